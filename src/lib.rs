//! Reef — supervises external coding-agent processes as tracked jobs.

pub mod adapters;
pub mod agent;
pub mod config;
pub mod console;
pub mod error;
pub mod events;
pub mod logging;
pub mod persistence;
pub mod service;

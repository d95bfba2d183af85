//! Agent module — job records, event tails, output plumbing and the job manager.

pub mod event_store;
pub mod job;
pub mod manager;
pub mod mux;

pub use event_store::EventStore;
pub use job::{Job, JobStatus};
pub use manager::{JobManager, SendOutcome};

pub mod api;
pub mod attempt;
pub mod config;
pub mod engine;
pub mod error;
pub mod job;
pub mod queue;
pub mod reaper;
pub mod recovery;
pub mod scheduler;
pub mod shutdown;
pub mod store;
pub mod worker;

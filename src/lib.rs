pub mod cache;
pub mod cli;
pub mod config;
pub mod core;
pub mod deadline;
pub mod error;
pub mod lock;
pub mod scheduler;
pub mod storage;

// src/refresh/mod.rs
//! Background refresh of the dividend cache.

pub mod coordinator;
pub mod scheduler;

pub use coordinator::{RefreshCoordinator, RefreshOutcome, RefreshReport, RefreshSettings};
pub use scheduler::{Scheduler, SchedulerSettings, TickOutcome};

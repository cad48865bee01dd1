//! Job lifecycle infrastructure.
//!
//! This module provides the kernel-level machinery for analysis runs:
//! - [`JobRecordStore`] - Authoritative per-key record of status, steps and
//!   terminal result/error, with run-id guarded writes
//! - [`ProgressHub`] - Per-key broadcast fan-out for observers
//! - [`JobRunner`] - Admission control and one spawned task per run
//! - [`JobEvent`] - Lifecycle facts observers consume
//!
//! # Architecture
//!
//! ```text
//! caller submits a key
//!     │
//!     └─► JobRunner (at most one active run per key)
//!             └─► BaseAnalyzer stream ──► JobRecordStore (run-id guard)
//!                                              └─► ProgressHub ──► observers
//! ```
//!
//! What the analysis actually does is the collaborator's business; this
//! module only owns the lifecycle.

pub mod events;
mod hub;
mod record;
mod runner;
pub mod testing;

pub use events::JobEvent;
pub use hub::ProgressHub;
pub use record::{CancelMode, JobRecordStore, JobSnapshot};
pub use runner::{JobRunner, RunHandle};

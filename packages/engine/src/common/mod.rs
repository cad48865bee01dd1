//! Shared types and errors used across the kernel.

pub mod error;
pub mod types;

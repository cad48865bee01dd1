//! Kernel: the analysis job lifecycle engine and its collaborator seams.

pub mod engine;
pub mod history;
pub mod jobs;
pub mod publish;
pub mod traits;

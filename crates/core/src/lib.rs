//! Pure domain logic for the storyreel content pipeline.
//!
//! Nothing in this crate performs I/O. Stage services in
//! `storyreel-pipeline` load state through the store traits and pass it
//! in here for evaluation.

pub mod assembly;
pub mod chaptering;
pub mod dependencies;
pub mod error;
pub mod lifecycle;
pub mod naming;
pub mod narration;
pub mod polling;
pub mod subtitle;
pub mod types;

//! gpusched-runtime: Runtime abstraction layer
//!
//! This crate provides runtime implementations for running scheduled jobs:
//! - Shell process runtime binding each job to one GPU

pub mod process;
pub mod traits;

pub use process::ProcessRuntime;
pub use traits::Runtime;

//! gpusched-core: Core types and traits for gpusched
//!
//! This crate provides the fundamental types used throughout the gpusched system:
//! - Job and job outcome types
//! - Configuration types
//! - Error handling
//! - GPU device snapshots and the probes that produce them

pub mod config;
pub mod error;
pub mod gpu;
pub mod job;
pub mod probe;

pub use config::*;
pub use error::*;
pub use gpu::*;
pub use job::*;
pub use probe::*;

//! Core trait abstractions for the pipeline.
//!
//! These traits define the interfaces that applications implement
//! to provide reasoning capabilities and narrative search tools.

pub mod capability;
pub mod toolbox;

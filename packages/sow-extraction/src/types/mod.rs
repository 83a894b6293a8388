//! Data types for the source-of-wealth pipeline.

pub mod config;
pub mod envelope;
pub mod evidence;
pub mod record;
pub mod source;

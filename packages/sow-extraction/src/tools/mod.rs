//! Search toolbox implementations.

pub mod narrative;
pub mod patterns;

pub use narrative::NarrativeToolbox;

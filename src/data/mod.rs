//! Synthetic observation generation.

pub mod sample;

pub use sample::*;

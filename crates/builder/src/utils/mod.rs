//! Utility modules for the builder crate

pub mod patterns;
pub mod text;
pub mod timeout;

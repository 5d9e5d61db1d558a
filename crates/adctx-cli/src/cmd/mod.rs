//! Command implementations by domain.

pub mod memory;
pub mod trainer;

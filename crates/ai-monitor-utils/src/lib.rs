//! Small dependency-free helpers shared across the monitor crates.

pub mod assert;

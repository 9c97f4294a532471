//! Wiring for the headless `notebook` binary.

pub mod backends;
pub mod printer;

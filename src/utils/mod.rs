//! Shared constants and helpers

pub mod constants;

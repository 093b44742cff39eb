// Exhibitor Search - util/mod.rs
//
// Utility modules: error types, named constants, logging setup.
// Error classification reuses core::ratelimit; no dependencies on app or platform.

pub mod constants;
pub mod error;
pub mod logging;

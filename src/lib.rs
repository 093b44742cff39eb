// Exhibitor Search - lib.rs
//
// Library entry point, exposing every module for integration testing.
// The CLI lives in `main.rs`.

pub mod app;
pub mod core;
pub mod platform;
pub mod util;

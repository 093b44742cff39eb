// Exhibitor Search - platform/mod.rs
//
// Platform abstraction layer.
// Dependencies: standard library, directories, toml, serde_json.
// Must NOT depend on: core, app.

pub mod config;
pub mod fs;

// Exhibitor Search - core/mod.rs
//
// Core crawl logic layer.
// Dependencies: serde, serde_json, indexmap, csv, tracing.
// Must NOT depend on: platform, app, or any network/filesystem crate directly.

pub mod config;
pub mod export;
pub mod extract;
pub mod model;
pub mod pagination;
pub mod ratelimit;
pub mod response;
pub mod template;

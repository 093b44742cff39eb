// Exhibitor Search - app/mod.rs
//
// Application layer: config directory loading, HTTP, crawl orchestration,
// config testing and upgrade.
// Dependencies: core, platform, util.

pub mod config_mgr;
pub mod crawl;
pub mod detail;
pub mod exporter;
pub mod http;
pub mod tester;
pub mod upgrade;

pub mod config;
pub mod logging;

// Core modules
pub mod executor;
pub mod fetch;
pub mod loader;
pub mod manifest;
pub mod merge;
pub mod script;
pub mod semver;
pub mod url_resolve;

//! CLI command handlers. Each command is in its own file for clarity.

mod fetch;
mod manifest;
mod resolve;
mod run;
mod satisfies;

pub use fetch::run_fetch;
pub use manifest::run_manifest;
pub use resolve::run_resolve;
pub use run::run_module;
pub use satisfies::run_satisfies;

//! `rml manifest <host>` – fetch, decode, and print a host's manifest.

use anyhow::{Context, Result};
use rml_core::fetch::FetchQueue;
use rml_core::loader::{LoaderOptions, RemoteModule};
use rml_core::script::json::value_to_json_lossy;

/// Prints the decoded manifest as JSON. Reconstructed functions, regexes,
/// and dates render as display strings.
pub async fn run_manifest(queue: FetchQueue, host: &str, options: LoaderOptions) -> Result<()> {
    let module = RemoteModule::new(queue, host, options);
    let manifest = module
        .manifest()
        .await
        .with_context(|| format!("loading manifest from {}", module.host()))?;
    println!(
        "{}",
        serde_json::to_string_pretty(&value_to_json_lossy(&manifest))?
    );
    Ok(())
}

//! `rml run <url>` – fetch a module, execute it, print its exports.

use anyhow::{Context, Result};
use rml_core::executor::ExecuteOptions;
use rml_core::fetch::{FetchOptions, FetchQueue};
use rml_core::loader;
use rml_core::script::json::value_to_json_lossy;

pub async fn run_module(queue: &FetchQueue, url: &str, options: FetchOptions) -> Result<()> {
    let exports = loader::import_script(queue, url, &options, &ExecuteOptions::default())
        .await
        .with_context(|| format!("running module {url}"))?;
    println!(
        "{}",
        serde_json::to_string_pretty(&value_to_json_lossy(&exports))?
    );
    Ok(())
}

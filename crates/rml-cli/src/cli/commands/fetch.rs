//! `rml fetch <url>` – fetch one URL and print the body text.

use anyhow::{Context, Result};
use rml_core::fetch::{FetchOptions, FetchQueue};

pub async fn run_fetch(queue: &FetchQueue, url: &str, options: FetchOptions) -> Result<()> {
    let text = queue
        .fetch(url, &options)
        .await
        .with_context(|| format!("fetching {url}"))?;
    print!("{text}");
    if !text.ends_with('\n') {
        println!();
    }
    Ok(())
}

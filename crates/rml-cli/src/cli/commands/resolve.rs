//! `rml resolve <path>` – resolve a module path to an absolute URL.

use anyhow::{bail, Context, Result};
use rml_core::config::RmlConfig;
use rml_core::url_resolve::{is_absolute_url, resolve_relative_url, Location};

pub async fn run_resolve(cfg: &RmlConfig, path: &str, host: Option<&str>) -> Result<()> {
    if host.is_none() && cfg.base_url.is_none() && !is_absolute_url(path) && !path.is_empty() {
        bail!("relative path {path:?} needs --host or a configured base_url");
    }

    let location = match &cfg.base_url {
        Some(base) => {
            Location::from_url(base).with_context(|| format!("invalid base_url {base:?}"))?
        }
        None => Location::new("", ""),
    };

    let resolved = resolve_relative_url(path, host, &location);
    if let Some(derived) = &resolved.derived_host {
        tracing::debug!("derived host {derived} from the configured base URL");
    }
    println!("{}", resolved.url);
    Ok(())
}

//! `rml satisfies <version> <range>` – version range check.

use anyhow::Result;
use rml_core::semver;

pub async fn run_satisfies(version: &str, range: &str) -> Result<()> {
    println!("{}", semver::satisfy(version, range));
    Ok(())
}

//! Remote module orchestration: one host, its manifest, and its modules.
//!
//! A [`RemoteModule`] borrows a shared [`FetchQueue`] rather than owning its
//! own, so several hosts (or repeat loads against one host) share a single
//! fetch cache whose lifetime the caller controls. The decoded manifest and
//! every required module's exports are memoized per instance; a repeat
//! `require` hands back the same exports object, not a re-executed copy.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use thiserror::Error;

use crate::executor::{self, ExecuteOptions};
use crate::fetch::{FetchError, FetchOptions, FetchQueue};
use crate::manifest::{self, DecodeError};
use crate::merge;
use crate::script::{json, ScriptError, Value};
use crate::semver;
use crate::url_resolve::{host_of_url, join_url};

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error("manifest version {found:?} does not satisfy required {required:?}")]
    IncompatibleVersion { required: String, found: String },

    #[error("module {name:?} is not listed in the manifest")]
    ModuleNotFound { name: String },
}

/// Per-host loading policy. `Default` means: default timeout, caching on,
/// no execution context, no version requirement.
#[derive(Debug, Clone, Default)]
pub struct LoaderOptions {
    pub timeout: Option<Duration>,
    pub nocache: bool,
    /// Execution context whose properties shadow globals inside module code.
    pub context: Option<Value>,
    /// Extra properties set on each module's `module` object.
    pub module_props: Vec<(String, Value)>,
    /// Range the manifest's `version` field must satisfy, e.g. `"^2.1"`.
    pub required_version: Option<String>,
    /// Merged over the decoded manifest before it is used.
    pub overrides: Option<Value>,
}

#[derive(Default)]
struct LoaderState {
    manifest: Option<Value>,
    exports: HashMap<String, Value>,
}

pub struct RemoteModule {
    queue: FetchQueue,
    host: String,
    options: LoaderOptions,
    state: Mutex<LoaderState>,
}

impl RemoteModule {
    /// `host_or_url` may be the host directory itself or a full script URL;
    /// a `.js` URL is trimmed to its directory.
    pub fn new(queue: FetchQueue, host_or_url: &str, options: LoaderOptions) -> RemoteModule {
        RemoteModule {
            queue,
            host: host_of_url(host_or_url),
            options,
            state: Mutex::new(LoaderState::default()),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            timeout: self.options.timeout,
            sync: false,
            nocache: self.options.nocache,
        }
    }

    fn execute_options(&self) -> ExecuteOptions {
        ExecuteOptions {
            context: self.options.context.clone(),
            module_props: self.options.module_props.clone(),
        }
    }

    /// Fetches and decodes `<host>/manifest.json`, merges overrides into it,
    /// enforces the version requirement, and memoizes the tree. Concurrent
    /// first calls may decode twice (the fetch itself is single-flight); the
    /// first memoized tree wins so every caller sees the same object.
    pub async fn manifest(&self) -> Result<Value, LoaderError> {
        if let Some(tree) = self.state.lock().unwrap().manifest.clone() {
            return Ok(tree);
        }

        let url = join_url(&self.host, "manifest.json");
        let text = self.queue.fetch(&url, &self.fetch_options()).await?;
        let tree = manifest::parse_manifest(&text)?;
        if let Some(overrides) = &self.options.overrides {
            merge::merge(&tree, overrides);
        }
        if let Some(required) = &self.options.required_version {
            let version = tree.get("version");
            let found = version.as_ref().and_then(|v| v.as_str()).unwrap_or("");
            if !semver::satisfy(found, required) {
                return Err(LoaderError::IncompatibleVersion {
                    required: required.clone(),
                    found: found.to_string(),
                });
            }
        }

        let mut state = self.state.lock().unwrap();
        Ok(state.manifest.get_or_insert_with(|| tree).clone())
    }

    /// Loads the module registered under `name` in the manifest's `modules`
    /// table. Exports are cached per name for the instance's lifetime.
    pub async fn require(&self, name: &str) -> Result<Value, LoaderError> {
        if let Some(exports) = self.state.lock().unwrap().exports.get(name).cloned() {
            return Ok(exports);
        }

        let tree = self.manifest().await?;
        let modules = tree.get("modules");
        let entry = modules.as_ref().and_then(|m| m.get(name));
        let path = match entry.as_ref().and_then(|v| v.as_str()) {
            Some(path) => path.to_string(),
            None => {
                return Err(LoaderError::ModuleNotFound {
                    name: name.to_string(),
                })
            }
        };

        let url = join_url(&self.host, &path);
        let text = self.queue.fetch(&url, &self.fetch_options()).await?;
        let exports = executor::execute(&text, &self.execute_options())?;

        let mut state = self.state.lock().unwrap();
        Ok(state.exports.entry(name.to_string()).or_insert(exports).clone())
    }

    /// Fetches and executes an arbitrary module URL resolved against the
    /// host. Nothing is cached beyond the fetch layer.
    pub async fn import(&self, url: &str) -> Result<Value, LoaderError> {
        let resolved = join_url(&self.host, url);
        let text = self.queue.fetch(&resolved, &self.fetch_options()).await?;
        Ok(executor::execute(&text, &self.execute_options())?)
    }
}

/// Fetches and executes one script URL, no host resolution or caching.
pub async fn import_script(
    queue: &FetchQueue,
    url: &str,
    fetch_options: &FetchOptions,
    execute_options: &ExecuteOptions,
) -> Result<Value, LoaderError> {
    let text = queue.fetch(url, fetch_options).await?;
    Ok(executor::execute(&text, execute_options)?)
}

/// Fetches a JSON document into a script value. Encoded function/regex/date
/// objects are left as the plain data they arrived as; go through
/// [`manifest::parse_manifest`] when they should be reconstructed.
pub async fn import_json(
    queue: &FetchQueue,
    url: &str,
    fetch_options: &FetchOptions,
) -> Result<Value, LoaderError> {
    let text = queue.fetch(url, fetch_options).await?;
    let tree: serde_json::Value = serde_json::from_str(&text).map_err(DecodeError::from)?;
    Ok(json::from_json(&tree))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loader(host: &str) -> RemoteModule {
        RemoteModule::new(FetchQueue::new(), host, LoaderOptions::default())
    }

    #[test]
    fn script_url_is_trimmed_to_its_host() {
        let rm = loader("http://cdn.example/app/entry.js");
        assert_eq!(rm.host(), "http://cdn.example/app");
        let rm = loader("http://cdn.example/app");
        assert_eq!(rm.host(), "http://cdn.example/app");
    }

    #[test]
    fn loader_options_map_onto_fetch_options() {
        let rm = RemoteModule::new(
            FetchQueue::new(),
            "http://cdn.example/app",
            LoaderOptions {
                timeout: Some(Duration::from_millis(250)),
                nocache: true,
                ..LoaderOptions::default()
            },
        );
        let opts = rm.fetch_options();
        assert_eq!(opts.timeout, Some(Duration::from_millis(250)));
        assert!(opts.nocache);
        assert!(!opts.sync);
    }

    #[tokio::test]
    async fn require_reports_unlisted_modules() {
        let rm = loader("http://cdn.example/app");
        rm.state.lock().unwrap().manifest = Some(Value::object_from(vec![(
            "modules".to_string(),
            Value::object_from(vec![("a".to_string(), Value::string("a.js"))]),
        )]));

        let err = rm.require("missing").await.unwrap_err();
        match err {
            LoaderError::ModuleNotFound { name } => assert_eq!(name, "missing"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn cached_exports_are_returned_by_identity() {
        let rm = loader("http://cdn.example/app");
        let exports = Value::object_from(vec![("n".to_string(), Value::Number(1.0))]);
        rm.state
            .lock()
            .unwrap()
            .exports
            .insert("mod".to_string(), exports.clone());

        let first = rm.require("mod").await.unwrap();
        let second = rm.require("mod").await.unwrap();
        assert!(Value::same_ref(&first, &exports));
        assert!(Value::same_ref(&first, &second));
    }

    #[tokio::test]
    async fn memoized_manifest_skips_the_network() {
        let rm = loader("http://cdn.example/app");
        let tree = Value::object_from(vec![("version".to_string(), Value::string("1.0.0"))]);
        rm.state.lock().unwrap().manifest = Some(tree.clone());

        let manifest = rm.manifest().await.unwrap();
        assert!(Value::same_ref(&manifest, &tree));
    }
}

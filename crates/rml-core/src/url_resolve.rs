//! URL helpers for locating remote modules: absolute-URL detection, host/path
//! joining, and resolution of `./`-relative references against a host or the
//! configured base location.

use url::Url;

/// True for explicit-scheme (`http://`, `https://`), scheme-relative (`//`),
/// and `data:` URLs.
pub fn is_absolute_url(url: &str) -> bool {
    url.starts_with("http://")
        || url.starts_with("https://")
        || url.starts_with("//")
        || url.starts_with("data:")
}

/// Joins a host and a path with exactly one `/` between them.
///
/// A single layer of surrounding quote characters on `path` is stripped
/// (paths sometimes arrive still wrapped from a config string). The path is
/// returned unchanged when the host is empty, when the path is already
/// absolute, and when the host is an absolute local path the path already
/// starts with.
pub fn join_url(host: &str, path: &str) -> String {
    let path = strip_quotes(path);
    if host.is_empty() || is_absolute_url(path) {
        return path.to_string();
    }
    if is_local_abs_path(host) && path.starts_with(host) {
        return path.to_string();
    }
    let host = host.strip_suffix('/').unwrap_or(host);
    let path = path.strip_prefix("./").unwrap_or(path);
    if path.starts_with('/') {
        format!("{}{}", host, path)
    } else {
        format!("{}/{}", host, path)
    }
}

fn strip_quotes(path: &str) -> &str {
    let bytes = path.as_bytes();
    if bytes.len() >= 3 {
        let first = bytes[0];
        let last = bytes[bytes.len() - 1];
        if (first == b'"' || first == b'\'') && (last == b'"' || last == b'\'') {
            return &path[1..path.len() - 1];
        }
    }
    path
}

fn is_local_abs_path(host: &str) -> bool {
    let mut chars = host.chars();
    chars.next() == Some('/') && chars.next().is_some_and(|c| c.is_ascii_alphabetic())
}

/// Derives the host part of a module URL: query and fragment are dropped, and
/// when the path ends in `.js` the file segment is dropped too. A URL that
/// does not point at a script is already a host.
pub fn host_of_url(url: &str) -> String {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    let url = &url[..end];
    if !url.ends_with(".js") {
        return url.to_string();
    }
    match url.rfind('/') {
        Some(i) => url[..i].to_string(),
        None => String::new(),
    }
}

/// The "current document" a relative module reference resolves against when
/// no explicit host is given.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    pub origin: String,
    pub pathname: String,
}

impl Location {
    pub fn new(origin: impl Into<String>, pathname: impl Into<String>) -> Location {
        Location {
            origin: origin.into(),
            pathname: pathname.into(),
        }
    }

    /// Splits an absolute URL into origin and pathname.
    pub fn from_url(url: &str) -> Result<Location, url::ParseError> {
        let parsed = Url::parse(url)?;
        Ok(Location {
            origin: parsed.origin().ascii_serialization(),
            pathname: parsed.path().to_string(),
        })
    }
}

/// Result of [`resolve_relative_url`]. `derived_host` is `Some` exactly when
/// the host had to be computed from the location rather than passed in, so
/// the caller can remember it for subsequent lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub url: String,
    pub derived_host: Option<String>,
}

/// Resolves a possibly-relative module URL. Absolute and empty URLs pass
/// through. A `./`-prefixed URL resolves against `host` when given, otherwise
/// against the location's directory: origin + pathname, trimmed to the parent
/// segment when the pathname names an `.html`/`.htm`/`.js` document.
pub fn resolve_relative_url(url: &str, host: Option<&str>, location: &Location) -> Resolved {
    if url.is_empty() || is_absolute_url(url) {
        return Resolved {
            url: url.to_string(),
            derived_host: None,
        };
    }
    let mut effective_host = match host {
        Some(h) => h.to_string(),
        None => location.origin.clone(),
    };
    let mut derived_host = None;
    let mut rest = url;
    if let Some(stripped) = url.strip_prefix("./") {
        rest = stripped;
        if host.is_none() {
            let mut base = format!("{}{}", location.origin, location.pathname);
            if ends_with_doc_extension(&base) {
                base = match base.rfind('/') {
                    Some(i) => base[..i].to_string(),
                    None => String::new(),
                };
            }
            derived_host = Some(base.clone());
            effective_host = base;
        }
    }
    Resolved {
        url: join_url(&effective_host, rest),
        derived_host,
    }
}

fn ends_with_doc_extension(path: &str) -> bool {
    path.ends_with(".html") || path.ends_with(".htm") || path.ends_with(".js")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_url_detection() {
        assert!(is_absolute_url("http://host/x.js"));
        assert!(is_absolute_url("https://host/x.js"));
        assert!(is_absolute_url("//cdn/x.js"));
        assert!(is_absolute_url("data:text/plain,x"));
        assert!(!is_absolute_url("./x.js"));
        assert!(!is_absolute_url("x.js"));
        assert!(!is_absolute_url("/opt/x.js"));
    }

    #[test]
    fn join_inserts_exactly_one_slash() {
        assert_eq!(join_url("http://host/app/", "./a.js"), "http://host/app/a.js");
        assert_eq!(join_url("http://host/app", "a.js"), "http://host/app/a.js");
        assert_eq!(join_url("http://host/app", "/a.js"), "http://host/app/a.js");
    }

    #[test]
    fn join_passes_through_absolute_and_hostless() {
        assert_eq!(join_url("", "./a.js"), "./a.js");
        assert_eq!(
            join_url("http://host", "https://cdn/b.js"),
            "https://cdn/b.js"
        );
    }

    #[test]
    fn join_strips_one_quote_layer() {
        assert_eq!(join_url("http://h", "'./a.js'"), "http://h/a.js");
        assert_eq!(join_url("http://h", "\"b.js\""), "http://h/b.js");
        assert_eq!(join_url("", "'c.js'"), "c.js");
    }

    #[test]
    fn join_does_not_double_prefix_local_paths() {
        assert_eq!(join_url("/opt/app", "/opt/app/x.js"), "/opt/app/x.js");
        assert_eq!(join_url("/opt/app", "x.js"), "/opt/app/x.js");
    }

    #[test]
    fn host_of_url_drops_script_segment() {
        assert_eq!(host_of_url("http://h/a/b.js"), "http://h/a");
        assert_eq!(host_of_url("http://h/a/b.js?v=1#frag"), "http://h/a");
        assert_eq!(host_of_url("http://h/a/b?v=1"), "http://h/a/b");
        assert_eq!(host_of_url("b.js"), "");
    }

    #[test]
    fn resolve_relative_with_explicit_host() {
        let resolved = resolve_relative_url("./x.js", Some("http://cdn/v1"), &Location::default());
        assert_eq!(resolved.url, "http://cdn/v1/x.js");
        assert_eq!(resolved.derived_host, None);
    }

    #[test]
    fn resolve_relative_derives_host_from_location() {
        let location = Location::new("http://app", "/pages/index.html");
        let resolved = resolve_relative_url("./mod.js", None, &location);
        assert_eq!(resolved.url, "http://app/pages/mod.js");
        assert_eq!(resolved.derived_host.as_deref(), Some("http://app/pages"));
    }

    #[test]
    fn resolve_relative_keeps_directory_pathname() {
        let location = Location::new("http://app", "/pages");
        let resolved = resolve_relative_url("./mod.js", None, &location);
        assert_eq!(resolved.url, "http://app/pages/mod.js");
    }

    #[test]
    fn resolve_passes_through_absolute_and_empty() {
        let location = Location::new("http://app", "/");
        let resolved = resolve_relative_url("https://cdn/x.js", None, &location);
        assert_eq!(resolved.url, "https://cdn/x.js");
        assert_eq!(resolved.derived_host, None);
        assert_eq!(resolve_relative_url("", None, &location).url, "");
    }

    #[test]
    fn resolve_without_dot_prefix_uses_origin() {
        let location = Location::new("http://app", "/pages/index.html");
        let resolved = resolve_relative_url("mod.js", None, &location);
        assert_eq!(resolved.url, "http://app/mod.js");
        assert_eq!(resolved.derived_host, None);
    }

    #[test]
    fn location_from_url() {
        let location = Location::from_url("http://app:8080/pages/index.html?q=1").unwrap();
        assert_eq!(location.origin, "http://app:8080");
        assert_eq!(location.pathname, "/pages/index.html");
    }
}

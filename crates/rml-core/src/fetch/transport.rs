//! Blocking HTTP GET over libcurl.
//!
//! Runs on the calling thread; async callers go through `spawn_blocking` in
//! the queue layer. The watchdog timeout covers the whole transfer and maps
//! to [`FetchError::Timeout`], matching the abort-on-timer behavior the
//! fetch layer promises.

use std::sync::Arc;
use std::time::Duration;

use super::{FetchError, FetchResult};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_REDIRECTS: u32 = 10;

/// Fetches `url` and returns the body text. 200 and 304 succeed; 404, other
/// statuses, timeouts, and transport failures map onto the [`FetchError`]
/// variants, each carrying the requested URL.
pub fn get_text(url: &str, timeout: Duration) -> FetchResult {
    let mut body: Vec<u8> = Vec::new();

    let mut easy = curl::easy::Easy::new();
    configure(&mut easy, url, timeout).map_err(|e| classify(url, e))?;

    {
        let mut transfer = easy.transfer();
        transfer
            .write_function(|data| {
                body.extend_from_slice(data);
                Ok(data.len())
            })
            .map_err(|e| classify(url, e))?;
        transfer.perform().map_err(|e| classify(url, e))?;
    }

    let status = easy.response_code().map_err(|e| classify(url, e))?;
    match status {
        0 => Err(FetchError::Timeout {
            url: url.to_string(),
        }),
        404 => Err(FetchError::NotFound {
            url: url.to_string(),
        }),
        200 | 304 => match String::from_utf8(body) {
            Ok(text) => Ok(Arc::from(text)),
            Err(_) => Err(FetchError::Transport {
                url: url.to_string(),
                detail: "response body is not valid UTF-8".to_string(),
            }),
        },
        status => Err(FetchError::Status {
            url: url.to_string(),
            status,
        }),
    }
}

fn configure(easy: &mut curl::easy::Easy, url: &str, timeout: Duration) -> Result<(), curl::Error> {
    easy.url(url)?;
    easy.get(true)?;
    easy.follow_location(true)?;
    easy.max_redirections(MAX_REDIRECTS)?;
    easy.connect_timeout(CONNECT_TIMEOUT)?;
    easy.timeout(timeout)?;

    let mut list = curl::easy::List::new();
    list.append("Content-Type: text/plain;charset=UTF-8")?;
    easy.http_headers(list)?;
    Ok(())
}

fn classify(url: &str, err: curl::Error) -> FetchError {
    if err.is_operation_timedout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Transport {
            url: url.to_string(),
            detail: err.to_string(),
        }
    }
}

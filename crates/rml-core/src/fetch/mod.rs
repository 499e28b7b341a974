//! Single-flight, order-preserving fetch layer.
//!
//! Every distinct URL gets at most one network request per queue lifetime:
//! the first caller creates a pending cache entry and a FIFO queue item,
//! later callers for the same key attach to the pending entry, and completed
//! results (success or failure) are memoized until the queue is dropped.
//!
//! Delivery order is submission order. A settled transfer marks its queue
//! item done, but callers only observe completions when the item reaches the
//! queue front; settling the head drains the contiguous run of already-done
//! items behind it. Responses arriving out of order therefore never reorder
//! caller-visible resolutions.

pub mod transport;

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tokio::sync::oneshot;

/// Watchdog timeout applied when `FetchOptions::timeout` is unset.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(120_000);

#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("fetch [{url}] timed out")]
    Timeout { url: String },

    #[error("fetch [{url}] not found")]
    NotFound { url: String },

    #[error("fetch [{url}] failed with status {status}")]
    Status { url: String, status: u32 },

    #[error("fetch [{url}] failed: {detail}")]
    Transport { url: String, detail: String },
}

impl FetchError {
    /// The URL the failed request was issued for, cache-busting suffix
    /// included.
    pub fn url(&self) -> &str {
        match self {
            FetchError::Timeout { url }
            | FetchError::NotFound { url }
            | FetchError::Status { url, .. }
            | FetchError::Transport { url, .. } => url,
        }
    }
}

pub type FetchResult = Result<Arc<str>, FetchError>;

#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Whole-transfer watchdog; [`DEFAULT_TIMEOUT`] when unset.
    pub timeout: Option<Duration>,
    /// Run the transport inline on the calling thread. Delivery order is
    /// still FIFO.
    pub sync: bool,
    /// Append a `_=<epoch-millis>` query parameter before caching and
    /// transport, defeating both this cache and intermediaries.
    pub nocache: bool,
}

/// Cheap-clone handle to one fetch cache + queue. Lifetime of the memoized
/// results is the lifetime of this queue; there is no eviction, failed
/// entries included.
#[derive(Clone, Default)]
pub struct FetchQueue {
    state: Arc<Mutex<QueueState>>,
}

#[derive(Default)]
struct QueueState {
    cache: HashMap<String, CacheEntry>,
    queue: VecDeque<QueueItem>,
}

enum CacheEntry {
    Pending {
        waiters: Vec<oneshot::Sender<FetchResult>>,
    },
    Done(FetchResult),
}

struct QueueItem {
    url: String,
    outcome: Option<FetchResult>,
}

enum Plan {
    Ready(FetchResult),
    Wait {
        url: String,
        rx: oneshot::Receiver<FetchResult>,
    },
}

impl FetchQueue {
    pub fn new() -> FetchQueue {
        FetchQueue::default()
    }

    /// Fetches `url` as text. The cache lookup, queue insertion, and
    /// transport dispatch all happen synchronously in this call, so
    /// submission order is call order; the returned future resolves in that
    /// order. Non-`sync` transports need a tokio runtime on the calling
    /// thread.
    pub fn fetch(
        &self,
        url: &str,
        options: &FetchOptions,
    ) -> impl Future<Output = FetchResult> + Send + 'static {
        let plan = self.submit(url, options);
        async move {
            match plan {
                Plan::Ready(result) => result,
                Plan::Wait { url, rx } => match rx.await {
                    Ok(result) => result,
                    Err(_) => Err(FetchError::Transport {
                        url,
                        detail: "fetch queue dropped before completion".to_string(),
                    }),
                },
            }
        }
    }

    fn submit(&self, url: &str, options: &FetchOptions) -> Plan {
        let url = if options.nocache {
            cache_bust(url)
        } else {
            url.to_string()
        };
        let timeout = options.timeout.unwrap_or(DEFAULT_TIMEOUT);

        let rx = {
            let mut state = self.state.lock().unwrap();
            match state.cache.get_mut(&url) {
                Some(CacheEntry::Done(result)) => {
                    tracing::debug!(url = %url, "fetch served from cache");
                    return Plan::Ready(result.clone());
                }
                Some(CacheEntry::Pending { waiters }) => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    return Plan::Wait { url, rx };
                }
                None => {}
            }
            let (tx, rx) = oneshot::channel();
            state.cache.insert(
                url.clone(),
                CacheEntry::Pending { waiters: vec![tx] },
            );
            state.queue.push_back(QueueItem {
                url: url.clone(),
                outcome: None,
            });
            rx
        };

        tracing::debug!(url = %url, sync = options.sync, "fetch submitted");
        if options.sync {
            let result = transport::get_text(&url, timeout);
            self.settle(&url, result);
        } else {
            let queue = self.clone();
            let task_url = url.clone();
            tokio::task::spawn_blocking(move || {
                let result = transport::get_text(&task_url, timeout);
                queue.settle(&task_url, result);
            });
        }
        Plan::Wait { url, rx }
    }

    /// Records a transfer outcome and delivers every queue item that is now
    /// at the front with a settled result, in order. Waiters are notified
    /// after the state lock is released.
    fn settle(&self, url: &str, result: FetchResult) {
        let mut deliveries: Vec<(Vec<oneshot::Sender<FetchResult>>, FetchResult)> = Vec::new();
        {
            let mut state = self.state.lock().unwrap();
            if let Some(item) = state
                .queue
                .iter_mut()
                .find(|item| item.url == url && item.outcome.is_none())
            {
                item.outcome = Some(result);
            }
            while state
                .queue
                .front()
                .is_some_and(|item| item.outcome.is_some())
            {
                let Some(item) = state.queue.pop_front() else {
                    break;
                };
                let Some(outcome) = item.outcome else {
                    break;
                };
                if let Err(ref err) = outcome {
                    tracing::warn!("{}", err);
                }
                let waiters = match state
                    .cache
                    .insert(item.url, CacheEntry::Done(outcome.clone()))
                {
                    Some(CacheEntry::Pending { waiters }) => waiters,
                    _ => Vec::new(),
                };
                deliveries.push((waiters, outcome));
            }
        }
        for (waiters, result) in deliveries {
            for waiter in waiters {
                let _ = waiter.send(result.clone());
            }
        }
    }
}

fn cache_bust(url: &str) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let sep = if url.contains('?') { '&' } else { '?' };
    format!("{}{}_={}", url, sep, millis)
}

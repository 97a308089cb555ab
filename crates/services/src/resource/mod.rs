pub mod ports;

pub use ports::*;

use futures::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

pub type ProducerFuture<T> = BoxFuture<'static, anyhow::Result<T>>;
pub type Producer<T> = Arc<dyn Fn() -> ProducerFuture<T> + Send + Sync>;

/// Construction parameters for an [`AsyncResource`]
pub struct ResourceOptions<T> {
    pub producer: Producer<T>,
    pub skip_initial_fetch: bool,
    pub settle_policy: SettlePolicy,
}

impl<T: Send + 'static> ResourceOptions<T> {
    pub fn new<F, Fut>(producer: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Self {
            producer: Arc::new(move || producer().boxed()),
            skip_initial_fetch: false,
            settle_policy: SettlePolicy::default(),
        }
    }

    pub fn skip_initial_fetch(mut self, skip: bool) -> Self {
        self.skip_initial_fetch = skip;
        self
    }

    pub fn settle_policy(mut self, policy: SettlePolicy) -> Self {
        self.settle_policy = policy;
        self
    }
}

/// Drives one asynchronous producer and exposes `{data, loading, error}`.
///
/// Unless the initial fetch is skipped, construction starts a fetch on the
/// current Tokio runtime, so `new` must be called from within one. Clones
/// share the same state.
pub struct AsyncResource<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for AsyncResource<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct Inner<T> {
    producer: Producer<T>,
    policy: SettlePolicy,
    notifier: Arc<dyn NotificationSink>,
    state: watch::Sender<ResourceState<T>>,
    generation: AtomicU64,
    producer_calls: AtomicU64,
}

impl<T> AsyncResource<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(options: ResourceOptions<T>, notifier: Arc<dyn NotificationSink>) -> Self {
        let initial = if options.skip_initial_fetch {
            ResourceState::idle()
        } else {
            ResourceState::loading()
        };
        let (state, _) = watch::channel(initial);

        let resource = Self {
            inner: Arc::new(Inner {
                producer: options.producer,
                policy: options.settle_policy,
                notifier,
                state,
                generation: AtomicU64::new(0),
                producer_calls: AtomicU64::new(0),
            }),
        };

        if !options.skip_initial_fetch {
            let (generation, fetch) = resource.inner.begin_fetch();
            let inner = resource.inner.clone();
            tokio::spawn(async move {
                let result = run_producer(fetch).await;
                inner.settle(generation, result);
            });
        }

        resource
    }

    /// Start a fetch regardless of the current state and wait for it to
    /// settle. Failures are recorded in state, never returned.
    pub async fn refetch(&self) {
        let (generation, fetch) = self.inner.begin_fetch();
        let result = run_producer(fetch).await;
        self.inner.settle(generation, result);
    }

    pub fn state(&self) -> ResourceState<T> {
        self.inner.state.borrow().clone()
    }

    pub fn phase(&self) -> ResourcePhase {
        self.inner.state.borrow().phase()
    }

    /// Receiver that observes every state transition
    pub fn subscribe(&self) -> watch::Receiver<ResourceState<T>> {
        self.inner.state.subscribe()
    }

    /// Wait until no fetch is loading and return that state
    pub async fn settled(&self) -> ResourceState<T> {
        let mut rx = self.subscribe();
        let settled = match rx.wait_for(|state| !state.loading).await {
            Ok(state) => state.clone(),
            // Sender lives as long as `self`, so this is unreachable in practice
            Err(_) => self.state(),
        };
        settled
    }

    /// Number of times the producer has been invoked
    pub fn producer_calls(&self) -> u64 {
        self.inner.producer_calls.load(Ordering::SeqCst)
    }

    pub fn settle_policy(&self) -> SettlePolicy {
        self.inner.policy
    }
}

impl<T: 'static> Inner<T> {
    fn begin_fetch(&self) -> (u64, ProducerFuture<T>) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.send_modify(|state| {
            state.loading = true;
            state.error = None;
        });

        self.producer_calls.fetch_add(1, Ordering::SeqCst);
        debug!(generation, "Starting fetch");

        // Producer runs inside the returned future so run_producer catches its panics
        let producer = self.producer.clone();
        (generation, async move { producer().await }.boxed())
    }

    fn settle(&self, generation: u64, result: anyhow::Result<T>) {
        if self.policy == SettlePolicy::LatestStartedWins
            && generation != self.generation.load(Ordering::SeqCst)
        {
            debug!(generation, "Discarding result of superseded fetch");
            return;
        }

        match result {
            Ok(value) => {
                debug!(generation, "Fetch succeeded");
                self.state.send_modify(|state| {
                    state.data = Some(value);
                    state.error = None;
                    state.loading = false;
                });
            }
            Err(e) => {
                let message = error_message(&e);
                warn!(generation, error = %message, "Fetch failed");
                self.state.send_modify(|state| {
                    state.error = Some(message.clone());
                    state.loading = false;
                });
                self.notifier.notify(ERROR_TITLE, &message);
            }
        }
    }
}

/// Await the producer, treating a panic like a failure with no message
async fn run_producer<T>(fetch: ProducerFuture<T>) -> anyhow::Result<T> {
    match AssertUnwindSafe(fetch).catch_unwind().await {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!("")),
    }
}

fn error_message(error: &anyhow::Error) -> String {
    let message = error.to_string();
    if message.trim().is_empty() {
        FALLBACK_ERROR_MESSAGE.to_string()
    } else {
        message
    }
}

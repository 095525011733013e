//! Fetch policies.
//!
//! A fetch policy is the head interceptor of a chain. It decides whether a
//! request is served from the cache, the network, or both, and which
//! failures it replaces with a substitute response.
//!
//! | Policy            | Cache leg           | Network leg                     |
//! |-------------------|---------------------|---------------------------------|
//! | `CacheOnly`       | always              | never                           |
//! | `NetworkOnly`     | never               | always                          |
//! | `CacheFirst`      | first               | only on a miss                  |
//! | `NetworkFirst`    | only on a failure   | first                           |
//! | `CacheAndNetwork` | first               | always, after the cache         |
//!
//! [`RelayError::Cancelled`] is never converted by any policy.

use std::fmt;

use futures_util::StreamExt;
use futures_util::future::BoxFuture;

use horizon_relay_core::logging::targets;

use crate::error::RelayError;
use crate::interceptor::{
    Chain, EventSink, EventStream, Interceptor, InterceptorEvent, InterceptorRequest,
    InterceptorResponse,
};

/// Where a request's data comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum FetchPolicy {
    /// Read the cache only. A miss yields an empty `from_cache` response.
    CacheOnly,
    /// Always use the network.
    NetworkOnly,
    /// Use the cache; go to the network on a miss.
    #[default]
    CacheFirst,
    /// Use the network; fall back to the cache on a failure.
    NetworkFirst,
    /// Emit the cached value, then the network value.
    CacheAndNetwork,
}

impl fmt::Display for FetchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CacheOnly => write!(f, "cache-only"),
            Self::NetworkOnly => write!(f, "network-only"),
            Self::CacheFirst => write!(f, "cache-first"),
            Self::NetworkFirst => write!(f, "network-first"),
            Self::CacheAndNetwork => write!(f, "cache-and-network"),
        }
    }
}

/// Which cache-leg failures a policy replaces with an empty response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum CacheFailurePolicy {
    /// Only [`RelayError::CacheMiss`] is converted; storage faults
    /// propagate.
    MissOnly,
    /// Every failure except cancellation is converted.
    #[default]
    AllErrors,
}

impl CacheFailurePolicy {
    /// Check if `error` from a cache leg is replaced by an empty response.
    pub fn converts(self, error: &RelayError) -> bool {
        match self {
            _ if error.is_cancelled() => false,
            Self::MissOnly => error.is_cache_miss(),
            Self::AllErrors => true,
        }
    }
}

/// The head interceptor implementing a [`FetchPolicy`].
#[derive(Clone, Copy, Debug)]
pub struct FetchPolicyInterceptor {
    policy: FetchPolicy,
    cache_failures: CacheFailurePolicy,
}

impl FetchPolicyInterceptor {
    /// Create the interceptor for `policy` with the default
    /// [`CacheFailurePolicy`].
    pub fn new(policy: FetchPolicy) -> Self {
        Self {
            policy,
            cache_failures: CacheFailurePolicy::default(),
        }
    }

    /// Set which cache failures are converted.
    pub fn cache_failures(mut self, cache_failures: CacheFailurePolicy) -> Self {
        self.cache_failures = cache_failures;
        self
    }

    /// Get the policy.
    pub fn policy(&self) -> FetchPolicy {
        self.policy
    }
}

impl Interceptor for FetchPolicyInterceptor {
    fn intercept(
        &self,
        request: InterceptorRequest,
        chain: Chain,
        sink: EventSink,
    ) -> BoxFuture<'static, ()> {
        let Self {
            policy,
            cache_failures,
        } = *self;
        tracing::debug!(
            target: targets::FETCHER,
            request_id = %request.request_id(),
            %policy,
            "Applying fetch policy"
        );

        Box::pin(async move {
            match policy {
                FetchPolicy::CacheOnly => cache_only(request, chain, sink, cache_failures).await,
                FetchPolicy::NetworkOnly => network_leg(&request, &chain).forward_to(&sink).await,
                FetchPolicy::CacheFirst => cache_first(request, chain, sink, cache_failures).await,
                FetchPolicy::NetworkFirst => network_first(request, chain, sink).await,
                FetchPolicy::CacheAndNetwork => cache_and_network(request, chain, sink).await,
            }
        })
    }
}

fn cache_leg(request: &InterceptorRequest, chain: &Chain) -> EventStream {
    chain.proceed(request.to_builder().fetch_from_cache(true).build())
}

fn network_leg(request: &InterceptorRequest, chain: &Chain) -> EventStream {
    chain.proceed(request.to_builder().fetch_from_cache(false).build())
}

/// How a cache leg ended.
enum CacheOutcome {
    /// A response with data was relayed and the leg completed.
    Hit,
    /// The leg completed without data, or failed with a convertible error.
    Miss,
    /// The leg failed with an error that must not be converted.
    Failed(RelayError),
    /// The sink stopped accepting events.
    Closed,
}

/// Run the cache leg, relaying fetch markers and data responses.
async fn run_cache_leg(
    request: &InterceptorRequest,
    chain: &Chain,
    sink: &EventSink,
    cache_failures: CacheFailurePolicy,
) -> CacheOutcome {
    let mut events = cache_leg(request, chain);
    let mut hit = false;

    while let Some(event) = events.next().await {
        match event {
            InterceptorEvent::Response(response) if !response.has_data() => {}
            InterceptorEvent::Response(_) | InterceptorEvent::Fetch(_) => {
                hit |= matches!(event, InterceptorEvent::Response(_));
                if sink.emit(event).is_err() {
                    return CacheOutcome::Closed;
                }
            }
            InterceptorEvent::Completed if hit => return CacheOutcome::Hit,
            InterceptorEvent::Completed => return CacheOutcome::Miss,
            InterceptorEvent::Failed(error) if !hit && cache_failures.converts(&error) => {
                tracing::debug!(
                    target: targets::FETCHER,
                    request_id = %request.request_id(),
                    %error,
                    "Cache leg failed"
                );
                return CacheOutcome::Miss;
            }
            InterceptorEvent::Failed(error) => return CacheOutcome::Failed(error),
        }
    }
    CacheOutcome::Failed(RelayError::Protocol(
        "cache leg ended without a terminal event".to_string(),
    ))
}

async fn cache_only(
    request: InterceptorRequest,
    chain: Chain,
    sink: EventSink,
    cache_failures: CacheFailurePolicy,
) {
    let result = match run_cache_leg(&request, &chain, &sink, cache_failures).await {
        CacheOutcome::Hit => sink.complete(),
        CacheOutcome::Miss => sink
            .response(InterceptorResponse::cache_miss())
            .and_then(|()| sink.complete()),
        CacheOutcome::Failed(error) => sink.fail(error),
        CacheOutcome::Closed => return,
    };
    if let Err(err) = result {
        tracing::trace!(target: targets::FETCHER, error = %err, "Cache-only result not delivered");
    }
}

async fn cache_first(
    request: InterceptorRequest,
    chain: Chain,
    sink: EventSink,
    cache_failures: CacheFailurePolicy,
) {
    match run_cache_leg(&request, &chain, &sink, cache_failures).await {
        CacheOutcome::Hit => {
            let _ = sink.complete();
        }
        CacheOutcome::Miss => network_leg(&request, &chain).forward_to(&sink).await,
        CacheOutcome::Failed(error) => {
            let _ = sink.fail(error);
        }
        CacheOutcome::Closed => {}
    }
}

async fn network_first(request: InterceptorRequest, chain: Chain, sink: EventSink) {
    let mut events = network_leg(&request, &chain);
    let mut responded = false;

    while let Some(event) = events.next().await {
        match event {
            InterceptorEvent::Failed(error) if !responded && !error.is_cancelled() => {
                tracing::debug!(
                    target: targets::FETCHER,
                    request_id = %request.request_id(),
                    %error,
                    "Network leg failed, reading cache"
                );
                let outcome =
                    run_cache_leg(&request, &chain, &sink, CacheFailurePolicy::AllErrors).await;
                // Only a hit replaces the network failure.
                let _ = match outcome {
                    CacheOutcome::Hit => sink.complete(),
                    CacheOutcome::Failed(cache_error) if cache_error.is_cancelled() => {
                        sink.fail(cache_error)
                    }
                    CacheOutcome::Miss | CacheOutcome::Failed(_) => sink.fail(error),
                    CacheOutcome::Closed => Ok(()),
                };
                return;
            }
            event => {
                responded |= matches!(event, InterceptorEvent::Response(_));
                if sink.emit(event).is_err() {
                    return;
                }
            }
        }
    }
}

async fn cache_and_network(request: InterceptorRequest, chain: Chain, sink: EventSink) {
    match run_cache_leg(&request, &chain, &sink, CacheFailurePolicy::AllErrors).await {
        CacheOutcome::Hit | CacheOutcome::Miss => {}
        CacheOutcome::Failed(error) if error.is_cancelled() => {
            let _ = sink.fail(error);
            return;
        }
        CacheOutcome::Failed(error) => {
            tracing::debug!(
                target: targets::FETCHER,
                request_id = %request.request_id(),
                %error,
                "Cache leg failed, continuing with network"
            );
        }
        CacheOutcome::Closed => return,
    }
    network_leg(&request, &chain).forward_to(&sink).await;
}

//! Serving requests from and writing responses to the normalized cache.

use std::fmt;
use std::sync::Arc;

use futures_util::StreamExt;
use futures_util::future::BoxFuture;

use horizon_relay_core::logging::targets;

use super::chain::{Chain, Interceptor};
use super::event::{EventSink, FetchSourceType, InterceptorEvent, InterceptorResponse};
use super::request::InterceptorRequest;
use crate::cache::{CacheRead, NormalizedCache};
use crate::error::RelayError;
use crate::graphql::GraphQLResponse;

/// Reads from and writes to a [`NormalizedCache`].
///
/// A request with `fetch_from_cache` set is answered from the cache alone:
/// a hit yields one `from_cache` response and `Completed`, a miss fails with
/// [`RelayError::CacheMiss`]. Any other request proceeds down the chain and
/// every network response carrying data is written back under the
/// operation's cache key.
#[derive(Clone)]
pub struct CacheInterceptor {
    cache: Arc<dyn NormalizedCache>,
}

impl CacheInterceptor {
    /// Create an interceptor over `cache`.
    pub fn new(cache: Arc<dyn NormalizedCache>) -> Self {
        Self { cache }
    }

    /// Get the cache.
    pub fn cache(&self) -> &Arc<dyn NormalizedCache> {
        &self.cache
    }
}

impl Interceptor for CacheInterceptor {
    fn intercept(
        &self,
        request: InterceptorRequest,
        chain: Chain,
        sink: EventSink,
    ) -> BoxFuture<'static, ()> {
        let cache = self.cache.clone();
        Box::pin(async move {
            if request.fetch_from_cache() {
                read_cache(cache.as_ref(), &request, &sink);
            } else {
                write_through(cache.as_ref(), request, chain, &sink).await;
            }
        })
    }

    fn dispose(&self) {
        tracing::debug!(target: targets::CACHE, "Cache interceptor disposed");
    }
}

impl fmt::Debug for CacheInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheInterceptor").finish_non_exhaustive()
    }
}

fn read_cache(cache: &dyn NormalizedCache, request: &InterceptorRequest, sink: &EventSink) {
    if sink.fetch(FetchSourceType::Cache).is_err() {
        return;
    }

    let key = request.operation().cache_key();
    let result = match cache.read(&key) {
        Ok(CacheRead::Hit(data)) => {
            tracing::debug!(target: targets::CACHE, key = %key, "Cache hit");
            sink.response(InterceptorResponse::from_cache(GraphQLResponse::from_data(data)))
                .and_then(|()| sink.complete())
        }
        Ok(CacheRead::Miss) => {
            tracing::debug!(target: targets::CACHE, key = %key, "Cache miss");
            sink.fail(RelayError::CacheMiss(key))
        }
        Err(err) => {
            tracing::debug!(target: targets::CACHE, key = %key, error = %err, "Cache read failed");
            sink.fail(err)
        }
    };
    if let Err(err) = result {
        tracing::trace!(target: targets::CACHE, error = %err, "Cache result not delivered");
    }
}

async fn write_through(
    cache: &dyn NormalizedCache,
    request: InterceptorRequest,
    chain: Chain,
    sink: &EventSink,
) {
    let key = request.operation().cache_key();
    let mut events = chain.proceed(request);

    while let Some(event) = events.next().await {
        if let InterceptorEvent::Response(response) = &event
            && !response.from_cache
            && let Some(data) = response.data()
        {
            if let Err(err) = cache.write(&key, data.clone()) {
                tracing::error!(target: targets::CACHE, key = %key, error = %err, "Cache write failed");
            } else {
                tracing::trace!(target: targets::CACHE, key = %key, "Wrote network response");
            }
        }
        if sink.emit(event).is_err() {
            return;
        }
    }
}

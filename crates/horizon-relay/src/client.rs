//! The client facade.
//!
//! [`RelayClient`] assembles a chain per call from the fetch policy, the
//! application's interceptors, the cache interceptor and the network
//! interceptor, and hands back either a stream of events or callbacks.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use futures_util::StreamExt;
//! use horizon_relay::cache::MemoryCache;
//! use horizon_relay::client::RelayClient;
//! use horizon_relay::fetcher::FetchPolicy;
//! use horizon_relay::graphql::GraphQLRequest;
//!
//! let client = RelayClient::builder("https://api.example.com/graphql")
//!     .normalized_cache(Arc::new(MemoryCache::default()))
//!     .build()?;
//!
//! let hero = GraphQLRequest::query("query Hero { hero { name } }").operation_name("Hero");
//!
//! // Await the final response
//! let response = client.query(hero.clone()).response().await?;
//!
//! // Or observe every event
//! let mut call = client.query(hero).fetch_policy(FetchPolicy::CacheAndNetwork).execute();
//! while let Some(event) = call.next().await {
//!     println!("{event:?}");
//! }
//! ```

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

use futures_util::{Stream, StreamExt};

use horizon_relay_core::logging::targets;
use horizon_relay_core::{CancellationToken, Dispatcher};

use crate::cache::NormalizedCache;
use crate::error::{RelayError, Result};
use crate::fetcher::{CacheFailurePolicy, FetchPolicy, FetchPolicyInterceptor};
use crate::graphql::{Operation, SubscriptionConfig};
use crate::http::{DefaultHttpEngine, Headers, HttpEngine, HttpEngineConfig, HttpMethod};
use crate::interceptor::{
    CacheInterceptor, EventStream, FetchSourceType, Interceptor, InterceptorChain,
    InterceptorEvent, InterceptorRequest, InterceptorResponse, NetworkInterceptor,
};
use crate::websocket::{DefaultWebSocketEngine, WebSocketEngine};

/// Receives the events of an enqueued call.
///
/// `on_fetch` and `on_response` may be called any number of times, then
/// exactly one of `on_completed` or `on_failure`.
pub trait CallBack: Send + Sync {
    /// A leg started fetching from `source`.
    fn on_fetch(&self, _source: FetchSourceType) {}

    /// A response arrived.
    fn on_response(&self, response: InterceptorResponse);

    /// The call finished successfully.
    fn on_completed(&self) {}

    /// The call failed.
    fn on_failure(&self, error: RelayError);
}

struct ClientInner {
    interceptors: Vec<Arc<dyn Interceptor>>,
    cache: Option<CacheInterceptor>,
    network: NetworkInterceptor,
    default_fetch_policy: FetchPolicy,
    cache_failures: CacheFailurePolicy,
    default_headers: Headers,
    http_method: HttpMethod,
    dispatcher: Dispatcher,
    disposed: AtomicBool,
}

/// A GraphQL client.
///
/// Cheap to clone; clones share engines, cache and interceptors.
#[derive(Clone)]
pub struct RelayClient {
    inner: Arc<ClientInner>,
}

impl RelayClient {
    /// Start building a client for the GraphQL endpoint at `server_url`.
    pub fn builder(server_url: impl Into<String>) -> RelayClientBuilder {
        RelayClientBuilder::new(server_url)
    }

    /// Prepare a query.
    pub fn query(&self, operation: impl Operation + 'static) -> RelayCall {
        RelayCall::new(self.clone(), Arc::new(operation), None)
    }

    /// Prepare a mutation. Mutations default to [`FetchPolicy::NetworkOnly`].
    pub fn mutate(&self, operation: impl Operation + 'static) -> RelayCall {
        RelayCall::new(self.clone(), Arc::new(operation), Some(FetchPolicy::NetworkOnly))
    }

    /// Prepare a subscription. Subscriptions default to
    /// [`FetchPolicy::NetworkOnly`].
    pub fn subscribe(&self, operation: impl Operation + 'static) -> RelayCall {
        RelayCall::new(self.clone(), Arc::new(operation), Some(FetchPolicy::NetworkOnly))
    }

    /// The default fetch policy for queries.
    pub fn default_fetch_policy(&self) -> FetchPolicy {
        self.inner.default_fetch_policy
    }

    /// Check if [`dispose`](Self::dispose) was called.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Dispose the engines and every interceptor.
    ///
    /// Calls made afterwards fail with [`RelayError::Configuration`].
    /// Idempotent.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        for interceptor in &self.inner.interceptors {
            interceptor.dispose();
        }
        if let Some(cache) = &self.inner.cache {
            cache.dispose();
        }
        self.inner.network.dispose();
        tracing::debug!(target: targets::CLIENT, "Client disposed");
    }

    fn chain(&self, policy: FetchPolicy) -> Result<InterceptorChain> {
        let inner = &self.inner;
        let mut interceptors: Vec<Arc<dyn Interceptor>> =
            Vec::with_capacity(inner.interceptors.len() + 3);
        interceptors.push(Arc::new(
            FetchPolicyInterceptor::new(policy).cache_failures(inner.cache_failures),
        ));
        interceptors.extend(inner.interceptors.iter().cloned());
        if let Some(cache) = &inner.cache {
            interceptors.push(Arc::new(cache.clone()));
        }
        interceptors.push(Arc::new(inner.network.clone()));
        InterceptorChain::new(interceptors)
    }
}

impl fmt::Debug for RelayClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayClient")
            .field("network", &self.inner.network)
            .field("interceptors", &self.inner.interceptors.len())
            .field("cache", &self.inner.cache.is_some())
            .field("default_fetch_policy", &self.inner.default_fetch_policy)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Builder for [`RelayClient`].
pub struct RelayClientBuilder {
    server_url: String,
    websocket_url: Option<String>,
    http_engine: Option<Arc<dyn HttpEngine>>,
    http_engine_config: HttpEngineConfig,
    websocket_engine: Option<Arc<dyn WebSocketEngine>>,
    cache: Option<Arc<dyn NormalizedCache>>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    default_fetch_policy: FetchPolicy,
    cache_failures: CacheFailurePolicy,
    default_headers: Headers,
    http_method: HttpMethod,
    dispatcher: Dispatcher,
    subscription_config: SubscriptionConfig,
}

impl RelayClientBuilder {
    /// Create a builder for `server_url`.
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            websocket_url: None,
            http_engine: None,
            http_engine_config: HttpEngineConfig::default(),
            websocket_engine: None,
            cache: None,
            interceptors: Vec::new(),
            default_fetch_policy: FetchPolicy::default(),
            cache_failures: CacheFailurePolicy::default(),
            default_headers: Headers::new(),
            http_method: HttpMethod::default(),
            dispatcher: Dispatcher::default(),
            subscription_config: SubscriptionConfig::default(),
        }
    }

    /// Use a separate URL for subscriptions. Defaults to the server URL.
    pub fn websocket_url(mut self, url: impl Into<String>) -> Self {
        self.websocket_url = Some(url.into());
        self
    }

    /// Use a custom HTTP engine.
    pub fn http_engine(mut self, engine: Arc<dyn HttpEngine>) -> Self {
        self.http_engine = Some(engine);
        self
    }

    /// Configure the default HTTP engine.
    ///
    /// Ignored when a custom engine is set.
    pub fn http_engine_config(mut self, config: HttpEngineConfig) -> Self {
        self.http_engine_config = config;
        self
    }

    /// Use a custom WebSocket engine.
    pub fn websocket_engine(mut self, engine: Arc<dyn WebSocketEngine>) -> Self {
        self.websocket_engine = Some(engine);
        self
    }

    /// Read from and write to `cache`.
    pub fn normalized_cache(mut self, cache: Arc<dyn NormalizedCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Add an interceptor between the fetch policy and the cache.
    ///
    /// Interceptors run in the order they are added.
    pub fn add_interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    /// Set the default fetch policy for queries.
    pub fn fetch_policy(mut self, policy: FetchPolicy) -> Self {
        self.default_fetch_policy = policy;
        self
    }

    /// Set which cache failures fetch policies convert.
    pub fn cache_failure_policy(mut self, policy: CacheFailurePolicy) -> Self {
        self.cache_failures = policy;
        self
    }

    /// Add a header sent with every request.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.add(name, value);
        self
    }

    /// Set the default HTTP method for queries.
    pub fn http_method(mut self, method: HttpMethod) -> Self {
        self.http_method = method;
        self
    }

    /// Run traversals on `dispatcher`. Defaults to the polling context.
    pub fn dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    /// Configure the subscription protocol.
    pub fn subscription_config(mut self, config: SubscriptionConfig) -> Self {
        self.subscription_config = config;
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<RelayClient> {
        url::Url::parse(&self.server_url)?;

        let http_engine = match self.http_engine {
            Some(engine) => engine,
            None => Arc::new(DefaultHttpEngine::new(self.http_engine_config)?),
        };
        let websocket_engine = self
            .websocket_engine
            .unwrap_or_else(|| Arc::new(DefaultWebSocketEngine::default()));
        let websocket_url = self
            .websocket_url
            .unwrap_or_else(|| self.server_url.clone());

        let network = NetworkInterceptor::new(self.server_url, http_engine).with_websocket(
            websocket_engine,
            websocket_url,
            self.subscription_config,
        );

        tracing::debug!(
            target: targets::CLIENT,
            server_url = network.server_url(),
            interceptors = self.interceptors.len(),
            cache = self.cache.is_some(),
            "Built client"
        );

        Ok(RelayClient {
            inner: Arc::new(ClientInner {
                interceptors: self.interceptors,
                cache: self.cache.map(CacheInterceptor::new),
                network,
                default_fetch_policy: self.default_fetch_policy,
                cache_failures: self.cache_failures,
                default_headers: self.default_headers,
                http_method: self.http_method,
                dispatcher: self.dispatcher,
                disposed: AtomicBool::new(false),
            }),
        })
    }
}

impl fmt::Debug for RelayClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayClientBuilder")
            .field("server_url", &self.server_url)
            .field("websocket_url", &self.websocket_url)
            .field("interceptors", &self.interceptors.len())
            .field("default_fetch_policy", &self.default_fetch_policy)
            .finish_non_exhaustive()
    }
}

/// One prepared operation call.
pub struct RelayCall {
    client: RelayClient,
    operation: Arc<dyn Operation>,
    fetch_policy: Option<FetchPolicy>,
    headers: Headers,
    http_method: Option<HttpMethod>,
}

impl RelayCall {
    fn new(client: RelayClient, operation: Arc<dyn Operation>, fetch_policy: Option<FetchPolicy>) -> Self {
        Self {
            client,
            operation,
            fetch_policy,
            headers: Headers::new(),
            http_method: None,
        }
    }

    /// Override the fetch policy for this call.
    pub fn fetch_policy(mut self, policy: FetchPolicy) -> Self {
        self.fetch_policy = Some(policy);
        self
    }

    /// Add a header for this call.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.add(name, value);
        self
    }

    /// Override the HTTP method for this call.
    pub fn http_method(mut self, method: HttpMethod) -> Self {
        self.http_method = Some(method);
        self
    }

    /// Start the call and observe its events.
    pub fn execute(self) -> CallHandle {
        let token = CancellationToken::new();
        let inner = &self.client.inner;

        if self.client.is_disposed() {
            return CallHandle {
                events: EventStream::failed(RelayError::Configuration(
                    "client has been disposed".to_string(),
                )),
                token,
            };
        }

        let policy = self.fetch_policy.unwrap_or(inner.default_fetch_policy);
        let chain = match self.client.chain(policy) {
            Ok(chain) => chain,
            Err(err) => {
                return CallHandle {
                    events: EventStream::failed(err),
                    token,
                };
            }
        };

        let mut headers = inner.default_headers.clone();
        headers.extend(self.headers);
        let request = InterceptorRequest::builder(self.operation)
            .headers(headers)
            .http_method(self.http_method.unwrap_or(inner.http_method))
            .build();

        tracing::debug!(
            target: targets::CLIENT,
            request_id = %request.request_id(),
            operation = request.operation().name(),
            %policy,
            "Executing call"
        );

        let events = chain.proceed_on(request, token.clone(), &inner.dispatcher);
        CallHandle { events, token }
    }

    /// Start the call and deliver its events to `callback`.
    ///
    /// The call runs on the client's dispatcher, or on the current Tokio
    /// runtime when the client dispatches inline. Without either,
    /// `callback` receives [`RelayError::Configuration`] right away.
    pub fn enqueue(self, callback: Arc<dyn CallBack>) -> CancelHandle {
        let handle = match &self.client.inner.dispatcher {
            Dispatcher::Runtime(handle) => Some(handle.clone()),
            Dispatcher::Inline => tokio::runtime::Handle::try_current().ok(),
        };
        let call = self.execute();
        let cancel = CancelHandle {
            token: call.token.clone(),
        };

        match handle {
            Some(handle) => {
                handle.spawn(deliver(call, callback));
            }
            None => callback.on_failure(RelayError::Configuration(
                "enqueue requires a Tokio runtime".to_string(),
            )),
        }
        cancel
    }

    /// Run the call and wait for its final response.
    pub async fn response(self) -> Result<InterceptorResponse> {
        self.execute().response().await
    }
}

impl fmt::Debug for RelayCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayCall")
            .field("operation", &self.operation.name())
            .field("fetch_policy", &self.fetch_policy)
            .field("http_method", &self.http_method)
            .finish()
    }
}

async fn deliver(mut call: CallHandle, callback: Arc<dyn CallBack>) {
    while let Some(event) = call.next().await {
        match event {
            InterceptorEvent::Fetch(source) => callback.on_fetch(source),
            InterceptorEvent::Response(response) => callback.on_response(response),
            InterceptorEvent::Completed => callback.on_completed(),
            InterceptorEvent::Failed(error) => callback.on_failure(error),
        }
    }
}

/// A running call.
///
/// A `Stream` of the call's events. Dropping the handle cancels the call.
pub struct CallHandle {
    events: EventStream,
    token: CancellationToken,
}

impl CallHandle {
    /// Cancel the call. The stream then ends with
    /// `Failed(RelayError::Cancelled)` unless it already ended.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Get a handle that can cancel this call from elsewhere.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            token: self.token.clone(),
        }
    }

    /// Wait for the terminal event and return the last response.
    ///
    /// Fails with the traversal's failure, or with [`RelayError::Protocol`]
    /// if it completed without any response.
    pub async fn response(mut self) -> Result<InterceptorResponse> {
        let mut last = None;
        while let Some(event) = self.next().await {
            match event {
                InterceptorEvent::Response(response) => last = Some(response),
                InterceptorEvent::Completed => break,
                InterceptorEvent::Failed(error) => return Err(error),
                InterceptorEvent::Fetch(_) => {}
            }
        }
        last.ok_or_else(|| RelayError::Protocol("call completed without a response".to_string()))
    }
}

impl Stream for CallHandle {
    type Item = InterceptorEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<InterceptorEvent>> {
        self.events.poll_next_unpin(cx)
    }
}

impl fmt::Debug for CallHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallHandle")
            .field("events", &self.events)
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}

/// Cancels an enqueued call.
#[derive(Clone, Debug)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    /// Cancel the call. The callback then receives
    /// [`RelayError::Cancelled`] unless the call already ended.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Check if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

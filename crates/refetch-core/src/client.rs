//! Client: base URL, defaults and middleware shared by many requests.
//!
//! Defaults are fixed at build time. Each request may override headers,
//! retry policy, attempt budget, cancellation, `Retry-After` negotiation and
//! hooks; overrides are resolved once per request before the retry loop runs.

use crate::config::{ConfigError, RefetchConfig};
use crate::decode::{Decoded, OutputKind};
use crate::middleware::{Middleware, MiddlewareChain};
use crate::request::{OutgoingRequest, RawResponse};
use crate::retry::{
    fetch_with_retry, ErrorHook, ExchangeError, FetchError, FetchPlan, Hooks, Negotiator,
    NetworkErrorHook, RetryAfterPolicy, RetryDecision, RetryPolicy, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_RETRY_AFTER_CODES,
};
use crate::transport::{CurlTransport, Transport};
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

#[derive(Clone)]
struct Defaults {
    headers: HeaderMap,
    max_attempts: u32,
    retry: Option<RetryPolicy>,
    retry_after_codes: Vec<u16>,
    timeout: Option<Duration>,
    hooks: Hooks,
}

/// Issues requests through the retry engine with shared defaults.
pub struct Client<T = CurlTransport> {
    base_url: Option<Url>,
    defaults: Defaults,
    middleware: MiddlewareChain,
    transport: T,
}

impl Client<CurlTransport> {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }
}

impl<T: Transport> Client<T> {
    /// Build a client from a loaded config file.
    pub fn from_config(cfg: &RefetchConfig, transport: T) -> Result<Self, ConfigError> {
        cfg.validate()?;
        let mut builder = ClientBuilder::default()
            .max_attempts(cfg.max_attempts)
            .retry_after_codes(cfg.retry_after_codes.clone());
        if let Some(base) = &cfg.base_url {
            builder = builder.base_url(base);
        }
        if let Some(policy) = cfg.retry_policy() {
            builder = builder.retry_policy(policy);
        }
        if let Some(timeout) = cfg.timeout() {
            builder = builder.timeout(timeout);
        }
        for (name, value) in &cfg.headers {
            builder = builder.header(name, value);
        }
        builder.build(transport)
    }

    /// Append a middleware under `id`.
    pub fn use_middleware(&mut self, id: impl Into<String>, middleware: impl Middleware + 'static) -> &mut Self {
        self.middleware.push(id, Arc::new(middleware));
        self
    }

    /// Remove the middleware registered under `id` (warns if absent).
    pub fn remove_middleware(&mut self, id: &str) -> &mut Self {
        self.middleware.remove(id);
        self
    }

    pub fn middleware(&self) -> &MiddlewareChain {
        &self.middleware
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Resolve `endpoint` against the base URL. Absolute endpoints replace it.
    pub fn resolve_url(&self, endpoint: &str) -> Result<Url, FetchError> {
        let joined = match &self.base_url {
            Some(base) => base.join(endpoint),
            None => Url::parse(endpoint),
        };
        joined.map_err(|e| FetchError::InvalidRequest(format!("endpoint {endpoint:?}: {e}")))
    }

    pub fn request(&self, method: Method, endpoint: impl Into<String>) -> RequestBuilder<'_, T> {
        RequestBuilder::new(self, method, endpoint.into())
    }

    pub fn get(&self, endpoint: impl Into<String>) -> RequestBuilder<'_, T> {
        self.request(Method::GET, endpoint)
    }

    pub fn post(&self, endpoint: impl Into<String>) -> RequestBuilder<'_, T> {
        self.request(Method::POST, endpoint)
    }

    pub fn put(&self, endpoint: impl Into<String>) -> RequestBuilder<'_, T> {
        self.request(Method::PUT, endpoint)
    }

    pub fn patch(&self, endpoint: impl Into<String>) -> RequestBuilder<'_, T> {
        self.request(Method::PATCH, endpoint)
    }

    pub fn delete(&self, endpoint: impl Into<String>) -> RequestBuilder<'_, T> {
        self.request(Method::DELETE, endpoint)
    }
}

/// Builds a [`Client`].
#[derive(Default)]
pub struct ClientBuilder {
    base_url: Option<String>,
    headers: Vec<(String, String)>,
    max_attempts: Option<u32>,
    retry: Option<RetryPolicy>,
    retry_after_codes: Option<Vec<u16>>,
    timeout: Option<Duration>,
    on_error: Option<ErrorHook>,
    on_network_error: Option<NetworkErrorHook>,
    middleware: MiddlewareChain,
}

impl ClientBuilder {
    pub fn base_url(mut self, url: &str) -> Self {
        self.base_url = Some(url.to_string());
        self
    }

    /// Default header sent with every request.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Default attempt budget. Falls back to the retry policy's, then 5.
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = Some(n);
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    pub fn retry_after_codes(mut self, codes: Vec<u16>) -> Self {
        self.retry_after_codes = Some(codes);
        self
    }

    /// Per-attempt timeout for requests that carry no cancellation token.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&RawResponse, bool) -> bool + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(f));
        self
    }

    pub fn on_network_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&ExchangeError) -> bool + Send + Sync + 'static,
    {
        self.on_network_error = Some(Arc::new(f));
        self
    }

    pub fn middleware(mut self, id: impl Into<String>, middleware: impl Middleware + 'static) -> Self {
        self.middleware.push(id, Arc::new(middleware));
        self
    }

    pub fn build<T: Transport>(self, transport: T) -> Result<Client<T>, ConfigError> {
        let base_url = self
            .base_url
            .map(|b| Url::parse(&b).map_err(|_| ConfigError::InvalidBaseUrl(b.clone())))
            .transpose()?;

        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            let (n, v) = parse_header(name, value)
                .map_err(|_| ConfigError::InvalidHeader(format!("{name}: {value}")))?;
            headers.insert(n, v);
        }

        let max_attempts = self
            .max_attempts
            .or(self.retry.map(|p| p.max_attempts))
            .unwrap_or(DEFAULT_MAX_ATTEMPTS);
        if max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }

        let fallback = Hooks::default();
        Ok(Client {
            base_url,
            defaults: Defaults {
                headers,
                max_attempts,
                retry: self.retry,
                retry_after_codes: self
                    .retry_after_codes
                    .unwrap_or_else(|| DEFAULT_RETRY_AFTER_CODES.to_vec()),
                timeout: self.timeout,
                hooks: Hooks {
                    on_error: self.on_error.unwrap_or(fallback.on_error),
                    on_network_error: self.on_network_error.unwrap_or(fallback.on_network_error),
                },
            },
            middleware: self.middleware,
            transport,
        })
    }
}

fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), String> {
    let n = HeaderName::from_bytes(name.trim().as_bytes()).map_err(|e| e.to_string())?;
    let v = HeaderValue::from_str(value.trim()).map_err(|e| e.to_string())?;
    Ok((n, v))
}

/// One request being configured against a [`Client`].
///
/// Builder errors (bad header, unserializable body) are kept until
/// [`send`](Self::send) and reported as [`FetchError::InvalidRequest`].
pub struct RequestBuilder<'a, T> {
    client: &'a Client<T>,
    method: Method,
    endpoint: String,
    output: OutputKind,
    headers: HeaderMap,
    body: Option<Bytes>,
    retry: Option<RetryPolicy>,
    max_attempts: Option<u32>,
    cancel: Option<CancellationToken>,
    negotiator: Option<Negotiator>,
    on_error: Option<ErrorHook>,
    on_network_error: Option<NetworkErrorHook>,
    error: Option<String>,
}

impl<'a, T: Transport> RequestBuilder<'a, T> {
    fn new(client: &'a Client<T>, method: Method, endpoint: String) -> Self {
        Self {
            client,
            method,
            endpoint,
            output: OutputKind::default(),
            headers: HeaderMap::new(),
            body: None,
            retry: None,
            max_attempts: None,
            cancel: None,
            negotiator: None,
            on_error: None,
            on_network_error: None,
            error: None,
        }
    }

    fn fail(&mut self, msg: String) {
        if self.error.is_none() {
            self.error = Some(msg);
        }
    }

    pub fn output(mut self, kind: OutputKind) -> Self {
        self.output = kind;
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        match parse_header(name, value) {
            Ok((n, v)) => {
                self.headers.insert(n, v);
            }
            Err(e) => self.fail(format!("header {name:?}: {e}")),
        }
        self
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Serialize `body` as JSON.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Self {
        match serde_json::to_vec(body) {
            Ok(bytes) => self.body = Some(Bytes::from(bytes)),
            Err(e) => self.fail(format!("body: {e}")),
        }
        self
    }

    /// Send these bytes as the body unchanged.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Backoff for this request; its `max_attempts` becomes the budget unless
    /// [`max_attempts`](Self::max_attempts) is also set.
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = Some(n);
        self
    }

    /// Cancel the whole request through `token`. Disables the client timeout.
    pub fn cancel_with(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn retry_after<F>(mut self, f: F) -> Self
    where
        F: Fn(&RawResponse, Option<&str>) -> RetryDecision + Send + Sync + 'static,
    {
        self.negotiator = Some(Arc::new(f));
        self
    }

    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&RawResponse, bool) -> bool + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(f));
        self
    }

    pub fn on_network_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&ExchangeError) -> bool + Send + Sync + 'static,
    {
        self.on_network_error = Some(Arc::new(f));
        self
    }

    fn into_plan(self) -> Result<FetchPlan, FetchError> {
        if let Some(msg) = self.error {
            return Err(FetchError::InvalidRequest(msg));
        }
        let client = self.client;
        let defaults = &client.defaults;

        let url = client.resolve_url(&self.endpoint)?;
        let mut request = OutgoingRequest::new(self.method, url);
        request.merge_headers(&defaults.headers);
        request.merge_headers(&self.headers);
        request.body = self.body;

        let mut retry_after = RetryAfterPolicy::with_codes(defaults.retry_after_codes.clone());
        if let Some(negotiate) = self.negotiator {
            retry_after.negotiate = negotiate;
        }

        let max_attempts = self
            .max_attempts
            .or(self.retry.map(|p| p.max_attempts))
            .unwrap_or(defaults.max_attempts);

        Ok(FetchPlan {
            request,
            output: self.output,
            max_attempts,
            retry: self.retry.or(defaults.retry),
            retry_after,
            hooks: Hooks {
                on_error: self.on_error.unwrap_or_else(|| defaults.hooks.on_error.clone()),
                on_network_error: self
                    .on_network_error
                    .unwrap_or_else(|| defaults.hooks.on_network_error.clone()),
            },
            timeout: defaults.timeout,
            cancel: self.cancel,
        })
    }

    /// Run the request and pass the decoded body to `on_success`.
    pub async fn send_with<R, F>(self, on_success: F) -> Result<R, FetchError>
    where
        F: FnOnce(Decoded) -> anyhow::Result<R>,
    {
        let client = self.client;
        let plan = self.into_plan()?;
        tracing::debug!(method = %plan.request.method, url = %plan.request.url, attempts = plan.max_attempts, "sending request");
        fetch_with_retry(&client.transport, &client.middleware, plan, on_success).await
    }

    /// Run the request and return the decoded body.
    pub async fn send(self) -> Result<Decoded, FetchError> {
        self.send_with(Ok).await
    }

    /// Run the request as JSON and deserialize the body into `D`.
    pub async fn send_json<D: DeserializeOwned>(self) -> Result<D, FetchError> {
        self.output(OutputKind::Json)
            .send_with(|decoded| Ok(decoded.into_json::<D>()?))
            .await
    }
}

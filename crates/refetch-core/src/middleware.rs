//! Request middleware: ordered transforms applied before every attempt.
//!
//! Each middleware gets the current request and the attempt context and hands
//! back the request to continue with, optionally stopping the rest of the chain
//! for this attempt. The next attempt starts again from the first middleware.

use crate::request::OutgoingRequest;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Registering more middleware than this logs a warning.
pub const MIDDLEWARE_COUNT_WARN: usize = 30;

/// Per-attempt view handed to each middleware.
#[derive(Debug, Clone)]
pub struct MiddlewareContext {
    /// 0-based attempt index.
    pub attempt: u32,
    pub max_attempts: u32,
    /// Token shared by the whole retry loop.
    pub cancel: CancellationToken,
}

impl MiddlewareContext {
    pub fn is_last_attempt(&self) -> bool {
        self.attempt + 1 >= self.max_attempts
    }
}

/// What a middleware hands back.
#[derive(Debug, Clone)]
pub struct MiddlewareOutput {
    pub request: OutgoingRequest,
    /// Skip the remaining middleware for this attempt.
    pub stop_propagation: bool,
}

impl MiddlewareOutput {
    /// Continue with the next middleware.
    pub fn proceed(request: OutgoingRequest) -> Self {
        Self {
            request,
            stop_propagation: false,
        }
    }

    /// Send `request` as is, skipping later middleware.
    pub fn stop(request: OutgoingRequest) -> Self {
        Self {
            request,
            stop_propagation: true,
        }
    }
}

#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, request: OutgoingRequest, ctx: &MiddlewareContext) -> MiddlewareOutput;
}

#[async_trait]
impl<F> Middleware for F
where
    F: Fn(OutgoingRequest, &MiddlewareContext) -> MiddlewareOutput + Send + Sync,
{
    async fn handle(&self, request: OutgoingRequest, ctx: &MiddlewareContext) -> MiddlewareOutput {
        (self)(request, ctx)
    }
}

/// Ordered `(id, middleware)` registry.
///
/// Not meant to be mutated while requests that share it are in flight.
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    entries: Vec<(String, Arc<dyn Middleware>)>,
}

impl std::fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(id, _)| id))
            .finish()
    }
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a middleware under `id`.
    pub fn push(&mut self, id: impl Into<String>, middleware: Arc<dyn Middleware>) {
        self.entries.push((id.into(), middleware));
        if self.entries.len() > MIDDLEWARE_COUNT_WARN {
            tracing::warn!(
                count = self.entries.len(),
                "many middleware registered; long chains add latency to every attempt"
            );
        }
    }

    /// Remove every middleware registered under `id`. Returns false (and warns) if none was.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry_id, _)| entry_id != id);
        let removed = self.entries.len() != before;
        if !removed {
            tracing::warn!("middleware {} not found", id);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered ids in order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(id, _)| id.as_str())
    }

    /// Run the chain over `request` in registration order.
    pub async fn apply(&self, request: OutgoingRequest, ctx: &MiddlewareContext) -> OutgoingRequest {
        let mut current = request;
        for (id, middleware) in &self.entries {
            let out = middleware.handle(current, ctx).await;
            current = out.request;
            if out.stop_propagation {
                tracing::trace!(middleware = %id, attempt = ctx.attempt, "middleware stopped propagation");
                break;
            }
        }
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderValue, Method};

    fn request() -> OutgoingRequest {
        OutgoingRequest::new(Method::GET, url::Url::parse("https://example.com/a").unwrap())
    }

    fn ctx(attempt: u32) -> MiddlewareContext {
        MiddlewareContext {
            attempt,
            max_attempts: 3,
            cancel: CancellationToken::new(),
        }
    }

    fn tag(name: &'static str, stop: bool) -> Arc<dyn Middleware> {
        Arc::new(move |mut req: OutgoingRequest, _ctx: &MiddlewareContext| {
            req.headers
                .append("x-seen", HeaderValue::from_static(name));
            if stop {
                MiddlewareOutput::stop(req)
            } else {
                MiddlewareOutput::proceed(req)
            }
        })
    }

    fn seen(req: &OutgoingRequest) -> Vec<&str> {
        req.headers
            .get_all("x-seen")
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn runs_in_registration_order() {
        let mut chain = MiddlewareChain::new();
        chain.push("a", tag("a", false));
        chain.push("b", tag("b", false));
        chain.push("c", tag("c", false));
        let out = chain.apply(request(), &ctx(0)).await;
        assert_eq!(seen(&out), ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn stop_propagation_skips_rest_on_every_attempt() {
        let mut chain = MiddlewareChain::new();
        chain.push("a", tag("a", false));
        chain.push("b", tag("b", true));
        chain.push("c", tag("c", false));
        for attempt in 0..3 {
            let out = chain.apply(request(), &ctx(attempt)).await;
            assert_eq!(seen(&out), ["a", "b"], "attempt {attempt}");
        }
        assert_eq!(chain.len(), 3);
    }

    #[tokio::test]
    async fn middleware_sees_attempt_context() {
        let mut chain = MiddlewareChain::new();
        chain.push(
            "attempt",
            Arc::new(|mut req: OutgoingRequest, ctx: &MiddlewareContext| {
                let v = format!("{}/{}", ctx.attempt, ctx.max_attempts);
                req.headers
                    .insert("x-attempt", HeaderValue::from_str(&v).unwrap());
                MiddlewareOutput::proceed(req)
            }),
        );
        let out = chain.apply(request(), &ctx(2)).await;
        assert_eq!(out.headers.get("x-attempt").unwrap(), "2/3");
    }

    #[tokio::test]
    async fn returned_request_replaces_original() {
        let mut chain = MiddlewareChain::new();
        chain.push(
            "rewrite",
            Arc::new(|_req: OutgoingRequest, _ctx: &MiddlewareContext| {
                MiddlewareOutput::proceed(OutgoingRequest::new(
                    Method::DELETE,
                    url::Url::parse("https://other.example.com/b").unwrap(),
                ))
            }),
        );
        let out = chain.apply(request(), &ctx(0)).await;
        assert_eq!(out.method, Method::DELETE);
        assert_eq!(out.url.host_str(), Some("other.example.com"));
    }

    struct Bearer(&'static str);

    #[async_trait]
    impl Middleware for Bearer {
        async fn handle(&self, mut request: OutgoingRequest, _ctx: &MiddlewareContext) -> MiddlewareOutput {
            let value = format!("Bearer {}", self.0);
            request.set_header(
                http::header::AUTHORIZATION,
                HeaderValue::from_str(&value).unwrap(),
            );
            MiddlewareOutput::proceed(request)
        }
    }

    #[tokio::test]
    async fn struct_middleware_and_removal() {
        let mut chain = MiddlewareChain::new();
        chain.push("auth", Arc::new(Bearer("t0k")));
        chain.push("a", tag("a", false));
        let out = chain.apply(request(), &ctx(0)).await;
        assert_eq!(out.headers.get("authorization").unwrap(), "Bearer t0k");

        assert!(chain.remove("auth"));
        assert!(!chain.remove("auth"));
        assert_eq!(chain.ids().collect::<Vec<_>>(), ["a"]);
        let out = chain.apply(request(), &ctx(0)).await;
        assert!(out.headers.get("authorization").is_none());
    }

    #[test]
    fn oversized_chain_still_registers() {
        let mut chain = MiddlewareChain::new();
        for i in 0..(MIDDLEWARE_COUNT_WARN + 5) {
            chain.push(format!("m{i}"), tag("x", false));
        }
        assert_eq!(chain.len(), MIDDLEWARE_COUNT_WARN + 5);
    }
}

//! Resilient HTTP request engine.
//!
//! A [`Client`] resolves per-request settings into a
//! [`FetchPlan`](retry::FetchPlan) and runs it through the retry loop:
//! middleware, one transport exchange, classification, backoff or
//! `Retry-After` wait, and finally decoding of the successful body.

pub mod client;
pub mod config;
pub mod decode;
pub mod logging;
pub mod middleware;
pub mod request;
pub mod retry;
pub mod transport;

#[cfg(test)]
mod testing;

pub use client::{Client, ClientBuilder, RequestBuilder};
pub use decode::{Decoded, OutputKind};
pub use request::{OutgoingRequest, RawResponse};
pub use retry::{FetchError, RetryDecision, RetryPolicy};

//! `refetch get|delete|post|put|patch <endpoint>` – send one request.

use crate::cli::RequestOpts;
use anyhow::{Context, Result};
use refetch_core::config::{RefetchConfig, RetryConfig};
use refetch_core::decode::Decoded;
use refetch_core::transport::CurlTransport;
use refetch_core::Client;
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Get,
    Delete,
    Post,
    Put,
    Patch,
}

/// Fold command-line flags into the loaded config.
pub fn apply_overrides(mut cfg: RefetchConfig, opts: &RequestOpts) -> Result<RefetchConfig> {
    if let Some(base) = &opts.base_url {
        cfg.base_url = Some(base.clone());
    }
    if let Some(n) = opts.attempts {
        cfg.max_attempts = n;
    }
    if let Some(ms) = opts.timeout_ms {
        cfg.timeout_ms = Some(ms);
    }
    for raw in &opts.headers {
        let (name, value) = raw
            .split_once(':')
            .with_context(|| format!("header {raw:?} is not \"Name: value\""))?;
        cfg.headers
            .insert(name.trim().to_string(), value.trim().to_string());
    }

    let touches_retry = opts.backoff.is_some()
        || opts.min_delay_ms.is_some()
        || opts.max_delay_ms.is_some()
        || opts.no_jitter;
    if touches_retry {
        let retry = cfg.retry.get_or_insert_with(RetryConfig::default);
        if let Some(kind) = opts.backoff {
            retry.kind = kind;
        }
        if let Some(ms) = opts.min_delay_ms {
            retry.min_delay_ms = ms;
        }
        if let Some(ms) = opts.max_delay_ms {
            retry.max_delay_ms = ms;
        }
        if opts.no_jitter {
            retry.jitter = false;
        }
    }

    cfg.validate()?;
    Ok(cfg)
}

pub async fn run_request(
    cfg: RefetchConfig,
    verb: Verb,
    endpoint: &str,
    body: Option<&str>,
    opts: &RequestOpts,
) -> Result<()> {
    let cfg = apply_overrides(cfg, opts)?;
    let client = Client::from_config(&cfg, CurlTransport::default())?;

    let mut request = match verb {
        Verb::Get => client.get(endpoint),
        Verb::Delete => client.delete(endpoint),
        Verb::Post => client.post(endpoint),
        Verb::Put => client.put(endpoint),
        Verb::Patch => client.patch(endpoint),
    };
    if let Some(raw) = body {
        let value: serde_json::Value =
            serde_json::from_str(raw).context("--body is not valid JSON")?;
        request = request.json(&value);
    }

    let decoded = request
        .output(opts.output)
        .send()
        .await
        .with_context(|| format!("{verb:?} {endpoint}"))?;
    print_decoded(decoded)
}

fn print_decoded(decoded: Decoded) -> Result<()> {
    let mut out = std::io::stdout().lock();
    match decoded {
        Decoded::Json(value) => writeln!(out, "{}", serde_json::to_string_pretty(&value)?)?,
        Decoded::Text(text) => writeln!(out, "{text}")?,
        Decoded::Bytes(bytes) => out.write_all(&bytes)?,
        Decoded::Blob(blob) => {
            if let Some(ct) = &blob.content_type {
                tracing::debug!(content_type = %ct, len = blob.bytes.len(), "blob body");
            }
            out.write_all(&blob.bytes)?
        }
        Decoded::FormData(pairs) => {
            for (name, value) in pairs {
                writeln!(out, "{name}={value}")?;
            }
        }
        Decoded::Response(resp) => {
            writeln!(out, "{} {}", resp.status, resp.url)?;
            for (name, value) in &resp.headers {
                writeln!(out, "{}: {}", name, String::from_utf8_lossy(value.as_bytes()))?;
            }
            writeln!(out)?;
            out.write_all(&resp.body)?;
        }
    }
    out.flush()?;
    Ok(())
}

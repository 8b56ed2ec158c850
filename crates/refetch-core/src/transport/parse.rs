//! Parse raw response header lines collected from curl into an `http::HeaderMap`.

use http::header::{HeaderName, HeaderValue};
use http::HeaderMap;

/// Headers of the final response in `lines`.
///
/// curl reports the header block of every response it sees, including
/// redirects and `100 Continue`; each status line starts a fresh block.
pub(crate) fn parse_header_lines(lines: &[String]) -> HeaderMap {
    let mut headers = HeaderMap::new();

    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with("HTTP/") {
            headers.clear();
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            let name = match HeaderName::from_bytes(name.trim().as_bytes()) {
                Ok(n) => n,
                Err(_) => {
                    tracing::debug!("skipping invalid header name in line {:?}", line);
                    continue;
                }
            };
            if let Ok(value) = HeaderValue::from_str(value.trim()) {
                headers.append(name, value);
            }
        }
    }

    headers
}

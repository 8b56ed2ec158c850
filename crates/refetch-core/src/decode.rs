//! Convert a successful response body into the caller's declared output kind.

use crate::request::RawResponse;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::fmt;
use std::str::FromStr;

/// Declared shape of a successful response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputKind {
    /// Raw body bytes.
    Bytes,
    /// Body parsed as JSON.
    #[default]
    Json,
    /// Body decoded as UTF-8 text.
    Text,
    /// Body bytes tagged with their content type.
    Blob,
    /// `application/x-www-form-urlencoded` name/value pairs.
    FormData,
    /// The untouched response.
    Response,
}

/// Returned when an output kind name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown output kind {0:?}")]
pub struct UnknownOutputKind(pub String);

impl FromStr for OutputKind {
    type Err = UnknownOutputKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bytes" | "arraybuffer" => Ok(OutputKind::Bytes),
            "json" => Ok(OutputKind::Json),
            "text" => Ok(OutputKind::Text),
            "blob" => Ok(OutputKind::Blob),
            "formdata" | "form" => Ok(OutputKind::FormData),
            "response" | "raw" => Ok(OutputKind::Response),
            _ => Err(UnknownOutputKind(s.to_string())),
        }
    }
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputKind::Bytes => "bytes",
            OutputKind::Json => "json",
            OutputKind::Text => "text",
            OutputKind::Blob => "blob",
            OutputKind::FormData => "formdata",
            OutputKind::Response => "response",
        };
        f.write_str(name)
    }
}

/// Body bytes with the content type the server declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// A decoded success body.
#[derive(Debug, Clone)]
pub enum Decoded {
    Bytes(Bytes),
    Json(serde_json::Value),
    Text(String),
    Blob(Blob),
    FormData(Vec<(String, String)>),
    Response(RawResponse),
}

/// Why a body could not be converted.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid JSON body: {0}")]
    Json(#[from] serde_json::Error),
    #[error("body is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("expected {expected} output, got {got}")]
    WrongKind {
        expected: OutputKind,
        got: OutputKind,
    },
}

impl Decoded {
    /// Which kind produced this value.
    pub fn kind(&self) -> OutputKind {
        match self {
            Decoded::Bytes(_) => OutputKind::Bytes,
            Decoded::Json(_) => OutputKind::Json,
            Decoded::Text(_) => OutputKind::Text,
            Decoded::Blob(_) => OutputKind::Blob,
            Decoded::FormData(_) => OutputKind::FormData,
            Decoded::Response(_) => OutputKind::Response,
        }
    }

    /// Deserialize a JSON body into `T`.
    pub fn into_json<T: DeserializeOwned>(self) -> Result<T, DecodeError> {
        match self {
            Decoded::Json(value) => Ok(serde_json::from_value(value)?),
            other => Err(DecodeError::WrongKind {
                expected: OutputKind::Json,
                got: other.kind(),
            }),
        }
    }

    /// Take a text body.
    pub fn into_text(self) -> Result<String, DecodeError> {
        match self {
            Decoded::Text(s) => Ok(s),
            other => Err(DecodeError::WrongKind {
                expected: OutputKind::Text,
                got: other.kind(),
            }),
        }
    }
}

/// Convert `response` according to `kind`.
pub fn decode(response: RawResponse, kind: OutputKind) -> Result<Decoded, DecodeError> {
    let decoded = match kind {
        OutputKind::Bytes => Decoded::Bytes(response.body),
        OutputKind::Json => Decoded::Json(serde_json::from_slice(&response.body)?),
        OutputKind::Text => Decoded::Text(String::from_utf8(response.body.to_vec())?),
        OutputKind::Blob => Decoded::Blob(Blob {
            content_type: response.content_type(),
            bytes: response.body,
        }),
        OutputKind::FormData => Decoded::FormData(
            url::form_urlencoded::parse(&response.body)
                .into_owned()
                .collect(),
        ),
        OutputKind::Response => Decoded::Response(response),
    };
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderMap, HeaderValue, StatusCode};

    fn ok(body: &'static [u8], content_type: Option<&'static str>) -> RawResponse {
        let mut headers = HeaderMap::new();
        if let Some(ct) = content_type {
            headers.insert(http::header::CONTENT_TYPE, HeaderValue::from_static(ct));
        }
        RawResponse {
            url: url::Url::parse("https://example.com/x").unwrap(),
            status: StatusCode::OK,
            headers,
            body: Bytes::from_static(body),
        }
    }

    #[test]
    fn json_body() {
        let d = decode(ok(br#"[{"id":1},{"id":2}]"#, None), OutputKind::Json).unwrap();
        let ids: Vec<serde_json::Value> = d.into_json().unwrap();
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn invalid_json_is_an_error() {
        assert!(matches!(
            decode(ok(b"<html>", None), OutputKind::Json),
            Err(DecodeError::Json(_))
        ));
    }

    #[test]
    fn text_rejects_invalid_utf8() {
        assert!(matches!(
            decode(ok(&[0xff, 0xfe], None), OutputKind::Text),
            Err(DecodeError::Utf8(_))
        ));
        let d = decode(ok(b"hello", None), OutputKind::Text).unwrap();
        assert_eq!(d.into_text().unwrap(), "hello");
    }

    #[test]
    fn blob_keeps_content_type() {
        let d = decode(ok(b"\x89PNG", Some("image/png")), OutputKind::Blob).unwrap();
        match d {
            Decoded::Blob(b) => {
                assert_eq!(b.content_type.as_deref(), Some("image/png"));
                assert_eq!(&b.bytes[..], b"\x89PNG");
            }
            other => panic!("expected blob, got {:?}", other.kind()),
        }
    }

    #[test]
    fn form_data_pairs() {
        let d = decode(ok(b"name=Ada+L&lang=en%2Dgb", None), OutputKind::FormData).unwrap();
        match d {
            Decoded::FormData(pairs) => assert_eq!(
                pairs,
                vec![
                    ("name".to_string(), "Ada L".to_string()),
                    ("lang".to_string(), "en-gb".to_string()),
                ]
            ),
            other => panic!("expected form data, got {:?}", other.kind()),
        }
    }

    #[test]
    fn response_is_untouched() {
        let d = decode(ok(b"raw", None), OutputKind::Response).unwrap();
        match d {
            Decoded::Response(r) => assert_eq!(&r.body[..], b"raw"),
            other => panic!("expected response, got {:?}", other.kind()),
        }
    }

    #[test]
    fn wrong_kind_accessor() {
        let d = decode(ok(b"abc", None), OutputKind::Bytes).unwrap();
        assert!(matches!(
            d.into_json::<serde_json::Value>(),
            Err(DecodeError::WrongKind { .. })
        ));
    }

    #[test]
    fn output_kind_from_str() {
        assert_eq!("JSON".parse::<OutputKind>(), Ok(OutputKind::Json));
        assert_eq!("arraybuffer".parse::<OutputKind>(), Ok(OutputKind::Bytes));
        assert!("xml".parse::<OutputKind>().is_err());
    }
}

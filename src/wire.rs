//! JSON request/response shapes exchanged with the peer, and the
//! base64 boundary for binary payloads.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde::Serialize;

/// A request submitted to the peer. `id` is filled in by the
/// [`crate::multiplexer::Multiplexer`] right before sending, never by the
/// FS adapter.
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    pub id: u64,
    pub op: &'static str,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flags: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fh: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buf: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "base64Encoded")]
    pub base64_encoded: Option<bool>,
}

impl Request {
    /// A request carrying no operation-specific fields beyond `op`/`path`
    /// (`getattr`, `readlink`, `unlink`, and the like).
    pub fn bare(op: &'static str, path: impl Into<String>) -> Self {
        Request {
            id: 0,
            op,
            path: path.into(),
            flags: None,
            fh: None,
            size: None,
            offset: None,
            mode: None,
            buf: None,
            base64_encoded: None,
        }
    }

    pub fn with_flags(mut self, flags: i32) -> Self {
        self.flags = Some(flags);
        self
    }

    pub fn with_fh(mut self, fh: u64) -> Self {
        self.fh = Some(fh);
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Attaches a binary payload, base64-encoding it. Binary payloads
    /// cross the wire as base64 text with an explicit flag.
    pub fn with_buf(mut self, data: &[u8]) -> Self {
        self.buf = Some(BASE64.encode(data));
        self.base64_encoded = Some(true);
        self
    }
}

/// The peer's reply. Every field beyond `id`/`error` is operation-specific
/// and absent when not applicable — absence means "not applicable", not
/// zero.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Response {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub error: i32,
    pub st_mode: Option<u32>,
    pub st_nlink: Option<u32>,
    pub st_size: Option<u64>,
    pub fh: Option<u64>,
    pub buf: Option<String>,
    #[serde(default, rename = "base64Encoded")]
    pub base64_encoded: bool,
    pub size: Option<u64>,
    pub entries: Option<Vec<String>>,
}

impl Response {
    pub fn is_error(&self) -> bool {
        self.error != 0
    }

    /// Decodes `buf` per the `base64Encoded` flag. Absent `buf` decodes to
    /// an empty payload, not an error — several operations (`release`,
    /// `write`'s accepted-count reply) carry no `buf` at all.
    pub fn decode_buf(&self) -> Result<Vec<u8>, crate::error::BridgeError> {
        match &self.buf {
            None => Ok(Vec::new()),
            Some(s) if self.base64_encoded => BASE64
                .decode(s)
                .map_err(|e| crate::error::BridgeError::Protocol(e.to_string())),
            Some(s) => Ok(s.as_bytes().to_vec()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_fields_are_skipped_not_null() {
        let req = Request::bare("getattr", "/tabs/1/url.txt");
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("flags"));
        assert!(!json.contains("fh"));
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&json).unwrap()["op"],
            "getattr"
        );
    }

    #[test]
    fn write_request_base64_encodes_its_buffer() {
        let req = Request::bare("write", "/x").with_buf(b"\x00\x01binary");
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["base64Encoded"], true);
        assert!(json["buf"].as_str().unwrap().len() > 0);
    }

    #[test]
    fn response_round_trips_through_json() {
        let body = r#"{"id": 5, "st_mode": 33188, "st_nlink": 1, "st_size": 13}"#;
        let resp: Response = serde_json::from_str(body).unwrap();
        assert!(!resp.is_error());
        assert_eq!(resp.st_size, Some(13));
        assert_eq!(resp.fh, None);
    }

    #[test]
    fn decode_buf_treats_missing_buf_as_empty() {
        let resp = Response::default();
        assert_eq!(resp.decode_buf().unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn decode_buf_honors_base64_flag() {
        let mut resp = Response::default();
        resp.buf = Some("aGVsbG8=".to_string());
        resp.base64_encoded = true;
        assert_eq!(resp.decode_buf().unwrap(), b"hello");
    }
}

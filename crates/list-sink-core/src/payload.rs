//! Opaque formatted log payloads.

use std::fmt;

/// An already-serialized log record.
///
/// The delivery core never inspects or modifies the bytes.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Payload {
    bytes: Vec<u8>,
}

impl Payload {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Concatenate layout-supplied header, body and footer into one payload.
    pub fn framed(header: Option<&[u8]>, body: &[u8], footer: Option<&[u8]>) -> Self {
        let header = header.unwrap_or_default();
        let footer = footer.unwrap_or_default();

        let mut bytes = Vec::with_capacity(header.len() + body.len() + footer.len());
        bytes.extend_from_slice(header);
        bytes.extend_from_slice(body);
        bytes.extend_from_slice(footer);
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Self::new(bytes.to_vec())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self::new(text.into_bytes())
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Self::new(text.as_bytes().to_vec())
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload").field("len", &self.bytes.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_framed_concatenates_in_order() {
        let payload = Payload::framed(Some(b"["), b"{\"msg\":\"hi\"}", Some(b"]\n"));
        assert_eq!(payload.as_bytes(), b"[{\"msg\":\"hi\"}]\n");
    }

    #[test]
    fn test_framed_without_parts_is_body() {
        let payload = Payload::framed(None, b"body", None);
        assert_eq!(payload, Payload::from("body"));
    }

    #[test]
    fn test_debug_hides_content() {
        let payload = Payload::from("secret token");
        assert_eq!(format!("{:?}", payload), "Payload { len: 12 }");
    }
}

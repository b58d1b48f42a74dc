//! `multipart/form-data` bodies.

use uuid::Uuid;

use crate::params::Params;

/// A named binary part of a multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartPart {
    pub field_name: String,
    pub payload: Vec<u8>,
    pub file_name: String,
    pub content_type: String,
}

impl MultipartPart {
    pub fn new(
        field_name: impl Into<String>,
        payload: impl Into<Vec<u8>>,
        file_name: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            field_name: field_name.into(),
            payload: payload.into(),
            file_name: file_name.into(),
            content_type: content_type.into(),
        }
    }
}

/// Delimiter between multipart sections. A fresh one is generated for every
/// upload attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Boundary(String);

impl Boundary {
    pub fn generate() -> Self {
        Self(format!("Boundary-{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.0)
    }
}

/// Encode parameters (as plain fields, sorted by key) followed by the binary
/// parts (in caller order), then the closing delimiter.
pub fn encode_multipart(params: &Params, parts: &[MultipartPart], boundary: &Boundary) -> Vec<u8> {
    let b = boundary.as_str();
    let mut body = Vec::new();

    for (name, value) in params.iter() {
        body.extend_from_slice(format!("--{b}\r\n").as_bytes());
        body.extend_from_slice(format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes());
        body.extend_from_slice(value.to_string().as_bytes());
        body.extend_from_slice(b"\r\n");
    }

    for part in parts {
        body.extend_from_slice(format!("--{b}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                part.field_name, part.file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", part.content_type).as_bytes());
        body.extend_from_slice(&part.payload);
        body.extend_from_slice(b"\r\n");
    }

    body.extend_from_slice(format!("--{b}--").as_bytes());
    body
}

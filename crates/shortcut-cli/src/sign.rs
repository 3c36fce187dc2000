//! Client for the remote signing service.
//!
//! The service takes the unsigned document as a single multipart file field
//! and answers with the signed container, which always starts with `AEA1`.

use std::io::Read;
use std::time::Duration;
use thiserror::Error;

pub const BOUNDARY: &str = "----ShortcutBoundary";
pub const FIELD: &str = "shortcut";
pub const SIGNED_MAGIC: &[u8] = b"AEA1";

/// Signed documents are small; anything past this is not one.
const MAX_RESPONSE_BYTES: u64 = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum SignError {
    #[error("signing request failed: {0}")]
    Transport(String),

    #[error("signing service returned HTTP {0}")]
    Status(u16),

    #[error("could not read signing response: {0}")]
    Read(#[from] std::io::Error),

    #[error("response is not a signed shortcut ({0} bytes, no AEA1 header)")]
    NotSigned(usize),
}

pub struct Signer {
    url: String,
    agent: ureq::Agent,
}

impl Signer {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Upload `data` as `file_name` and return the signed bytes.
    pub fn sign(&self, file_name: &str, data: &[u8]) -> Result<Vec<u8>, SignError> {
        let body = multipart_body(file_name, data);
        let response = self
            .agent
            .post(&self.url)
            .set(
                "Content-Type",
                &format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .send_bytes(&body)
            .map_err(|e| match e {
                ureq::Error::Status(code, _) => SignError::Status(code),
                ureq::Error::Transport(t) => SignError::Transport(t.to_string()),
            })?;

        let mut signed = Vec::new();
        response
            .into_reader()
            .take(MAX_RESPONSE_BYTES)
            .read_to_end(&mut signed)?;
        if !signed.starts_with(SIGNED_MAGIC) {
            return Err(SignError::NotSigned(signed.len()));
        }
        Ok(signed)
    }
}

pub fn multipart_body(file_name: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(data.len() + 256);
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{FIELD}\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

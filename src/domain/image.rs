use crate::domain::model::Payload;
use crate::utils::error::{CaptchaError, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::Value;
use std::io::Read;
use std::path::Path;

/// Raw CAPTCHA image bytes. Content is not inspected; an empty image is
/// only rejected when it is uploaded.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CaptchaImage {
    bytes: Vec<u8>,
}

impl CaptchaImage {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        tracing::debug!(
            "Read {} bytes of image data from {}",
            bytes.len(),
            path.as_ref().display()
        );
        Ok(Self { bytes })
    }

    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Ok(Self { bytes })
    }

    /// Accepts plain base64 or the `base64:` prefixed form the HTTP API uses.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let trimmed = encoded.trim();
        let data = trimmed.strip_prefix("base64:").unwrap_or(trimmed);
        let bytes = STANDARD
            .decode(data)
            .map_err(|e| CaptchaError::invalid_captcha(format!("invalid base64 image: {}", e)))?;
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }
}

impl From<Vec<u8>> for CaptchaImage {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from_bytes(bytes)
    }
}

impl From<&[u8]> for CaptchaImage {
    fn from(bytes: &[u8]) -> Self {
        Self::from_bytes(bytes)
    }
}

/// Optional fields sent along with an upload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadOptions {
    /// Service-specific CAPTCHA type code. Plain image CAPTCHAs leave it unset.
    pub captcha_type: Option<u32>,
    /// Image shown to solvers next to the CAPTCHA, e.g. a site logo.
    pub banner: Option<CaptchaImage>,
    /// Instructions shown to solvers.
    pub banner_text: Option<String>,
    /// Parameters for token CAPTCHA types, sent as a JSON string.
    pub token_params: Option<Value>,
}

impl UploadOptions {
    pub fn with_type(mut self, captcha_type: u32) -> Self {
        self.captcha_type = Some(captcha_type);
        self
    }

    pub fn with_banner(mut self, banner: CaptchaImage) -> Self {
        self.banner = Some(banner);
        self
    }

    pub fn with_banner_text(mut self, text: impl Into<String>) -> Self {
        self.banner_text = Some(text.into());
        self
    }

    pub fn with_token_params(mut self, params: Value) -> Self {
        self.token_params = Some(params);
        self
    }

    pub(crate) fn write_into(&self, payload: &mut Payload) {
        if let Some(captcha_type) = self.captcha_type {
            payload.insert("type".to_string(), Value::from(captcha_type));
        }
        if let Some(banner) = self.banner.as_ref().filter(|b| !b.is_empty()) {
            payload.insert("banner".to_string(), Value::String(banner.to_base64()));
        }
        if let Some(text) = &self.banner_text {
            payload.insert("banner_text".to_string(), Value::String(text.clone()));
        }
        if let Some(params) = &self.token_params {
            payload.insert("token_params".to_string(), Value::String(params.to_string()));
        }
    }
}

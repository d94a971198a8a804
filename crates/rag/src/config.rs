use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "http://localhost:5000/api/rag";
pub const DEFAULT_ASK_PATH: &str = "ask";
pub const DEFAULT_UPLOAD_PATH: &str = "upload";
pub const DEFAULT_UPLOAD_FIELD: &str = "pdfFile";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RagClientConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_ask_path")]
    pub ask_path: String,
    #[serde(default = "default_upload_path")]
    pub upload_path: String,
    /// Multipart field carrying the document bytes.
    #[serde(default = "default_upload_field")]
    pub upload_field: String,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Whole-request timeout. Unset means the request may take as long as the service needs.
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
}

impl Default for RagClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            ask_path: default_ask_path(),
            upload_path: default_upload_path(),
            upload_field: default_upload_field(),
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: None,
        }
    }
}

impl RagClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn normalized(mut self) -> Self {
        self.base_url = match self.base_url.trim().trim_end_matches('/') {
            "" => default_base_url(),
            trimmed => trimmed.to_string(),
        };
        self.ask_path = normalize_path(&self.ask_path).unwrap_or_else(default_ask_path);
        self.upload_path = normalize_path(&self.upload_path).unwrap_or_else(default_upload_path);
        self.upload_field = match self.upload_field.trim() {
            "" => default_upload_field(),
            trimmed => trimmed.to_string(),
        };
        self
    }

    pub fn ask_url(&self) -> String {
        format!("{}/{}", self.base_url, self.ask_path)
    }

    pub fn upload_url(&self) -> String {
        format!("{}/{}", self.base_url, self.upload_path)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}

fn normalize_path(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_matches('/');
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_ask_path() -> String {
    DEFAULT_ASK_PATH.to_string()
}

fn default_upload_path() -> String {
    DEFAULT_UPLOAD_PATH.to_string()
}

fn default_upload_field() -> String {
    DEFAULT_UPLOAD_FIELD.to_string()
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

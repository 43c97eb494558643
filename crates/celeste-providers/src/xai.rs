//! xAI (Grok) backend: OpenAI-compatible wire shape with its own endpoint.

use async_trait::async_trait;

use celeste_core::error::Result;
use celeste_core::provider::{BackendRequest, BackendResponse, ChatBackend};

use crate::openai_compatible::OpenAiCompatibleBackend;

const DEFAULT_BASE_URL: &str = "https://api.x.ai/v1";

/// Backend for the xAI API.
pub struct XaiBackend {
    inner: OpenAiCompatibleBackend,
}

impl XaiBackend {
    pub fn new(model: impl Into<String>, api_key: impl Into<String>, base_url: Option<String>) -> Self {
        let base_url = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            inner: OpenAiCompatibleBackend::new(model, api_key, Some(base_url)).with_name("xai"),
        }
    }
}

#[async_trait]
impl ChatBackend for XaiBackend {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn send_sync(&self, request: &BackendRequest) -> Result<BackendResponse> {
        self.inner.send_sync(request).await
    }
}

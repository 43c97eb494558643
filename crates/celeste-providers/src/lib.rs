//! Concrete [`ChatBackend`] implementations for Celeste.

pub mod openai_compatible;
pub mod xai;

pub use openai_compatible::OpenAiCompatibleBackend;
pub use xai::XaiBackend;

use std::sync::Arc;

use celeste_core::config::Config;
use celeste_core::error::{CelesteError, Result};
use celeste_core::provider::ChatBackend;

const DEFAULT_MODEL: &str = "gpt-4o";

/// Build a backend from configuration. Base URLs pointing at xAI get the
/// branded backend; everything else goes through the generic
/// OpenAI-compatible one.
pub fn backend_from_config(config: &Config) -> Result<Arc<dyn ChatBackend>> {
    let api_key = config
        .api_key
        .clone()
        .ok_or_else(|| CelesteError::Configuration("no API key configured".to_string()))?;
    let model = config
        .model
        .clone()
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());

    let is_xai = config
        .base_url
        .as_deref()
        .map(|url| url.contains("api.x.ai"))
        .unwrap_or(false)
        || model.starts_with("grok");

    if is_xai {
        Ok(Arc::new(XaiBackend::new(
            model,
            api_key,
            config.base_url.clone(),
        )))
    } else {
        Ok(Arc::new(OpenAiCompatibleBackend::new(
            model,
            api_key,
            config.base_url.clone(),
        )))
    }
}

//! Environment-backed provider configuration.

/// Connection settings for the configured provider.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
}

impl Config {
    /// Load from environment variables, reading `.env` first if present.
    ///
    /// Key resolution order: `CELESTE_API_KEY`, then `OPENAI_API_KEY`, then
    /// `XAI_API_KEY`.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let api_key = ["CELESTE_API_KEY", "OPENAI_API_KEY", "XAI_API_KEY"]
            .iter()
            .find_map(|var| std::env::var(var).ok())
            .filter(|value| !value.trim().is_empty());
        Self {
            api_key,
            base_url: std::env::var("CELESTE_BASE_URL").ok(),
            model: std::env::var("CELESTE_MODEL").ok(),
        }
    }
}

//! Token usage accounting.

use serde::{Deserialize, Serialize};

/// Token usage reported by a provider for one request.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

fn default_batch_size() -> usize {
    4
}

/// Request body for `POST /v1/translate` and `POST /v1/translate/stream`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TranslateRequest {
    /// A URL, a data-URI, or raw base64; see `ImageSource::classify`.
    pub image: String,
    /// Opaque translation config, forwarded verbatim to the executor.
    #[serde(default)]
    pub config: serde_json::Value,
}

/// Request body for `POST /v1/translate/batch`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TranslateBatchRequest {
    /// One entry per image, each in the same shapes as [`TranslateRequest::image`].
    pub images: Vec<String>,
    /// Opaque translation config, forwarded verbatim to the executor.
    #[serde(default)]
    pub config: serde_json::Value,
    /// Number of images grouped per executor call (default `4`).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

//! cache_image tool implementation.

use datavault_client::{CacheService, ImagePreview};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;

/// Parameters for the cache_image tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheImageParams {
    /// Image URL (http or https).
    pub url: String,

    /// Return a low-resolution preview right away and cache the full image
    /// in the background (default: false).
    #[serde(default)]
    pub placeholder: bool,
}

/// Output from the cache_image tool without placeholder.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheImageOutput {
    pub url: String,
    /// Data URI, or the original URL when the image could not be fetched.
    pub image: String,
    pub inlined: bool,
    /// Why the image was not inlined.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Output of the placeholder variant.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheImagePreviewOutput {
    pub url: String,
    #[serde(flatten)]
    pub preview: ImagePreview,
}

/// Implementation of the cache_image tool.
pub async fn image_impl(cache: &CacheService, params: CacheImageParams) -> Result<CallToolResult, McpError> {
    if params.placeholder {
        let preview = cache.image_with_placeholder(&params.url).await;
        return json_result(&CacheImagePreviewOutput { url: params.url, preview });
    }

    let output = match cache.try_cache_image(&params.url).await {
        Ok(image) => CacheImageOutput { url: params.url, image, inlined: true, error: None },
        Err(e) => {
            CacheImageOutput { image: params.url.clone(), url: params.url, inlined: false, error: Some(e.to_string()) }
        }
    };
    json_result(&output)
}

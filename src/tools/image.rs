//! Image generation tool.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use serde_json::{json, Value};

use super::file::absolute;
use super::{str_arg, Tool};
use crate::images::{ImageClient, ImageError, ImageRequest};

const DEFAULT_FILENAME: &str = "image.png";
const DEFAULT_SIZE: &str = "1024x1024";
const DEFAULT_SAVE_DIR: &str = ".";

/// Generate an image from a prompt and save it locally.
pub struct GenerateImages {
    client: Arc<dyn ImageClient>,
    model: String,
}

impl GenerateImages {
    pub fn new(client: Arc<dyn ImageClient>, model: String) -> Self {
        Self { client, model }
    }

    /// Generate the image and write it to `save_dir/filename`.
    ///
    /// Inline base64 data is preferred; a URL payload is downloaded instead.
    pub async fn generate_to_file(
        &self,
        prompt: &str,
        filename: &str,
        size: &str,
        save_dir: &Path,
    ) -> Result<String, ImageError> {
        tokio::fs::create_dir_all(save_dir).await?;
        let filepath = save_dir.join(filename);

        let request = ImageRequest::b64(&self.model, prompt, size);
        let response = self.client.generate(&request).await?;

        let data = response.data.unwrap_or_default();
        let first = data.into_iter().next().ok_or(ImageError::EmptyData)?;

        if let Some(revised) = first.revised_prompt.as_deref() {
            tracing::debug!("Image prompt revised to: {}", revised);
        }

        let bytes = match (first.b64_json.as_deref(), first.url.as_deref()) {
            (Some(b64), _) if !b64.is_empty() => {
                base64::engine::general_purpose::STANDARD.decode(b64)?
            }
            (_, Some(url)) if !url.is_empty() => {
                tracing::warn!("Image response has no base64 data, downloading {}", url);
                self.client
                    .download(url)
                    .await
                    .map_err(|e| ImageError::FallbackDownload(e.to_string()))?
            }
            _ => return Err(ImageError::NoPayload),
        };

        tokio::fs::write(&filepath, &bytes).await?;

        tracing::info!("Saved {} byte image to {}", bytes.len(), filepath.display());

        Ok(filepath.to_string_lossy().into_owned())
    }
}

#[async_trait]
impl Tool for GenerateImages {
    fn name(&self) -> &str {
        "generateImages"
    }

    fn description(&self) -> &str {
        "Generate an image from a text prompt and save it as a file. Returns the absolute path of the saved image."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "prompt": {
                    "type": "string",
                    "description": "Description of the image"
                },
                "filename": {
                    "type": "string",
                    "description": "File name of the image (default: image.png)"
                },
                "size": {
                    "type": "string",
                    "description": "Image size, e.g. 1024x1024, 1792x1024 or 1024x1792 (default: 1024x1024)"
                },
                "save_dir": {
                    "type": "string",
                    "description": "Directory to save the image in (default: current directory)"
                }
            },
            "required": ["prompt"]
        })
    }

    async fn execute(&self, args: Value, workspace: &Path) -> anyhow::Result<String> {
        let prompt = str_arg(&args, "prompt").unwrap_or("");
        let filename = str_arg(&args, "filename").unwrap_or(DEFAULT_FILENAME);
        let size = str_arg(&args, "size").unwrap_or(DEFAULT_SIZE);
        let save_dir = str_arg(&args, "save_dir").unwrap_or(DEFAULT_SAVE_DIR);

        tracing::info!("Generating image ({}): {}", size, prompt);

        let save_dir = absolute(workspace, Path::new(save_dir));
        Ok(self.generate_to_file(prompt, filename, size, &save_dir).await?)
    }
}

//! Image Generator tool - OpenAI image generation

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::agent::approval::ApprovalHandle;
use crate::ai::client::ClientConfig;
use crate::settings::AppSettings;
use crate::tools::registry::{parse_args, RunResult, Tool, ToolInstance};

const IMAGE_SIZE: &str = "1024x1024";

pub struct GenerateImageTool;

#[derive(Deserialize)]
struct Params {
    prompt: String,
}

#[derive(Serialize)]
struct ImageRequest<'a> {
    prompt: &'a str,
    n: u8,
    size: &'a str,
    response_format: &'a str,
}

#[derive(Deserialize)]
struct ImageResponse {
    data: Vec<ImageData>,
}

#[derive(Deserialize)]
struct ImageData {
    url: String,
}

struct GenerateImageInstance {
    http: reqwest::Client,
    config: ClientConfig,
}

#[async_trait]
impl Tool for GenerateImageTool {
    fn id(&self) -> &str {
        "generate_image"
    }

    fn name(&self) -> &str {
        "Image Generator"
    }

    fn description(&self) -> &str {
        "generate images using dalle"
    }

    fn argument_descriptions(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(
            "prompt".to_string(),
            "prompt to use to generate the image; the prompt should be detailed, and include keywords regarding styling; it shouldn't be a proper sentence, rather, a bag of keywords".to_string(),
        )])
    }

    async fn instantiate(
        &self,
        settings: &AppSettings,
        _approval: ApprovalHandle,
    ) -> Result<Box<dyn ToolInstance>> {
        let config = ClientConfig::from_settings(settings);
        if config.api_key.is_empty() {
            anyhow::bail!("No OpenAI API key configured");
        }
        Ok(Box::new(GenerateImageInstance {
            http: reqwest::Client::new(),
            config,
        }))
    }
}

#[async_trait]
impl ToolInstance for GenerateImageInstance {
    async fn run(&mut self, args: &Map<String, Value>) -> Result<RunResult> {
        let params: Params = parse_args(args)?;

        let response = self
            .http
            .post(self.config.images_url())
            .bearer_auth(&self.config.api_key)
            .json(&ImageRequest {
                prompt: &params.prompt,
                n: 1,
                size: IMAGE_SIZE,
                response_format: "url",
            })
            .send()
            .await
            .context("error creating image")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("error creating image: {} {}", status, body);
        }

        let image: ImageResponse = response.json().await.context("error decoding image response")?;
        Ok(RunResult::new("successfully generated image", image_output(image)?))
    }
}

/// `{"image_url": ...}` for the first generated image
fn image_output(image: ImageResponse) -> Result<String> {
    let url = image
        .data
        .into_iter()
        .next()
        .map(|d| d.url)
        .context("image response had no data")?;
    Ok(serde_json::to_string_pretty(&json!({ "image_url": url }))?)
}

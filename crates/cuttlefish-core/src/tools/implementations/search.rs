//! Search tool - Google Custom Search

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::agent::approval::ApprovalHandle;
use crate::settings::AppSettings;
use crate::tools::registry::{parse_args, RunResult, Tool, ToolInstance};

const SEARCH_ENDPOINT: &str = "https://www.googleapis.com/customsearch/v1";
const MAX_RESULTS: usize = 5;

pub struct SearchTool;

#[derive(Deserialize)]
struct Params {
    query: String,
}

struct SearchInstance {
    http: reqwest::Client,
    engine_id: String,
    api_key: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Deserialize)]
struct SearchItem {
    link: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
}

#[derive(Debug, Serialize)]
struct SearchResult {
    url: String,
    title: String,
    snippet: String,
}

#[async_trait]
impl Tool for SearchTool {
    fn id(&self) -> &str {
        "search"
    }

    fn name(&self) -> &str {
        "Search"
    }

    fn description(&self) -> &str {
        "search using google; when the user asks about facts, or you need facts to answer, double-check them here instead of relying on your memory; you can also use it to find web pages relevant to a topic"
    }

    fn argument_descriptions(&self) -> BTreeMap<String, String> {
        BTreeMap::from([("query".to_string(), "phrase to search for".to_string())])
    }

    async fn instantiate(
        &self,
        settings: &AppSettings,
        _approval: ApprovalHandle,
    ) -> Result<Box<dyn ToolInstance>> {
        let google = &settings.search.google_custom_search;
        if google.custom_search_engine_id.is_empty() || google.google_cloud_api_key.is_empty() {
            anyhow::bail!("Google Custom Search is not configured");
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("couldn't build HTTP client")?;
        Ok(Box::new(SearchInstance {
            http,
            engine_id: google.custom_search_engine_id.clone(),
            api_key: google.google_cloud_api_key.clone(),
        }))
    }
}

#[async_trait]
impl ToolInstance for SearchInstance {
    async fn run(&mut self, args: &Map<String, Value>) -> Result<RunResult> {
        let params: Params = parse_args(args)?;
        let num = MAX_RESULTS.to_string();

        let response = self
            .http
            .get(SEARCH_ENDPOINT)
            .query(&[
                ("key", self.api_key.as_str()),
                ("cx", self.engine_id.as_str()),
                ("q", params.query.as_str()),
                ("num", num.as_str()),
            ])
            .send()
            .await
            .context("could not search")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("search returned {}: {}", status, body);
        }

        let response: SearchResponse = response.json().await.context("could not decode results")?;
        let results = to_results(response);
        let json = serde_json::to_string_pretty(&results).context("could not encode results")?;

        Ok(RunResult::new(
            format!("returning top {} results", results.len()),
            format!("{}\n", json),
        ))
    }
}

fn to_results(response: SearchResponse) -> Vec<SearchResult> {
    response
        .items
        .into_iter()
        .take(MAX_RESULTS)
        .map(|item| SearchResult {
            url: item.link,
            title: item.title,
            snippet: item.snippet,
        })
        .collect()
}

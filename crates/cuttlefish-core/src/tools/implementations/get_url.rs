//! URL Getter tool - fetch a page and extract its main text

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;
use url::Url;

use crate::agent::approval::ApprovalHandle;
use crate::settings::AppSettings;
use crate::tools::registry::{parse_args, RunResult, Tool, ToolInstance};

const MAX_WORDS: usize = 300;
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

pub struct GetUrlTool;

#[derive(Deserialize)]
struct Params {
    url: String,
}

struct GetUrlInstance {
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct WikipediaSummary {
    #[serde(default)]
    extract: String,
}

#[async_trait]
impl Tool for GetUrlTool {
    fn id(&self) -> &str {
        "get_url"
    }

    fn name(&self) -> &str {
        "URL Getter"
    }

    fn description(&self) -> &str {
        "fetch the contents of a url; useful for getting details about a search result"
    }

    fn argument_descriptions(&self) -> BTreeMap<String, String> {
        BTreeMap::from([("url".to_string(), "url to get".to_string())])
    }

    async fn instantiate(
        &self,
        _settings: &AppSettings,
        _approval: ApprovalHandle,
    ) -> Result<Box<dyn ToolInstance>> {
        let http = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(concat!("cuttlefish/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("couldn't build HTTP client")?;
        Ok(Box::new(GetUrlInstance { http }))
    }
}

#[async_trait]
impl ToolInstance for GetUrlInstance {
    async fn run(&mut self, args: &Map<String, Value>) -> Result<RunResult> {
        let params: Params = parse_args(args)?;
        let url = Url::parse(&params.url).context("could not parse URL")?;
        let content = self
            .fetch_main_content(&url)
            .await
            .context("could not fetch url main contents")?;
        Ok(RunResult::new(
            "successfully fetched url",
            format!("{}\n", content.trim()),
        ))
    }
}

impl GetUrlInstance {
    async fn fetch_main_content(&self, url: &Url) -> Result<String> {
        let host = url.host_str().unwrap_or_default();

        if host.ends_with("wikipedia.org") {
            if let Some(title) = url.path().strip_prefix("/wiki/") {
                return self.wikipedia_summary(url, title).await;
            }
        }

        let response = self.http.get(url.as_str()).send().await?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("{} returned {}", url, status);
        }
        let html = response.text().await?;
        debug!(url = %url, bytes = html.len(), "Fetched page");
        extract_main_content(host, &html)
    }

    async fn wikipedia_summary(&self, url: &Url, title: &str) -> Result<String> {
        let mut endpoint = url.clone();
        endpoint.set_path(&format!("/api/rest_v1/page/summary/{}", title));
        endpoint.set_query(None);
        let summary: WikipediaSummary = self
            .http
            .get(endpoint.as_str())
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("could not get Wikipedia summary")?;
        Ok(summary.extract)
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow::anyhow!("invalid selector `{}`: {:?}", css, e))
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>()
}

/// Pick the part of a page worth showing the model
fn extract_main_content(host: &str, html: &str) -> Result<String> {
    let document = Html::parse_document(html);

    if host.ends_with("stackoverflow.com") {
        let question = document
            .select(&selector(".question .js-post-body")?)
            .next()
            .map(element_text)
            .unwrap_or_default();
        let answer = document
            .select(&selector(".answer .js-post-body")?)
            .next()
            .map(element_text)
            .unwrap_or_default();
        return Ok(format!(
            "Question:\n{}\n---\nAnswer:\n{}",
            question.trim(),
            answer.trim()
        ));
    }

    let articles: Vec<ElementRef<'_>> = document.select(&selector("article")?).collect();
    if articles.len() > 1 {
        let text: String = articles.into_iter().map(element_text).collect();
        return Ok(truncate_words(&text, MAX_WORDS));
    }

    // Longest element wins, unless something is explicitly marked as main content
    let mut main: Option<ElementRef<'_>> = None;
    let mut longest = 0;
    for element in document.select(&selector("body *")?) {
        let len = element_text(element).len();
        if len > longest {
            longest = len;
            main = Some(element);
        }
        if let Some(class) = element.value().attr("class") {
            if class.contains("main") || class.contains("content") {
                main = Some(element);
            }
        }
    }

    let main = main.context("could not find main content element")?;
    Ok(truncate_words(&element_text(main), MAX_WORDS))
}

fn truncate_words(text: &str, max_words: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() > max_words {
        format!("{} ...", words[..max_words].join(" "))
    } else {
        words.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stackoverflow_question_and_answer() {
        let html = r#"<html><body>
            <div class="question"><div class="js-post-body"> How do I exit vim? </div></div>
            <div class="answer"><div class="js-post-body">Type :q</div></div>
            <div class="answer"><div class="js-post-body">Unplug it</div></div>
        </body></html>"#;
        let content = extract_main_content("stackoverflow.com", html).unwrap();
        assert_eq!(content, "Question:\nHow do I exit vim?\n---\nAnswer:\nType :q");
    }

    #[test]
    fn test_marked_main_content_wins() {
        let html = r#"<html><body>
            <nav>a very long navigation bar with many many many many words in it</nav>
            <div class="page-content">short body</div>
        </body></html>"#;
        let content = extract_main_content("example.com", html).unwrap();
        assert_eq!(content, "short body");
    }

    #[test]
    fn test_longest_element_without_markers() {
        let html = r#"<html><body><p>tiny</p><section>the real text of the page</section></body></html>"#;
        let content = extract_main_content("example.com", html).unwrap();
        assert_eq!(content, "the real text of the page");
    }

    #[test]
    fn test_empty_body_has_no_main_content() {
        assert!(extract_main_content("example.com", "<html><body></body></html>").is_err());
    }

    #[test]
    fn test_truncate_words() {
        let text = (0..305).map(|i| i.to_string()).collect::<Vec<_>>().join(" ");
        let truncated = truncate_words(&text, 300);
        assert!(truncated.ends_with("299 ..."));
        assert_eq!(truncate_words("a  b\nc", 300), "a b c");
    }
}

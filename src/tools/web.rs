//! Web search through the DuckDuckGo HTML endpoint.

use std::path::Path;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{str_arg, Tool};

const MAX_RESULTS: usize = 5;
const NO_RESULTS: &str = "No good DuckDuckGo Search Result was found";

/// Search the web (no API key needed).
pub struct WebSearch {
    endpoint: String,
    client: reqwest::Client,
}

impl WebSearch {
    pub fn new(endpoint: String) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("Mozilla/5.0 (compatible; VoiceAgentTools/0.1)")
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self { endpoint, client })
    }
}

#[async_trait]
impl Tool for WebSearch {
    fn name(&self) -> &str {
        "searchWeb"
    }

    fn description(&self) -> &str {
        "Search the web for current information. Returns the text of the top result snippets."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value, _workspace: &Path) -> anyhow::Result<String> {
        let query = str_arg(&args, "query").unwrap_or("");

        tracing::info!("Searching the web: {}", query);

        let url = format!("{}?q={}", self.endpoint, urlencoding::encode(query));
        let response = self.client.get(&url).send().await?;
        let status = response.status();

        if !status.is_success() {
            return Err(anyhow::anyhow!("Search request failed: HTTP {}", status));
        }

        let html = response.text().await?;
        let snippets = extract_ddg_snippets(&html);
        tracing::debug!("Search returned {} snippets", snippets.len());

        if snippets.is_empty() {
            Ok(NO_RESULTS.to_string())
        } else {
            Ok(snippets.join(" "))
        }
    }
}

/// Extract organic result snippets from DuckDuckGo HTML.
fn extract_ddg_snippets(html: &str) -> Vec<String> {
    let chunks: Vec<&str> = html.split("result__body").collect();

    chunks
        .windows(2)
        .filter_map(|pair| {
            let (before, chunk) = (pair[0], pair[1]);
            if is_ad(before, chunk) {
                return None;
            }
            let snippet = chunk.split("class=\"result__snippet\"").nth(1)?;
            // Skip the rest of the opening tag.
            let (_, body) = snippet.split_once('>')?;
            let inner = body.split("</a>").next().unwrap_or(body);
            let text = html_decode(&strip_tags(inner));
            (!text.is_empty()).then_some(text)
        })
        .take(MAX_RESULTS)
        .collect()
}

/// Sponsored results carry `result--ad` on their container, which opens
/// after the previous result's last `</div>`, and link through `y.js`.
fn is_ad(before: &str, chunk: &str) -> bool {
    let container = before.rsplit("</div>").next().unwrap_or(before);
    container.contains("result--ad") || chunk.contains("duckduckgo.com/y.js")
}

/// Drop markup and collapse whitespace.
fn strip_tags(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;

    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }

    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Basic HTML entity decoding.
fn html_decode(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

//! Web search skill with two backends: the Brave Search API and a local
//! SearXNG instance. Both normalize to `[{title, url, description}]`.

use async_trait::async_trait;
use pulsebot_core::skill::{Skill, ToolDefinition, ToolResult};
use serde::{Deserialize, Serialize};
use tracing::debug;

const BRAVE_SEARCH_URL: &str = "https://api.search.brave.com/res/v1/web/search";
const REQUEST_TIMEOUT_SECS: u64 = 20;

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub description: String,
}

enum Backend {
    Brave { api_key: String },
    Searxng { url: String },
}

pub struct WebSearchSkill {
    backend: Backend,
    client: reqwest::Client,
}

impl WebSearchSkill {
    pub fn brave(api_key: impl Into<String>) -> Self {
        Self {
            backend: Backend::Brave {
                api_key: api_key.into(),
            },
            client: http_client(),
        }
    }

    pub fn searxng(url: impl Into<String>) -> Self {
        Self {
            backend: Backend::Searxng {
                url: url.into().trim_end_matches('/').to_string(),
            },
            client: http_client(),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self.backend {
            Backend::Brave { .. } => "brave",
            Backend::Searxng { .. } => "searxng",
        }
    }

    async fn search(&self, query: &str, count: usize) -> Result<Vec<SearchResult>, String> {
        match &self.backend {
            Backend::Brave { api_key } => {
                if api_key.is_empty() {
                    return Err("Brave Search API key not configured".into());
                }
                let response = self
                    .client
                    .get(BRAVE_SEARCH_URL)
                    .query(&[("q", query), ("count", &count.to_string())])
                    .header("Accept", "application/json")
                    .header("X-Subscription-Token", api_key)
                    .send()
                    .await
                    .map_err(|e| format!("Search request failed: {e}"))?;

                let status = response.status();
                if !status.is_success() {
                    return Err(format!("Search returned status {status}"));
                }

                let parsed: BraveResponse = response
                    .json()
                    .await
                    .map_err(|e| format!("Failed to parse search response: {e}"))?;
                Ok(parse_brave(parsed, count))
            }
            Backend::Searxng { url } => {
                let response = self
                    .client
                    .get(format!("{url}/search"))
                    .query(&[("q", query), ("format", "json")])
                    .send()
                    .await
                    .map_err(|e| format!("Search request failed: {e}"))?;

                let status = response.status();
                if !status.is_success() {
                    return Err(format!("Search returned status {status}"));
                }

                let parsed: SearxngResponse = response
                    .json()
                    .await
                    .map_err(|e| format!("Failed to parse search response: {e}"))?;
                Ok(parse_searxng(parsed, count))
            }
        }
    }
}

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()
        .expect("Failed to create HTTP client")
}

fn clamp_count(raw: Option<u64>) -> usize {
    raw.unwrap_or(5).clamp(1, 10) as usize
}

#[async_trait]
impl Skill for WebSearchSkill {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for current information"
    }

    fn tools(&self) -> Vec<ToolDefinition> {
        vec![ToolDefinition {
            name: "web_search".into(),
            description:
                "Search the web for current information, news, or facts. Returns titles, URLs, and descriptions."
                    .into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The search query"
                    },
                    "count": {
                        "type": "integer",
                        "description": "Number of results (1-10)",
                        "default": 5
                    }
                },
                "required": ["query"]
            }),
        }]
    }

    async fn execute(&self, tool_name: &str, arguments: serde_json::Value) -> ToolResult {
        if tool_name != "web_search" {
            return ToolResult::fail(format!("unknown tool: {tool_name}"));
        }

        let query = arguments["query"].as_str().unwrap_or_default();
        if query.is_empty() {
            return ToolResult::fail("Search query is required");
        }
        let count = clamp_count(arguments["count"].as_u64());

        let preview: String = query.chars().take(60).collect();
        debug!(backend = self.backend_name(), query = %preview, count, "Web search");

        match self.search(query, count).await {
            Ok(results) => ToolResult::ok(serde_json::json!({
                "query": query,
                "results": results,
            })),
            Err(e) => ToolResult::fail(e),
        }
    }
}

// --- Backend wire types ---

#[derive(Debug, Deserialize)]
struct BraveResponse {
    #[serde(default)]
    web: Option<BraveWeb>,
}

#[derive(Debug, Deserialize)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveResult>,
}

#[derive(Debug, Deserialize)]
struct BraveResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    description: String,
}

fn parse_brave(resp: BraveResponse, count: usize) -> Vec<SearchResult> {
    resp.web
        .map(|w| w.results)
        .unwrap_or_default()
        .into_iter()
        .take(count)
        .map(|r| SearchResult {
            title: r.title,
            url: r.url,
            description: r.description,
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct SearxngResponse {
    #[serde(default)]
    results: Vec<SearxngResult>,
}

#[derive(Debug, Deserialize)]
struct SearxngResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
}

fn parse_searxng(resp: SearxngResponse, count: usize) -> Vec<SearchResult> {
    resp.results
        .into_iter()
        .take(count)
        .map(|r| SearchResult {
            title: r.title,
            url: r.url,
            description: r.content,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_clamping() {
        assert_eq!(clamp_count(None), 5);
        assert_eq!(clamp_count(Some(0)), 1);
        assert_eq!(clamp_count(Some(3)), 3);
        assert_eq!(clamp_count(Some(50)), 10);
    }

    #[test]
    fn brave_parsing() {
        let raw = r#"{
            "web": {"results": [
                {"title": "Cats", "url": "https://cats.example", "description": "All about cats"},
                {"title": "More cats", "url": "https://more.example", "description": "Even more"}
            ]}
        }"#;
        let parsed: BraveResponse = serde_json::from_str(raw).unwrap();
        let results = parse_brave(parsed, 1);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "Cats");
    }

    #[test]
    fn searxng_parsing_maps_content_to_description() {
        let raw = r#"{"results": [{"title": "T", "url": "U", "content": "C"}]}"#;
        let parsed: SearxngResponse = serde_json::from_str(raw).unwrap();
        let results = parse_searxng(parsed, 5);
        assert_eq!(results[0].description, "C");
    }

    #[test]
    fn empty_brave_response_yields_no_results() {
        let parsed: BraveResponse = serde_json::from_str("{}").unwrap();
        assert!(parse_brave(parsed, 5).is_empty());
    }

    #[tokio::test]
    async fn empty_query_fails() {
        let skill = WebSearchSkill::searxng("http://localhost:8080");
        let result = skill.execute("web_search", serde_json::json!({})).await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn brave_without_key_fails() {
        let skill = WebSearchSkill::brave("");
        let result = skill
            .execute("web_search", serde_json::json!({"query": "cats"}))
            .await;
        assert!(!result.success);
        assert!(result.error.as_deref().unwrap().contains("API key"));
    }
}

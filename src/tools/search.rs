//! Web search exposed to the research step as a tool.

use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};

use super::http::post_json;
use super::text::truncate_with_ellipsis;
use super::{Tool, ToolError, ToolSpec};

/// Per-result content cap, in characters.
pub const RESULT_CONTENT_CHARS: usize = 900;
/// Results requested from the backend and rendered into the tool output.
pub const MAX_RESULTS: usize = 3;

pub const NO_RESULTS: &str = "(No results)";
pub const SEARCH_UNAVAILABLE: &str = "(Web search is unavailable because TAVILY_API_KEY is not set.)\n\
     Please set TAVILY_API_KEY in your `.env` file.";

const TAVILY_URL: &str = "https://api.tavily.com/search";

/// One search result before formatting.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SearchHit {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub raw_content: Option<String>,
}

/// Where hits come from. Swappable so tests never hit the network.
pub trait SearchBackend: Send + Sync {
    fn search(&self, query: &str) -> Result<Vec<SearchHit>, ToolError>;
}

/// Render the first [`MAX_RESULTS`] hits as `[i] title\ncontent\nsource: url`,
/// blank-line separated.
pub fn format_hits(hits: &[SearchHit]) -> String {
    let field = |v: &Option<String>| v.as_deref().unwrap_or("").trim().to_string();

    let blocks: Vec<String> = hits
        .iter()
        .take(MAX_RESULTS)
        .enumerate()
        .map(|(i, hit)| {
            let mut content = field(&hit.content);
            if content.is_empty() {
                content = field(&hit.raw_content);
            }
            format!(
                "[{}] {}\n{}\nsource: {}",
                i + 1,
                field(&hit.title),
                truncate_with_ellipsis(&content, RESULT_CONTENT_CHARS),
                field(&hit.url)
            )
        })
        .collect();

    if blocks.is_empty() {
        NO_RESULTS.to_string()
    } else {
        blocks.join("\n\n")
    }
}

/// The `web_search` tool. Without a backend it answers with a fixed
/// "unavailable" notice instead of failing.
pub struct SearchTool {
    backend: Option<Box<dyn SearchBackend>>,
}

impl SearchTool {
    pub const NAME: &'static str = "web_search";

    pub fn new(backend: impl SearchBackend + 'static) -> Self {
        Self {
            backend: Some(Box::new(backend)),
        }
    }

    pub fn unavailable() -> Self {
        Self { backend: None }
    }
}

impl Tool for SearchTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: Self::NAME.to_string(),
            description: "Web search. Returns a formatted list of top results with source URLs."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "What to search for"}
                },
                "required": ["query"]
            }),
        }
    }

    fn call(&self, arguments: &Value) -> Result<String, ToolError> {
        let query = arguments
            .get("query")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("'query' must be a non-empty string".into()))?;

        match &self.backend {
            Some(backend) => Ok(format_hits(&backend.search(query)?)),
            None => Ok(SEARCH_UNAVAILABLE.to_string()),
        }
    }
}

/// Tavily search API client.
pub struct TavilyClient {
    api_key: String,
    max_results: usize,
    timeout: Duration,
}

impl TavilyClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            max_results: MAX_RESULTS,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

impl SearchBackend for TavilyClient {
    fn search(&self, query: &str) -> Result<Vec<SearchHit>, ToolError> {
        let body = json!({
            "query": query,
            "max_results": self.max_results,
            "search_depth": "basic",
            "include_answer": false,
            "include_raw_content": false,
            "include_images": false,
        });

        let value = post_json(TAVILY_URL, Some(&self.api_key), &body, self.timeout)?;
        let response: TavilyResponse = serde_json::from_value(value)
            .map_err(|e| ToolError::Failed(format!("unexpected search response: {e}")))?;
        Ok(response.results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Canned(Vec<SearchHit>);
    impl SearchBackend for Canned {
        fn search(&self, _query: &str) -> Result<Vec<SearchHit>, ToolError> {
            Ok(self.0.clone())
        }
    }

    struct Down;
    impl SearchBackend for Down {
        fn search(&self, _query: &str) -> Result<Vec<SearchHit>, ToolError> {
            Err(ToolError::Failed("503 from upstream".into()))
        }
    }

    fn hit(title: &str, content: &str, url: &str) -> SearchHit {
        SearchHit {
            title: Some(title.into()),
            url: Some(url.into()),
            content: Some(content.into()),
            raw_content: None,
        }
    }

    #[test]
    fn formats_numbered_blocks() {
        let text = format_hits(&[
            hit("Market size", "USD 1.2B", "https://a.example"),
            hit("Players", "Astroscale, ClearSpace", "https://b.example"),
        ]);
        assert_eq!(
            text,
            "[1] Market size\nUSD 1.2B\nsource: https://a.example\n\n\
             [2] Players\nAstroscale, ClearSpace\nsource: https://b.example"
        );
    }

    #[test]
    fn renders_at_most_three_hits() {
        let hits: Vec<SearchHit> = (1..=5)
            .map(|i| hit(&format!("t{i}"), "c", &format!("https://{i}.example")))
            .collect();
        let text = format_hits(&hits);
        assert_eq!(text.matches("source: ").count(), 3);
        assert!(text.contains("[3] t3"));
        assert!(!text.contains("[4]"));
        assert!(!text.contains("https://5.example"));
    }

    #[test]
    fn empty_hits_render_no_results() {
        assert_eq!(format_hits(&[]), NO_RESULTS);
    }

    #[test]
    fn long_content_is_capped() {
        let long = "a".repeat(RESULT_CONTENT_CHARS * 2);
        let text = format_hits(&[hit("t", &long, "u")]);
        let body = text.lines().nth(1).unwrap();
        assert_eq!(body.chars().count(), RESULT_CONTENT_CHARS + 1);
        assert!(body.ends_with('…'));
    }

    #[test]
    fn raw_content_used_when_content_blank() {
        let text = format_hits(&[SearchHit {
            title: Some("t".into()),
            url: None,
            content: Some("   ".into()),
            raw_content: Some("raw body".into()),
        }]);
        assert_eq!(text, "[1] t\nraw body\nsource: ");
    }

    #[test]
    fn tool_without_backend_reports_unavailable() {
        let tool = SearchTool::unavailable();
        let out = tool.call(&json!({"query": "space debris"})).unwrap();
        assert!(out.contains("TAVILY_API_KEY"));
    }

    #[test]
    fn tool_requires_query() {
        let tool = SearchTool::new(Canned(vec![]));
        let err = tool.call(&json!({"q": "x"})).err().unwrap();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[test]
    fn backend_failure_propagates_to_invoker() {
        let tool = SearchTool::new(Down);
        let err = tool.call(&json!({"query": "x"})).err().unwrap();
        assert_eq!(err.kind(), "ToolFailed");
    }

    #[test]
    fn tool_formats_backend_hits() {
        let tool = SearchTool::new(Canned(vec![hit("t", "c", "u")]));
        assert_eq!(
            tool.call(&json!({"query": "x"})).unwrap(),
            "[1] t\nc\nsource: u"
        );
        assert_eq!(tool.spec().name, "web_search");
    }
}

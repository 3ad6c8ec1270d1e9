//! DuckDuckGo HTML search (no API key needed).

use std::time::Duration;

use async_trait::async_trait;

use super::{SearchError, SearchProvider};
use crate::artifact::SearchHit;

const DDG_HTML_URL: &str = "https://html.duckduckgo.com/html/";

pub struct DuckDuckGoSearch {
    client: reqwest::Client,
}

impl DuckDuckGoSearch {
    pub fn new() -> Result<Self, SearchError> {
        let client = reqwest::Client::builder()
            .user_agent("Mozilla/5.0 (compatible; deckpilot/0.1)")
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoSearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, SearchError> {
        let url = format!("{}?q={}", DDG_HTML_URL, urlencoding::encode(query));

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::Status(status.as_u16()));
        }
        let html = response.text().await?;

        let hits = extract_ddg_results(&html, max_results);
        tracing::debug!("Search '{}' returned {} hits", query, hits.len());
        Ok(hits)
    }
}

/// Extract search results from DuckDuckGo HTML.
fn extract_ddg_results(html: &str, max_results: usize) -> Vec<SearchHit> {
    let mut results = Vec::new();

    for chunk in html.split("class=\"result__body\"").skip(1) {
        if results.len() >= max_results {
            break;
        }

        let title = inner_text_after(chunk, "class=\"result__a\"").unwrap_or("");
        let snippet = inner_text_after(chunk, "class=\"result__snippet\"").unwrap_or("");
        let url = inner_text_after(chunk, "class=\"result__url\"")
            .map(str::trim)
            .unwrap_or("");

        if !title.trim().is_empty() {
            results.push(SearchHit {
                title: html_decode(title.trim()),
                url: url.to_string(),
                snippet: html_decode(snippet.trim()),
            });
        }
    }

    results
}

/// Text between the end of the tag carrying `marker` and the next `<`.
fn inner_text_after<'a>(chunk: &'a str, marker: &str) -> Option<&'a str> {
    chunk
        .split(marker)
        .nth(1)
        .and_then(|s| s.split('>').nth(1))
        .and_then(|s| s.split('<').next())
}

/// Basic HTML entity decoding.
fn html_decode(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&nbsp;", " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
<div class="result__body">
  <a class="result__a" href="/l/?u=1">Rust &amp; Tokio</a>
  <a class="result__url" href="/l/?u=1"> tokio.rs </a>
  <a class="result__snippet">An async runtime &quot;for&quot; Rust</a>
</div>
<div class="result__body">
  <a class="result__a" href="/l/?u=2">Second</a>
  <a class="result__url" href="/l/?u=2">example.com</a>
</div>
<div class="result__body">
  <a class="result__a" href="/l/?u=3">Third</a>
</div>
"#;

    #[test]
    fn test_extract_results() {
        let hits = extract_ddg_results(PAGE, 5);
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].title, "Rust & Tokio");
        assert_eq!(hits[0].url, "tokio.rs");
        assert_eq!(hits[0].snippet, "An async runtime \"for\" Rust");
        assert_eq!(hits[1].snippet, "");
    }

    #[test]
    fn test_extract_respects_limit() {
        assert_eq!(extract_ddg_results(PAGE, 2).len(), 2);
        assert!(extract_ddg_results("<html>nothing</html>", 5).is_empty());
    }
}

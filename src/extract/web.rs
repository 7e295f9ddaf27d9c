//! Breadth-first web crawler.
//!
//! Starting from a seed URL, fetches up to `max_pages` same-origin pages,
//! preferring text found in semantic containers (article/main/content
//! regions) over whole-page text. Script, style, nav, footer and header
//! content is ignored. Pages below the minimum content length are dropped
//! as noise, and per-page fetch failures are logged and skipped.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::config::Settings;

use super::{SourceDocument, SourceType};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

const CONTENT_SELECTORS: [&str; 6] = [
    "article",
    "main",
    ".content",
    "#content",
    ".post-content",
    ".entry-content",
];

const SKIP_ELEMENTS: [&str; 6] = ["script", "style", "nav", "footer", "header", "noscript"];

pub struct WebCrawler {
    client: reqwest::Client,
    min_content_length: usize,
    links_per_page: usize,
}

/// Outcome of parsing one fetched page.
struct ParsedPage {
    title: Option<String>,
    text: String,
    links: Vec<Url>,
}

/// Seam between the crawl loop and the network.
#[async_trait]
trait FetchPage: Send + Sync {
    async fn fetch_page(&self, url: &Url) -> Result<String, String>;
}

#[async_trait]
impl FetchPage for reqwest::Client {
    async fn fetch_page(&self, url: &Url) -> Result<String, String> {
        let response = self
            .get(url.clone())
            .send()
            .await
            .and_then(|res| res.error_for_status())
            .map_err(|err| err.to_string())?;
        response.text().await.map_err(|err| err.to_string())
    }
}

impl WebCrawler {
    pub fn new(settings: &Settings) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .unwrap_or_default();

        Self {
            client,
            min_content_length: settings.min_content_length,
            links_per_page: settings.links_per_page,
        }
    }

    /// Crawl breadth-first from `start_url`, capped at `max_pages` fetches.
    ///
    /// Never fails: unreachable pages shrink the result instead.
    pub async fn crawl(&self, start_url: &str, max_pages: usize) -> Vec<SourceDocument> {
        self.crawl_with(&self.client, start_url, max_pages).await
    }

    async fn crawl_with(
        &self,
        fetcher: &dyn FetchPage,
        start_url: &str,
        max_pages: usize,
    ) -> Vec<SourceDocument> {
        let Ok(origin) = Url::parse(start_url) else {
            tracing::warn!("Invalid start URL: {}", start_url);
            return Vec::new();
        };

        let mut documents = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut queue: Vec<Url> = vec![origin.clone()];
        let mut cursor = 0;
        let mut fetched = 0;

        while cursor < queue.len() && fetched < max_pages {
            let current = queue[cursor].clone();
            cursor += 1;

            if !visited.insert(current.to_string()) {
                continue;
            }

            fetched += 1;
            let html = match fetcher.fetch_page(&current).await {
                Ok(html) => html,
                Err(err) => {
                    tracing::warn!("Error scraping {}: {}", current, err);
                    continue;
                }
            };

            let parsed = parse_page(&html, &current, self.links_per_page);

            if parsed.text.len() > self.min_content_length {
                let mut doc = SourceDocument::new(
                    parsed.text,
                    current.to_string(),
                    SourceType::Web,
                );
                doc.title = parsed.title;
                documents.push(doc);

                for link in parsed.links {
                    if link.origin() == origin.origin()
                        && !visited.contains(link.as_str())
                        && !queue.iter().any(|queued| queued == &link)
                    {
                        queue.push(link);
                    }
                }
            } else {
                tracing::debug!("Skipping {} (content below threshold)", current);
            }
        }

        documents
    }

}

/// Parse one page: title, cleaned text, and discovered links (bounded).
fn parse_page(html: &str, base: &Url, links_per_page: usize) -> ParsedPage {
    let document = Html::parse_document(html);

    let title = Selector::parse("title")
        .ok()
        .and_then(|sel| document.select(&sel).next())
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty());

    let mut text = String::new();
    for selector in CONTENT_SELECTORS {
        if let Ok(sel) = Selector::parse(selector) {
            for element in document.select(&sel) {
                collect_text(element, &mut text);
            }
        }
        if !text.trim().is_empty() {
            break;
        }
    }

    // Whole page as fallback when no semantic container matched.
    if text.trim().is_empty() {
        if let Ok(sel) = Selector::parse("body") {
            if let Some(body) = document.select(&sel).next() {
                collect_text(body, &mut text);
            }
        }
    }

    let text = normalize_whitespace(&text);

    let mut links = Vec::new();
    if let Ok(sel) = Selector::parse("a[href]") {
        for anchor in document.select(&sel) {
            if links.len() >= links_per_page {
                break;
            }
            if let Some(href) = anchor.value().attr("href") {
                if let Ok(mut joined) = base.join(href) {
                    joined.set_fragment(None);
                    if joined.scheme() == "http" || joined.scheme() == "https" {
                        links.push(joined);
                    }
                }
            }
        }
    }

    ParsedPage { title, text, links }
}

/// Walk an element's subtree collecting text nodes, ignoring script, style
/// and page chrome elements.
fn collect_text(element: ElementRef, out: &mut String) {
    for child in element.children() {
        match child.value() {
            scraper::Node::Text(text) => {
                out.push_str(text);
                out.push(' ');
            }
            scraper::Node::Element(el) => {
                if SKIP_ELEMENTS.contains(&el.name()) {
                    continue;
                }
                if let Some(child_ref) = ElementRef::wrap(child) {
                    collect_text(child_ref, out);
                }
            }
            _ => {}
        }
    }
}

fn normalize_whitespace(text: &str) -> String {
    static PATTERN: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    let re = PATTERN.get_or_init(|| Regex::new(r"\s+").expect("valid regex"));
    re.replace_all(text, " ").trim().to_string()
}

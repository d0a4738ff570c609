//! HTML parser for extracting page content
//!
//! This module handles parsing HTML content to extract:
//! - Page title and visible body text
//! - Meta tags and the canonical link
//! - Outbound links, classified internal/external against the page origin
//! - Values selected by the job's field selectors

use crate::fetcher::{FetchError, PageLink};
use crate::job::FieldSelector;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use std::collections::BTreeMap;
use url::Url;

/// Elements whose text is never part of the visible page text
const HIDDEN_TEXT_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

/// Extracted information from an HTML page
#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    /// The page title (from <title> tag)
    pub title: Option<String>,

    /// Visible body text, whitespace collapsed
    pub text: String,

    /// Meta tag values keyed by name or property
    pub metadata: BTreeMap<String, String>,

    /// All followable links found on the page
    pub links: Vec<PageLink>,

    /// Field selector results keyed by field name
    pub data: BTreeMap<String, Value>,
}

/// A field selector with its CSS already parsed
#[derive(Debug, Clone)]
pub struct CompiledSelector {
    name: String,
    selector: Selector,
    attribute: Option<String>,
    multiple: bool,
}

/// Parses every field selector up front
///
/// # Errors
///
/// Returns `FetchError::InvalidSelector` naming the first field whose CSS
/// does not parse.
pub fn compile_selectors(
    selectors: &BTreeMap<String, FieldSelector>,
) -> Result<Vec<CompiledSelector>, FetchError> {
    selectors
        .iter()
        .map(|(name, field)| {
            let selector =
                Selector::parse(&field.selector).map_err(|e| FetchError::InvalidSelector {
                    name: name.clone(),
                    message: e.to_string(),
                })?;
            Ok(CompiledSelector {
                name: name.clone(),
                selector,
                attribute: field.attribute.clone(),
                multiple: field.multiple,
            })
        })
        .collect()
}

/// Parses HTML content and extracts text, metadata, links and selector data
///
/// # Link Extraction Rules
///
/// **Include:** `<a href="...">` tags, resolved against `base_url`, with the
/// fragment removed.
///
/// **Exclude:**
/// - `<a href="..." download>`
/// - `javascript:`, `mailto:`, `tel:` links
/// - Data URIs and fragment-only links
/// - Anything that is not HTTP(S) after resolution
///
/// A link is internal when its origin (scheme, host, port) equals the origin
/// of `base_url`.
///
/// # Example
///
/// ```no_run
/// use crawl_engine::fetcher::parse_page;
/// use url::Url;
///
/// let html = r#"<html><head><title>Test</title></head><body><a href="/page">Link</a></body></html>"#;
/// let base_url = Url::parse("https://example.com/").unwrap();
/// let parsed = parse_page(html, &base_url, &[]);
/// assert_eq!(parsed.title, Some("Test".to_string()));
/// assert!(parsed.links[0].is_internal);
/// ```
pub fn parse_page(html: &str, base_url: &Url, selectors: &[CompiledSelector]) -> ParsedPage {
    let document = Html::parse_document(html);

    ParsedPage {
        title: extract_title(&document),
        text: extract_text(&document),
        metadata: extract_metadata(&document, base_url),
        links: extract_links(&document, base_url),
        data: apply_selectors(&document, selectors),
    }
}

/// Extracts the page title from the HTML document
fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| collapse_whitespace(&element.text().collect::<String>()))
        .filter(|s| !s.is_empty())
}

/// Collects the visible text under <body>, skipping scripts and styles
fn extract_text(document: &Html) -> String {
    let body = Selector::parse("body")
        .ok()
        .and_then(|selector| document.select(&selector).next())
        .unwrap_or_else(|| document.root_element());

    let mut words: Vec<&str> = Vec::new();
    for node in body.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };

        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|element| HIDDEN_TEXT_ELEMENTS.contains(&element.name()))
        });
        if !hidden {
            words.extend(text.split_whitespace());
        }
    }

    words.join(" ")
}

/// Extracts `<meta>` tags and the canonical link
fn extract_metadata(document: &Html, base_url: &Url) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();

    if let Ok(meta_selector) = Selector::parse("meta[content]") {
        for element in document.select(&meta_selector) {
            let attrs = element.value();
            let key = attrs
                .attr("name")
                .or_else(|| attrs.attr("property"))
                .or_else(|| attrs.attr("http-equiv"));

            if let (Some(key), Some(content)) = (key, attrs.attr("content")) {
                metadata
                    .entry(key.trim().to_lowercase())
                    .or_insert_with(|| content.trim().to_string());
            }
        }
    }

    if let Ok(canonical_selector) = Selector::parse("link[rel='canonical'][href]") {
        let canonical = document
            .select(&canonical_selector)
            .filter_map(|element| element.value().attr("href"))
            .find_map(|href| resolve_link(href, base_url));

        if let Some(url) = canonical {
            metadata.insert("canonical".to_string(), url.to_string());
        }
    }

    metadata
}

/// Extracts all valid links from the HTML document
fn extract_links(document: &Html, base_url: &Url) -> Vec<PageLink> {
    let mut links = Vec::new();

    let Ok(a_selector) = Selector::parse("a[href]") else {
        return links;
    };

    for element in document.select(&a_selector) {
        // Skip if it has the download attribute
        if element.value().attr("download").is_some() {
            continue;
        }

        let Some(url) = element
            .value()
            .attr("href")
            .and_then(|href| resolve_link(href, base_url))
        else {
            continue;
        };

        links.push(PageLink {
            is_internal: url.origin() == base_url.origin(),
            url: url.to_string(),
            text: collapse_whitespace(&element.text().collect::<String>()),
        });
    }

    links
}

/// Runs each field selector against the document
fn apply_selectors(document: &Html, selectors: &[CompiledSelector]) -> BTreeMap<String, Value> {
    selectors
        .iter()
        .map(|compiled| {
            let mut matches = document.select(&compiled.selector);
            let value = if compiled.multiple {
                Value::Array(
                    matches
                        .map(|element| selected_value(element, compiled.attribute.as_deref()))
                        .collect(),
                )
            } else {
                matches
                    .next()
                    .map(|element| selected_value(element, compiled.attribute.as_deref()))
                    .unwrap_or(Value::Null)
            };
            (compiled.name.clone(), value)
        })
        .collect()
}

fn selected_value(element: ElementRef<'_>, attribute: Option<&str>) -> Value {
    match attribute {
        Some(name) => element
            .value()
            .attr(name)
            .map(|v| Value::String(v.to_string()))
            .unwrap_or(Value::Null),
        None => Value::String(collapse_whitespace(&element.text().collect::<String>())),
    }
}

/// Resolves a link href to an absolute URL and validates it
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - Fragment-only links
/// - Invalid URLs
/// - Non-HTTP(S) URLs after resolution
fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    let mut absolute_url = base_url.join(href).ok()?;
    if absolute_url.scheme() != "http" && absolute_url.scheme() != "https" {
        return None;
    }

    absolute_url.set_fragment(None);
    Some(absolute_url)
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

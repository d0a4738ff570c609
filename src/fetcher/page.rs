use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An outbound link found on a page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLink {
    /// Absolute URL, fragment removed
    pub url: String,

    /// Anchor text, whitespace collapsed
    pub text: String,

    /// Same origin as the page the link was found on
    pub is_internal: bool,
}

/// Everything extracted from a successfully fetched page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageContent {
    pub title: Option<String>,

    /// Visible text of the document body
    pub text: String,

    /// Raw HTML; `None` when loaded through a summary projection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,

    /// `<meta>` name/property -> content, plus `canonical`
    pub metadata: BTreeMap<String, String>,

    pub links: Vec<PageLink>,

    /// Values extracted by the job's field selectors
    pub data: BTreeMap<String, serde_json::Value>,

    pub status_code: u16,
    pub content_type: String,
    pub headers: BTreeMap<String, String>,
}

impl PageContent {
    /// Links classified as internal, in document order
    pub fn internal_links(&self) -> impl Iterator<Item = &PageLink> {
        self.links.iter().filter(|link| link.is_internal)
    }
}

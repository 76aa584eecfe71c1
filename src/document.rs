//! Queryable HTML documents
//!
//! CSS selectors run against a `scraper` tree. XPath needs an XML tree, which
//! is built from the same source on the first XPath query only.

use std::cell::OnceCell;

use scraper::{Html, Selector};
use sxd_document::Package;
use sxd_xpath::{evaluate_xpath, Value as XPathValue};

use crate::error::QueryError;

/// Read access to a parsed document.
///
/// Both queries return the raw text content of the first match; callers trim.
pub trait DocumentQuery {
    fn query_css(&self, selector: &str) -> Result<Option<String>, QueryError>;
    fn query_xpath(&self, expr: &str) -> Result<Option<String>, QueryError>;
}

pub struct HtmlDocument {
    source: String,
    html: Html,
    xml: OnceCell<Package>,
}

impl HtmlDocument {
    pub fn parse(source: &str) -> Self {
        Self {
            source: source.to_string(),
            html: Html::parse_document(source),
            xml: OnceCell::new(),
        }
    }

    /// Parse raw bytes, replacing invalid UTF-8 sequences.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self::parse(&String::from_utf8_lossy(bytes))
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    fn xml(&self) -> &Package {
        self.xml.get_or_init(|| sxd_html::parse_html(&self.source))
    }
}

impl DocumentQuery for HtmlDocument {
    fn query_css(&self, selector_str: &str) -> Result<Option<String>, QueryError> {
        let selector = Selector::parse(selector_str).map_err(|e| QueryError::Selector {
            selector: selector_str.to_string(),
            reason: e.to_string(),
        })?;

        Ok(self
            .html
            .select(&selector)
            .next()
            .map(|el| el.text().collect::<String>()))
    }

    fn query_xpath(&self, expr: &str) -> Result<Option<String>, QueryError> {
        let document = self.xml().as_document();
        match evaluate_xpath(&document, expr) {
            Ok(XPathValue::Nodeset(nodes)) => {
                Ok(nodes.document_order_first().map(|node| node.string_value()))
            }
            // Only node results count as a match
            Ok(_) => Ok(None),
            Err(e) => Err(QueryError::XPath {
                expr: expr.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

impl std::fmt::Debug for HtmlDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HtmlDocument")
            .field("len", &self.source.len())
            .field("xml_parsed", &self.xml.get().is_some())
            .finish()
    }
}

use crate::error::ConfigError;
use crate::models::IndexDocument;
use crate::text::{non_empty_lines, normalize_whitespace};
use scraper::{Html, Selector};

/// CSS selectors for the marker elements a page uses to expose its fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerSelectors {
    pub title: String,
    /// Elements removed before any body text is read.
    pub stripped: String,
    pub primary_category: String,
    pub secondary_category: String,
    pub content: String,
}

impl Default for MarkerSelectors {
    fn default() -> Self {
        Self {
            title: "index-title".to_string(),
            stripped: ".title".to_string(),
            primary_category: ".entrycategory".to_string(),
            secondary_category: ".othrentrycategory".to_string(),
            content: ".index-content".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HtmlExtractor {
    title: Selector,
    stripped: Selector,
    primary_category: Selector,
    secondary_category: Selector,
    content: Selector,
}

impl HtmlExtractor {
    pub fn new(markers: &MarkerSelectors) -> Result<Self, ConfigError> {
        Ok(Self {
            title: parse_selector(&markers.title)?,
            stripped: parse_selector(&markers.stripped)?,
            primary_category: parse_selector(&markers.primary_category)?,
            secondary_category: parse_selector(&markers.secondary_category)?,
            content: parse_selector(&markers.content)?,
        })
    }

    pub fn with_default_markers() -> Result<Self, ConfigError> {
        Self::new(&MarkerSelectors::default())
    }

    /// Extracts the index fields of one page. Missing markers leave their
    /// field empty.
    pub fn extract(&self, html: &str, link: String) -> IndexDocument {
        let mut page = Html::parse_document(html);

        let title = first_text(&page, &self.title)
            .map(|text| text.trim().to_string())
            .unwrap_or_default();

        let stripped: Vec<_> = page.select(&self.stripped).map(|element| element.id()).collect();
        for id in stripped {
            if let Some(mut node) = page.tree.get_mut(id) {
                node.detach();
            }
        }

        let mut document = IndexDocument {
            title,
            link,
            ..Default::default()
        };

        if let Some(text) = first_text(&page, &self.primary_category) {
            assign_primary_categories(&non_empty_lines(&text), &mut document);
        }

        if let Some(text) = first_text(&page, &self.secondary_category) {
            document.category_s.extend(non_empty_lines(&text));
        }

        if let Some(text) = first_text(&page, &self.content) {
            document.content = normalize_whitespace(&text);
        }

        document
    }
}

fn parse_selector(selector: &str) -> Result<Selector, ConfigError> {
    Selector::parse(selector).map_err(|error| ConfigError::InvalidSelector {
        selector: selector.to_string(),
        details: format!("{error:?}"),
    })
}

fn first_text(page: &Html, selector: &Selector) -> Option<String> {
    page.select(selector)
        .next()
        .map(|element| element.text().collect::<String>())
}

/// The first line of the primary block is its label. Two to four lines fill
/// the levels from the top; any other shape contributes nothing.
fn assign_primary_categories(lines: &[String], document: &mut IndexDocument) {
    if !(2..=4).contains(&lines.len()) {
        return;
    }

    let levels = [
        &mut document.category_l,
        &mut document.category_m,
        &mut document.category_s,
    ];
    for (level, line) in levels.into_iter().zip(&lines[1..]) {
        level.push(line.clone());
    }
}

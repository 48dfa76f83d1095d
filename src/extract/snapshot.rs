//! Read-only snapshot of a rendered page.
//!
//! A snapshot supports the three addressing modes the cascade needs:
//! structural (CSS path), attribute lookup, and regex search over the
//! flattened text. It never mutates; its lifetime is one extraction pass.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

pub struct Snapshot {
    html: Html,
    text: String,
}

impl Snapshot {
    pub fn parse_document(html: &str) -> Self {
        let html = Html::parse_document(html);
        let text = flatten(&html);
        Self { html, text }
    }

    pub fn parse_fragment(html: &str) -> Self {
        let html = Html::parse_fragment(html);
        let text = flatten(&html);
        Self { html, text }
    }

    /// Whitespace-normalized text of the whole snapshot.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Text content of the first element matching `selector`.
    pub fn select_text(&self, selector: &Selector) -> Option<String> {
        let element = self.html.select(selector).next()?;
        let text = element.text().collect::<Vec<_>>().join(" ");
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    /// `attr` of the first matching element that carries it.
    pub fn select_attr(&self, selector: &Selector, attr: &str) -> Option<String> {
        self.html
            .select(selector)
            .find_map(|element| element.value().attr(attr))
            .map(|value| value.replace('\u{a0}', " ").trim().to_owned())
            .filter(|value| !value.is_empty())
    }

    /// First element matching `selector`, for callers that need to inspect
    /// attributes beyond a single lookup (pagination controls).
    pub fn select_element(&self, selector: &Selector) -> Option<ElementRef<'_>> {
        self.html.select(selector).next()
    }

    /// First regex hit over the flattened text; capture group 1 wins when
    /// the pattern defines one.
    pub fn find_pattern(&self, pattern: &Regex) -> Option<String> {
        let captures = pattern.captures(&self.text)?;
        let hit = captures.get(1).or_else(|| captures.get(0))?;
        let text = hit.as_str().trim();
        if text.is_empty() {
            None
        } else {
            Some(text.to_owned())
        }
    }

    /// Addressable sub-regions (e.g. result-grid cards), re-parsed as
    /// standalone fragments.
    pub fn regions(&self, selector: &Selector) -> Vec<Snapshot> {
        self.html
            .select(selector)
            .map(|element| Snapshot::parse_fragment(&element.html()))
            .collect()
    }
}

fn flatten(html: &Html) -> String {
    let raw = html.root_element().text().collect::<Vec<_>>().join(" ");
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const PAGE: &str = r#"
        <html><body>
          <div class="card" itemprop="itemListElement">
            <meta itemprop="name" content="Lakeside cottage" />
            <span class="price">$1,200</span>
          </div>
          <div class="card" itemprop="itemListElement">
            <meta itemprop="name" content="Downtown loft" />
            <span class="price">$950</span>
          </div>
          <p>Stay for 3   nights</p>
        </body></html>
    "#;

    #[test]
    fn structural_and_attribute_addressing() {
        let snapshot = Snapshot::parse_document(PAGE);
        let price = Selector::parse("span.price").unwrap();
        let name = Selector::parse("meta[itemprop='name']").unwrap();

        assert_eq!(snapshot.select_text(&price), Some("$1,200".to_owned()));
        assert_eq!(
            snapshot.select_attr(&name, "content"),
            Some("Lakeside cottage".to_owned())
        );
        assert_eq!(snapshot.select_attr(&name, "missing"), None);
    }

    #[test]
    fn regex_addressing_over_flattened_text() {
        let snapshot = Snapshot::parse_document(PAGE);
        let nights = Regex::new(r"for (\d+) nights").unwrap();
        assert_eq!(snapshot.find_pattern(&nights), Some("3".to_owned()));
    }

    #[test]
    fn regions_are_standalone_fragments() {
        let snapshot = Snapshot::parse_document(PAGE);
        let card = Selector::parse("div[itemprop='itemListElement']").unwrap();
        let price = Selector::parse("span.price").unwrap();

        let regions = snapshot.regions(&card);
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[1].select_text(&price), Some("$950".to_owned()));
    }
}

//! Forward-only cursor over search result pages.

use anyhow::Result;
use scraper::Selector;
use tracing::debug;
use url::Url;

use crate::extract::snapshot::Snapshot;

/// How the next page can be reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageRef {
    /// Discoverable href, preferred because it is resumable without
    /// interaction.
    Link(String),
    /// Clickable control with no usable href.
    Control,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Next(PageRef),
    Exhausted,
}

/// State machine over result pages: `AtPage(n)` advancing forward until the
/// terminal exhausted state. No backward paging.
pub struct PaginationCursor {
    page: u32,
    exhausted: bool,
    next_control: Selector,
}

impl PaginationCursor {
    pub fn new() -> Result<Self> {
        let next_control = Selector::parse("a[aria-label='Next'], button[aria-label='Next']")
            .map_err(|err| anyhow::anyhow!("invalid next-control selector: {err:?}"))?;
        Ok(Self {
            page: 1,
            exhausted: false,
            next_control,
        })
    }

    /// 1-based index of the page the cursor currently points at.
    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Inspect `snapshot` for a usable next-page control. An absent or
    /// disabled control parks the cursor in its terminal state.
    pub fn advance(&mut self, snapshot: &Snapshot, current_url: &str) -> Transition {
        if self.exhausted {
            return Transition::Exhausted;
        }

        let Some(element) = snapshot.select_element(&self.next_control) else {
            debug!(page = self.page, "no next-page control");
            self.exhausted = true;
            return Transition::Exhausted;
        };

        let disabled = element
            .value()
            .attr("aria-disabled")
            .is_some_and(|value| value.eq_ignore_ascii_case("true"))
            || element.value().attr("disabled").is_some();
        if disabled {
            debug!(page = self.page, "next-page control is disabled");
            self.exhausted = true;
            return Transition::Exhausted;
        }

        self.page += 1;
        match element.value().attr("href").filter(|href| !href.trim().is_empty()) {
            Some(href) => Transition::Next(PageRef::Link(resolve(current_url, href))),
            None => Transition::Next(PageRef::Control),
        }
    }
}

fn resolve(base: &str, href: &str) -> String {
    match Url::parse(base).and_then(|base| base.join(href)) {
        Ok(url) => url.to_string(),
        Err(_) => href.to_owned(),
    }
}

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use headless_chrome::{Browser, LaunchOptions, Tab};
use tracing::{debug, info, warn};

use crate::extract::snapshot::Snapshot;
use crate::scrapers::traits::PageSource;

/// Page source backed by headless Chrome.
///
/// Search results stay in one long-lived tab; every listing detail page gets
/// its own short-lived tab so the result grid keeps its scroll position and
/// pagination state.
pub struct BrowserSource {
    browser: Browser,
    tab: Arc<Tab>,
}

/// Bounded wait for lazily rendered regions; a timeout is strategy failure
/// downstream, not an error here.
const REGION_WAIT: Duration = Duration::from_secs(5);
const SETTLE: Duration = Duration::from_millis(1500);

impl BrowserSource {
    pub fn new() -> Result<Self> {
        info!("Launching headless Chrome...");

        let options = LaunchOptions::default_builder()
            .headless(true)
            .build()
            .context("Failed to build launch options")?;

        let browser = Browser::new(options).context("Failed to launch Chrome browser")?;
        let tab = browser.new_tab().context("Failed to open browser tab")?;

        Ok(Self { browser, tab })
    }

    /// Dismiss consent/tips interstitials ("Got it" and cookie banners).
    /// Best effort; a page without popups is the common case.
    fn dismiss_popups(tab: &Tab) {
        let _ = tab.evaluate(
            r#"
            const gotIt = [...document.querySelectorAll('button')]
                .find((b) => b.innerText.trim() === 'Got it');
            if (gotIt) gotIt.click();
            const consent = document.querySelector('button[id*="accept"], button[data-testid*="accept"]');
            if (consent) consent.click();
            "#,
            false,
        );
        thread::sleep(Duration::from_millis(500));
    }

    fn snapshot_tab(tab: &Tab) -> Result<Snapshot> {
        let result = tab
            .evaluate("document.documentElement.outerHTML", false)
            .context("capture page HTML")?;
        let html = result
            .value
            .as_ref()
            .and_then(|value| value.as_str())
            .unwrap_or_default()
            .to_owned();

        if html.is_empty() {
            warn!("Captured an empty page snapshot");
        } else {
            debug!(bytes = html.len(), "Captured page snapshot");
        }

        Ok(Snapshot::parse_document(&html))
    }

    fn await_region(tab: &Tab, selector: &str) {
        if tab
            .wait_for_element_with_custom_timeout(selector, REGION_WAIT)
            .is_err()
        {
            debug!(selector, "region did not appear within {REGION_WAIT:?}");
        }
    }
}

impl PageSource for BrowserSource {
    fn goto(&self, url: &str) -> Result<Snapshot> {
        debug!(url, "Navigating search tab");
        self.tab
            .navigate_to(url)
            .with_context(|| format!("navigate to {url}"))?;
        self.tab.wait_until_navigated().context("await navigation")?;
        thread::sleep(SETTLE);

        Self::dismiss_popups(&self.tab);
        Self::await_region(&self.tab, "[itemprop='itemListElement']");

        Self::snapshot_tab(&self.tab)
    }

    fn open_detail(&self, url: &str) -> Result<Snapshot> {
        debug!(url, "Opening listing detail tab");
        let tab = self.browser.new_tab().context("open detail tab")?;
        tab.navigate_to(url)
            .with_context(|| format!("navigate to {url}"))?;
        tab.wait_until_navigated().context("await navigation")?;
        thread::sleep(SETTLE);

        Self::dismiss_popups(&tab);

        // Ratings and amenities render lazily near the bottom of the page.
        let _ = tab.evaluate(
            "window.scrollTo(0, document.body.scrollHeight); window.scrollBy(0, -100);",
            false,
        );
        thread::sleep(Duration::from_millis(800));
        Self::await_region(&tab, "div[data-section-id='AMENITIES_DEFAULT']");

        let snapshot = Self::snapshot_tab(&tab);

        if let Err(err) = tab.close(true) {
            debug!(?err, "detail tab close failed");
        }

        snapshot
    }

    fn click_next(&self) -> Result<Snapshot> {
        let next = self
            .tab
            .wait_for_element_with_custom_timeout(
                "a[aria-label='Next'], button[aria-label='Next']",
                REGION_WAIT,
            )
            .context("locate next-page control")?;
        next.click().context("click next-page control")?;
        thread::sleep(SETTLE);

        Self::dismiss_popups(&self.tab);
        Self::await_region(&self.tab, "[itemprop='itemListElement']");

        Self::snapshot_tab(&self.tab)
    }
}

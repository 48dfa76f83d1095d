//! Listing record builder for Airbnb-style search results.
//!
//! One entity flows through three passes: the grid pass reads the cheap
//! summary fields off the result card, the detail pass opens the listing's
//! own page, and the recovery pass asks the semantic classifier about
//! whatever is still unknown. The record is committed to the store after
//! every pass, so a crash mid-run loses at most the in-flight pass.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Context, Result};
use scraper::Selector;
use tracing::{debug, info, warn};
use url::Url;

use crate::extract::cascade::{self, FieldSpec, Strategy};
use crate::extract::snapshot::Snapshot;
use crate::extract::{amenities, normalize};
use crate::models::{
    Amenity, AmenityVector, Confidence, ExtractionOutcome, FieldName, ListingRecord,
    PartialOutcomeSet, Provenance, Scalar, ScalarKind, Source,
};
use crate::scrapers::pagination::{PageRef, PaginationCursor, Transition};
use crate::scrapers::traits::{PageSource, SemanticClassifier};
use crate::store::{IncrementalStore, StoreEntry};

/// The full extraction schema: strategy cascades per field for both
/// navigation depths, plus the selectors that address the grid and the
/// amenity section.
pub struct FieldSchema {
    grid: Vec<FieldSpec>,
    detail: Vec<FieldSpec>,
    grid_item: Selector,
    url_strategies: Vec<Strategy>,
    amenity_section: Selector,
    kinds: BTreeMap<FieldName, ScalarKind>,
    overrides: BTreeSet<FieldName>,
}

impl FieldSchema {
    pub fn new() -> Result<Self> {
        let grid = vec![
            FieldSpec::new(
                FieldName::Name,
                ScalarKind::Text,
                vec![
                    Strategy::structural("div[data-testid='listing-card-title']")?,
                    Strategy::attribute("meta[itemprop='name']", "content")?,
                ],
            ),
            FieldSpec::new(
                FieldName::Stars,
                ScalarKind::Decimal,
                vec![
                    Strategy::structural("span[class*='r1dxllyb']")?,
                    Strategy::pattern(r"([\d.]+)\s*\(\d+\)")?,
                    Strategy::pattern(r"([\d.]+) out of 5")?,
                ],
            ),
            FieldSpec::new(
                FieldName::ReviewCount,
                ScalarKind::Count,
                vec![
                    Strategy::pattern(r"[\d.]+\s*\((\d+)\)")?,
                    Strategy::pattern(r"(?i)(\d+)\s+reviews?")?,
                ],
            ),
            FieldSpec::new(
                FieldName::TotalPrice,
                ScalarKind::Currency,
                vec![
                    Strategy::structural("span._tyxjp1")?,
                    Strategy::structural("div[data-testid='price-availability-row'] span")?,
                    Strategy::pattern(r"\$\s?([\d,]+)\s+total")?,
                ],
            ),
            FieldSpec::new(
                FieldName::NumberOfNights,
                ScalarKind::Count,
                vec![
                    Strategy::pattern(r"(?i)for (\d+) nights?")?,
                    Strategy::pattern(r"(?i)(\d+)\s+nights?")?,
                ],
            ),
            FieldSpec::new(
                FieldName::GuestFavorite,
                ScalarKind::Flag,
                vec![
                    Strategy::structural("span[data-testid='guest-favorite-badge']")?,
                    Strategy::pattern(r"(?i)(guest favou?rite)")?,
                ],
            ),
        ];

        let detail = vec![
            FieldSpec::new(
                FieldName::Name,
                ScalarKind::Text,
                vec![Strategy::structural("h1")?],
            ),
            FieldSpec::new(
                FieldName::GuestLimit,
                ScalarKind::Count,
                vec![
                    Strategy::structural(
                        "div[data-section-id='OVERVIEW_DEFAULT_V2'] ol li:nth-of-type(1)",
                    )?,
                    Strategy::pattern(r"(?i)(\d+)\s+guests?")?,
                ],
            ),
            FieldSpec::new(
                FieldName::Bedrooms,
                ScalarKind::Count,
                vec![
                    Strategy::structural(
                        "div[data-section-id='OVERVIEW_DEFAULT_V2'] ol li:nth-of-type(2)",
                    )?,
                    Strategy::pattern(r"(?i)(\d+)\s+bedrooms?")?,
                ],
            ),
            FieldSpec::new(
                FieldName::Beds,
                ScalarKind::Count,
                vec![
                    Strategy::structural(
                        "div[data-section-id='OVERVIEW_DEFAULT_V2'] ol li:nth-of-type(3)",
                    )?,
                    Strategy::pattern(r"(?i)(\d+)\s+beds?\b")?,
                ],
            ),
            FieldSpec::new(
                FieldName::Bathrooms,
                ScalarKind::Decimal,
                vec![
                    Strategy::structural(
                        "div[data-section-id='OVERVIEW_DEFAULT_V2'] ol li:nth-of-type(4)",
                    )?,
                    Strategy::pattern(r"(?i)([\d.]+)\s+(?:shared |private )?bath")?,
                ],
            ),
            FieldSpec::new(
                FieldName::TotalPrice,
                ScalarKind::Currency,
                vec![
                    Strategy::structural(
                        "div[data-section-id='BOOK_IT_SIDEBAR'] div[data-testid='price-item-total'] span",
                    )?,
                    Strategy::pattern(r"\$\s?([\d,]+)\s+total")?,
                    Strategy::pattern(r"(?i)total(?: before taxes)?\s+\$\s?([\d,]+)")?,
                ],
            ),
            FieldSpec::new(
                FieldName::NumberOfNights,
                ScalarKind::Count,
                vec![
                    Strategy::pattern(r"(?i)for (\d+) nights?")?,
                    Strategy::pattern(r"(?i)(\d+)\s+nights?")?,
                ],
            ),
            FieldSpec::new(
                FieldName::Stars,
                ScalarKind::Decimal,
                vec![
                    Strategy::structural(
                        "div[data-testid='pdp-reviews-highlight-banner-host-rating'] span",
                    )?,
                    Strategy::pattern(r"([\d.]+)\s*·\s*\d+\s+reviews?")?,
                    Strategy::pattern(r"(?i)rated ([\d.]+) out of 5")?,
                ],
            ),
            FieldSpec::new(
                FieldName::ReviewCount,
                ScalarKind::Count,
                vec![Strategy::pattern(r"(?i)(\d+)\s+reviews?")?],
            ),
            FieldSpec::new(
                FieldName::LocationRating,
                ScalarKind::Decimal,
                vec![
                    Strategy::structural(
                        "div[data-section-id='REVIEWS_DEFAULT'] div[aria-label*='Location']",
                    )?,
                    Strategy::pattern(r"(?i)location\s+([\d.]+)")?,
                ],
            ),
            FieldSpec::new(
                FieldName::GuestFavorite,
                ScalarKind::Flag,
                vec![
                    Strategy::structural("div[data-section-id='GUEST_FAVORITE_BANNER']")?,
                    Strategy::pattern(r"(?i)(guest favou?rite)")?,
                ],
            ),
            FieldSpec::new(
                FieldName::HistoricalHouse,
                ScalarKind::Flag,
                vec![Strategy::pattern(
                    r"(?i)(historic(?:al)?\s+(?:home|house|building|property))",
                )?],
            ),
        ];

        let url_strategies = vec![
            Strategy::attribute("meta[itemprop='url']", "content")?,
            Strategy::attribute("a[href*='/rooms/']", "href")?,
            Strategy::attribute("a", "href")?,
        ];

        let mut kinds = BTreeMap::new();
        for spec in grid.iter().chain(detail.iter()) {
            kinds.insert(spec.name, spec.kind);
        }
        kinds.insert(FieldName::PricePerNight, ScalarKind::Currency);

        // Price-per-night is the one revisit-overwritable field: the detail
        // pass knows the exact night count, so its derivation beats the grid
        // estimate. Extend this set to change the policy per field.
        let mut overrides: BTreeSet<FieldName> = grid
            .iter()
            .chain(detail.iter())
            .filter(|spec| spec.allow_override)
            .map(|spec| spec.name)
            .collect();
        overrides.insert(FieldName::PricePerNight);

        Ok(Self {
            grid,
            detail,
            grid_item: compile("div[itemprop='itemListElement']")?,
            url_strategies,
            amenity_section: compile("div[data-section-id='AMENITIES_DEFAULT']")?,
            kinds,
            overrides,
        })
    }

    fn kind_of(&self, field: FieldName) -> Option<ScalarKind> {
        self.kinds.get(&field).copied()
    }

    fn allows_override(&self, field: FieldName) -> bool {
        self.overrides.contains(&field)
    }

    /// Fields the recovery pass may ask the classifier about.
    fn recoverable(&self) -> impl Iterator<Item = FieldName> + '_ {
        self.kinds.keys().copied()
    }
}

fn compile(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|err| anyhow::anyhow!("invalid selector `{css}`: {err:?}"))
}

/// Run every spec's cascade against `snapshot` at the given confidence.
fn collect(schema: &FieldSchema, specs: &[FieldSpec], snapshot: &Snapshot, confidence: Confidence) -> PartialOutcomeSet {
    let mut pass = PartialOutcomeSet::default();
    for spec in specs {
        let outcome = cascade::extract(snapshot, spec, confidence);
        pass.push(spec.name, outcome, schema.allows_override(spec.name));
    }
    pass
}

/// Derive price-per-night from the pass's own total and night count.
fn derive_price_per_night(schema: &FieldSchema, pass: &mut PartialOutcomeSet, confidence: Confidence) {
    let total = match pass.known(FieldName::TotalPrice) {
        Some(Scalar::Currency(total)) => *total,
        _ => return,
    };
    let nights = match pass.known(FieldName::NumberOfNights) {
        Some(Scalar::Count(nights)) => *nights,
        _ => return,
    };
    let Some(per_night) = normalize::price_per_night(total, nights) else {
        return;
    };
    pass.push(
        FieldName::PricePerNight,
        ExtractionOutcome::found(Scalar::Currency(per_night), Provenance::Derived, confidence, 0),
        schema.allows_override(FieldName::PricePerNight),
    );
}

fn canonical_listing_url(raw: &str, base: &str) -> Option<String> {
    let raw = raw.trim();
    let mut url = if raw.starts_with("http://") || raw.starts_with("https://") {
        Url::parse(raw).ok()?
    } else if raw.starts_with("www.") {
        Url::parse(&format!("https://{raw}")).ok()?
    } else {
        Url::parse(base).ok()?.join(raw).ok()?
    };
    url.set_query(None);
    url.set_fragment(None);
    Some(url.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrapeSummary {
    /// Result pages actually processed.
    pub pages: u32,
    /// Grid entities seen across all pages (including ones whose detail
    /// pass failed).
    pub listings: usize,
}

pub struct AirbnbScraper<'a> {
    source: &'a dyn PageSource,
    classifier: &'a dyn SemanticClassifier,
    schema: FieldSchema,
}

impl<'a> AirbnbScraper<'a> {
    pub fn new(source: &'a dyn PageSource, classifier: &'a dyn SemanticClassifier) -> Result<Self> {
        Ok(Self {
            source,
            classifier,
            schema: FieldSchema::new()?,
        })
    }

    /// Walk result pages until the cursor is exhausted or `max_pages` is
    /// reached, fully processing every listing on a page before asking for
    /// the next one.
    pub async fn run(
        &self,
        store: &mut IncrementalStore,
        search_url: &str,
        max_pages: Option<u32>,
    ) -> Result<ScrapeSummary> {
        let mut cursor = PaginationCursor::new()?;
        let mut snapshot = self.source.goto(search_url).context("open search page")?;
        let mut current_url = search_url.to_owned();
        let mut pages = 0u32;
        let mut listings = 0usize;

        loop {
            info!(page = cursor.page(), "Processing result page");
            listings += self.process_page(store, &snapshot, &current_url).await?;
            pages += 1;

            if let Some(cap) = max_pages {
                if pages >= cap {
                    info!(pages, cap, "Stopping at caller-supplied page cap");
                    break;
                }
            }

            match cursor.advance(&snapshot, &current_url) {
                Transition::Exhausted => {
                    info!(pages, "No further result pages");
                    break;
                }
                Transition::Next(PageRef::Link(url)) => match self.source.goto(&url) {
                    Ok(next) => {
                        snapshot = next;
                        current_url = url;
                    }
                    Err(err) => {
                        warn!(url = %url, error = %format!("{err:#}"), "Next page unreachable; treating as exhausted");
                        break;
                    }
                },
                Transition::Next(PageRef::Control) => match self.source.click_next() {
                    Ok(next) => snapshot = next,
                    Err(err) => {
                        warn!(error = %format!("{err:#}"), "Next control failed; treating as exhausted");
                        break;
                    }
                },
            }
        }

        Ok(ScrapeSummary { pages, listings })
    }

    /// Process every grid item on one result page. Entity failures are
    /// contained here; only store errors propagate.
    async fn process_page(
        &self,
        store: &mut IncrementalStore,
        page: &Snapshot,
        page_url: &str,
    ) -> Result<usize> {
        let cards = page.regions(&self.schema.grid_item);
        info!(count = cards.len(), "Found listings on page");

        let mut processed = 0usize;
        for (index, card) in cards.iter().enumerate() {
            let Some(url) = self.listing_url(card, page_url) else {
                warn!(index, "Skipping grid item with no discoverable listing URL");
                continue;
            };
            processed += 1;
            self.process_listing(store, card, &url).await?;
        }

        Ok(processed)
    }

    async fn process_listing(
        &self,
        store: &mut IncrementalStore,
        card: &Snapshot,
        url: &str,
    ) -> Result<()> {
        info!(listing = %url, "Processing listing");

        // Grid pass: always the first write for a URL.
        let mut record = ListingRecord::new(url.to_owned(), Source::Airbnb);
        let mut grid = collect(&self.schema, &self.schema.grid, card, Confidence::GridSummary);
        derive_price_per_night(&self.schema, &mut grid, Confidence::GridSummary);
        record.merge(&grid);
        store
            .upsert(StoreEntry::from_record(&record))
            .context("commit grid pass")?;

        // Detail pass: an unreachable page keeps the grid record and moves on.
        let detail = match self.source.open_detail(url) {
            Ok(detail) => detail,
            Err(err) => {
                warn!(listing = %url, error = %format!("{err:#}"), "Detail page unreachable; keeping grid-pass record");
                return Ok(());
            }
        };

        let mut pass = collect(&self.schema, &self.schema.detail, &detail, Confidence::DetailPage);
        derive_price_per_night(&self.schema, &mut pass, Confidence::DetailPage);
        pass.amenities = Some(self.classify_amenities(&detail).await);
        record.merge(&pass);
        store
            .upsert(StoreEntry::from_record(&record))
            .context("commit detail pass")?;

        // Recovery pass, only when something is still missing.
        if let Some(pass) = self.recovery_pass(&detail, &record).await {
            record.merge(&pass);
            store
                .upsert(StoreEntry::from_record(&record))
                .context("commit recovery pass")?;
        }

        Ok(())
    }

    fn listing_url(&self, card: &Snapshot, page_url: &str) -> Option<String> {
        let raw = self
            .schema
            .url_strategies
            .iter()
            .find_map(|strategy| strategy.locate(card))?;
        canonical_listing_url(&raw, page_url)
    }

    /// Keyword pass first; escalate to the semantic classifier when the
    /// amenity text is missing or the keywords found nothing at all.
    async fn classify_amenities(&self, detail: &Snapshot) -> AmenityVector {
        let section = detail.select_text(&self.schema.amenity_section);
        let keyword = section.as_deref().map(amenities::classify_keywords);

        if let Some(vector) = &keyword {
            if vector.any_positive() {
                return vector.clone();
            }
        }

        let text = section.as_deref().unwrap_or_else(|| detail.text());
        match self.classifier.classify_amenities(text, &Amenity::ALL).await {
            Ok(reply) => {
                let mut vector = keyword.unwrap_or_default();
                for (amenity, present) in reply {
                    vector.set(amenity, present);
                }
                vector
            }
            Err(err) => {
                warn!(error = %format!("{err:#}"), "Amenity classifier failed; recording an all-false vector");
                AmenityVector::all_false_with_note(format!("classifier failure: {err:#}"))
            }
        }
    }

    /// Ask the classifier about still-unknown fields and normalize whatever
    /// it returns. `None` when nothing is missing or nothing came back.
    async fn recovery_pass(
        &self,
        detail: &Snapshot,
        record: &ListingRecord,
    ) -> Option<PartialOutcomeSet> {
        let missing: Vec<FieldName> = self
            .schema
            .recoverable()
            .filter(|field| record.is_unknown(*field))
            .collect();
        if missing.is_empty() {
            return None;
        }

        debug!(fields = ?missing, "Attempting recovery for unknown fields");
        let reply = match self.classifier.extract_fields(detail.text(), &missing).await {
            Ok(reply) => reply,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "Field recovery failed; keeping unknowns");
                return None;
            }
        };
        if reply.is_empty() {
            return None;
        }

        let mut pass = PartialOutcomeSet::default();
        for field in missing {
            let Some(raw) = reply.get(&field) else {
                continue;
            };
            let Some(kind) = self.schema.kind_of(field) else {
                continue;
            };
            let Some(value) = normalize::normalize(raw, kind) else {
                debug!(?field, raw = %raw, "recovered text failed normalization");
                continue;
            };
            pass.push(
                field,
                ExtractionOutcome::found(value, Provenance::Classifier, Confidence::Recovered, 0),
                false,
            );
        }
        if pass.outcomes.is_empty() {
            None
        } else {
            Some(pass)
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const CARD: &str = r#"
        <div itemprop="itemListElement">
          <meta itemprop="name" content="Lakeside cottage" />
          <meta itemprop="url" content="www.airbnb.com/rooms/101?check_in=2025-07-01" />
          <div data-testid="listing-card-title">Lakeside cottage with dock</div>
          <span class="r1dxllyb something">4.82 (57)</span>
          <div data-testid="price-availability-row"><span>$2,400 total</span><span>for 3 nights</span></div>
          <span data-testid="guest-favorite-badge">Guest favourite</span>
        </div>
    "#;

    #[test]
    fn grid_pass_reads_the_summary_fields() {
        let schema = FieldSchema::new().unwrap();
        let card = Snapshot::parse_fragment(CARD);

        let mut pass = collect(&schema, &schema.grid, &card, Confidence::GridSummary);
        derive_price_per_night(&schema, &mut pass, Confidence::GridSummary);

        assert_eq!(
            pass.known(FieldName::Name),
            Some(&Scalar::Text("Lakeside cottage with dock".to_owned()))
        );
        assert_eq!(pass.known(FieldName::Stars), Some(&Scalar::Decimal(4.82)));
        assert_eq!(pass.known(FieldName::ReviewCount), Some(&Scalar::Count(57)));
        assert_eq!(
            pass.known(FieldName::TotalPrice),
            Some(&Scalar::Currency(2400))
        );
        assert_eq!(
            pass.known(FieldName::NumberOfNights),
            Some(&Scalar::Count(3))
        );
        assert_eq!(
            pass.known(FieldName::GuestFavorite),
            Some(&Scalar::Flag(true))
        );
        // 2400 / 3, derived at grid confidence.
        assert_eq!(
            pass.known(FieldName::PricePerNight),
            Some(&Scalar::Currency(800))
        );
    }

    #[test]
    fn canonical_urls_are_absolute_and_stripped() {
        let base = "https://www.airbnb.com/s/tahoe/homes?page=2";
        assert_eq!(
            canonical_listing_url("www.airbnb.com/rooms/101?check_in=2025-07-01", base),
            Some("https://www.airbnb.com/rooms/101".to_owned())
        );
        assert_eq!(
            canonical_listing_url("/rooms/202#photos", base),
            Some("https://www.airbnb.com/rooms/202".to_owned())
        );
        assert_eq!(
            canonical_listing_url("https://www.airbnb.com/rooms/303", base),
            Some("https://www.airbnb.com/rooms/303".to_owned())
        );
    }

    #[test]
    fn price_per_night_is_the_only_overridable_field() {
        let schema = FieldSchema::new().unwrap();
        assert!(schema.allows_override(FieldName::PricePerNight));
        assert!(!schema.allows_override(FieldName::Stars));
        assert!(!schema.allows_override(FieldName::TotalPrice));
    }
}

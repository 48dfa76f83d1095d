//! End-to-end pipeline test: two result pages of three listings each flow
//! through the grid, detail and recovery passes into both store forms.

use std::collections::{BTreeMap, HashMap, HashSet};

use anyhow::Result;
use async_trait::async_trait;
use pretty_assertions::assert_eq;

use stay_scout::extract::snapshot::Snapshot;
use stay_scout::models::{Amenity, FieldName};
use stay_scout::scrapers::traits::{PageSource, SemanticClassifier};
use stay_scout::scrapers::AirbnbScraper;
use stay_scout::store::{IncrementalStore, StoreEntry, COLUMNS};

const PAGE_ONE_URL: &str = "https://www.stays.example/s/tahoe/homes";
const PAGE_TWO_URL: &str = "https://www.stays.example/s/tahoe/homes?page=2";

fn listing_url(id: u32) -> String {
    format!("https://www.stays.example/rooms/{id}")
}

fn card(id: u32, name: &str, total: &str, extra: &str) -> String {
    format!(
        r#"
        <div itemprop="itemListElement">
          <div data-testid="listing-card-title">{name}</div>
          <meta itemprop="url" content="www.stays.example/rooms/{id}?ref=grid" />
          <span class="r1dxllyb">4.82 (57)</span>
          <div data-testid="price-availability-row"><span>{total} total</span><span>for 3 nights</span></div>
          {extra}
        </div>"#
    )
}

fn result_page(cards: &[String], next: &str) -> String {
    format!(
        "<html><body><main>{}</main><nav>{next}</nav></body></html>",
        cards.join("\n")
    )
}

fn detail_page(name: &str, total: &str, location: &str, amenity_text: &str, note: &str) -> String {
    format!(
        r#"<html><body>
          <h1>{name}</h1>
          <div data-section-id="OVERVIEW_DEFAULT_V2"><ol>
            <li>8 guests</li><li>4 bedrooms</li><li>6 beds</li><li>3 baths</li>
          </ol></div>
          <div data-section-id="BOOK_IT_SIDEBAR">
            <div data-testid="price-item-total"><span>{total} total</span></div>
            <span>for 3 nights</span>
          </div>
          <div data-testid="pdp-reviews-highlight-banner-host-rating"><span>4.9</span></div>
          <p>57 reviews</p>
          {location}
          <div data-section-id="AMENITIES_DEFAULT"><p>{amenity_text}</p></div>
          <p>{note}</p>
        </body></html>"#
    )
}

struct FixtureSource {
    pages: HashMap<String, String>,
    details: HashMap<String, String>,
}

impl FixtureSource {
    fn new() -> Self {
        let favorite_badge =
            r#"<span data-testid="guest-favorite-badge">Guest favourite</span>"#;
        let page_one = result_page(
            &[
                card(1, "Lakeside cottage", "$2,700", favorite_badge),
                card(2, "Downtown loft", "$1,500", ""),
                card(3, "Forest cabin", "$1,800", ""),
            ],
            r#"<a aria-label="Next" href="?page=2">›</a>"#,
        );
        let page_two = result_page(
            &[
                card(4, "Old mill house", "$2,100", ""),
                card(5, "Beach bungalow", "$3,000", ""),
                card(6, "Mountain chalet", "$2,400", ""),
            ],
            r#"<a aria-label="Next" aria-disabled="true" href="?page=3">›</a>"#,
        );

        let mut pages = HashMap::new();
        pages.insert(PAGE_ONE_URL.to_owned(), page_one);
        pages.insert(PAGE_TWO_URL.to_owned(), page_two);

        let mut details = HashMap::new();
        details.insert(
            listing_url(1),
            detail_page(
                "Lakeside cottage",
                "$2,400",
                "<p>Location 4.8</p>",
                "Hot tub on the patio, heated swimming pool, 65-inch TV, washer and dryer",
                "",
            ),
        );
        details.insert(
            listing_url(2),
            detail_page(
                "Downtown loft",
                "$1,500",
                "<p>Location 4.6</p>",
                "Everything you need for a comfortable stay",
                "",
            ),
        );
        // Listing 3 omits its location rating; the recovery pass fills it.
        details.insert(
            listing_url(3),
            detail_page(
                "Forest cabin",
                "$1,800",
                "",
                "Pool table, billiards room",
                "",
            ),
        );
        details.insert(
            listing_url(4),
            detail_page(
                "Old mill house",
                "$2,100",
                "<p>Location 4.9</p>",
                "Large yard with fire pit",
                "A historical house from 1900",
            ),
        );
        details.insert(
            listing_url(5),
            detail_page(
                "Beach bungalow",
                "$3,000",
                "<p>Location 5.0</p>",
                "Balcony, home gym, washing machine",
                "",
            ),
        );
        // Listing 6 has no detail page; its grid record must survive alone.

        Self { pages, details }
    }
}

impl PageSource for FixtureSource {
    fn goto(&self, url: &str) -> Result<Snapshot> {
        let html = self
            .pages
            .get(url)
            .ok_or_else(|| anyhow::anyhow!("unexpected page url: {url}"))?;
        Ok(Snapshot::parse_document(html))
    }

    fn open_detail(&self, url: &str) -> Result<Snapshot> {
        let html = self
            .details
            .get(url)
            .ok_or_else(|| anyhow::anyhow!("detail unavailable: {url}"))?;
        Ok(Snapshot::parse_document(html))
    }

    fn click_next(&self) -> Result<Snapshot> {
        anyhow::bail!("fixture pagination is link-based")
    }
}

/// Deterministic stand-in for the semantic classifier: recognizes a TV in
/// amenity text and recovers a location rating when asked about it.
struct StubClassifier;

#[async_trait]
impl SemanticClassifier for StubClassifier {
    async fn classify_amenities(
        &self,
        _text: &str,
        _vocabulary: &[Amenity],
    ) -> Result<BTreeMap<Amenity, bool>> {
        let mut determined = BTreeMap::new();
        determined.insert(Amenity::Tv, true);
        Ok(determined)
    }

    async fn extract_fields(
        &self,
        _text: &str,
        fields: &[FieldName],
    ) -> Result<BTreeMap<FieldName, String>> {
        let mut determined = BTreeMap::new();
        if fields.contains(&FieldName::LocationRating) {
            determined.insert(FieldName::LocationRating, "4.7".to_owned());
        }
        Ok(determined)
    }
}

fn entry<'a>(store: &'a IncrementalStore, id: u32) -> &'a StoreEntry {
    let url = listing_url(id);
    store
        .entries()
        .iter()
        .find(|entry| entry.link == url)
        .unwrap_or_else(|| panic!("no store entry for {url}"))
}

#[tokio::test]
async fn two_page_search_fills_both_store_forms() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut store = IncrementalStore::open(dir.path(), "pipeline")?;
    let source = FixtureSource::new();
    let classifier = StubClassifier;
    let scraper = AirbnbScraper::new(&source, &classifier)?;

    let summary = scraper.run(&mut store, PAGE_ONE_URL, None).await?;

    assert_eq!(summary.pages, 2);
    assert_eq!(summary.listings, 6);
    assert_eq!(store.len(), 6);

    // Every listing has exactly one row, keyed by canonical URL.
    let links: HashSet<&str> = store.entries().iter().map(|e| e.link.as_str()).collect();
    assert_eq!(links.len(), 6);
    for id in 1..=6 {
        assert!(links.contains(listing_url(id).as_str()));
    }

    // Row form and document form agree after the full upsert sequence.
    let raw_csv = std::fs::read_to_string(store.csv_path())?;
    let mut reader = csv::Reader::from_reader(raw_csv.as_bytes());
    assert_eq!(
        reader.headers()?.iter().collect::<Vec<_>>(),
        COLUMNS.to_vec()
    );
    assert_eq!(reader.records().count(), 6);

    let raw_json = std::fs::read_to_string(store.json_path())?;
    let documents: Vec<StoreEntry> = serde_json::from_str(&raw_json)?;
    assert_eq!(documents.len(), 6);

    Ok(())
}

#[tokio::test]
async fn passes_layer_into_the_expected_columns() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut store = IncrementalStore::open(dir.path(), "columns")?;
    let source = FixtureSource::new();
    let classifier = StubClassifier;
    let scraper = AirbnbScraper::new(&source, &classifier)?;

    scraper.run(&mut store, PAGE_ONE_URL, None).await?;

    // Detail pass recomputed price-per-night ($2,400 / 3) and overwrote the
    // grid estimate ($2,700 / 3); nothing else from the grid was displaced.
    let cottage = entry(&store, 1);
    assert_eq!(cottage.price_per_night, "800");
    assert_eq!(cottage.stars, "4.82");
    assert_eq!(cottage.name, "Lakeside cottage");
    assert_eq!(cottage.bedrooms, "4");
    assert_eq!(cottage.beds, "6");
    assert_eq!(cottage.bathrooms, "3");
    assert_eq!(cottage.guest_limit, "8");
    assert_eq!(cottage.location_rating, "4.8");
    assert_eq!(cottage.guest_favorite, "TRUE");
    assert_eq!(cottage.source, "Airbnb");
    // Keyword classification from the amenity section.
    assert_eq!(cottage.pool, "TRUE");
    assert_eq!(cottage.jacuzzi, "TRUE");
    assert_eq!(cottage.tv, "TRUE");
    assert_eq!(cottage.laundry, "TRUE");
    assert_eq!(cottage.balcony, "TRUE");
    assert_eq!(cottage.billiards_table, "FALSE");

    // Keyword matching was inconclusive, so the semantic classifier decided
    // the TV; everything it omitted stays at the keyword pass's false.
    let loft = entry(&store, 2);
    assert_eq!(loft.tv, "TRUE");
    assert_eq!(loft.pool, "FALSE");
    assert_eq!(loft.guest_favorite, "");

    // A pool table is not a pool; the missing location rating was recovered.
    let cabin = entry(&store, 3);
    assert_eq!(cabin.pool, "FALSE");
    assert_eq!(cabin.billiards_table, "TRUE");
    assert_eq!(cabin.location_rating, "4.7");

    let mill = entry(&store, 4);
    assert_eq!(mill.historical_house, "TRUE");
    assert_eq!(mill.large_yard, "TRUE");

    let bungalow = entry(&store, 5);
    assert_eq!(bungalow.home_gym, "TRUE");
    assert_eq!(bungalow.balcony, "TRUE");
    assert_eq!(bungalow.laundry, "TRUE");

    // Listing 6 has no reachable detail page: the grid record stands, with
    // detail-only columns still unevaluated.
    let chalet = entry(&store, 6);
    assert_eq!(chalet.name, "Mountain chalet");
    assert_eq!(chalet.price_per_night, "800");
    assert_eq!(chalet.bedrooms, "");
    assert_eq!(chalet.guest_limit, "");
    assert_eq!(chalet.pool, "");

    Ok(())
}

#[tokio::test]
async fn page_cap_stops_the_walk_early() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut store = IncrementalStore::open(dir.path(), "capped")?;
    let source = FixtureSource::new();
    let classifier = StubClassifier;
    let scraper = AirbnbScraper::new(&source, &classifier)?;

    let summary = scraper.run(&mut store, PAGE_ONE_URL, Some(1)).await?;

    assert_eq!(summary.pages, 1);
    assert_eq!(store.len(), 3);
    Ok(())
}

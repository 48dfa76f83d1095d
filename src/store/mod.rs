//! Dual-format incremental persistence.
//!
//! One logical query owns one JSON document file and one CSV row file. Every
//! upsert merges into the in-memory collection and rewrites both files in
//! full, so the store always holds exactly one row per listing URL no matter
//! how many passes revisit it.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::models::{Amenity, FieldName, ListingRecord, Scalar};

/// Fixed column order of the row-oriented form.
pub const COLUMNS: [&str; 21] = [
    "Link",
    "Name",
    "Bedrooms",
    "Beds",
    "Bathrooms",
    "Guest Limit",
    "Stars",
    "Price/Night",
    "Location Rating",
    "Source",
    "Amenities",
    "TV",
    "Pool",
    "Jacuzzi",
    "Historical House",
    "Billiards Table",
    "Large Yard",
    "Balcony",
    "Laundry",
    "Home Gym",
    "Guest Favorite Status",
];

/// Flattened, externally persisted form of a listing record.
///
/// Every column is a string. Boolean columns hold "TRUE", "FALSE" or the
/// empty string — empty meaning "not yet evaluated", which is distinct from
/// FALSE — so the row form stays legible to spreadsheet tooling.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreEntry {
    pub link: String,
    pub name: String,
    pub bedrooms: String,
    pub beds: String,
    pub bathrooms: String,
    pub guest_limit: String,
    pub stars: String,
    pub price_per_night: String,
    pub location_rating: String,
    pub source: String,
    /// Reserved column, always blank.
    pub amenities: String,
    pub tv: String,
    pub pool: String,
    pub jacuzzi: String,
    pub historical_house: String,
    pub billiards_table: String,
    pub large_yard: String,
    pub balcony: String,
    pub laundry: String,
    pub home_gym: String,
    pub guest_favorite: String,
}

impl StoreEntry {
    pub fn from_record(record: &ListingRecord) -> Self {
        let field = |name: FieldName| {
            record
                .known_value(name)
                .map(Scalar::render)
                .unwrap_or_default()
        };
        let amenity = |amenity: Amenity| tri_state(record.amenities.get(amenity));

        Self {
            link: record.url.clone(),
            name: field(FieldName::Name),
            bedrooms: field(FieldName::Bedrooms),
            beds: field(FieldName::Beds),
            bathrooms: field(FieldName::Bathrooms),
            guest_limit: field(FieldName::GuestLimit),
            stars: field(FieldName::Stars),
            price_per_night: field(FieldName::PricePerNight),
            location_rating: field(FieldName::LocationRating),
            source: record.source.label().to_owned(),
            amenities: String::new(),
            tv: amenity(Amenity::Tv),
            pool: amenity(Amenity::Pool),
            jacuzzi: amenity(Amenity::Jacuzzi),
            historical_house: field(FieldName::HistoricalHouse),
            billiards_table: amenity(Amenity::BilliardsTable),
            large_yard: amenity(Amenity::LargeYard),
            balcony: amenity(Amenity::Balcony),
            laundry: amenity(Amenity::Laundry),
            home_gym: amenity(Amenity::HomeGym),
            guest_favorite: field(FieldName::GuestFavorite),
        }
    }

    /// Per-column merge: a non-empty incoming value wins, an empty one
    /// preserves what the store already has.
    fn merge_from(&mut self, newer: &StoreEntry) {
        fn keep(current: &mut String, incoming: &str) {
            if !incoming.is_empty() {
                *current = incoming.to_owned();
            }
        }
        keep(&mut self.name, &newer.name);
        keep(&mut self.bedrooms, &newer.bedrooms);
        keep(&mut self.beds, &newer.beds);
        keep(&mut self.bathrooms, &newer.bathrooms);
        keep(&mut self.guest_limit, &newer.guest_limit);
        keep(&mut self.stars, &newer.stars);
        keep(&mut self.price_per_night, &newer.price_per_night);
        keep(&mut self.location_rating, &newer.location_rating);
        keep(&mut self.source, &newer.source);
        keep(&mut self.tv, &newer.tv);
        keep(&mut self.pool, &newer.pool);
        keep(&mut self.jacuzzi, &newer.jacuzzi);
        keep(&mut self.historical_house, &newer.historical_house);
        keep(&mut self.billiards_table, &newer.billiards_table);
        keep(&mut self.large_yard, &newer.large_yard);
        keep(&mut self.balcony, &newer.balcony);
        keep(&mut self.laundry, &newer.laundry);
        keep(&mut self.home_gym, &newer.home_gym);
        keep(&mut self.guest_favorite, &newer.guest_favorite);
    }

    fn row(&self) -> [&str; 21] {
        [
            &self.link,
            &self.name,
            &self.bedrooms,
            &self.beds,
            &self.bathrooms,
            &self.guest_limit,
            &self.stars,
            &self.price_per_night,
            &self.location_rating,
            &self.source,
            &self.amenities,
            &self.tv,
            &self.pool,
            &self.jacuzzi,
            &self.historical_house,
            &self.billiards_table,
            &self.large_yard,
            &self.balcony,
            &self.laundry,
            &self.home_gym,
            &self.guest_favorite,
        ]
    }
}

fn tri_state(value: Option<bool>) -> String {
    match value {
        Some(true) => "TRUE".to_owned(),
        Some(false) => "FALSE".to_owned(),
        None => String::new(),
    }
}

/// Durable store for one logical query, kept in two always-consistent forms.
pub struct IncrementalStore {
    json_path: PathBuf,
    csv_path: PathBuf,
    entries: Vec<StoreEntry>,
}

impl IncrementalStore {
    /// Open the store for `key`, resuming from an existing document file
    /// when one is present.
    pub fn open(dir: &Path, key: &str) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("create store dir: {}", dir.display()))?;

        let json_path = dir.join(format!("{key}.json"));
        let csv_path = dir.join(format!("{key}.csv"));

        let entries: Vec<StoreEntry> = if json_path.exists() {
            let raw = fs::read_to_string(&json_path)
                .with_context(|| format!("read store json: {}", json_path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("parse store json: {}", json_path.display()))?
        } else {
            Vec::new()
        };

        if !entries.is_empty() {
            info!(count = entries.len(), key, "Resuming existing store");
        }

        Ok(Self {
            json_path,
            csv_path,
            entries,
        })
    }

    /// Insert or update by Link, then rewrite both forms in full. Exactly
    /// one row per key at all times.
    pub fn upsert(&mut self, entry: StoreEntry) -> Result<()> {
        match self
            .entries
            .iter_mut()
            .find(|existing| existing.link == entry.link)
        {
            Some(existing) => {
                debug!(link = %entry.link, "Updating store entry");
                existing.merge_from(&entry);
            }
            None => {
                debug!(link = %entry.link, "Inserting store entry");
                self.entries.push(entry);
            }
        }
        self.rewrite()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[StoreEntry] {
        &self.entries
    }

    pub fn json_path(&self) -> &Path {
        &self.json_path
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }

    /// Document form first, row form second, both from the same in-memory
    /// collection. A crash between the two leaves the row form stale, never
    /// corrupt.
    fn rewrite(&self) -> Result<()> {
        let json =
            serde_json::to_string_pretty(&self.entries).context("serialize store entries")?;
        fs::write(&self.json_path, json)
            .with_context(|| format!("write store json: {}", self.json_path.display()))?;

        let mut writer = csv::Writer::from_path(&self.csv_path)
            .with_context(|| format!("open store csv: {}", self.csv_path.display()))?;
        writer.write_record(COLUMNS).context("write csv header")?;
        for entry in &self.entries {
            writer.write_record(entry.row()).context("write csv row")?;
        }
        writer.flush().context("flush store csv")?;

        Ok(())
    }
}

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Source of the listing
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Source {
    Airbnb,
}

impl Source {
    pub fn label(&self) -> &'static str {
        match self {
            Source::Airbnb => "Airbnb",
        }
    }
}

/// Target scalar kind of a schema field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalarKind {
    Count,
    Decimal,
    Currency,
    Flag,
    Text,
}

/// A normalized scalar value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    Count(u32),
    Decimal(f64),
    /// Minor-agnostic amount; the source currency symbol is discarded.
    Currency(i64),
    Flag(bool),
    Text(String),
}

impl Scalar {
    /// Column rendering: flags become "TRUE"/"FALSE" so the row form stays
    /// legible to spreadsheet tooling.
    pub fn render(&self) -> String {
        match self {
            Scalar::Count(n) => n.to_string(),
            Scalar::Decimal(d) => d.to_string(),
            Scalar::Currency(c) => c.to_string(),
            Scalar::Flag(true) => "TRUE".to_owned(),
            Scalar::Flag(false) => "FALSE".to_owned(),
            Scalar::Text(t) => t.clone(),
        }
    }
}

/// Names of the scalar extraction schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FieldName {
    Name,
    GuestLimit,
    Bedrooms,
    Beds,
    Bathrooms,
    Stars,
    ReviewCount,
    TotalPrice,
    NumberOfNights,
    PricePerNight,
    LocationRating,
    GuestFavorite,
    HistoricalHouse,
}

impl FieldName {
    /// Human-readable label, also used when talking to the semantic classifier.
    pub fn label(&self) -> &'static str {
        match self {
            FieldName::Name => "Name",
            FieldName::GuestLimit => "Guest Limit",
            FieldName::Bedrooms => "Bedrooms",
            FieldName::Beds => "Beds",
            FieldName::Bathrooms => "Bathrooms",
            FieldName::Stars => "Stars",
            FieldName::ReviewCount => "Review Count",
            FieldName::TotalPrice => "Total Price",
            FieldName::NumberOfNights => "Number of Nights",
            FieldName::PricePerNight => "Price/Night",
            FieldName::LocationRating => "Location Rating",
            FieldName::GuestFavorite => "Guest Favorite Status",
            FieldName::HistoricalHouse => "Historical House",
        }
    }
}

/// Which pass produced a value. The derived ordering is the overwrite
/// lattice: recovered values rank lowest so the recovery pass can only ever
/// fill holes, never replace an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Confidence {
    Recovered,
    GridSummary,
    DetailPage,
}

/// What produced a known value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Provenance {
    /// Index into the field's strategy cascade.
    Strategy(usize),
    /// Computed from other fields (price-per-night).
    Derived,
    /// Supplied by the semantic classifier.
    Classifier,
}

/// Result of one extraction attempt for one field.
///
/// Invariant: a known value always carries the provenance that produced it.
/// The constructors are the only way to build one, so the invariant holds by
/// construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionOutcome {
    value: Option<Scalar>,
    provenance: Option<Provenance>,
    confidence: Confidence,
    attempts: usize,
}

impl ExtractionOutcome {
    pub fn found(
        value: Scalar,
        provenance: Provenance,
        confidence: Confidence,
        attempts: usize,
    ) -> Self {
        Self {
            value: Some(value),
            provenance: Some(provenance),
            confidence,
            attempts,
        }
    }

    pub fn unknown(confidence: Confidence, attempts: usize) -> Self {
        Self {
            value: None,
            provenance: None,
            confidence,
            attempts,
        }
    }

    pub fn is_known(&self) -> bool {
        self.value.is_some()
    }

    pub fn value(&self) -> Option<&Scalar> {
        self.value.as_ref()
    }

    pub fn provenance(&self) -> Option<Provenance> {
        self.provenance
    }

    pub fn confidence(&self) -> Confidence {
        self.confidence
    }

    /// Number of cascade strategies consumed before this outcome settled.
    pub fn attempts(&self) -> usize {
        self.attempts
    }
}

/// Fixed amenity vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Amenity {
    Tv,
    Pool,
    Jacuzzi,
    BilliardsTable,
    LargeYard,
    Balcony,
    Laundry,
    HomeGym,
}

impl Amenity {
    pub const ALL: [Amenity; 8] = [
        Amenity::Tv,
        Amenity::Pool,
        Amenity::Jacuzzi,
        Amenity::BilliardsTable,
        Amenity::LargeYard,
        Amenity::Balcony,
        Amenity::Laundry,
        Amenity::HomeGym,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Amenity::Tv => "TV",
            Amenity::Pool => "Pool",
            Amenity::Jacuzzi => "Jacuzzi",
            Amenity::BilliardsTable => "Billiards Table",
            Amenity::LargeYard => "Large Yard",
            Amenity::Balcony => "Balcony",
            Amenity::Laundry => "Laundry",
            Amenity::HomeGym => "Home Gym",
        }
    }
}

/// Tri-state amenity vector: an absent entry means "not yet evaluated",
/// which is distinct from an evaluated `false`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AmenityVector {
    values: BTreeMap<Amenity, bool>,
    /// Why the vector degraded to all-false, when it did.
    pub note: Option<String>,
}

impl AmenityVector {
    pub fn get(&self, amenity: Amenity) -> Option<bool> {
        self.values.get(&amenity).copied()
    }

    pub fn set(&mut self, amenity: Amenity, present: bool) {
        self.values.insert(amenity, present);
    }

    pub fn all_false_with_note(note: String) -> Self {
        let mut vector = Self::default();
        for amenity in Amenity::ALL {
            vector.set(amenity, false);
        }
        vector.note = Some(note);
        vector
    }

    pub fn is_evaluated(&self) -> bool {
        !self.values.is_empty()
    }

    pub fn any_positive(&self) -> bool {
        self.values.values().any(|present| *present)
    }

    /// Fill-only-unknown merge; an already evaluated amenity keeps its value.
    pub fn merge_from(&mut self, other: &AmenityVector) {
        for (amenity, present) in &other.values {
            self.values.entry(*amenity).or_insert(*present);
        }
        if self.note.is_none() {
            self.note = other.note.clone();
        }
    }
}

/// One field outcome produced by a pass, plus whether a higher-confidence
/// revisit of this field may overwrite an existing value.
#[derive(Debug, Clone)]
pub struct PassOutcome {
    pub field: FieldName,
    pub outcome: ExtractionOutcome,
    pub allow_override: bool,
}

/// Everything one pass learned about one entity, before merging.
#[derive(Debug, Clone, Default)]
pub struct PartialOutcomeSet {
    pub outcomes: Vec<PassOutcome>,
    pub amenities: Option<AmenityVector>,
}

impl PartialOutcomeSet {
    pub fn push(&mut self, field: FieldName, outcome: ExtractionOutcome, allow_override: bool) {
        self.outcomes.push(PassOutcome {
            field,
            outcome,
            allow_override,
        });
    }

    /// Known value this pass produced for `field`, if any.
    pub fn known(&self, field: FieldName) -> Option<&Scalar> {
        self.outcomes
            .iter()
            .filter(|pass| pass.field == field)
            .find_map(|pass| pass.outcome.value())
    }
}

/// One listing, keyed by canonical URL, built up across passes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingRecord {
    pub url: String,
    pub source: Source,
    pub fields: BTreeMap<FieldName, ExtractionOutcome>,
    pub amenities: AmenityVector,
    pub first_seen_at: DateTime<Utc>,
}

impl ListingRecord {
    pub fn new(url: String, source: Source) -> Self {
        Self {
            url,
            source,
            fields: BTreeMap::new(),
            amenities: AmenityVector::default(),
            first_seen_at: Utc::now(),
        }
    }

    /// Merge one pass into the record.
    ///
    /// A known value is never replaced by unknown. An existing known value
    /// is replaced only when the incoming outcome is known, the field allows
    /// override, and the incoming confidence is strictly higher.
    pub fn merge(&mut self, pass: &PartialOutcomeSet) {
        for item in &pass.outcomes {
            if !item.outcome.is_known() {
                // Keep the record schema-complete: an unknown outcome is
                // recorded once so the audit trail shows the field was tried.
                self.fields
                    .entry(item.field)
                    .or_insert_with(|| item.outcome.clone());
                continue;
            }
            match self.fields.get(&item.field) {
                Some(existing) if existing.is_known() => {
                    if item.allow_override
                        && item.outcome.confidence() > existing.confidence()
                    {
                        self.fields.insert(item.field, item.outcome.clone());
                    }
                }
                _ => {
                    self.fields.insert(item.field, item.outcome.clone());
                }
            }
        }
        if let Some(amenities) = &pass.amenities {
            self.amenities.merge_from(amenities);
        }
    }

    pub fn known_value(&self, field: FieldName) -> Option<&Scalar> {
        self.fields.get(&field).and_then(|outcome| outcome.value())
    }

    pub fn is_unknown(&self, field: FieldName) -> bool {
        self.known_value(field).is_none()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn known(value: Scalar, confidence: Confidence) -> ExtractionOutcome {
        ExtractionOutcome::found(value, Provenance::Strategy(0), confidence, 1)
    }

    fn grid_pass() -> PartialOutcomeSet {
        let mut pass = PartialOutcomeSet::default();
        pass.push(
            FieldName::Stars,
            known(Scalar::Decimal(4.8), Confidence::GridSummary),
            false,
        );
        pass.push(
            FieldName::PricePerNight,
            known(Scalar::Currency(900), Confidence::GridSummary),
            true,
        );
        pass.push(
            FieldName::Bedrooms,
            ExtractionOutcome::unknown(Confidence::GridSummary, 3),
            false,
        );
        pass
    }

    #[test]
    fn merge_is_idempotent() {
        let mut once = ListingRecord::new("https://example.com/rooms/1".to_owned(), Source::Airbnb);
        once.merge(&grid_pass());
        let mut twice = once.clone();
        twice.merge(&grid_pass());
        assert_eq!(once.fields, twice.fields);
        assert_eq!(once.amenities, twice.amenities);
    }

    #[test]
    fn merge_never_replaces_known_with_unknown() {
        let mut record = ListingRecord::new("https://example.com/rooms/1".to_owned(), Source::Airbnb);
        record.merge(&grid_pass());

        let mut later = PartialOutcomeSet::default();
        later.push(
            FieldName::Stars,
            ExtractionOutcome::unknown(Confidence::DetailPage, 2),
            false,
        );
        record.merge(&later);

        assert_eq!(
            record.known_value(FieldName::Stars),
            Some(&Scalar::Decimal(4.8))
        );
    }

    #[test]
    fn override_needs_flag_and_higher_confidence() {
        let mut record = ListingRecord::new("https://example.com/rooms/1".to_owned(), Source::Airbnb);
        record.merge(&grid_pass());

        // Same field, higher confidence, override allowed: replaced.
        let mut detail = PartialOutcomeSet::default();
        detail.push(
            FieldName::PricePerNight,
            known(Scalar::Currency(800), Confidence::DetailPage),
            true,
        );
        // Stars is not overridable; the new value must be ignored.
        detail.push(
            FieldName::Stars,
            known(Scalar::Decimal(4.9), Confidence::DetailPage),
            false,
        );
        record.merge(&detail);

        assert_eq!(
            record.known_value(FieldName::PricePerNight),
            Some(&Scalar::Currency(800))
        );
        assert_eq!(
            record.known_value(FieldName::Stars),
            Some(&Scalar::Decimal(4.8))
        );
    }

    #[test]
    fn recovery_fills_but_never_overwrites() {
        let mut record = ListingRecord::new("https://example.com/rooms/1".to_owned(), Source::Airbnb);
        record.merge(&grid_pass());

        let mut recovery = PartialOutcomeSet::default();
        recovery.push(
            FieldName::Bedrooms,
            ExtractionOutcome::found(
                Scalar::Count(3),
                Provenance::Classifier,
                Confidence::Recovered,
                0,
            ),
            false,
        );
        recovery.push(
            FieldName::PricePerNight,
            ExtractionOutcome::found(
                Scalar::Currency(1),
                Provenance::Classifier,
                Confidence::Recovered,
                0,
            ),
            true,
        );
        record.merge(&recovery);

        assert_eq!(record.known_value(FieldName::Bedrooms), Some(&Scalar::Count(3)));
        // Recovered confidence ranks lowest; even the overridable field keeps
        // its grid value.
        assert_eq!(
            record.known_value(FieldName::PricePerNight),
            Some(&Scalar::Currency(900))
        );
    }

    #[test]
    fn amenity_merge_fills_only_unknown() {
        let mut vector = AmenityVector::default();
        vector.set(Amenity::Pool, true);

        let mut other = AmenityVector::default();
        other.set(Amenity::Pool, false);
        other.set(Amenity::Tv, true);

        vector.merge_from(&other);
        assert_eq!(vector.get(Amenity::Pool), Some(true));
        assert_eq!(vector.get(Amenity::Tv), Some(true));
        assert_eq!(vector.get(Amenity::Balcony), None);
    }
}

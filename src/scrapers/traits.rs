use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;

use crate::extract::snapshot::Snapshot;
use crate::models::{Amenity, FieldName};

/// Collaborator that renders pages into snapshots.
///
/// The core never assumes a markup dialect; it only needs structural,
/// attribute and full-text addressing on whatever this returns. Bounded
/// waits for lazily rendered regions live behind this trait — a timed-out
/// wait surfaces as a snapshot without the region, never as an error.
pub trait PageSource {
    /// Navigate the main context to `url` and snapshot it.
    fn goto(&self, url: &str) -> Result<Snapshot>;

    /// Open a listing page in its own context, snapshot it, close it.
    fn open_detail(&self, url: &str) -> Result<Snapshot>;

    /// Activate the "next page" control and snapshot the result.
    fn click_next(&self) -> Result<Snapshot>;
}

/// Last-resort natural-language classifier.
///
/// Both calls return total mappings where omission means "not determined".
/// Implementations report transport or parse failures as errors; callers
/// degrade to defaults and never abort the run over them.
#[async_trait]
pub trait SemanticClassifier: Send + Sync {
    async fn classify_amenities(
        &self,
        text: &str,
        vocabulary: &[Amenity],
    ) -> Result<BTreeMap<Amenity, bool>>;

    async fn extract_fields(
        &self,
        text: &str,
        fields: &[FieldName],
    ) -> Result<BTreeMap<FieldName, String>>;
}

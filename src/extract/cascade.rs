//! Ordered-strategy extraction for one named field.
//!
//! Earlier strategies are structural and precise; later ones fall back to
//! regex over the flattened page text, trading precision for availability as
//! the page structure drifts.

use anyhow::{Context as _, Result};
use regex::Regex;
use scraper::Selector;
use tracing::debug;

use crate::extract::normalize;
use crate::extract::snapshot::Snapshot;
use crate::models::{Confidence, ExtractionOutcome, FieldName, Provenance, ScalarKind};

/// One technique for locating a field's raw value in a snapshot.
pub enum Strategy {
    /// Text content of the first element on a CSS path.
    Structural(Selector),
    /// Attribute value of the first element on a CSS path.
    Attribute(Selector, &'static str),
    /// Regex over the flattened text; capture group 1 when present.
    Pattern(Regex),
}

impl Strategy {
    pub fn structural(css: &str) -> Result<Self> {
        Ok(Strategy::Structural(compile(css)?))
    }

    pub fn attribute(css: &str, attr: &'static str) -> Result<Self> {
        Ok(Strategy::Attribute(compile(css)?, attr))
    }

    pub fn pattern(regex: &str) -> Result<Self> {
        let regex = Regex::new(regex).with_context(|| format!("invalid pattern `{regex}`"))?;
        Ok(Strategy::Pattern(regex))
    }

    pub fn locate(&self, snapshot: &Snapshot) -> Option<String> {
        match self {
            Strategy::Structural(selector) => snapshot.select_text(selector),
            Strategy::Attribute(selector, attr) => snapshot.select_attr(selector, attr),
            Strategy::Pattern(regex) => snapshot.find_pattern(regex),
        }
    }
}

fn compile(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|err| anyhow::anyhow!("invalid selector `{css}`: {err:?}"))
}

/// Static descriptor for one schema field.
pub struct FieldSpec {
    pub name: FieldName,
    pub kind: ScalarKind,
    pub strategies: Vec<Strategy>,
    /// Whether a later pass at strictly higher confidence may overwrite an
    /// already known value for this field.
    pub allow_override: bool,
}

impl FieldSpec {
    pub fn new(name: FieldName, kind: ScalarKind, strategies: Vec<Strategy>) -> Self {
        Self {
            name,
            kind,
            strategies,
            allow_override: false,
        }
    }

    pub fn overridable(mut self) -> Self {
        self.allow_override = true;
        self
    }
}

/// Try each strategy in order; the first located, normalizable value wins
/// and later strategies are never attempted. All-miss yields the sentinel
/// with no provenance.
pub fn extract(snapshot: &Snapshot, spec: &FieldSpec, confidence: Confidence) -> ExtractionOutcome {
    for (index, strategy) in spec.strategies.iter().enumerate() {
        let Some(raw) = strategy.locate(snapshot) else {
            continue;
        };
        let Some(value) = normalize::normalize(&raw, spec.kind) else {
            debug!(field = ?spec.name, strategy = index, raw = %raw, "located text failed normalization");
            continue;
        };
        return ExtractionOutcome::found(value, Provenance::Strategy(index), confidence, index + 1);
    }
    ExtractionOutcome::unknown(confidence, spec.strategies.len())
}

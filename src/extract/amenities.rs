//! Keyword classification of free-text amenity lists.
//!
//! Matching is layered: every amenity has a curated synonym list matched as
//! whole words against the lowercased text, and "pool" carries an extra
//! disambiguation window so a billiards table never reads as a swimming
//! pool. Escalation to the semantic classifier happens in the record
//! builder, not here; this module stays pure.

use crate::models::{Amenity, AmenityVector};

/// Bytes scanned on each side of a "pool" hit for a billiards context.
const POOL_WINDOW: usize = 16;

fn synonyms(amenity: Amenity) -> &'static [&'static str] {
    match amenity {
        Amenity::Tv => &["tv", "television", "hdtv"],
        Amenity::Pool => &["pool"],
        Amenity::Jacuzzi => &["jacuzzi", "hot tub", "whirlpool", "spa bath"],
        Amenity::BilliardsTable => &["pool table", "billiard", "snooker"],
        Amenity::LargeYard => &[
            "large yard",
            "big yard",
            "backyard",
            "large garden",
            "spacious yard",
        ],
        Amenity::Balcony => &["balcony", "terrace", "patio"],
        Amenity::Laundry => &["washer", "washing machine", "dryer", "laundry"],
        Amenity::HomeGym => &["gym", "exercise equipment", "fitness"],
    }
}

/// Evaluate the whole vocabulary against `text`. Every amenity comes back
/// evaluated (true or false); "not evaluated" only exists before this runs.
pub fn classify_keywords(text: &str) -> AmenityVector {
    let lower = text.to_lowercase();
    let mut vector = AmenityVector::default();
    for amenity in Amenity::ALL {
        let hit = synonyms(amenity).iter().any(|synonym| match amenity {
            Amenity::Pool => pool_mentions(&lower, synonym),
            _ => mentions(&lower, synonym),
        });
        vector.set(amenity, hit);
    }
    vector
}

/// True when `needle` appears as its own word (or word sequence).
fn mentions(haystack: &str, needle: &str) -> bool {
    find_word(haystack, needle, 0).is_some()
}

/// A "pool" hit is discarded when "table" or "billiard" co-occurs within a
/// small window around it.
fn pool_mentions(haystack: &str, needle: &str) -> bool {
    let mut from = 0;
    while let Some((start, end)) = find_word(haystack, needle, from) {
        let window = window_around(haystack, start, end);
        if !window.contains("table") && !window.contains("billiard") {
            return true;
        }
        from = end;
    }
    false
}

/// First whole-word occurrence of `needle` in `haystack[from..]`, as byte
/// offsets into `haystack`.
fn find_word(haystack: &str, needle: &str, mut from: usize) -> Option<(usize, usize)> {
    while let Some(rel) = haystack[from..].find(needle) {
        let start = from + rel;
        let end = start + needle.len();
        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let after_ok = haystack[end..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric());
        if before_ok && after_ok {
            return Some((start, end));
        }
        from = end;
    }
    None
}

fn window_around(haystack: &str, start: usize, end: usize) -> &str {
    let mut lo = start.saturating_sub(POOL_WINDOW);
    while !haystack.is_char_boundary(lo) {
        lo -= 1;
    }
    let mut hi = (end + POOL_WINDOW).min(haystack.len());
    while !haystack.is_char_boundary(hi) {
        hi += 1;
    }
    &haystack[lo..hi]
}

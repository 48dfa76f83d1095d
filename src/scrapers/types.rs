use std::path::PathBuf;

use chrono::{DateTime, Utc};
use url::Url;

/// Run-wide context, constructed once at startup and threaded through every
/// component; there are no ambient globals.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Directory holding the store files.
    pub out_dir: PathBuf,
    /// Store-file key for this logical query.
    pub query_key: String,
    pub started_at: DateTime<Utc>,
}

impl RunContext {
    pub fn new(search_url: &str, out_dir: impl Into<PathBuf>) -> Self {
        let started_at = Utc::now();
        Self {
            out_dir: out_dir.into(),
            query_key: query_key(search_url, started_at),
            started_at,
        }
    }
}

/// Key for one logical query: location, date range and guest count from the
/// search URL, falling back to the run timestamp when none are present.
fn query_key(search_url: &str, fallback: DateTime<Utc>) -> String {
    let Ok(url) = Url::parse(search_url) else {
        return timestamp_key(fallback);
    };

    let mut parts: Vec<String> = Vec::new();

    // Search paths look like /s/<location>/homes.
    let segments: Vec<&str> = url
        .path_segments()
        .map(|segments| segments.collect())
        .unwrap_or_default();
    if let Some(position) = segments.iter().position(|segment| *segment == "s") {
        if let Some(location) = segments.get(position + 1) {
            if !location.is_empty() {
                parts.push((*location).to_owned());
            }
        }
    }

    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "checkin" | "checkout" | "adults" | "guests" => parts.push(value.into_owned()),
            _ => {}
        }
    }

    if parts.is_empty() {
        return timestamp_key(fallback);
    }
    sanitize(&parts.join("-"))
}

fn timestamp_key(timestamp: DateTime<Utc>) -> String {
    format!("scrape-{}", timestamp.format("%Y%m%d-%H%M%S"))
}

/// Filesystem-safe key: alphanumerics kept, runs of anything else collapse
/// to a single dash.
fn sanitize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_dash = true;
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn query_key_combines_location_dates_and_guests() {
        let key = query_key(
            "https://www.airbnb.com/s/Lake%20Tahoe/homes?checkin=2025-07-01&checkout=2025-07-04&adults=4",
            Utc::now(),
        );
        assert_eq!(key, "lake-20tahoe-2025-07-01-2025-07-04-4");
    }

    #[test]
    fn query_key_falls_back_to_timestamp() {
        let fallback = "2025-07-01T10:30:00Z".parse().unwrap();
        let key = query_key("https://www.airbnb.com/", fallback);
        assert_eq!(key, "scrape-20250701-103000");

        let key = query_key("not a url", fallback);
        assert_eq!(key, "scrape-20250701-103000");
    }

    #[test]
    fn sanitize_collapses_separator_runs() {
        assert_eq!(sanitize("Lake Tahoe -- July"), "lake-tahoe-july");
        assert_eq!(sanitize("trailing!!"), "trailing");
    }
}

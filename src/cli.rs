use clap::{Parser, ValueEnum};

/// Scrape a stay-listing search into a dual-format incremental store.
#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Complete search URL to scrape.
    #[arg(long)]
    pub url: String,

    /// Maximum number of result pages to walk; walks until the results run
    /// out when omitted.
    #[arg(long)]
    pub max_pages: Option<u32>,

    /// Output directory for the store files.
    #[arg(long, default_value = "scraped")]
    pub out: String,

    /// Fallback classifier for amenities and still-unknown fields.
    #[arg(long, value_enum, default_value = "noop")]
    pub classifier: ClassifierEngine,

    /// Model used by the openai classifier engine.
    #[arg(long, default_value = "gpt-4o-mini")]
    pub openai_model: String,

    /// Base URL of the OpenAI-compatible API.
    #[arg(long, default_value = "https://api.openai.com/v1")]
    pub openai_base_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ClassifierEngine {
    /// Keyword matching and the cascade stand alone.
    Noop,
    /// Escalate to an OpenAI-compatible API (needs OPENAI_API_KEY).
    Openai,
}

use anyhow::Context;
use clap::Parser;
use tracing::info;

use stay_scout::cli::{Cli, ClassifierEngine};
use stay_scout::scrapers::types::RunContext;
use stay_scout::scrapers::{
    AirbnbScraper, BrowserSource, NoopClassifier, OpenAiClassifier, SemanticClassifier,
};
use stay_scout::store::IncrementalStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    stay_scout::logging::init()?;
    let cli = Cli::parse();

    info!("🏠 Stay Scout - listing scraper");
    info!("================================");
    info!("");

    let ctx = RunContext::new(&cli.url, &cli.out);
    let mut store = IncrementalStore::open(&ctx.out_dir, &ctx.query_key)?;

    let classifier: Box<dyn SemanticClassifier> = match cli.classifier {
        ClassifierEngine::Noop => Box::new(NoopClassifier),
        ClassifierEngine::Openai => {
            let api_key = std::env::var("OPENAI_API_KEY").context("OPENAI_API_KEY is not set")?;
            Box::new(OpenAiClassifier::new(
                &cli.openai_base_url,
                api_key,
                cli.openai_model.clone(),
            )?)
        }
    };

    let source = BrowserSource::new()?;
    let scraper = AirbnbScraper::new(&source, classifier.as_ref())?;

    info!("Starting scrape: {}", cli.url);
    info!("This will visit each listing page for detailed information");
    info!("");

    let summary = scraper.run(&mut store, &cli.url, cli.max_pages).await?;

    info!("");
    info!(
        "✅ Walked {} pages, processed {} listings ({} rows in store)",
        summary.pages,
        summary.listings,
        store.len()
    );
    info!("💾 Saved results to {}", store.csv_path().display());
    info!("💾 Saved results to {}", store.json_path().display());

    Ok(())
}

pub mod airbnb;
pub mod browser;
pub mod openai;
pub mod pagination;
pub mod traits;
pub mod types;

pub use airbnb::AirbnbScraper;
pub use browser::BrowserSource;
pub use openai::{NoopClassifier, OpenAiClassifier};
pub use traits::{PageSource, SemanticClassifier};

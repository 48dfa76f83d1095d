pub mod cli;
pub mod extract;
pub mod logging;
pub mod models;
pub mod scrapers;
pub mod store;

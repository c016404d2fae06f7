// Resolution strategies, cheapest first

pub mod signed_api;
pub mod browser;
pub mod scrape;
pub mod cdn;
pub mod alt_runtime;

pub use signed_api::SignedApiStrategy;
pub use browser::BrowserInterceptionStrategy;
pub use scrape::StaticScrapeStrategy;
pub use cdn::CdnProbeStrategy;
pub use alt_runtime::AltRuntimeStrategy;

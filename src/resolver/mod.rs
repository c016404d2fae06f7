// Resolver module - share link to direct download URL
//
// Cascade of independent strategies behind one trait:
// - Signed API calls replicated locally
// - Headless browser interception
// - Static page scraping
// - CDN URL guessing
// - Signed calls delegated to an alternate runtime
//
// The cascade stops at the first strategy that yields a URL.

pub mod diagnostics;
pub mod errors;
pub mod identifier;
pub mod locator;
pub mod models;
pub mod orchestrator;
pub mod signing;
pub mod strategies;
pub mod traits;
pub mod utils;

pub use diagnostics::{diagnose_trail, FailureReason};
pub use errors::ResolveError;
pub use identifier::{extract_identifier, IdentifierExtractor};
pub use locator::{locate_url, LocatedFile};
pub use models::{LinkFamily, OutcomeView, ResolutionOutcome, ShareIdentifier, StrategyOutcome, TrailSection};
pub use orchestrator::ResolutionCascade;
pub use signing::SigningContext;
pub use traits::ResolutionStrategy;

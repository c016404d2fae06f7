pub mod config;
pub mod logging;
pub mod republish;
pub mod resolver;

pub use config::ResolverConfig;
pub use republish::{republish_status, HttpRepublisher, RepublishRequest, RepublishResponse, Republisher};
pub use resolver::{
    IdentifierExtractor, OutcomeView, ResolutionCascade, ResolutionOutcome, ResolveError, ShareIdentifier,
};

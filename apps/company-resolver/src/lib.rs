//! Resolves free-text company names to canonical company-directory ids,
//! with a persistent cache of both positive and negative resolutions.

pub mod cache;
pub mod config;
pub mod db;
pub mod directory;
pub mod errors;
pub mod matching;
pub mod models;
pub mod resolution;
pub mod state;
pub mod telemetry;

#[cfg(test)]
mod testing;

pub use config::{ResolutionSettings, ResolverConfig};
pub use errors::ResolveError;
pub use models::company::{CompanyId, MatchTier, ResolvedCompany};
pub use resolution::{BatchContext, CompanyQuery, ResolutionOrchestrator};
pub use state::ResolverState;

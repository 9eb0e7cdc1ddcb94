// Company resolution: tiered directory matching behind a cache.
// Entry point for enrichment pipelines is `ResolutionOrchestrator::resolve_company`;
// `batch::enrich_companies` drives it for a whole discovery run.

pub mod batch;
pub mod orchestrator;
pub mod single_flight;
pub mod tiered;

pub use batch::{enrich_companies, BatchContext, BatchOutcome, BatchSummary, CompanyQuery};
pub use orchestrator::ResolutionOrchestrator;
pub use tiered::TieredResolver;

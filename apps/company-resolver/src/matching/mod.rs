// Name canonicalization and candidate scoring.
// Pure functions only: no I/O, safe to call from any tier.

pub mod normalize;
pub mod similarity;

pub use normalize::{normalize_name, normalize_website};
pub use similarity::{combined_confidence, similarity};

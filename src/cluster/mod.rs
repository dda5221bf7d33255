//! Event clustering and synthesis.

mod assign;
mod entities;
mod normalize;
mod synthesis;

pub use assign::cluster;
pub use entities::{apply_aliases, canonicalize, distinct_entities, extract_entities, EntityRun};
pub use normalize::{local_aliases, near_duplicate, normalize_entity};
pub use synthesis::synthesize;

//! Agent memory: the per-run transcript and the shared knowledge store

mod semantic;
mod working;

pub use semantic::{Document, SemanticMemory};
pub use working::WorkingMemory;

//! Corpus storage and retrieval: passage catalog, nearest-neighbour indexes
//! (in-memory, optionally LanceDB) and the hybrid Retrieval Engine.

mod error;
pub use error::StoreError;

pub mod catalog;
pub mod index;
pub mod retrieval;

pub use catalog::{Passage, PassageCatalog};
pub use index::{CorpusIndex, MemoryIndex};
pub use retrieval::{RankedPassage, RetrievalContext, RetrievalEngine, fuse};

#[cfg(feature = "lancedb")]
mod lance;
#[cfg(feature = "lancedb")]
pub use lance::LanceIndex;

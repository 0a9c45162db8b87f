pub mod chroma;
pub mod memory;
pub mod opensearch;

pub use chroma::ChromaStore;
pub use memory::{InMemoryRecordStore, InMemoryVectorStore};
pub use opensearch::OpenSearchStore;

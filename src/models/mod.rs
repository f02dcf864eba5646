pub mod api;
pub mod chunk;
pub mod rag_options;

pub use chunk::{ChunkMetadata, ChunkType, DocumentChunk};

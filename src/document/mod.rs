pub mod chunker;
pub mod datasheet;
pub mod flowchart;
pub mod generic;
pub mod sop;
pub mod vision;
pub mod work_instruction;

pub use chunker::{ChunkBuilder, ChunkingEngine, ChunkingStrategy};

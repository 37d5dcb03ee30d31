mod cache;
mod engine;

// Re-export from cache
pub use cache::{HashCache, HashRecord, SECTION_ADDNET, SECTION_HASHES};
// Re-export from engine
pub use engine::{cache_key, HashEngine, HashEvent, HashMode, BLOCK_SIZE};

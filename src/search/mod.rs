// Similarity search module
// Candidate narrowing through a CandidateIndex, then exact scoring and ranking

pub mod engine;
pub mod index;
pub mod memory;
pub mod request;
pub mod similarity;

pub use engine::{MatchSummary, SimilarityEngine, SimilarityMatch, summarize};
pub use index::{Candidate, CandidateIndex, Partition};
pub use memory::MemoryIndex;
pub use request::SimilarityQuery;

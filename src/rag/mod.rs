//! Retrieval-augmented generation components: chunking and context assembly.

mod chunker;
mod retriever;

pub use chunker::TextChunker;
pub use retriever::{ContextBuilder, RetrievalContext, RetrievalOutcome};

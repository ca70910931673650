//! Concept records and their on-repository encoding.

mod codec;
mod model;

pub use codec::{CodecError, RDFS_NS, REDSTRING_NS, decode, encode, encode_graph};
pub use model::{CommitKind, Concept, ConceptData, PendingCommit};

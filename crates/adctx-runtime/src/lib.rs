//! Embedding runtime for adctx.
//!
//! Text-to-vector conversion is delegated to an [`embedding::EmbeddingDriver`]:
//! either an OpenAI-compatible HTTP endpoint or the local deterministic
//! hashing driver used offline and in tests.

pub mod embedding;

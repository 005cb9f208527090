//! Storage module for persistent data storage
//!
//! Provides SQLite-based persistence for documents, stage results, and progress events.

mod database;

pub use database::{
    decode_embedding_blob, encode_embedding_blob, PipelineDb, PipelineDbStats, StoredPipeline,
};

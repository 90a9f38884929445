pub mod config;
pub mod context;
pub mod docgen;
pub mod error;
pub mod indexer;
pub mod keys;
pub mod kv;
pub mod metadata;
pub mod query;
pub mod schema;
pub mod value;

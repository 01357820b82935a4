//! Data layer module
//!
//! Handles graph persistence and caching:
//! - Triple store contract and backends (memory, SQLite)
//! - Node <-> triple conversion
//! - Dereference caches (volatile)

mod cache;
mod database;
mod graph;
mod triple;

pub use cache::{
    Cache, CacheStats, DEFAULT_TTL, MemoryCache, MokaCache, normalize_cache_key,
};
pub use database::SqliteTripleStore;
pub use graph::{
    LocalNodeSource, RDF_TYPE, TripleStoreNodeSource, node_from_triples, triples_from_node,
};
pub use triple::{
    MemoryTripleStore, OBJECT_TYPE_IRI, TripleStore, TypedRdfTriple, XSD_DATE_TIME,
};

#[cfg(test)]
mod database_test;

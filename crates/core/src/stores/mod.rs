pub mod lmdb;

pub use lmdb::LmdbVectorStore;

//! Vector store adapters.

pub mod milvus;

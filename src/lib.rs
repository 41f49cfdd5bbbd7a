//! Chunked file storage with share links.
//!
//! Files are split into bounded chunks, written through a [`gateway::StorageGateway`],
//! finalized, optionally published, and rebuilt byte-exact on read.

pub mod config;
pub mod errors;
pub mod gateway;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;

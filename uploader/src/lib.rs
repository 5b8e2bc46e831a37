//! Resumable chunked upload server.
//!
//! Clients split a file into fixed-size chunks, send them in any order and
//! then ask the server to merge them. Finished files are stored under their
//! content hash, so a file that was already uploaded once is never
//! transferred again.

pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod service;
pub mod storage;
pub mod utils;

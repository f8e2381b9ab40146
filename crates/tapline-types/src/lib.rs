//! Shared Tapline model types.
//!
//! This crate is dependency-boundary-safe for engine, store, and CLI usage:
//! pure data types plus the structured error model, nothing async.

pub mod api;
pub mod error;
pub mod execution;
pub mod job;
pub mod message;
pub mod source;

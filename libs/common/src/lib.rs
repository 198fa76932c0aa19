//! Common library for the storefront platform
//!
//! This crate provides shared infrastructure used across storefront
//! services: PostgreSQL connectivity, the Redis cache pool that backs the
//! token revocation list, and shared error types.

pub mod cache;
pub mod database;
pub mod error;

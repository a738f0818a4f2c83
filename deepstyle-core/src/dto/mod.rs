//! Data Transfer Objects for the document store
//!
//! Bodies the store returns from its HTTP API. They are decoded by the client
//! and never leave it.

pub mod store;

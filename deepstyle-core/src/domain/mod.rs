//! Core domain types
//!
//! These types are point-in-time snapshots of documents held by the store.
//! They carry no network state; reading and writing them is the job of the
//! client crate.

pub mod document;
pub mod job;
pub mod mutation;

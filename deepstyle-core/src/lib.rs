//! Deepstyle Core
//!
//! Core types for deepstyle job documents stored in a revision-controlled
//! document database.
//!
//! This crate contains:
//! - Domain types: versioned documents, the job document and its states
//! - DTOs: response bodies returned by the document store

pub mod domain;
pub mod dto;

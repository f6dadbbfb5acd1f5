//! services/api/src/lib.rs
//!
//! The HTTP/WebSocket service hosting the CV editor's auto-save engine.

pub mod adapters;
pub mod config;
pub mod error;
pub mod web;

//! Sync Reconciler Library
//!
//! Merges a client-held dataset with the authoritative copy kept by an
//! upstream store. The main server binary is in main.rs.
//!
//! # Modules
//!
//! - `merge`: The reconciliation algorithm (no I/O)
//! - `upstream`: Pull/push access to the authoritative dataset
//! - `routes`: HTTP surface
//! - `config`: Environment-driven configuration

pub mod config;
pub mod error;
pub mod merge;
pub mod routes;
pub mod state;
pub mod upstream;

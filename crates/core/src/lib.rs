//! CropCart Core - Shared types library.
//!
//! This crate provides common types used across all CropCart components:
//! - `state` - Client-side state and synchronization core
//! - `integration-tests` - Cross-store scenario tests
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no HTTP clients, no
//! knowledge of the hosted backend. This keeps it lightweight and allows it
//! to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, prices, emails,
//!   roles/statuses, and the canonical timestamp

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;

//! CropCart state and synchronization core.
//!
//! This crate is the shared application-state layer of the CropCart
//! marketplace client: it tracks the authenticated identity, the public
//! listing catalog, the per-user cart and wishlist, and the order list, and
//! it mediates every read and write against the hosted document backend.
//! The presentation layer consumes this crate and renders whatever the
//! stores hold; it never talks to the backend directly.
//!
//! # Architecture
//!
//! - [`state::AppState`] - explicit, cheaply-cloneable container wiring the
//!   stores together (no ambient singleton)
//! - [`session::SessionManager`] - identity state machine with a session
//!   epoch that stale async results are checked against
//! - [`catalog::CatalogStore`] - public listings + farmer profiles,
//!   optimistic mutations with rollback
//! - [`cart::CartStore`] / [`cart::WishlistStore`] - per-user collections,
//!   mirrored to a local cache keyed by user id
//! - [`orders::OrderPipeline`] - checkout and order-status flow,
//!   remote-confirm-then-apply
//! - [`backend`] - boundary traits plus the HTTP client and the in-memory
//!   test backend
//!
//! Everything is single-logical-thread, event-driven: store mutations run
//! in handler order, remote calls suspend, and no lock is ever held across
//! an `.await`.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod backend;
pub mod cache;
pub mod cart;
pub mod catalog;
pub mod config;
pub mod error;
pub mod models;
pub mod orders;
pub mod session;
pub mod state;

mod sync;

pub use error::{Result, StateError};
pub use state::AppState;

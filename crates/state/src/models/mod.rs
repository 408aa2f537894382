//! Domain models for the marketplace.
//!
//! These are the document shapes of the hosted backend's three collections
//! (`users`, `crops`, `orders`) plus the purely local cart/wishlist
//! entries. Wire documents use camelCase field names; the serde renames
//! here keep the Rust structs idiomatic.

pub mod cart;
pub mod identity;
pub mod listing;
pub mod order;

pub use cart::CartItem;
pub use identity::{Identity, ProfilePatch};
pub use listing::{Listing, ListingDraft};
pub use order::{Order, OrderBuyer, OrderDraft};

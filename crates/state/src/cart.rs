//! Per-user cart and wishlist stores.
//!
//! Both stores are local collections scoped to one signed-in buyer: the
//! in-memory state is authoritative for rendering, and every mutation
//! mirrors the whole collection to the local cache under
//! `{prefix}-{collection}-{user_id}`. On session resolution the store is
//! hydrated from that same key before any remote calls happen. The remote
//! backend never sees a cart; only `place_order` turns one into a
//! document.
//!
//! Mutations require an authenticated buyer; an anonymous caller gets
//! [`StateError::AuthRequired`], which the presentation layer turns into a
//! login redirect rather than a silent failure.

use std::sync::Arc;
use std::sync::Mutex;

use cropcart_core::{CropId, Price, Role, UserId};

use crate::cache::{LocalCache, cache_key, load_collection, store_collection};
use crate::error::{Result, StateError};
use crate::models::{CartItem, Identity, Listing};
use crate::session::SessionManager;
use crate::sync::acquire;

/// Cache collection segment for carts.
const CART_COLLECTION: &str = "cart";
/// Cache collection segment for wishlists.
const WISHLIST_COLLECTION: &str = "wishlist";

/// Resolve the signed-in buyer, or the error the presentation layer needs.
pub(crate) fn require_buyer(session: &SessionManager) -> Result<Identity> {
    let identity = session.current_identity().ok_or(StateError::AuthRequired)?;
    if identity.role != Role::Buyer {
        return Err(StateError::Permission(
            "only buyers have a cart".to_string(),
        ));
    }
    Ok(identity)
}

// =============================================================================
// Cart
// =============================================================================

/// The signed-in buyer's cart: listing snapshots with quantities.
pub struct CartStore {
    session: Arc<SessionManager>,
    cache: Arc<dyn LocalCache>,
    prefix: String,
    items: Mutex<Vec<CartItem>>,
}

impl CartStore {
    /// Create an empty cart store.
    #[must_use]
    pub fn new(
        session: Arc<SessionManager>,
        cache: Arc<dyn LocalCache>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            session,
            cache,
            prefix: prefix.into(),
            items: Mutex::new(Vec::new()),
        }
    }

    /// The current entries, in insertion order.
    #[must_use]
    pub fn items(&self) -> Vec<CartItem> {
        acquire(&self.items).clone()
    }

    /// Whether the cart has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        acquire(&self.items).is_empty()
    }

    /// `Σ price × quantity` over the current entries, recomputed on every
    /// call, never a cached value.
    #[must_use]
    pub fn total(&self) -> Price {
        acquire(&self.items)
            .iter()
            .map(CartItem::line_total)
            .sum()
    }

    /// Add `quantity` units of a listing, merging into an existing entry.
    ///
    /// At most one entry per listing id exists; adding to a present entry
    /// increments its quantity. A zero quantity changes nothing.
    ///
    /// # Errors
    ///
    /// Returns `AuthRequired` when nobody is signed in (redirect contract)
    /// or `Permission` when the caller is a farmer.
    pub fn add_item(&self, listing: Listing, quantity: u32) -> Result<()> {
        let buyer = require_buyer(&self.session)?;
        if quantity == 0 {
            return Ok(());
        }

        {
            let mut items = acquire(&self.items);
            match items.iter_mut().find(|i| i.listing.id == listing.id) {
                Some(existing) => existing.quantity += quantity,
                None => items.push(CartItem::new(listing, quantity)),
            }
        }

        self.persist(&buyer.id);
        Ok(())
    }

    /// Replace an entry's quantity; zero removes the entry.
    ///
    /// Setting the quantity of an absent id does nothing.
    ///
    /// # Errors
    ///
    /// Returns `AuthRequired` or `Permission` as [`Self::add_item`] does.
    pub fn set_quantity(&self, id: &CropId, quantity: u32) -> Result<()> {
        if quantity == 0 {
            return self.remove_item(id);
        }

        let buyer = require_buyer(&self.session)?;
        {
            let mut items = acquire(&self.items);
            if let Some(existing) = items.iter_mut().find(|i| &i.listing.id == id) {
                existing.quantity = quantity;
            }
        }

        self.persist(&buyer.id);
        Ok(())
    }

    /// Remove an entry; removing an absent id is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `AuthRequired` or `Permission` as [`Self::add_item`] does.
    pub fn remove_item(&self, id: &CropId) -> Result<()> {
        let buyer = require_buyer(&self.session)?;
        acquire(&self.items).retain(|i| &i.listing.id != id);
        self.persist(&buyer.id);
        Ok(())
    }

    /// Empty the cart.
    pub fn clear(&self) {
        acquire(&self.items).clear();
        if let Ok(buyer) = require_buyer(&self.session) {
            self.persist(&buyer.id);
        }
    }

    /// Load the cached cart for `user_id`, replacing the in-memory state.
    ///
    /// Called on session resolution, before any remote traffic. An
    /// unparseable cached value falls back to an empty cart.
    pub fn hydrate(&self, user_id: &UserId) {
        let key = self.key_for(user_id);
        *acquire(&self.items) = load_collection(self.cache.as_ref(), &key);
    }

    /// Drop the in-memory state (session became anonymous); the cache
    /// entry survives for the next hydration.
    pub fn reset(&self) {
        acquire(&self.items).clear();
    }

    /// Drop both the in-memory state and the cache entry (explicit
    /// logout).
    pub fn purge(&self, user_id: &UserId) {
        acquire(&self.items).clear();
        let key = self.key_for(user_id);
        if let Err(e) = self.cache.remove(&key) {
            tracing::warn!(key, error = %e, "failed to remove cached cart");
        }
    }

    /// Empty the cart after a confirmed checkout, mirroring the cache.
    pub(crate) fn clear_after_checkout(&self, user_id: &UserId) {
        acquire(&self.items).clear();
        self.persist(user_id);
    }

    fn key_for(&self, user_id: &UserId) -> String {
        cache_key(&self.prefix, CART_COLLECTION, user_id)
    }

    fn persist(&self, user_id: &UserId) {
        let items = self.items();
        store_collection(self.cache.as_ref(), &self.key_for(user_id), &items);
    }
}

// =============================================================================
// Wishlist
// =============================================================================

/// The signed-in buyer's wishlist: a set of listing snapshots.
pub struct WishlistStore {
    session: Arc<SessionManager>,
    cache: Arc<dyn LocalCache>,
    prefix: String,
    items: Mutex<Vec<Listing>>,
}

impl WishlistStore {
    /// Create an empty wishlist store.
    #[must_use]
    pub fn new(
        session: Arc<SessionManager>,
        cache: Arc<dyn LocalCache>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            session,
            cache,
            prefix: prefix.into(),
            items: Mutex::new(Vec::new()),
        }
    }

    /// The current entries, in insertion order.
    #[must_use]
    pub fn items(&self) -> Vec<Listing> {
        acquire(&self.items).clone()
    }

    /// Whether a listing is on the wishlist.
    #[must_use]
    pub fn contains(&self, id: &CropId) -> bool {
        acquire(&self.items).iter().any(|l| &l.id == id)
    }

    /// Add a listing; set semantics, so adding a present id is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `AuthRequired` or `Permission` as cart mutations do.
    pub fn add_item(&self, listing: Listing) -> Result<()> {
        let buyer = require_buyer(&self.session)?;
        {
            let mut items = acquire(&self.items);
            if !items.iter().any(|l| l.id == listing.id) {
                items.push(listing);
            }
        }
        self.persist(&buyer.id);
        Ok(())
    }

    /// Remove a listing; removing an absent id is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `AuthRequired` or `Permission` as cart mutations do.
    pub fn remove_item(&self, id: &CropId) -> Result<()> {
        let buyer = require_buyer(&self.session)?;
        acquire(&self.items).retain(|l| &l.id != id);
        self.persist(&buyer.id);
        Ok(())
    }

    /// Empty the wishlist.
    pub fn clear(&self) {
        acquire(&self.items).clear();
        if let Ok(buyer) = require_buyer(&self.session) {
            self.persist(&buyer.id);
        }
    }

    /// Load the cached wishlist for `user_id`; see [`CartStore::hydrate`].
    pub fn hydrate(&self, user_id: &UserId) {
        let key = self.key_for(user_id);
        *acquire(&self.items) = load_collection(self.cache.as_ref(), &key);
    }

    /// Drop the in-memory state only.
    pub fn reset(&self) {
        acquire(&self.items).clear();
    }

    /// Drop both the in-memory state and the cache entry.
    pub fn purge(&self, user_id: &UserId) {
        acquire(&self.items).clear();
        let key = self.key_for(user_id);
        if let Err(e) = self.cache.remove(&key) {
            tracing::warn!(key, error = %e, "failed to remove cached wishlist");
        }
    }

    fn key_for(&self, user_id: &UserId) -> String {
        cache_key(&self.prefix, WISHLIST_COLLECTION, user_id)
    }

    fn persist(&self, user_id: &UserId) {
        let items = self.items();
        store_collection(self.cache.as_ref(), &self.key_for(user_id), &items);
    }
}

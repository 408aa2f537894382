//! Checkout and order lifecycle.
//!
//! Order creation is money-sensitive, so it follows the strict two-phase
//! discipline: nothing local changes until the backend confirms the
//! document write. Status updates follow the same remote-first order. The
//! local order list is a render mirror, wholesale-replaced by
//! [`OrderPipeline::load_for_current_user`] and epoch-guarded against
//! stale completions.

use std::sync::Arc;
use std::sync::Mutex;

use tracing::{debug, instrument};

use cropcart_core::{OrderId, OrderStatus, Role};

use crate::backend::DataService;
use crate::cart::{CartStore, require_buyer};
use crate::error::{Result, StateError};
use crate::models::{Order, OrderBuyer, OrderDraft, order::farmer_ids_of};
use crate::session::SessionManager;
use crate::sync::acquire;

/// Converts cart snapshots into persisted orders and tracks the signed-in
/// user's order list.
pub struct OrderPipeline {
    data: Arc<dyn DataService>,
    session: Arc<SessionManager>,
    orders: Mutex<Vec<Order>>,
}

impl OrderPipeline {
    /// Create an empty pipeline.
    #[must_use]
    pub fn new(data: Arc<dyn DataService>, session: Arc<SessionManager>) -> Self {
        Self {
            data,
            session,
            orders: Mutex::new(Vec::new()),
        }
    }

    /// The loaded order list, newest first.
    #[must_use]
    pub fn orders(&self) -> Vec<Order> {
        acquire(&self.orders).clone()
    }

    /// Check out the current cart as a single order.
    ///
    /// Snapshots the cart, computes the total and the deduplicated owning
    /// farmers, and persists one `Pending` order document whose date is the
    /// backend's write-time. On success the cart is cleared (the wishlist
    /// is untouched) and the order is prepended to the local list. On
    /// failure the cart is untouched and nothing is added locally.
    ///
    /// This is an at-most-once operation with no idempotency key: if the
    /// write succeeds remotely but the confirmation is lost, a
    /// user-initiated retry creates a second order. Clearing the cart and
    /// creating the order are also two separate effects; an interruption
    /// between them can leave a non-empty cart despite a placed order.
    /// Both are accepted weak-consistency boundaries, not bugs to patch
    /// over silently.
    ///
    /// # Errors
    ///
    /// Returns `AuthRequired`/`Permission` if the caller is not a signed-in
    /// buyer, `EmptyCart` if there is nothing to check out, or
    /// `RemoteWrite` if the backend refuses the document.
    #[instrument(skip(self, cart))]
    pub async fn place_order(&self, cart: &CartStore) -> Result<Order> {
        let buyer = require_buyer(&self.session)?;

        let items = cart.items();
        if items.is_empty() {
            return Err(StateError::EmptyCart);
        }

        let draft = OrderDraft {
            id: OrderId::generate(),
            buyer: OrderBuyer::from(&buyer),
            total: cart.total(),
            farmer_ids: farmer_ids_of(&items),
            status: OrderStatus::Pending,
            items,
        };

        let order = self
            .data
            .create_order(&draft)
            .await
            .map_err(StateError::write)?;

        cart.clear_after_checkout(&buyer.id);
        acquire(&self.orders).insert(0, order.clone());
        Ok(order)
    }

    /// Set the status of an order, remotely first.
    ///
    /// The caller must be a farmer listed in the order's `farmer_ids`. No
    /// forward-only rule is enforced: any status may replace any other.
    ///
    /// # Errors
    ///
    /// Returns `AuthRequired`, `Permission` (caller not a farmer on the
    /// order), `NotFound` (unknown order), or `RemoteWrite`.
    #[instrument(skip(self), fields(id = %id, status = %status))]
    pub async fn update_status(&self, id: &OrderId, status: OrderStatus) -> Result<Order> {
        let caller = self
            .session
            .current_identity()
            .ok_or(StateError::AuthRequired)?;
        if caller.role != Role::Farmer {
            return Err(StateError::Permission(
                "only farmers update order status".to_string(),
            ));
        }

        // The loaded list usually has the order; fall back to a fetch so a
        // deep link works before load_for_current_user has run.
        let cached = {
            let orders = acquire(&self.orders);
            orders.iter().find(|o| &o.id == id).cloned()
        };
        let order = match cached {
            Some(order) => order,
            None => self
                .data
                .fetch_order(id)
                .await
                .map_err(StateError::read)?
                .ok_or_else(|| StateError::NotFound(format!("orders/{id}")))?,
        };

        if !order.farmer_ids.contains(&caller.id) {
            return Err(StateError::Permission(
                "order does not include this farmer's listings".to_string(),
            ));
        }

        self.data
            .set_order_status(id, status)
            .await
            .map_err(StateError::write)?;

        // Confirmed; mirror into the local list.
        let mut orders = acquire(&self.orders);
        if let Some(stored) = orders.iter_mut().find(|o| &o.id == id) {
            stored.status = status;
        }
        drop(orders);

        Ok(Order { status, ..order })
    }

    /// Load the orders visible to the signed-in user, newest first.
    ///
    /// Buyers see orders they placed; farmers see orders whose
    /// `farmer_ids` contains them, with each order's items restricted to
    /// that farmer's own lines (the stored total is left as-is). The sort
    /// happens locally so the date-descending contract holds regardless of
    /// backend index support. A result that lands after a session
    /// transition is discarded.
    ///
    /// # Errors
    ///
    /// Returns `AuthRequired` if nobody is signed in, or `RemoteRead` if
    /// the fetch fails (local list untouched).
    #[instrument(skip(self))]
    pub async fn load_for_current_user(&self) -> Result<()> {
        let caller = self
            .session
            .current_identity()
            .ok_or(StateError::AuthRequired)?;
        let epoch = self.session.epoch();

        let mut fetched = match caller.role {
            Role::Buyer => self
                .data
                .fetch_orders_for_buyer(&caller.id)
                .await
                .map_err(StateError::read)?,
            Role::Farmer => {
                let mut orders = self
                    .data
                    .fetch_orders_for_farmer(&caller.id)
                    .await
                    .map_err(StateError::read)?;
                // No cross-farmer item leakage: a farmer only sees their
                // own lines of a shared order.
                for order in &mut orders {
                    order.items.retain(|i| i.listing.farmer_id == caller.id);
                }
                orders
            }
        };

        fetched.sort_by(|a, b| b.date.cmp(&a.date));

        if !self.session.is_current(epoch) {
            debug!("discarding stale order load");
            return Ok(());
        }

        *acquire(&self.orders) = fetched;
        Ok(())
    }

    /// Drop the loaded list (session became anonymous).
    pub fn clear(&self) {
        acquire(&self.orders).clear();
    }
}

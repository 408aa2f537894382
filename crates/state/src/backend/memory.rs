//! In-process backend for tests.
//!
//! Implements all three boundary traits over mutexed maps, with a failure
//! switch so tests can exercise rollback and confirm-then-apply paths.
//! Unit tests in this crate and the integration-test crate both build their
//! stores on top of it.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::broadcast;
use uuid::Uuid;

use cropcart_core::{CropId, Email, OrderId, OrderStatus, Timestamp, UserId};

use crate::models::{Identity, Listing, Order, OrderDraft};
use crate::sync::acquire;

use super::{AuthEvent, AuthGateway, BackendError, BlobStore, DataService};

/// An in-memory stand-in for the hosted backend.
pub struct MemoryBackend {
    users: Mutex<HashMap<UserId, Identity>>,
    crops: Mutex<Vec<Listing>>,
    orders: Mutex<Vec<Order>>,
    /// email -> (password, auth subject)
    accounts: Mutex<HashMap<String, (String, UserId)>>,
    events: broadcast::Sender<AuthEvent>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    /// Artificial latency applied to reads, for interleaving tests.
    read_delay: Mutex<Option<std::time::Duration>>,
    /// Number of write operations attempted (including failed ones).
    pub write_attempts: AtomicU64,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            users: Mutex::new(HashMap::new()),
            crops: Mutex::new(Vec::new()),
            orders: Mutex::new(Vec::new()),
            accounts: Mutex::new(HashMap::new()),
            events,
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            read_delay: Mutex::new(None),
            write_attempts: AtomicU64::new(0),
        }
    }
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a profile document.
    pub fn seed_profile(&self, profile: Identity) {
        acquire(&self.users).insert(profile.id.clone(), profile);
    }

    /// Seed a listing document.
    pub fn seed_listing(&self, listing: Listing) {
        acquire(&self.crops).push(listing);
    }

    /// Seed an order document.
    pub fn seed_order(&self, order: Order) {
        acquire(&self.orders).push(order);
    }

    /// Seed an auth account with a fixed subject id.
    pub fn seed_account(&self, email: &Email, password: &str, user_id: UserId) {
        acquire(&self.accounts)
            .insert(email.as_str().to_owned(), (password.to_owned(), user_id));
    }

    /// Make every subsequent read fail until reset.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent write fail until reset.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Delay every subsequent read, so tests can interleave a competing
    /// state transition while a fetch is in flight.
    pub fn set_read_delay(&self, delay: std::time::Duration) {
        *acquire(&self.read_delay) = Some(delay);
    }

    /// Direct view of the stored listings (test assertions).
    #[must_use]
    pub fn stored_listings(&self) -> Vec<Listing> {
        acquire(&self.crops).clone()
    }

    /// Direct view of the stored orders (test assertions).
    #[must_use]
    pub fn stored_orders(&self) -> Vec<Order> {
        acquire(&self.orders).clone()
    }

    /// Broadcast an identity-changed event, as the hosted auth service
    /// would out-of-band (e.g. a restored session or remote revocation).
    pub fn emit_auth_event(&self, event: AuthEvent) {
        let _ = self.events.send(event);
    }

    async fn read_gate(&self) -> Result<(), BackendError> {
        let delay = *acquire(&self.read_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(BackendError::Api {
                status: 503,
                message: "injected read failure".to_string(),
            });
        }
        Ok(())
    }

    fn write_gate(&self) -> Result<(), BackendError> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(BackendError::Api {
                status: 503,
                message: "injected write failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl DataService for MemoryBackend {
    async fn fetch_listings(&self) -> Result<Vec<Listing>, BackendError> {
        self.read_gate().await?;
        Ok(acquire(&self.crops).clone())
    }

    async fn create_listing(&self, listing: &Listing) -> Result<(), BackendError> {
        self.write_gate()?;
        acquire(&self.crops).push(listing.clone());
        Ok(())
    }

    async fn update_listing(&self, listing: &Listing) -> Result<(), BackendError> {
        self.write_gate()?;
        let mut crops = acquire(&self.crops);
        match crops.iter_mut().find(|c| c.id == listing.id) {
            Some(stored) => {
                *stored = listing.clone();
                Ok(())
            }
            None => Err(BackendError::NotFound(format!("crops/{}", listing.id))),
        }
    }

    async fn delete_listing(&self, id: &CropId) -> Result<(), BackendError> {
        self.write_gate()?;
        acquire(&self.crops).retain(|c| &c.id != id);
        Ok(())
    }

    async fn fetch_profile(&self, id: &UserId) -> Result<Option<Identity>, BackendError> {
        self.read_gate().await?;
        Ok(acquire(&self.users).get(id).cloned())
    }

    async fn fetch_farmers(&self) -> Result<Vec<Identity>, BackendError> {
        self.read_gate().await?;
        Ok(acquire(&self.users)
            .values()
            .filter(|u| u.role == cropcart_core::Role::Farmer)
            .cloned()
            .collect())
    }

    async fn upsert_profile(&self, profile: &Identity) -> Result<(), BackendError> {
        self.write_gate()?;
        acquire(&self.users).insert(profile.id.clone(), profile.clone());
        Ok(())
    }

    async fn create_order(&self, draft: &OrderDraft) -> Result<Order, BackendError> {
        self.write_gate()?;
        let order = draft.clone().into_order(Timestamp::now());
        acquire(&self.orders).push(order.clone());
        Ok(order)
    }

    async fn fetch_order(&self, id: &OrderId) -> Result<Option<Order>, BackendError> {
        self.read_gate().await?;
        Ok(acquire(&self.orders).iter().find(|o| &o.id == id).cloned())
    }

    async fn fetch_orders_for_buyer(&self, buyer: &UserId) -> Result<Vec<Order>, BackendError> {
        self.read_gate().await?;
        // Insertion order, deliberately: the backend guarantees no sort.
        Ok(acquire(&self.orders)
            .iter()
            .filter(|o| &o.buyer.id == buyer)
            .cloned()
            .collect())
    }

    async fn fetch_orders_for_farmer(&self, farmer: &UserId) -> Result<Vec<Order>, BackendError> {
        self.read_gate().await?;
        Ok(acquire(&self.orders)
            .iter()
            .filter(|o| o.farmer_ids.contains(farmer))
            .cloned()
            .collect())
    }

    async fn set_order_status(
        &self,
        id: &OrderId,
        status: OrderStatus,
    ) -> Result<(), BackendError> {
        self.write_gate()?;
        let mut orders = acquire(&self.orders);
        match orders.iter_mut().find(|o| &o.id == id) {
            Some(order) => {
                order.status = status;
                Ok(())
            }
            None => Err(BackendError::NotFound(format!("orders/{id}"))),
        }
    }
}

#[async_trait]
impl AuthGateway for MemoryBackend {
    async fn sign_up(&self, email: &Email, password: &str) -> Result<UserId, BackendError> {
        self.write_gate()?;
        let mut accounts = acquire(&self.accounts);
        if accounts.contains_key(email.as_str()) {
            return Err(BackendError::EmailInUse);
        }
        let user_id = UserId::new(format!("user-{}", Uuid::new_v4()));
        accounts.insert(
            email.as_str().to_owned(),
            (password.to_owned(), user_id.clone()),
        );
        drop(accounts);
        let _ = self.events.send(AuthEvent::SignedIn(user_id.clone()));
        Ok(user_id)
    }

    async fn sign_in(&self, email: &Email, password: &str) -> Result<UserId, BackendError> {
        self.read_gate().await?;
        let user_id = {
            let accounts = acquire(&self.accounts);
            match accounts.get(email.as_str()) {
                Some((stored, user_id)) if stored == password => user_id.clone(),
                _ => return Err(BackendError::InvalidCredentials),
            }
        };
        let _ = self.events.send(AuthEvent::SignedIn(user_id.clone()));
        Ok(user_id)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        self.write_gate()?;
        let _ = self.events.send(AuthEvent::SignedOut);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

#[async_trait]
impl BlobStore for MemoryBackend {
    async fn upload(
        &self,
        path: &str,
        _bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<String, BackendError> {
        self.write_gate()?;
        Ok(format!("memory://blobs/{path}"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_update_missing_listing_is_not_found() {
        let backend = MemoryBackend::new();
        let listing: Listing = serde_json::from_value(serde_json::json!({
            "id": "crop-1",
            "name": "Organic Tomatoes",
            "image": "",
            "price": "2.99",
            "description": "",
            "farmerId": "farmer-1",
            "category": "Vegetable",
            "quantity": 50,
            "unit": "kg"
        }))
        .unwrap();

        let err = backend.update_listing(&listing).await.unwrap_err();
        assert!(matches!(err, BackendError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_missing_listing_is_noop() {
        let backend = MemoryBackend::new();
        assert!(backend.delete_listing(&CropId::new("crop-9")).await.is_ok());
    }

    #[tokio::test]
    async fn test_injected_write_failure() {
        let backend = MemoryBackend::new();
        backend.set_fail_writes(true);
        let err = backend
            .upsert_profile(&Identity {
                id: UserId::new("farmer-1"),
                name: "John".to_string(),
                role: cropcart_core::Role::Farmer,
                avatar_url: None,
                contact: None,
                email: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Api { status: 503, .. }));
        assert!(acquire(&backend.users).is_empty());
    }

    #[tokio::test]
    async fn test_sign_in_emits_event() {
        let backend = MemoryBackend::new();
        let email = Email::parse("jane@example.com").unwrap();
        backend.seed_account(&email, "hunter22", UserId::new("buyer-1"));

        let mut events = backend.subscribe();
        let user_id = backend.sign_in(&email, "hunter22").await.unwrap();
        assert_eq!(user_id, UserId::new("buyer-1"));
        assert_eq!(
            events.recv().await.unwrap(),
            AuthEvent::SignedIn(UserId::new("buyer-1"))
        );
    }

    #[tokio::test]
    async fn test_sign_in_rejects_bad_password() {
        let backend = MemoryBackend::new();
        let email = Email::parse("jane@example.com").unwrap();
        backend.seed_account(&email, "hunter22", UserId::new("buyer-1"));

        let err = backend.sign_in(&email, "wrong").await.unwrap_err();
        assert!(matches!(err, BackendError::InvalidCredentials));
    }
}

//! Boundary to the hosted backend services.
//!
//! # Architecture
//!
//! The backend is three managed services behind one project: a document
//! database (collections `users`, `crops`, `orders`), an email+password
//! authentication service that pushes identity-changed events, and a blob
//! store for listing images. The stores in this crate only ever see the
//! three traits below; the concrete wiring is either [`HttpBackend`] (the
//! hosted service) or [`MemoryBackend`] (in-process, for tests).
//!
//! Reads are query-by-equality plus optional sort; writes are
//! whole-document create/update/delete with per-document atomicity. No
//! cross-document transactions exist, and none are required.

mod http;
mod memory;

pub use http::HttpBackend;
pub use memory::MemoryBackend;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

use cropcart_core::{CropId, Email, OrderId, OrderStatus, Timestamp, UserId};

use crate::models::{Identity, Listing, Order, OrderDraft};

/// Errors that can occur when talking to the hosted backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// HTTP transport failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body could not be decoded.
    #[error("response parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Referenced document does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Session token missing, expired, or revoked.
    #[error("unauthorized")]
    Unauthorized,

    /// Backend security rules rejected the operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Sign-in rejected the email/password pair.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Sign-up rejected a duplicate email.
    #[error("email already registered")]
    EmailInUse,

    /// Rate limited, retry after the given number of seconds.
    #[error("rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Any other non-success response.
    #[error("backend error (HTTP {status}): {message}")]
    Api { status: u16, message: String },
}

/// An asynchronous identity-changed notification from the auth service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// A user signed in (locally or out-of-band, e.g. token restore).
    SignedIn(UserId),
    /// The session ended.
    SignedOut,
}

/// Document CRUD over the three backend collections.
#[async_trait]
pub trait DataService: Send + Sync {
    /// Fetch every listing. Public data; callable before auth resolves.
    async fn fetch_listings(&self) -> Result<Vec<Listing>, BackendError>;

    /// Create a listing document keyed by `listing.id`.
    async fn create_listing(&self, listing: &Listing) -> Result<(), BackendError>;

    /// Replace the listing document with the same id.
    ///
    /// Fails with [`BackendError::NotFound`] if no such document exists.
    async fn update_listing(&self, listing: &Listing) -> Result<(), BackendError>;

    /// Delete a listing document. Deleting an absent id is a no-op.
    async fn delete_listing(&self, id: &CropId) -> Result<(), BackendError>;

    /// Fetch a single profile, or `None` if the document is missing.
    async fn fetch_profile(&self, id: &UserId) -> Result<Option<Identity>, BackendError>;

    /// Fetch every farmer profile.
    async fn fetch_farmers(&self) -> Result<Vec<Identity>, BackendError>;

    /// Create or replace a profile document keyed by `profile.id`.
    async fn upsert_profile(&self, profile: &Identity) -> Result<(), BackendError>;

    /// Atomically create an order document; the returned order carries the
    /// backend's authoritative write-time.
    async fn create_order(&self, draft: &OrderDraft) -> Result<Order, BackendError>;

    /// Fetch a single order, or `None` if the document is missing.
    async fn fetch_order(&self, id: &OrderId) -> Result<Option<Order>, BackendError>;

    /// Orders where `buyer.id` equals the given user.
    ///
    /// No ordering is guaranteed; callers sort locally.
    async fn fetch_orders_for_buyer(&self, buyer: &UserId) -> Result<Vec<Order>, BackendError>;

    /// Orders whose `farmer_ids` contains the given farmer.
    ///
    /// No ordering is guaranteed; callers sort locally.
    async fn fetch_orders_for_farmer(&self, farmer: &UserId) -> Result<Vec<Order>, BackendError>;

    /// Overwrite the status field of an order document.
    ///
    /// Fails with [`BackendError::NotFound`] if no such document exists.
    async fn set_order_status(
        &self,
        id: &OrderId,
        status: OrderStatus,
    ) -> Result<(), BackendError>;
}

/// Email+password authentication and identity-changed notifications.
#[async_trait]
pub trait AuthGateway: Send + Sync {
    /// Register a new account; returns the new auth subject.
    async fn sign_up(&self, email: &Email, password: &str) -> Result<UserId, BackendError>;

    /// Authenticate; returns the auth subject and establishes the session.
    async fn sign_in(&self, email: &Email, password: &str) -> Result<UserId, BackendError>;

    /// Terminate the remote session.
    async fn sign_out(&self) -> Result<(), BackendError>;

    /// Subscribe to identity-changed events for the life of the process.
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;
}

/// Binary payload upload returning a durable public URL.
///
/// Used by the listing-image-upload collaborator, not by the core stores.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, BackendError>;
}

/// The conventional blob path for a listing image:
/// `crop-images/{farmer_id}/{timestamp}_{filename}`.
#[must_use]
pub fn crop_image_path(farmer_id: &UserId, filename: &str) -> String {
    format!(
        "crop-images/{farmer_id}/{}_{filename}",
        Timestamp::now().epoch_millis()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_display() {
        let err = BackendError::NotFound("crops/crop-123".to_string());
        assert_eq!(err.to_string(), "not found: crops/crop-123");

        let err = BackendError::RateLimited(60);
        assert_eq!(err.to_string(), "rate limited, retry after 60 seconds");
    }

    #[test]
    fn test_crop_image_path_shape() {
        let path = crop_image_path(&UserId::new("farmer-1"), "tomatoes.png");
        assert!(path.starts_with("crop-images/farmer-1/"));
        assert!(path.ends_with("_tomatoes.png"));
    }
}

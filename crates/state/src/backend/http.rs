//! HTTP client for the hosted backend.
//!
//! Speaks the backend's JSON document API with `reqwest`: whole-document
//! reads/writes under `v1/{collection}/{id}`, equality-filter queries via
//! query parameters, and a small auth surface (`signup`/`signin`/
//! `signout`) that yields a bearer token held for the life of the session.
//! Every request carries the project API key; authenticated requests also
//! carry the bearer token.

use std::sync::Mutex;

use reqwest::{RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::broadcast;
use tracing::instrument;
use url::Url;

use async_trait::async_trait;

use cropcart_core::{CropId, Email, OrderId, OrderStatus, UserId};

use crate::config::AppConfig;
use crate::models::{Identity, Listing, Order, OrderDraft};
use crate::sync::acquire;

use super::{AuthEvent, AuthGateway, BackendError, BlobStore, DataService};

/// Capacity of the identity-changed event channel. Events are tiny and the
/// session manager drains them promptly.
const AUTH_EVENT_CAPACITY: usize = 16;

/// Client for the hosted document/auth/blob services.
///
/// Cheaply cloneable; all clones share the HTTP connection pool and the
/// session token.
#[derive(Clone)]
pub struct HttpBackend {
    inner: std::sync::Arc<HttpBackendInner>,
}

struct HttpBackendInner {
    client: reqwest::Client,
    data_base: Url,
    auth_base: Url,
    storage_base: Url,
    api_key: SecretString,
    /// Bearer token captured at sign-in, cleared at sign-out.
    session_token: Mutex<Option<SecretString>>,
    events: broadcast::Sender<AuthEvent>,
}

impl HttpBackend {
    /// Create a new backend client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(config: &AppConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        let (events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);

        Ok(Self {
            inner: std::sync::Arc::new(HttpBackendInner {
                client,
                data_base: with_trailing_slash(&config.api_base),
                auth_base: with_trailing_slash(&config.auth_base),
                storage_base: with_trailing_slash(&config.storage_base),
                api_key: config.api_key.clone(),
                session_token: Mutex::new(None),
                events,
            }),
        })
    }

    /// Build a request with the project API key and, when a session is
    /// active, the bearer token.
    fn request(&self, method: reqwest::Method, url: Url) -> RequestBuilder {
        let mut builder = self
            .inner
            .client
            .request(method, url)
            .header("x-api-key", self.inner.api_key.expose_secret());

        let token = acquire(&self.inner.session_token).clone();
        if let Some(token) = token {
            builder = builder.bearer_auth(token.expose_secret());
        }

        builder
    }

    fn data_url(&self, path: &str) -> Result<Url, BackendError> {
        join(&self.inner.data_base, path)
    }

    fn auth_url(&self, path: &str) -> Result<Url, BackendError> {
        join(&self.inner.auth_base, path)
    }

    fn storage_url(&self, path: &str) -> Result<Url, BackendError> {
        join(&self.inner.storage_base, path)
    }

    fn set_session_token(&self, token: Option<SecretString>) {
        *acquire(&self.inner.session_token) = token;
    }

    fn emit(&self, event: AuthEvent) {
        // A send error only means no subscriber is attached yet.
        let _ = self.inner.events.send(event);
    }

    /// Run the auth endpoint that establishes a session and record its
    /// token.
    async fn establish_session(
        &self,
        path: &str,
        email: &Email,
        password: &str,
        conflict_error: BackendError,
    ) -> Result<UserId, BackendError> {
        let url = self.auth_url(path)?;
        let response = self
            .request(reqwest::Method::POST, url)
            .json(&Credentials {
                email: email.as_str(),
                password,
            })
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
            return Err(BackendError::InvalidCredentials);
        }
        if status == StatusCode::CONFLICT {
            return Err(conflict_error);
        }

        let session: SessionResponse = read_json(check(response, path).await?).await?;
        self.set_session_token(Some(SecretString::from(session.token)));
        self.emit(AuthEvent::SignedIn(session.user_id.clone()));
        Ok(session.user_id)
    }
}

// =============================================================================
// DataService
// =============================================================================

#[async_trait]
impl DataService for HttpBackend {
    #[instrument(skip(self))]
    async fn fetch_listings(&self) -> Result<Vec<Listing>, BackendError> {
        let url = self.data_url("v1/crops")?;
        let response = self.request(reqwest::Method::GET, url).send().await?;
        read_json(check(response, "crops").await?).await
    }

    #[instrument(skip(self, listing), fields(id = %listing.id))]
    async fn create_listing(&self, listing: &Listing) -> Result<(), BackendError> {
        let url = self.data_url(&format!("v1/crops/{}", listing.id))?;
        let response = self
            .request(reqwest::Method::PUT, url)
            .json(listing)
            .send()
            .await?;
        check(response, &format!("crops/{}", listing.id)).await?;
        Ok(())
    }

    #[instrument(skip(self, listing), fields(id = %listing.id))]
    async fn update_listing(&self, listing: &Listing) -> Result<(), BackendError> {
        let url = self.data_url(&format!("v1/crops/{}", listing.id))?;
        let response = self
            .request(reqwest::Method::PATCH, url)
            .json(listing)
            .send()
            .await?;
        check(response, &format!("crops/{}", listing.id)).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(id = %id))]
    async fn delete_listing(&self, id: &CropId) -> Result<(), BackendError> {
        let url = self.data_url(&format!("v1/crops/{id}"))?;
        let response = self.request(reqwest::Method::DELETE, url).send().await?;
        match check(response, &format!("crops/{id}")).await {
            // Deleting an absent document is a no-op, not an error.
            Ok(_) | Err(BackendError::NotFound(_)) => Ok(()),
            Err(other) => Err(other),
        }
    }

    #[instrument(skip(self), fields(id = %id))]
    async fn fetch_profile(&self, id: &UserId) -> Result<Option<Identity>, BackendError> {
        let url = self.data_url(&format!("v1/users/{id}"))?;
        let response = self.request(reqwest::Method::GET, url).send().await?;
        match check(response, &format!("users/{id}")).await {
            Ok(response) => Ok(Some(read_json(response).await?)),
            Err(BackendError::NotFound(_)) => Ok(None),
            Err(other) => Err(other),
        }
    }

    #[instrument(skip(self))]
    async fn fetch_farmers(&self) -> Result<Vec<Identity>, BackendError> {
        let url = self.data_url("v1/users")?;
        let response = self
            .request(reqwest::Method::GET, url)
            .query(&[("role", "farmer")])
            .send()
            .await?;
        read_json(check(response, "users").await?).await
    }

    #[instrument(skip(self, profile), fields(id = %profile.id))]
    async fn upsert_profile(&self, profile: &Identity) -> Result<(), BackendError> {
        let url = self.data_url(&format!("v1/users/{}", profile.id))?;
        let response = self
            .request(reqwest::Method::PUT, url)
            .json(profile)
            .send()
            .await?;
        check(response, &format!("users/{}", profile.id)).await?;
        Ok(())
    }

    #[instrument(skip(self, draft), fields(id = %draft.id))]
    async fn create_order(&self, draft: &OrderDraft) -> Result<Order, BackendError> {
        let url = self.data_url("v1/orders")?;
        let response = self
            .request(reqwest::Method::POST, url)
            .json(draft)
            .send()
            .await?;
        // The stored document comes back with the server-assigned date.
        read_json(check(response, "orders").await?).await
    }

    #[instrument(skip(self), fields(id = %id))]
    async fn fetch_order(&self, id: &OrderId) -> Result<Option<Order>, BackendError> {
        let url = self.data_url(&format!("v1/orders/{id}"))?;
        let response = self.request(reqwest::Method::GET, url).send().await?;
        match check(response, &format!("orders/{id}")).await {
            Ok(response) => Ok(Some(read_json(response).await?)),
            Err(BackendError::NotFound(_)) => Ok(None),
            Err(other) => Err(other),
        }
    }

    #[instrument(skip(self), fields(buyer = %buyer))]
    async fn fetch_orders_for_buyer(&self, buyer: &UserId) -> Result<Vec<Order>, BackendError> {
        let url = self.data_url("v1/orders")?;
        let response = self
            .request(reqwest::Method::GET, url)
            .query(&[("buyerId", buyer.as_str())])
            .send()
            .await?;
        read_json(check(response, "orders").await?).await
    }

    #[instrument(skip(self), fields(farmer = %farmer))]
    async fn fetch_orders_for_farmer(&self, farmer: &UserId) -> Result<Vec<Order>, BackendError> {
        let url = self.data_url("v1/orders")?;
        let response = self
            .request(reqwest::Method::GET, url)
            .query(&[("farmerId", farmer.as_str())])
            .send()
            .await?;
        read_json(check(response, "orders").await?).await
    }

    #[instrument(skip(self), fields(id = %id, status = %status))]
    async fn set_order_status(
        &self,
        id: &OrderId,
        status: OrderStatus,
    ) -> Result<(), BackendError> {
        let url = self.data_url(&format!("v1/orders/{id}/status"))?;
        let response = self
            .request(reqwest::Method::PATCH, url)
            .json(&StatusPatch { status })
            .send()
            .await?;
        check(response, &format!("orders/{id}")).await?;
        Ok(())
    }
}

// =============================================================================
// AuthGateway
// =============================================================================

#[async_trait]
impl AuthGateway for HttpBackend {
    #[instrument(skip(self, password), fields(email = %email))]
    async fn sign_up(&self, email: &Email, password: &str) -> Result<UserId, BackendError> {
        self.establish_session("signup", email, password, BackendError::EmailInUse)
            .await
    }

    #[instrument(skip(self, password), fields(email = %email))]
    async fn sign_in(&self, email: &Email, password: &str) -> Result<UserId, BackendError> {
        self.establish_session("signin", email, password, BackendError::InvalidCredentials)
            .await
    }

    #[instrument(skip(self))]
    async fn sign_out(&self) -> Result<(), BackendError> {
        let url = self.auth_url("signout")?;
        let response = self.request(reqwest::Method::POST, url).send().await?;
        check(response, "signout").await?;
        self.set_session_token(None);
        self.emit(AuthEvent::SignedOut);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.events.subscribe()
    }
}

// =============================================================================
// BlobStore
// =============================================================================

#[async_trait]
impl BlobStore for HttpBackend {
    #[instrument(skip(self, bytes), fields(path = %path, size = bytes.len()))]
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, BackendError> {
        let url = self.storage_url(path)?;
        let response = self
            .request(reqwest::Method::POST, url)
            .header("Content-Type", content_type)
            .body(bytes)
            .send()
            .await?;
        let upload: UploadResponse = read_json(check(response, path).await?).await?;
        Ok(upload.url)
    }
}

// =============================================================================
// Wire helpers
// =============================================================================

#[derive(Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    user_id: UserId,
    token: String,
}

#[derive(serde::Deserialize)]
struct UploadResponse {
    url: String,
}

#[derive(Serialize)]
struct StatusPatch {
    status: OrderStatus,
}

fn with_trailing_slash(url: &Url) -> Url {
    if url.path().ends_with('/') {
        return url.clone();
    }
    let mut fixed = url.clone();
    fixed.set_path(&format!("{}/", url.path()));
    fixed
}

fn join(base: &Url, path: &str) -> Result<Url, BackendError> {
    base.join(path).map_err(|e| BackendError::Api {
        status: 0,
        message: format!("invalid request path {path:?}: {e}"),
    })
}

/// Map a non-success response to a [`BackendError`], reading the body for
/// diagnostics.
async fn check(response: Response, what: &str) -> Result<Response, BackendError> {
    let status = response.status();

    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(1);
        return Err(BackendError::RateLimited(retry_after));
    }

    let body = response.text().await.unwrap_or_default();
    let message: String = body.chars().take(200).collect();

    match status {
        StatusCode::NOT_FOUND => Err(BackendError::NotFound(what.to_string())),
        StatusCode::UNAUTHORIZED => Err(BackendError::Unauthorized),
        StatusCode::FORBIDDEN => Err(BackendError::PermissionDenied(message)),
        _ => {
            tracing::error!(
                status = %status,
                body = %message,
                "backend returned non-success status"
            );
            Err(BackendError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }
}

/// Read a response body as text first, so decode failures carry the
/// offending payload in the logs.
async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, BackendError> {
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| {
        tracing::error!(
            error = %e,
            body = %body.chars().take(500).collect::<String>(),
            "failed to parse backend response"
        );
        BackendError::Parse(e)
    })
}

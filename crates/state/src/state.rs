//! Application state shared across the presentation layer.
//!
//! One explicit container instead of an ambient global: every view or
//! handler receives an [`AppState`] (cheap `Arc` clone) and reaches the
//! stores through accessors. Cross-store orchestration (what happens when
//! the identity changes) lives here, so no store ever reaches into another
//! behind the scenes.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{error, instrument};

use cropcart_core::{Email, Role, UserId};

use crate::backend::{
    AuthEvent, AuthGateway, BackendError, BlobStore, DataService, HttpBackend,
};
use crate::cache::{CacheError, FsCache, LocalCache};
use crate::cart::{CartStore, WishlistStore};
use crate::catalog::CatalogStore;
use crate::config::AppConfig;
use crate::error::{Result, StateError};
use crate::models::Identity;
use crate::orders::OrderPipeline;
use crate::session::{SessionManager, SessionPhase};

/// Error creating the application state from configuration.
#[derive(Debug, thiserror::Error)]
pub enum StateInitError {
    #[error("backend client error: {0}")]
    Backend(#[from] BackendError),
    #[error("local cache error: {0}")]
    Cache(#[from] CacheError),
}

/// Application state shared across all consumers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to the
/// session, the stores, and the blob-upload boundary.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: AppConfig,
    data: Arc<dyn DataService>,
    auth: Arc<dyn AuthGateway>,
    blobs: Arc<dyn BlobStore>,
    session: Arc<SessionManager>,
    catalog: CatalogStore,
    cart: CartStore,
    wishlist: WishlistStore,
    orders: OrderPipeline,
}

impl AppState {
    /// Wire the stores over explicit backend handles and a local cache.
    ///
    /// Used directly by tests (with the in-memory backend) and by
    /// [`Self::from_config`] for the hosted backend.
    #[must_use]
    pub fn new(
        config: AppConfig,
        data: Arc<dyn DataService>,
        auth: Arc<dyn AuthGateway>,
        blobs: Arc<dyn BlobStore>,
        cache: Arc<dyn LocalCache>,
    ) -> Self {
        let session = Arc::new(SessionManager::new(Arc::clone(&data)));
        let catalog = CatalogStore::new(Arc::clone(&data), Arc::clone(&session));
        let cart = CartStore::new(
            Arc::clone(&session),
            Arc::clone(&cache),
            config.cache_prefix.clone(),
        );
        let wishlist = WishlistStore::new(
            Arc::clone(&session),
            Arc::clone(&cache),
            config.cache_prefix.clone(),
        );
        let orders = OrderPipeline::new(Arc::clone(&data), Arc::clone(&session));

        Self {
            inner: Arc::new(AppStateInner {
                config,
                data,
                auth,
                blobs,
                session,
                catalog,
                cart,
                wishlist,
                orders,
            }),
        }
    }

    /// Build the state over the hosted backend and the filesystem cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or the cache
    /// directory cannot be created.
    pub fn from_config(config: AppConfig) -> std::result::Result<Self, StateInitError> {
        let backend = Arc::new(HttpBackend::new(&config)?);
        let cache = Arc::new(FsCache::open(&config.cache_dir)?);
        Ok(Self::new(
            config,
            Arc::clone(&backend) as Arc<dyn DataService>,
            Arc::clone(&backend) as Arc<dyn AuthGateway>,
            backend as Arc<dyn BlobStore>,
            cache as Arc<dyn LocalCache>,
        ))
    }

    /// Get a reference to the configuration.
    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    /// Get a reference to the session manager.
    #[must_use]
    pub fn session(&self) -> &SessionManager {
        &self.inner.session
    }

    /// Get a reference to the catalog store.
    #[must_use]
    pub fn catalog(&self) -> &CatalogStore {
        &self.inner.catalog
    }

    /// Get a reference to the cart store.
    #[must_use]
    pub fn cart(&self) -> &CartStore {
        &self.inner.cart
    }

    /// Get a reference to the wishlist store.
    #[must_use]
    pub fn wishlist(&self) -> &WishlistStore {
        &self.inner.wishlist
    }

    /// Get a reference to the order pipeline.
    #[must_use]
    pub fn orders(&self) -> &OrderPipeline {
        &self.inner.orders
    }

    /// Get a reference to the blob-upload boundary (listing images).
    #[must_use]
    pub fn blobs(&self) -> &dyn BlobStore {
        self.inner.blobs.as_ref()
    }

    /// Mark process startup and begin listening for identity events.
    ///
    /// The session enters `Resolving`; the returned task applies every
    /// subsequent auth event to the stores and runs until the event
    /// channel closes. The public catalog can be loaded in parallel;
    /// [`CatalogStore::load_all`] does not wait for authentication.
    pub fn start(&self) -> JoinHandle<()> {
        self.inner.session.begin_startup();
        self.spawn_auth_listener()
    }

    /// Spawn the background task that applies auth events to the stores.
    fn spawn_auth_listener(&self) -> JoinHandle<()> {
        let mut events = self.inner.auth.subscribe();
        let state = self.clone();
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                if let Err(e) = state.handle_auth_event(event).await {
                    error!(error = %e, "failed to apply auth event");
                }
            }
        })
    }

    /// Apply a single identity-changed event.
    ///
    /// Entering `Authenticated` hydrates the cart/wishlist from the local
    /// cache, then reloads the catalog and the order list for the new
    /// identity. Entering `Anonymous` clears the per-user stores (the
    /// public catalog stays).
    ///
    /// # Errors
    ///
    /// Propagates store errors from the post-authentication loads.
    #[instrument(skip(self))]
    pub async fn handle_auth_event(&self, event: AuthEvent) -> Result<()> {
        match event {
            AuthEvent::SignedIn(user_id) => {
                let resolved = self.inner.session.resolve_signed_in(&user_id).await?;
                match resolved {
                    Some(identity) => {
                        self.inner.cart.hydrate(&identity.id);
                        self.inner.wishlist.hydrate(&identity.id);
                        self.inner.catalog.load_all().await?;
                        self.inner.orders.load_for_current_user().await?;
                    }
                    // Stale resolution or missing profile; if the session
                    // actually fell to anonymous, drop per-user state.
                    None => {
                        if matches!(self.inner.session.phase(), SessionPhase::Anonymous) {
                            self.clear_per_user_state();
                        }
                    }
                }
            }
            AuthEvent::SignedOut => {
                self.inner.session.resolve_signed_out();
                self.clear_per_user_state();
            }
        }
        Ok(())
    }

    /// Sign in with email and password.
    ///
    /// On success the session is authenticated, the cart/wishlist are
    /// hydrated, and the catalog and orders are loaded for the identity.
    ///
    /// # Errors
    ///
    /// Returns `Auth` for rejected credentials or an account without a
    /// profile document, and propagates load failures.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn sign_in(&self, email: &Email, password: &str) -> Result<Identity> {
        let user_id = self
            .inner
            .auth
            .sign_in(email, password)
            .await
            .map_err(auth_error)?;

        self.handle_auth_event(AuthEvent::SignedIn(user_id)).await?;

        self.inner
            .session
            .current_identity()
            .ok_or_else(|| StateError::Auth("account has no profile".to_string()))
    }

    /// Register a new account and create its profile document.
    ///
    /// The role chosen here is permanent; profile edits cannot change it.
    ///
    /// # Errors
    ///
    /// Returns `Auth` if the email is already registered, `RemoteWrite` if
    /// the profile document cannot be created, and propagates load
    /// failures.
    #[instrument(skip(self, password), fields(email = %email, role = %role))]
    pub async fn sign_up(
        &self,
        email: &Email,
        password: &str,
        name: String,
        role: Role,
    ) -> Result<Identity> {
        let user_id = self
            .inner
            .auth
            .sign_up(email, password)
            .await
            .map_err(auth_error)?;

        let profile = Identity {
            id: user_id.clone(),
            name,
            role,
            avatar_url: None,
            contact: None,
            email: Some(email.clone()),
        };
        self.inner
            .data
            .upsert_profile(&profile)
            .await
            .map_err(StateError::write)?;

        self.handle_auth_event(AuthEvent::SignedIn(user_id)).await?;
        Ok(profile)
    }

    /// Terminate the session and clear the current user's cart/wishlist,
    /// including their cache entries.
    ///
    /// If the remote sign-out fails, nothing local changes and the error
    /// propagates so the user can retry.
    ///
    /// # Errors
    ///
    /// Returns `RemoteWrite` if the remote sign-out fails.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<()> {
        let identity = self.inner.session.current_identity();

        self.inner
            .auth
            .sign_out()
            .await
            .map_err(StateError::write)?;

        self.inner.session.resolve_signed_out();
        if let Some(identity) = &identity {
            self.inner.cart.purge(&identity.id);
            self.inner.wishlist.purge(&identity.id);
        } else {
            self.inner.cart.reset();
            self.inner.wishlist.reset();
        }
        self.inner.orders.clear();
        Ok(())
    }

    /// Store a listing image under the conventional blob path and return
    /// the durable URL (used by the image-upload collaborator).
    ///
    /// # Errors
    ///
    /// Returns `RemoteWrite` if the upload fails.
    pub async fn upload_listing_image(
        &self,
        farmer_id: &UserId,
        filename: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String> {
        let path = crate::backend::crop_image_path(farmer_id, filename);
        self.inner
            .blobs
            .upload(&path, bytes, content_type)
            .await
            .map_err(StateError::write)
    }

    fn clear_per_user_state(&self) {
        self.inner.cart.reset();
        self.inner.wishlist.reset();
        self.inner.orders.clear();
    }
}

/// Map auth-gateway failures onto the store taxonomy.
fn auth_error(err: BackendError) -> StateError {
    match err {
        BackendError::InvalidCredentials => {
            StateError::Auth("invalid email or password".to_string())
        }
        BackendError::EmailInUse => {
            StateError::Auth("an account with this email already exists".to_string())
        }
        BackendError::Unauthorized => StateError::Auth("session is no longer valid".to_string()),
        other => StateError::RemoteWrite(other),
    }
}

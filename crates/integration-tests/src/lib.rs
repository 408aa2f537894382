//! Integration tests for CropCart.
//!
//! The scenarios in `tests/` exercise the whole state core (session,
//! catalog, cart/wishlist, orders) wired over the in-memory backend and
//! cache, the same way the presentation layer wires it over the hosted
//! services.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p cropcart-integration-tests
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use cropcart_core::{CropId, Email, Role, UserId};
use cropcart_state::AppState;
use cropcart_state::backend::{AuthGateway, BlobStore, DataService, MemoryBackend};
use cropcart_state::cache::{LocalCache, MemoryCache};
use cropcart_state::config::AppConfig;
use cropcart_state::models::{Identity, Listing};

/// Password used by every seeded test account.
pub const TEST_PASSWORD: &str = "correct-horse-battery";

/// A full application state over the in-memory backend and cache.
pub struct TestContext {
    pub backend: Arc<MemoryBackend>,
    pub cache: Arc<MemoryCache>,
    pub state: AppState,
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TestContext {
    #[must_use]
    pub fn new() -> Self {
        let backend = Arc::new(MemoryBackend::new());
        let cache = Arc::new(MemoryCache::new());
        let state = AppState::new(
            test_config(),
            Arc::clone(&backend) as Arc<dyn DataService>,
            Arc::clone(&backend) as Arc<dyn AuthGateway>,
            Arc::clone(&backend) as Arc<dyn BlobStore>,
            Arc::clone(&cache) as Arc<dyn LocalCache>,
        );
        Self {
            backend,
            cache,
            state,
        }
    }

    /// Seed a profile plus a matching auth account
    /// (`{id}@example.com` / [`TEST_PASSWORD`]).
    pub fn seed_identity(&self, id: &str, name: &str, role: Role) -> Identity {
        let identity = Identity {
            id: UserId::new(id),
            name: name.to_string(),
            role,
            avatar_url: None,
            contact: None,
            email: Some(email_of(id)),
        };
        self.backend.seed_profile(identity.clone());
        self.backend
            .seed_account(&email_of(id), TEST_PASSWORD, identity.id.clone());
        identity
    }

    /// Seed a listing document owned by `farmer`.
    pub fn seed_listing(&self, id: &str, name: &str, price: &str, farmer: &str) -> Listing {
        let listing = listing(id, name, price, farmer);
        self.backend.seed_listing(listing.clone());
        listing
    }

    /// Sign in a previously seeded identity.
    ///
    /// # Panics
    ///
    /// Panics if the sign-in fails; tests seed their identities first.
    pub async fn sign_in_as(&self, id: &str) -> Identity {
        self.state
            .sign_in(&email_of(id), TEST_PASSWORD)
            .await
            .expect("seeded identity should sign in")
    }
}

/// The seeded email for a test identity id.
#[must_use]
pub fn email_of(id: &str) -> Email {
    Email::parse(&format!("{id}@example.com")).expect("test email is valid")
}

/// Build a listing value without seeding it.
#[must_use]
pub fn listing(id: &str, name: &str, price: &str, farmer: &str) -> Listing {
    Listing {
        id: CropId::new(id),
        name: name.to_string(),
        image: "https://placehold.co/600x400.png".to_string(),
        price: price.parse().expect("test price is a valid decimal"),
        description: String::new(),
        category: "Vegetable".to_string(),
        quantity: 50,
        unit: "kg".to_string(),
        location: Some("Accra".to_string()),
        contact: None,
        farmer_id: UserId::new(farmer),
    }
}

fn test_config() -> AppConfig {
    AppConfig {
        api_base: Url::parse("http://localhost:9099").expect("static url"),
        auth_base: Url::parse("http://localhost:9099/auth").expect("static url"),
        storage_base: Url::parse("http://localhost:9099/storage").expect("static url"),
        api_key: SecretString::from("kZ9$vQ2!pL7@mX4#"),
        cache_dir: PathBuf::from(".cropcart-cache"),
        cache_prefix: "cropcart".to_string(),
        request_timeout: Duration::from_secs(5),
    }
}

/// Initialise test logging once; safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

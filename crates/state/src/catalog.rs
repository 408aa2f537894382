//! Public listing catalog and farmer directory.
//!
//! The catalog is public data: `load_all` is safe before authentication
//! resolves and replaces the local collections wholesale (no incremental
//! merge). Mutations are farmer-gated and optimistic: applied locally
//! first, dispatched remotely, rolled back if the backend refuses. Listings
//! are single-owner, so concurrent edits by different farmers never touch
//! the same document and no conflict resolution is needed.

use std::sync::Arc;
use std::sync::Mutex;

use tracing::{debug, instrument};

use cropcart_core::{CropId, Role, UserId};

use crate::backend::DataService;
use crate::error::{Result, StateError};
use crate::models::{Identity, Listing, ListingDraft};
use crate::session::SessionManager;
use crate::sync::acquire;

/// Placeholder shown where a farmer id no longer resolves to a profile.
/// The backend does not enforce referential integrity, so dangling ids are
/// rendered, never treated as errors.
const MISSING_FARMER_PLACEHOLDER: &str = "N/A";

#[derive(Default)]
struct CatalogState {
    listings: Vec<Listing>,
    farmers: Vec<Identity>,
}

/// Holds the denormalized listing catalog and the farmer directory.
pub struct CatalogStore {
    data: Arc<dyn DataService>,
    session: Arc<SessionManager>,
    state: Mutex<CatalogState>,
}

impl CatalogStore {
    /// Create an empty catalog.
    #[must_use]
    pub fn new(data: Arc<dyn DataService>, session: Arc<SessionManager>) -> Self {
        Self {
            data,
            session,
            state: Mutex::new(CatalogState::default()),
        }
    }

    /// Every listing currently loaded.
    #[must_use]
    pub fn listings(&self) -> Vec<Listing> {
        acquire(&self.state).listings.clone()
    }

    /// A single listing by id.
    #[must_use]
    pub fn listing(&self, id: &CropId) -> Option<Listing> {
        acquire(&self.state)
            .listings
            .iter()
            .find(|l| &l.id == id)
            .cloned()
    }

    /// Every farmer profile currently loaded.
    #[must_use]
    pub fn farmers(&self) -> Vec<Identity> {
        acquire(&self.state).farmers.clone()
    }

    /// The display name for a farmer id, or `"N/A"` when the id does not
    /// resolve to a loaded profile.
    #[must_use]
    pub fn farmer_display_name(&self, id: &UserId) -> String {
        acquire(&self.state)
            .farmers
            .iter()
            .find(|f| &f.id == id)
            .map_or_else(
                || MISSING_FARMER_PLACEHOLDER.to_string(),
                |f| f.name.clone(),
            )
    }

    /// Fetch every listing and every farmer profile, replacing the local
    /// collections wholesale.
    ///
    /// Idempotent and safe to call before authentication resolves. If the
    /// session epoch moves while the fetch is in flight (e.g. a logout),
    /// the result is discarded.
    ///
    /// # Errors
    ///
    /// Returns `RemoteRead` if either fetch fails; local collections are
    /// left as they were.
    #[instrument(skip(self))]
    pub async fn load_all(&self) -> Result<()> {
        let epoch = self.session.epoch();

        let listings = self
            .data
            .fetch_listings()
            .await
            .map_err(StateError::read)?;
        let farmers = self.data.fetch_farmers().await.map_err(StateError::read)?;

        if !self.session.is_current(epoch) {
            debug!("discarding stale catalog load");
            return Ok(());
        }

        let mut state = acquire(&self.state);
        state.listings = listings;
        state.farmers = farmers;
        Ok(())
    }

    /// Create a listing owned by the signed-in farmer.
    ///
    /// Assigns a fresh id, appends locally, then persists; the optimistic
    /// append is rolled back if the remote write fails.
    ///
    /// # Errors
    ///
    /// Returns `AuthRequired` if nobody is signed in, `Permission` if the
    /// caller is not a farmer, `Invalid` for a negative price, or
    /// `RemoteWrite` if the backend rejects the document.
    #[instrument(skip(self, draft), fields(name = %draft.name))]
    pub async fn add(&self, draft: ListingDraft) -> Result<Listing> {
        let caller = self
            .session
            .current_identity()
            .ok_or(StateError::AuthRequired)?;
        if caller.role != Role::Farmer {
            return Err(StateError::Permission(
                "only farmers create listings".to_string(),
            ));
        }
        if draft.price.is_negative() {
            return Err(StateError::Invalid("price must be >= 0".to_string()));
        }

        let listing = draft.into_listing(CropId::generate(), caller.id);

        acquire(&self.state).listings.push(listing.clone());

        if let Err(e) = self.data.create_listing(&listing).await {
            acquire(&self.state).listings.retain(|l| l.id != listing.id);
            return Err(StateError::write(e));
        }

        Ok(listing)
    }

    /// Replace an existing listing.
    ///
    /// The replacement is applied locally first and rolled back if the
    /// remote write fails; a missing remote document surfaces as
    /// `NotFound`.
    ///
    /// # Errors
    ///
    /// Returns `AuthRequired`, `Permission` (caller is not the owning
    /// farmer), `Invalid` (negative price), `NotFound`, or `RemoteWrite`.
    #[instrument(skip(self, listing), fields(id = %listing.id))]
    pub async fn update(&self, listing: Listing) -> Result<()> {
        let caller = self
            .session
            .current_identity()
            .ok_or(StateError::AuthRequired)?;
        if caller.role != Role::Farmer || listing.farmer_id != caller.id {
            return Err(StateError::Permission(
                "only the owning farmer may edit a listing".to_string(),
            ));
        }
        if listing.price.is_negative() {
            return Err(StateError::Invalid("price must be >= 0".to_string()));
        }

        // Optimistic replace, remembering the previous entry for rollback.
        let previous = {
            let mut state = acquire(&self.state);
            match state.listings.iter_mut().find(|l| l.id == listing.id) {
                Some(stored) => {
                    if stored.farmer_id != caller.id {
                        return Err(StateError::Permission(
                            "only the owning farmer may edit a listing".to_string(),
                        ));
                    }
                    Some(std::mem::replace(stored, listing.clone()))
                }
                None => None,
            }
        };

        if let Err(e) = self.data.update_listing(&listing).await {
            if let Some(previous) = previous {
                let mut state = acquire(&self.state);
                if let Some(stored) = state.listings.iter_mut().find(|l| l.id == listing.id) {
                    *stored = previous;
                }
            }
            return Err(StateError::write(e));
        }

        Ok(())
    }

    /// Delete a listing.
    ///
    /// Idempotent: removing an id that is not in the catalog is a no-op,
    /// not an error. The optimistic removal is rolled back if the remote
    /// delete fails transiently.
    ///
    /// # Errors
    ///
    /// Returns `AuthRequired`, `Permission` (caller is not the owning
    /// farmer), or `RemoteWrite`.
    #[instrument(skip(self), fields(id = %id))]
    pub async fn remove(&self, id: &CropId) -> Result<()> {
        let caller = self
            .session
            .current_identity()
            .ok_or(StateError::AuthRequired)?;
        if caller.role != Role::Farmer {
            return Err(StateError::Permission(
                "only farmers delete listings".to_string(),
            ));
        }

        // Optimistic removal, remembering position for rollback.
        let removed = {
            let mut state = acquire(&self.state);
            match state.listings.iter().position(|l| &l.id == id) {
                Some(index) => {
                    if state
                        .listings
                        .get(index)
                        .is_some_and(|l| l.farmer_id != caller.id)
                    {
                        return Err(StateError::Permission(
                            "only the owning farmer may delete a listing".to_string(),
                        ));
                    }
                    Some((index, state.listings.remove(index)))
                }
                // Unknown id: no-op by contract.
                None => return Ok(()),
            }
        };

        if let Err(e) = self.data.delete_listing(id).await {
            // The backend treats a missing document as deleted; anything
            // else restores the optimistic removal.
            if !matches!(e, crate::backend::BackendError::NotFound(_)) {
                if let Some((index, listing)) = removed {
                    let mut state = acquire(&self.state);
                    let index = index.min(state.listings.len());
                    state.listings.insert(index, listing);
                }
                return Err(StateError::RemoteWrite(e));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    fn identity(id: &str, role: Role) -> Identity {
        Identity {
            id: UserId::new(id),
            name: format!("user {id}"),
            role,
            avatar_url: None,
            contact: None,
            email: None,
        }
    }

    fn draft(name: &str) -> ListingDraft {
        ListingDraft {
            name: name.to_string(),
            image: "https://img.example/x.png".to_string(),
            price: "2.99".parse().unwrap(),
            description: String::new(),
            category: "Vegetable".to_string(),
            quantity: 10,
            unit: "kg".to_string(),
            location: None,
            contact: None,
        }
    }

    async fn signed_in_catalog(
        backend: &Arc<MemoryBackend>,
        who: &Identity,
    ) -> (CatalogStore, Arc<SessionManager>) {
        backend.seed_profile(who.clone());
        let session = Arc::new(SessionManager::new(
            Arc::clone(backend) as Arc<dyn DataService>
        ));
        session.resolve_signed_in(&who.id).await.unwrap();
        let catalog = CatalogStore::new(
            Arc::clone(backend) as Arc<dyn DataService>,
            Arc::clone(&session),
        );
        (catalog, session)
    }

    #[tokio::test]
    async fn test_load_all_replaces_wholesale() {
        let backend = Arc::new(MemoryBackend::new());
        let farmer = identity("farmer-1", Role::Farmer);
        let (catalog, _session) = signed_in_catalog(&backend, &farmer).await;

        catalog.add(draft("Organic Tomatoes")).await.unwrap();
        assert_eq!(catalog.listings().len(), 1);

        // A reload replaces rather than merges.
        catalog.load_all().await.unwrap();
        assert_eq!(catalog.listings().len(), 1);
        assert_eq!(catalog.farmers(), vec![farmer]);
    }

    #[tokio::test]
    async fn test_add_requires_farmer_role() {
        let backend = Arc::new(MemoryBackend::new());
        let buyer = identity("buyer-1", Role::Buyer);
        let (catalog, _session) = signed_in_catalog(&backend, &buyer).await;

        let err = catalog.add(draft("Organic Tomatoes")).await.unwrap_err();
        assert!(matches!(err, StateError::Permission(_)));
        assert!(catalog.listings().is_empty());
        assert!(backend.stored_listings().is_empty());
    }

    #[tokio::test]
    async fn test_add_rolls_back_on_remote_failure() {
        let backend = Arc::new(MemoryBackend::new());
        let farmer = identity("farmer-1", Role::Farmer);
        let (catalog, _session) = signed_in_catalog(&backend, &farmer).await;

        backend.set_fail_writes(true);
        let err = catalog.add(draft("Organic Tomatoes")).await.unwrap_err();
        assert!(matches!(err, StateError::RemoteWrite(_)));
        assert!(catalog.listings().is_empty());
    }

    #[tokio::test]
    async fn test_update_by_non_owner_is_denied_and_catalog_unchanged() {
        let backend = Arc::new(MemoryBackend::new());
        let farmer = identity("farmer-1", Role::Farmer);
        let (catalog, session) = signed_in_catalog(&backend, &farmer).await;
        let listing = catalog.add(draft("Organic Tomatoes")).await.unwrap();

        // Another farmer signs in on this client.
        let intruder = identity("farmer-2", Role::Farmer);
        backend.seed_profile(intruder.clone());
        session.resolve_signed_in(&intruder.id).await.unwrap();

        let mut stolen = listing.clone();
        stolen.name = "Cheap Tomatoes".to_string();
        let err = catalog.update(stolen).await.unwrap_err();
        assert!(matches!(err, StateError::Permission(_)));
        assert_eq!(catalog.listing(&listing.id).unwrap().name, "Organic Tomatoes");
    }

    #[tokio::test]
    async fn test_update_missing_listing_is_not_found() {
        let backend = Arc::new(MemoryBackend::new());
        let farmer = identity("farmer-1", Role::Farmer);
        let (catalog, _session) = signed_in_catalog(&backend, &farmer).await;

        let listing =
            draft("Ghost Crop").into_listing(CropId::new("crop-ghost"), farmer.id.clone());
        let err = catalog.update(listing).await.unwrap_err();
        assert!(matches!(err, StateError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_update_rolls_back_on_remote_failure() {
        let backend = Arc::new(MemoryBackend::new());
        let farmer = identity("farmer-1", Role::Farmer);
        let (catalog, _session) = signed_in_catalog(&backend, &farmer).await;
        let listing = catalog.add(draft("Organic Tomatoes")).await.unwrap();

        backend.set_fail_writes(true);
        let mut edited = listing.clone();
        edited.name = "Heirloom Tomatoes".to_string();
        let err = catalog.update(edited).await.unwrap_err();
        assert!(matches!(err, StateError::RemoteWrite(_)));
        assert_eq!(catalog.listing(&listing.id).unwrap().name, "Organic Tomatoes");
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let backend = Arc::new(MemoryBackend::new());
        let farmer = identity("farmer-1", Role::Farmer);
        let (catalog, _session) = signed_in_catalog(&backend, &farmer).await;
        let listing = catalog.add(draft("Organic Tomatoes")).await.unwrap();

        catalog.remove(&listing.id).await.unwrap();
        assert!(catalog.listings().is_empty());
        // Removing again is a no-op, not an error.
        catalog.remove(&listing.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_remove_by_non_owner_is_denied() {
        let backend = Arc::new(MemoryBackend::new());
        let farmer = identity("farmer-1", Role::Farmer);
        let (catalog, session) = signed_in_catalog(&backend, &farmer).await;
        let listing = catalog.add(draft("Organic Tomatoes")).await.unwrap();

        let intruder = identity("farmer-2", Role::Farmer);
        backend.seed_profile(intruder.clone());
        session.resolve_signed_in(&intruder.id).await.unwrap();

        let err = catalog.remove(&listing.id).await.unwrap_err();
        assert!(matches!(err, StateError::Permission(_)));
        assert_eq!(catalog.listings().len(), 1);
    }

    #[tokio::test]
    async fn test_remove_rolls_back_on_remote_failure() {
        let backend = Arc::new(MemoryBackend::new());
        let farmer = identity("farmer-1", Role::Farmer);
        let (catalog, _session) = signed_in_catalog(&backend, &farmer).await;
        let listing = catalog.add(draft("Organic Tomatoes")).await.unwrap();

        backend.set_fail_writes(true);
        let err = catalog.remove(&listing.id).await.unwrap_err();
        assert!(matches!(err, StateError::RemoteWrite(_)));
        assert_eq!(catalog.listings().len(), 1);
    }

    #[tokio::test]
    async fn test_farmer_display_name_placeholder_for_dangling_id() {
        let backend = Arc::new(MemoryBackend::new());
        let farmer = identity("farmer-1", Role::Farmer);
        let (catalog, _session) = signed_in_catalog(&backend, &farmer).await;
        catalog.load_all().await.unwrap();

        assert_eq!(catalog.farmer_display_name(&farmer.id), "user farmer-1");
        assert_eq!(
            catalog.farmer_display_name(&UserId::new("farmer-gone")),
            "N/A"
        );
    }

    #[tokio::test]
    async fn test_stale_load_is_discarded() {
        let backend = Arc::new(MemoryBackend::new());
        let farmer = identity("farmer-1", Role::Farmer);
        let (catalog, session) = signed_in_catalog(&backend, &farmer).await;
        let catalog = Arc::new(catalog);
        backend.seed_listing(
            draft("Organic Tomatoes").into_listing(CropId::new("crop-1"), farmer.id.clone()),
        );

        backend.set_read_delay(std::time::Duration::from_millis(50));
        let loading = {
            let catalog = Arc::clone(&catalog);
            tokio::spawn(async move { catalog.load_all().await })
        };

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        session.resolve_signed_out();

        loading.await.unwrap().unwrap();
        // The stale result never landed.
        assert!(catalog.listings().is_empty());
    }
}

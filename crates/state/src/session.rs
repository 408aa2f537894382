//! Session state machine and epoch guard.
//!
//! The session moves `Unresolved -> Resolving -> {Authenticated, Anonymous}`.
//! External sign-in events take any state back through `Resolving` to
//! `Authenticated`; sign-out events end in `Anonymous`. While `Resolving`,
//! the presentation layer must not render role-specific routes; it checks
//! [`SessionManager::is_resolving`] instead of guessing.
//!
//! None of the remote calls support cancellation, so a superseded fetch can
//! complete after a newer transition has started. Every transition bumps a
//! monotonically increasing **epoch**; async work captures the epoch when
//! issued and its result is discarded if the epoch moved on before it
//! landed.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, instrument, warn};

use cropcart_core::UserId;

use crate::backend::DataService;
use crate::error::{Result, StateError};
use crate::models::{Identity, ProfilePatch};
use crate::sync::acquire;

/// Where the session currently stands.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// Process start; nothing known yet.
    #[default]
    Unresolved,
    /// An identity check is in flight; role routes must not render.
    Resolving,
    /// A signed-in user with a loaded profile.
    Authenticated(Identity),
    /// Definitely signed out.
    Anonymous,
}

/// Tracks the authenticated identity and its profile document.
pub struct SessionManager {
    data: Arc<dyn DataService>,
    phase: Mutex<SessionPhase>,
    epoch: AtomicU64,
}

impl SessionManager {
    /// Create a session manager in the `Unresolved` phase.
    #[must_use]
    pub fn new(data: Arc<dyn DataService>) -> Self {
        Self {
            data,
            phase: Mutex::new(SessionPhase::Unresolved),
            epoch: AtomicU64::new(0),
        }
    }

    /// The current phase.
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        acquire(&self.phase).clone()
    }

    /// Whether an identity check is in flight.
    #[must_use]
    pub fn is_resolving(&self) -> bool {
        matches!(*acquire(&self.phase), SessionPhase::Resolving)
    }

    /// The signed-in identity, if any.
    #[must_use]
    pub fn current_identity(&self) -> Option<Identity> {
        match &*acquire(&self.phase) {
            SessionPhase::Authenticated(identity) => Some(identity.clone()),
            _ => None,
        }
    }

    /// The current session epoch.
    ///
    /// Capture this before issuing an async load; pass it back to
    /// [`Self::is_current`] before applying the result.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Whether a captured epoch is still the live one.
    #[must_use]
    pub fn is_current(&self, epoch: u64) -> bool {
        self.epoch() == epoch
    }

    /// Mark process startup: `Unresolved -> Resolving`, awaiting the first
    /// identity event from the auth service.
    pub fn begin_startup(&self) {
        let mut phase = acquire(&self.phase);
        if matches!(*phase, SessionPhase::Unresolved) {
            self.epoch.fetch_add(1, Ordering::SeqCst);
            *phase = SessionPhase::Resolving;
        }
    }

    /// Enter `Resolving` and return the epoch of the new resolution.
    fn enter_resolving(&self) -> u64 {
        let mut phase = acquire(&self.phase);
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        *phase = SessionPhase::Resolving;
        epoch
    }

    /// Resolve a sign-in event: fetch the profile document for `user_id`
    /// and enter `Authenticated`.
    ///
    /// Returns `Ok(None)` when the result was discarded as stale (a newer
    /// transition started while the fetch was in flight) or when the auth
    /// subject has no profile document, in which case the session falls to
    /// `Anonymous`.
    ///
    /// # Errors
    ///
    /// Returns `RemoteRead` if the profile fetch fails; the session falls
    /// to `Anonymous` rather than sticking in `Resolving`.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn resolve_signed_in(&self, user_id: &UserId) -> Result<Option<Identity>> {
        let epoch = self.enter_resolving();

        let fetched = self.data.fetch_profile(user_id).await;

        let mut phase = acquire(&self.phase);
        if !self.is_current(epoch) {
            debug!("discarding stale sign-in resolution");
            return Ok(None);
        }

        match fetched {
            Ok(Some(identity)) => {
                *phase = SessionPhase::Authenticated(identity.clone());
                Ok(Some(identity))
            }
            Ok(None) => {
                warn!("auth subject has no profile document; treating as anonymous");
                *phase = SessionPhase::Anonymous;
                Ok(None)
            }
            Err(e) => {
                *phase = SessionPhase::Anonymous;
                Err(StateError::read(e))
            }
        }
    }

    /// Resolve a sign-out event: any state ends in `Anonymous`.
    pub fn resolve_signed_out(&self) {
        let mut phase = acquire(&self.phase);
        self.epoch.fetch_add(1, Ordering::SeqCst);
        *phase = SessionPhase::Anonymous;
    }

    /// Merge a partial edit into the current profile, remotely first.
    ///
    /// The local identity is only touched after the backend confirms the
    /// write, so a failure never leaves a partial update visible. The role
    /// is not part of [`ProfilePatch`] and can never change here.
    ///
    /// # Errors
    ///
    /// Returns `AuthRequired` if no user is signed in, or `RemoteWrite` if
    /// the backend rejects the write (local state unchanged).
    #[instrument(skip(self, patch))]
    pub async fn update_profile(&self, patch: ProfilePatch) -> Result<Identity> {
        let current = self.current_identity().ok_or(StateError::AuthRequired)?;
        if patch.is_empty() {
            return Ok(current);
        }

        let updated = patch.apply_to(&current);
        self.data
            .upsert_profile(&updated)
            .await
            .map_err(StateError::write)?;

        // Confirmed; apply locally unless the session moved on meanwhile.
        let mut phase = acquire(&self.phase);
        if let SessionPhase::Authenticated(identity) = &mut *phase
            && identity.id == updated.id
        {
            *identity = updated.clone();
        }

        Ok(updated)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use cropcart_core::Role;

    fn buyer() -> Identity {
        Identity {
            id: UserId::new("buyer-1"),
            name: "Jane Smith".to_string(),
            role: Role::Buyer,
            avatar_url: None,
            contact: None,
            email: None,
        }
    }

    fn manager_with(backend: &Arc<MemoryBackend>) -> SessionManager {
        SessionManager::new(Arc::clone(backend) as Arc<dyn DataService>)
    }

    #[test]
    fn test_startup_enters_resolving_once() {
        let backend = Arc::new(MemoryBackend::new());
        let session = manager_with(&backend);

        assert_eq!(session.phase(), SessionPhase::Unresolved);
        session.begin_startup();
        assert!(session.is_resolving());

        let epoch = session.epoch();
        session.begin_startup(); // second call is a no-op
        assert_eq!(session.epoch(), epoch);
    }

    #[tokio::test]
    async fn test_sign_in_resolves_profile() {
        let backend = Arc::new(MemoryBackend::new());
        backend.seed_profile(buyer());
        let session = manager_with(&backend);

        let identity = session
            .resolve_signed_in(&UserId::new("buyer-1"))
            .await
            .unwrap();
        assert_eq!(identity, Some(buyer()));
        assert_eq!(session.phase(), SessionPhase::Authenticated(buyer()));
    }

    #[tokio::test]
    async fn test_sign_in_without_profile_falls_to_anonymous() {
        let backend = Arc::new(MemoryBackend::new());
        let session = manager_with(&backend);

        let identity = session
            .resolve_signed_in(&UserId::new("ghost-1"))
            .await
            .unwrap();
        assert_eq!(identity, None);
        assert_eq!(session.phase(), SessionPhase::Anonymous);
    }

    #[tokio::test]
    async fn test_sign_in_failure_does_not_stick_in_resolving() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set_fail_reads(true);
        let session = manager_with(&backend);

        let err = session
            .resolve_signed_in(&UserId::new("buyer-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, StateError::RemoteRead(_)));
        assert_eq!(session.phase(), SessionPhase::Anonymous);
    }

    #[tokio::test]
    async fn test_stale_sign_in_is_discarded_after_sign_out() {
        let backend = Arc::new(MemoryBackend::new());
        backend.seed_profile(buyer());
        backend.set_read_delay(std::time::Duration::from_millis(50));
        let session = Arc::new(manager_with(&backend));

        let resolving = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.resolve_signed_in(&UserId::new("buyer-1")).await })
        };

        // Sign out while the profile fetch is still in flight.
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        session.resolve_signed_out();

        let resolved = resolving.await.unwrap().unwrap();
        assert_eq!(resolved, None);
        assert_eq!(session.phase(), SessionPhase::Anonymous);
    }

    #[tokio::test]
    async fn test_update_profile_confirms_before_apply() {
        let backend = Arc::new(MemoryBackend::new());
        backend.seed_profile(buyer());
        let session = manager_with(&backend);
        session
            .resolve_signed_in(&UserId::new("buyer-1"))
            .await
            .unwrap();

        backend.set_fail_writes(true);
        let patch = ProfilePatch {
            name: Some("Jane S.".to_string()),
            ..ProfilePatch::default()
        };
        let err = session.update_profile(patch.clone()).await.unwrap_err();
        assert!(matches!(err, StateError::RemoteWrite(_)));
        // No partial update visible.
        assert_eq!(session.current_identity().unwrap().name, "Jane Smith");

        backend.set_fail_writes(false);
        let updated = session.update_profile(patch).await.unwrap();
        assert_eq!(updated.name, "Jane S.");
        assert_eq!(session.current_identity().unwrap().name, "Jane S.");
    }

    #[tokio::test]
    async fn test_update_profile_requires_authentication() {
        let backend = Arc::new(MemoryBackend::new());
        let session = manager_with(&backend);

        let err = session
            .update_profile(ProfilePatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StateError::AuthRequired));
    }
}

//! Persisted session slots
//!
//! A slot is the pair (tokens, identity) of one kind of actor. The end-user
//! slot and the admin slot live side by side under disjoint storage keys, so
//! a shopper and a store administrator can be signed in from the same client
//! at the same time.

use crate::store::KeyValueStore;
use crate::types::{AdminProfile, AuthTokens, UserProfile};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, warn};

/// Kind of actor a session slot belongs to
pub trait ActorKind: Send + Sync + 'static {
    /// Profile record stored next to the tokens
    type Identity: Serialize + DeserializeOwned + Clone + Debug + PartialEq + Send + Sync + 'static;

    /// Short name used in log fields
    const NAME: &'static str;
    const TOKENS_KEY: &'static str;
    const IDENTITY_KEY: &'static str;
}

/// End-user (shopper) slot
#[derive(Debug, Clone, Copy)]
pub enum User {}

/// Store administrator slot
#[derive(Debug, Clone, Copy)]
pub enum Admin {}

impl ActorKind for User {
    type Identity = UserProfile;

    const NAME: &'static str = "user";
    const TOKENS_KEY: &'static str = "auth_tokens";
    const IDENTITY_KEY: &'static str = "user_data";
}

impl ActorKind for Admin {
    type Identity = AdminProfile;

    const NAME: &'static str = "admin";
    const TOKENS_KEY: &'static str = "admin_tokens";
    const IDENTITY_KEY: &'static str = "admin_data";
}

/// Contents of a slot as read back from storage
pub type StoredSession<I> = (Option<AuthTokens>, Option<I>);

/// Reads and writes one slot of persistent storage
///
/// Storage failures never reach the caller: writes are logged and dropped,
/// unreadable or corrupt values read back as an empty slot.
pub struct SessionManager<A: ActorKind> {
    store: Arc<dyn KeyValueStore>,
    _actor: PhantomData<A>,
}

impl<A: ActorKind> Clone for SessionManager<A> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            _actor: PhantomData,
        }
    }
}

impl<A: ActorKind> SessionManager<A> {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        if !store.is_available() {
            debug!(slot = A::NAME, "No persistent storage, session lasts for this process only");
        }
        Self {
            store,
            _actor: PhantomData,
        }
    }

    /// Persist both halves of the session
    pub fn save(&self, tokens: &AuthTokens, identity: &A::Identity) {
        self.save_tokens(tokens);
        self.save_identity(identity);
    }

    pub fn save_tokens(&self, tokens: &AuthTokens) {
        self.write(A::TOKENS_KEY, tokens);
    }

    pub fn save_identity(&self, identity: &A::Identity) {
        self.write(A::IDENTITY_KEY, identity);
    }

    /// Read the slot back. If either half is unreadable, the whole slot
    /// reads as empty.
    pub fn load(&self) -> StoredSession<A::Identity> {
        let tokens = match self.read::<AuthTokens>(A::TOKENS_KEY) {
            Ok(tokens) => tokens,
            Err(()) => return (None, None),
        };
        let identity = match self.read::<A::Identity>(A::IDENTITY_KEY) {
            Ok(identity) => identity,
            Err(()) => return (None, None),
        };
        (tokens, identity)
    }

    pub fn tokens(&self) -> Option<AuthTokens> {
        self.load().0
    }

    /// Stored tokens exist and the access token has not expired
    pub fn is_authenticated(&self) -> bool {
        self.tokens().is_some_and(|tokens| !tokens.is_expired())
    }

    /// Whether a saved session can outlive the process
    pub fn is_persistent(&self) -> bool {
        self.store.is_available()
    }

    /// Remove this slot's keys; the other slot is untouched
    pub fn clear(&self) {
        for key in [A::TOKENS_KEY, A::IDENTITY_KEY] {
            if let Err(e) = self.store.remove(key) {
                warn!(slot = A::NAME, key, error = %e, "Failed to remove session key");
            }
        }
        debug!(slot = A::NAME, "Session cleared");
    }

    fn write<T: Serialize>(&self, key: &str, value: &T) {
        if !self.store.is_available() {
            return;
        }
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(e) => {
                warn!(slot = A::NAME, key, error = %e, "Failed to serialize session value");
                return;
            }
        };
        if let Err(e) = self.store.set(key, &json) {
            warn!(slot = A::NAME, key, error = %e, "Failed to save session value");
        }
    }

    /// `Err(())` means the key exists but could not be used
    fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ()> {
        let raw = match self.store.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Ok(None),
            Err(e) => {
                warn!(slot = A::NAME, key, error = %e, "Failed to read session value");
                return Err(());
            }
        };
        serde_json::from_str(&raw).map(Some).map_err(|e| {
            warn!(slot = A::NAME, key, error = %e, "Discarding corrupt session value");
        })
    }
}

/// Clear both the user and the admin slot
pub fn clear_all(store: &Arc<dyn KeyValueStore>) {
    SessionManager::<User>::new(Arc::clone(store)).clear();
    SessionManager::<Admin>::new(Arc::clone(store)).clear();
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::store::{DetachedStore, MemoryStore};
    use crate::token::tests::token_expiring_in;
    use crate::types::AdminRole;

    pub(crate) fn sample_user() -> UserProfile {
        UserProfile {
            id: 7,
            first_name: "Hanako".into(),
            last_name: "Sato".into(),
            email: "hanako@example.com".into(),
            name: "Hanako Sato".into(),
            is_active: 1,
            email_verified_at: None,
            created_at: "2024-01-01T00:00:00Z".into(),
            updated_at: "2024-01-02T00:00:00Z".into(),
        }
    }

    pub(crate) fn sample_admin() -> AdminProfile {
        AdminProfile {
            id: 1,
            name: "Root".into(),
            email: "root@example.com".into(),
            role: AdminRole::SuperAdmin,
            is_active: 1,
            last_login_at: Some("2024-03-01T09:00:00Z".into()),
            created_at: "2023-12-01T00:00:00Z".into(),
            updated_at: "2024-03-01T09:00:00Z".into(),
        }
    }

    pub(crate) fn tokens_expiring_in(secs: i64) -> AuthTokens {
        AuthTokens {
            access_token: token_expiring_in(secs),
            refresh_token: "refresh-token".into(),
            token_type: "Bearer".into(),
            expires_in: secs.max(0) as u64,
        }
    }

    fn managers() -> (MemoryStore, SessionManager<User>, SessionManager<Admin>) {
        let store = MemoryStore::new();
        let shared: Arc<dyn KeyValueStore> = Arc::new(store.clone());
        (
            store,
            SessionManager::new(Arc::clone(&shared)),
            SessionManager::new(shared),
        )
    }

    #[test]
    fn test_round_trip_both_slots() {
        let (_store, users, admins) = managers();
        let user_tokens = tokens_expiring_in(3_600);
        let admin_tokens = tokens_expiring_in(1_800);

        users.save(&user_tokens, &sample_user());
        admins.save(&admin_tokens, &sample_admin());

        assert_eq!(users.load(), (Some(user_tokens.clone()), Some(sample_user())));
        assert_eq!(admins.load(), (Some(admin_tokens.clone()), Some(sample_admin())));

        // Rewriting the user slot leaves the admin slot as it was
        let newer = tokens_expiring_in(7_200);
        users.save(&newer, &sample_user());
        assert_eq!(users.tokens(), Some(newer));
        assert_eq!(admins.load(), (Some(admin_tokens), Some(sample_admin())));
    }

    #[test]
    fn test_clear_only_touches_own_slot() {
        let (store, users, admins) = managers();
        users.save(&tokens_expiring_in(3_600), &sample_user());
        admins.save(&tokens_expiring_in(3_600), &sample_admin());
        let admin_before = admins.load();

        users.clear();

        assert_eq!(users.load(), (None, None));
        assert_eq!(admins.load(), admin_before);
        assert!(!store.contains("auth_tokens"));
        assert!(store.contains("admin_tokens"));
    }

    #[test]
    fn test_clear_all() {
        let (store, users, admins) = managers();
        users.save(&tokens_expiring_in(3_600), &sample_user());
        admins.save(&tokens_expiring_in(3_600), &sample_admin());

        let shared: Arc<dyn KeyValueStore> = Arc::new(store.clone());
        clear_all(&shared);

        assert_eq!(users.load(), (None, None));
        assert_eq!(admins.load(), (None, None));
        assert!(store.keys().is_empty());
    }

    #[test]
    fn test_corrupt_value_reads_as_empty() {
        let (store, users, _admins) = managers();
        users.save(&tokens_expiring_in(3_600), &sample_user());
        store.set("user_data", "{not json").unwrap();

        assert_eq!(users.load(), (None, None));
        assert!(!users.is_authenticated());
    }

    #[test]
    fn test_is_authenticated_follows_token_expiry() {
        let (_store, users, admins) = managers();
        assert!(!users.is_authenticated());

        users.save_tokens(&tokens_expiring_in(600));
        assert!(users.is_authenticated());

        admins.save_tokens(&tokens_expiring_in(-10));
        assert!(!admins.is_authenticated());

        users.save_tokens(&AuthTokens {
            access_token: "not-a-jwt".into(),
            ..tokens_expiring_in(600)
        });
        assert!(!users.is_authenticated());
    }

    #[test]
    fn test_memory_store_is_persistent() {
        let users = SessionManager::<User>::new(Arc::new(MemoryStore::new()));
        assert!(users.is_persistent());
    }

    #[test]
    fn test_detached_store_yields_empty_slots() {
        let users = SessionManager::<User>::new(Arc::new(DetachedStore));
        assert!(!users.is_persistent());
        users.save(&tokens_expiring_in(3_600), &sample_user());
        assert_eq!(users.load(), (None, None));
        assert!(!users.is_authenticated());
        users.clear();
    }
}

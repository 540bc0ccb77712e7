//! Both session slots behind one handle

use crate::config::ClientConfig;
use crate::error::Result;
use crate::gateway::{AuthGateway, HttpGateway};
use crate::orchestrator::AuthOrchestrator;
use crate::session::{self, Admin, User};
use crate::store::{FileStore, KeyValueStore, MemoryStore};
use std::sync::Arc;
use tracing::info;

/// User and admin orchestrators sharing one store and one gateway
///
/// The two slots stay independent: signing one out never touches the other,
/// except through [`AuthContext::sign_out_all`].
pub struct AuthContext<G: AuthGateway> {
    store: Arc<dyn KeyValueStore>,
    pub user: Arc<AuthOrchestrator<User, G>>,
    pub admin: Arc<AuthOrchestrator<Admin, G>>,
}

impl AuthContext<HttpGateway> {
    /// HTTP gateway plus a file store under `config.storage_dir`, or an
    /// in-memory store when no directory is configured
    pub fn from_config(config: ClientConfig) -> Result<Self> {
        let store: Arc<dyn KeyValueStore> = match &config.storage_dir {
            Some(dir) => Arc::new(FileStore::open(dir)?),
            None => Arc::new(MemoryStore::new()),
        };
        let gateway = Arc::new(HttpGateway::new(config.clone())?);
        Ok(Self::new(gateway, store, &config))
    }
}

impl<G: AuthGateway> AuthContext<G> {
    pub fn new(gateway: Arc<G>, store: Arc<dyn KeyValueStore>, config: &ClientConfig) -> Self {
        Self {
            user: Arc::new(AuthOrchestrator::new(
                Arc::clone(&gateway),
                Arc::clone(&store),
                config,
            )),
            admin: Arc::new(AuthOrchestrator::new(gateway, Arc::clone(&store), config)),
            store,
        }
    }

    /// Restore both slots from storage
    pub async fn initialize(&self) {
        tokio::join!(self.user.initialize(), self.admin.initialize());
    }

    /// Sign out of both slots and wipe every stored session key
    pub async fn sign_out_all(&self) {
        tokio::join!(self.user.logout(), self.admin.logout());
        session::clear_all(&self.store);
        info!("Signed out of all sessions");
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }
}

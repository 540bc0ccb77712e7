//! Storefront session client
//!
//! Client-side session and token lifecycle management for the storefront
//! API: persisted user and admin session slots, bearer token expiry checks,
//! and the login/register/logout/refresh flows that keep them in sync with
//! the server.

pub mod config;
pub mod context;
pub mod error;
pub mod gateway;
pub mod orchestrator;
pub mod session;
pub mod store;
pub mod token;
pub mod types;

pub use config::ClientConfig;
pub use context::AuthContext;
pub use error::{ClientError, Result};
pub use gateway::{AuthGateway, HttpGateway};
pub use orchestrator::{AuthOrchestrator, AuthPhase, AuthState, SlotFlows};
pub use session::{ActorKind, Admin, SessionManager, User};
pub use store::{DetachedStore, FileStore, KeyValueStore, MemoryStore};
pub use types::{AdminProfile, ApiEnvelope, AuthTokens, Credentials, RegisterRequest, UserProfile};

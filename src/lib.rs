//! gigboard client library
//!
//! Client side of a small freelance marketplace: users sign in through a
//! hosted identity provider (Supabase or Firebase), keep a profile, publish
//! service offers under categories and subcategories, and read posts. Data
//! lives in a PostgREST-fronted Postgres with row-level security and avatars
//! in object storage.

pub mod config;
pub mod error;
pub mod forms;
pub mod gateway;
pub mod guard;
pub mod hooks;
pub mod models;
pub mod notify;
pub mod session;

use reqwest::Client;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::config::GigboardConfig;
use crate::error::{Error, Result};
use crate::gateway::{AuthGateway, DataGateway, FileGateway};
use crate::models::Identity;
use crate::session::SessionStore;

/// Shared gateways for one configured backend.
pub struct Gigboard {
    /// Configuration the gateways were built from
    pub config: GigboardConfig,
    /// HTTP client used for requests
    pub http_client: Client,
    pub auth: Arc<AuthGateway>,
    pub data: Arc<DataGateway>,
    pub files: Arc<FileGateway>,
}

impl Gigboard {
    /// Build the gateways. Empty URLs or keys are accepted here and surface as
    /// errors on the first request.
    pub fn new(config: GigboardConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder.build().map_err(Error::config)?;

        let auth = Arc::new(AuthGateway::from_config(&config, http_client.clone()));
        let data = Arc::new(DataGateway::new(
            &config.supabase_url,
            &config.supabase_anon_key,
            http_client.clone(),
            auth.clone(),
        ));
        let files = Arc::new(FileGateway::new(
            &config.supabase_url,
            &config.supabase_anon_key,
            &config.avatar_bucket,
            http_client.clone(),
            auth.clone(),
        ));

        Ok(Self {
            config,
            http_client,
            auth,
            data,
            files,
        })
    }

    /// Build from the process environment (and `.env`).
    pub fn from_env() -> Result<Self> {
        Self::new(GigboardConfig::from_env())
    }

    /// The signed-in identity, or `Error::NotSignedIn`.
    pub fn require_identity(&self) -> Result<Identity> {
        self.auth.current_identity().ok_or(Error::NotSignedIn)
    }

    /// Start a session store following this client's auth gateway.
    pub fn session(&self) -> (SessionStore, JoinHandle<()>) {
        SessionStore::listen(&self.auth)
    }
}

/// A convenience module for common imports
pub mod prelude {
    pub use crate::config::{Backend, GigboardConfig};
    pub use crate::error::Error;
    pub use crate::forms::{ProfileEditor, ProfileForm, ServiceEditor, ServiceForm};
    pub use crate::gateway::{AuthChangeEvent, AuthGateway, DataGateway, FileGateway};
    pub use crate::guard::{guard, GuardDecision, Route, RouteGuard};
    pub use crate::hooks::{CategoriesHook, FetchState, SubcategoriesHook};
    pub use crate::models::*;
    pub use crate::notify::{Notice, NoticeLevel, Notifier};
    pub use crate::session::{SessionState, SessionStore};
    pub use crate::Gigboard;
}

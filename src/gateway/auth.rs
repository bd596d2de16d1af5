//! Auth Gateway: one sign-in surface over whichever identity provider is
//! configured, plus a stream of auth state changes.

use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::Client;
use serde_json::{Map, Value};
use tokio::sync::broadcast;

use gigboard_auth::firebase::{FirebaseAuth, FirebaseSession, FirebaseUser};
use gigboard_auth::{Auth, AuthError, AuthOptions, User, UserAttributes};

use crate::config::{Backend, GigboardConfig};
use crate::error::Result;
use crate::models::Identity;

const EVENT_CAPACITY: usize = 16;

type AuthResult<T> = std::result::Result<T, AuthError>;

/// Partial change to the signed-in identity. Unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdentityChanges {
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    /// Extra metadata merged key by key. Only GoTrue stores it.
    pub data: Option<Map<String, Value>>,
}

/// A hosted identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(None)` when the account still has to be confirmed by email.
    async fn sign_up(&self, email: &str, password: &str) -> AuthResult<Option<Identity>>;

    async fn sign_in(&self, email: &str, password: &str) -> AuthResult<Identity>;

    /// Must forget the local session even when the provider call fails.
    async fn sign_out(&self) -> AuthResult<()>;

    /// Ask the provider for the signed-in user; `Ok(None)` without a session.
    async fn current_user(&self) -> AuthResult<Option<Identity>>;

    /// The identity of the local session, without a request.
    fn cached_identity(&self) -> Option<Identity>;

    async fn update_profile(&self, changes: &IdentityChanges) -> AuthResult<Identity>;

    fn access_token(&self) -> Option<String>;

    /// Bearer token the data and storage APIs accept. `None` falls back to
    /// the anon key.
    fn backend_token(&self) -> Option<String> {
        self.access_token()
    }
}

fn identity_from_user(user: &User) -> Identity {
    Identity {
        id: user.id.clone(),
        email: user.email.clone(),
        display_name: user
            .metadata_str("display_name")
            .or_else(|| user.metadata_str("name"))
            .map(str::to_string),
        avatar_url: user.metadata_str("avatar_url").map(str::to_string),
        metadata: user.user_metadata.clone(),
    }
}

#[async_trait]
impl IdentityProvider for Auth {
    fn name(&self) -> &'static str {
        "supabase"
    }

    async fn sign_up(&self, email: &str, password: &str) -> AuthResult<Option<Identity>> {
        let response = Auth::sign_up(self, email, password).await?;
        Ok(response
            .session
            .map(|session| identity_from_user(&session.user)))
    }

    async fn sign_in(&self, email: &str, password: &str) -> AuthResult<Identity> {
        let session = self.sign_in_with_password(email, password).await?;
        Ok(identity_from_user(&session.user))
    }

    async fn sign_out(&self) -> AuthResult<()> {
        Auth::sign_out(self).await
    }

    async fn current_user(&self) -> AuthResult<Option<Identity>> {
        if self.get_session().is_none() {
            return Ok(None);
        }
        let user = self.get_user().await?;
        Ok(Some(identity_from_user(&user)))
    }

    fn cached_identity(&self) -> Option<Identity> {
        self.get_session()
            .map(|session| identity_from_user(&session.user))
    }

    async fn update_profile(&self, changes: &IdentityChanges) -> AuthResult<Identity> {
        let mut data = changes.data.clone().unwrap_or_default();
        if let Some(display_name) = &changes.display_name {
            data.insert("display_name".to_string(), Value::String(display_name.clone()));
        }
        if let Some(avatar_url) = &changes.avatar_url {
            data.insert("avatar_url".to_string(), Value::String(avatar_url.clone()));
        }

        let attributes = UserAttributes {
            data: Some(Value::Object(data)),
            ..Default::default()
        };
        let user = self.update_user(&attributes).await?;
        Ok(identity_from_user(&user))
    }

    fn access_token(&self) -> Option<String> {
        self.get_session().map(|session| session.access_token)
    }
}

fn identity_from_firebase_session(session: &FirebaseSession) -> Identity {
    Identity {
        id: session.local_id.clone(),
        email: session.email.clone(),
        display_name: session.display_name.clone().filter(|name| !name.is_empty()),
        avatar_url: None,
        metadata: Value::Null,
    }
}

fn identity_from_firebase_user(user: &FirebaseUser) -> Identity {
    Identity {
        id: user.local_id.clone(),
        email: user.email.clone(),
        display_name: user.display_name.clone().filter(|name| !name.is_empty()),
        avatar_url: user.photo_url.clone(),
        metadata: Value::Null,
    }
}

#[async_trait]
impl IdentityProvider for FirebaseAuth {
    fn name(&self) -> &'static str {
        "firebase"
    }

    async fn sign_up(&self, email: &str, password: &str) -> AuthResult<Option<Identity>> {
        let session = FirebaseAuth::sign_up(self, email, password).await?;
        Ok(Some(identity_from_firebase_session(&session)))
    }

    async fn sign_in(&self, email: &str, password: &str) -> AuthResult<Identity> {
        let session = self.sign_in_with_password(email, password).await?;
        Ok(identity_from_firebase_session(&session))
    }

    async fn sign_out(&self) -> AuthResult<()> {
        FirebaseAuth::sign_out(self);
        Ok(())
    }

    async fn current_user(&self) -> AuthResult<Option<Identity>> {
        if self.get_session().is_none() {
            return Ok(None);
        }
        let user = self.get_user().await?;
        Ok(Some(identity_from_firebase_user(&user)))
    }

    fn cached_identity(&self) -> Option<Identity> {
        self.get_session()
            .map(|session| identity_from_firebase_session(&session))
    }

    async fn update_profile(&self, changes: &IdentityChanges) -> AuthResult<Identity> {
        if changes.data.as_ref().is_some_and(|data| !data.is_empty()) {
            warn!("firebase accounts have no free-form metadata; extra fields dropped");
        }
        let user = FirebaseAuth::update_profile(
            self,
            changes.display_name.as_deref(),
            changes.avatar_url.as_deref(),
        )
        .await?;
        Ok(identity_from_firebase_user(&user))
    }

    fn access_token(&self) -> Option<String> {
        self.get_session().map(|session| session.id_token)
    }

    // Firebase ID tokens are not signed with the PostgREST JWT secret.
    fn backend_token(&self) -> Option<String> {
        None
    }
}

/// 認証イベントの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthChangeEvent {
    /// Current state at the time of subscribing.
    InitialSession,
    SignedIn,
    SignedOut,
    UserUpdated,
    SignInFailed,
}

/// One auth state transition.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthStateChange {
    pub event: AuthChangeEvent,
    pub identity: Option<Identity>,
    pub error: Option<String>,
}

impl AuthStateChange {
    fn new(event: AuthChangeEvent, identity: Option<Identity>) -> Self {
        Self {
            event,
            identity,
            error: None,
        }
    }
}

/// Receiving end of [`AuthGateway::subscribe`].
pub struct AuthSubscription {
    receiver: broadcast::Receiver<AuthStateChange>,
}

impl AuthSubscription {
    /// Next change, or `None` once the gateway is dropped.
    ///
    /// A slow subscriber skips the changes it missed and keeps going.
    pub async fn next(&mut self) -> Option<AuthStateChange> {
        loop {
            match self.receiver.recv().await {
                Ok(change) => return Some(change),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!("auth subscriber lagged, {} changes skipped", missed);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// 認証ゲートウェイ
pub struct AuthGateway {
    provider: Box<dyn IdentityProvider>,
    events: broadcast::Sender<AuthStateChange>,
}

impl AuthGateway {
    pub fn new(provider: Box<dyn IdentityProvider>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self { provider, events }
    }

    /// Build the provider named by `config.backend`.
    pub fn from_config(config: &GigboardConfig, http_client: Client) -> Self {
        let provider: Box<dyn IdentityProvider> = match config.backend {
            Backend::Supabase => Box::new(Auth::new(
                &config.supabase_url,
                &config.supabase_anon_key,
                http_client,
                AuthOptions {
                    persist_session: config.persist_session,
                },
            )),
            Backend::Firebase => Box::new(FirebaseAuth::new(
                &config.firebase_auth_url,
                &config.firebase_api_key,
                http_client,
            )),
        };
        debug!("auth gateway using {}", provider.name());
        Self::new(provider)
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Subscribe to auth state changes made after this call.
    pub fn subscribe(&self) -> AuthSubscription {
        AuthSubscription {
            receiver: self.events.subscribe(),
        }
    }

    fn emit(&self, change: AuthStateChange) {
        // 購読者がいなければ捨てる
        let _ = self.events.send(change);
    }

    /// The identity of the local session, without a request.
    pub fn current_identity(&self) -> Option<Identity> {
        self.provider.cached_identity()
    }

    pub fn access_token(&self) -> Option<String> {
        self.provider.access_token()
    }

    /// Token to authorize data and storage requests with, if the provider
    /// issues one those APIs accept.
    pub fn backend_token(&self) -> Option<String> {
        self.provider.backend_token()
    }

    /// Create an account. Returns `None` while the provider waits for email
    /// confirmation; otherwise the new user is signed in.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Identity>> {
        let identity = self.provider.sign_up(email, password).await?;
        match &identity {
            Some(identity) => {
                info!("signed up {}", identity.id);
                self.emit(AuthStateChange::new(
                    AuthChangeEvent::SignedIn,
                    Some(identity.clone()),
                ));
            }
            None => info!("sign-up for {} awaits confirmation", email),
        }
        Ok(identity)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Identity> {
        match self.provider.sign_in(email, password).await {
            Ok(identity) => {
                info!("signed in {}", identity.id);
                self.emit(AuthStateChange::new(
                    AuthChangeEvent::SignedIn,
                    Some(identity.clone()),
                ));
                Ok(identity)
            }
            Err(err) => {
                warn!("sign-in failed: {}", err);
                self.emit(AuthStateChange {
                    event: AuthChangeEvent::SignInFailed,
                    identity: self.provider.cached_identity(),
                    error: Some(err.to_string()),
                });
                Err(err.into())
            }
        }
    }

    /// Sign out. Subscribers see `SignedOut` even when the provider call fails.
    pub async fn sign_out(&self) -> Result<()> {
        let result = self.provider.sign_out().await;
        info!("signed out");
        self.emit(AuthStateChange::new(AuthChangeEvent::SignedOut, None));
        Ok(result?)
    }

    /// Fetch the signed-in user from the provider.
    pub async fn current_user(&self) -> Result<Option<Identity>> {
        Ok(self.provider.current_user().await?)
    }

    pub async fn update_profile(&self, changes: &IdentityChanges) -> Result<Identity> {
        let identity = self.provider.update_profile(changes).await?;
        self.emit(AuthStateChange::new(
            AuthChangeEvent::UserUpdated,
            Some(identity.clone()),
        ));
        Ok(identity)
    }
}

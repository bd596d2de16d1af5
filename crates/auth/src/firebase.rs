//! Firebase Identity Toolkit client
//!
//! Covers the email/password subset of the REST API: `accounts:signUp`,
//! `accounts:signInWithPassword`, `accounts:lookup` and `accounts:update`.
//! Firebase has no server-side logout, so signing out only forgets the local
//! session.

use log::debug;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};
use url::Url;

use crate::{read_json, AuthError};

/// Public Identity Toolkit endpoint.
pub const IDENTITY_TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com";

/// Tokens returned by sign-up and sign-in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FirebaseSession {
    pub id_token: String,
    pub refresh_token: String,
    /// Lifetime of `id_token` in seconds, sent as a string by the API.
    pub expires_in: String,
    pub local_id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Account record from `accounts:lookup` or `accounts:update`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FirebaseUser {
    pub local_id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub email_verified: Option<bool>,
    /// Milliseconds since the epoch, as a string.
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<FirebaseUser>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateRequest<'a> {
    id_token: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    display_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    photo_url: Option<&'a str>,
    return_secure_token: bool,
}

/// Firebase Identity Toolkit クライアント
pub struct FirebaseAuth {
    base_url: String,
    api_key: String,
    http_client: Client,
    current_session: Arc<RwLock<Option<FirebaseSession>>>,
}

impl FirebaseAuth {
    /// Create a client. `base_url` is normally [`IDENTITY_TOOLKIT_URL`].
    pub fn new(base_url: &str, api_key: &str, http_client: Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            http_client,
            current_session: Arc::new(RwLock::new(None)),
        }
    }

    fn endpoint(&self, action: &str) -> Result<Url, AuthError> {
        let mut url = Url::parse(&format!("{}/v1/accounts:{}", self.base_url, action))?;
        url.query_pairs_mut().append_pair("key", &self.api_key);
        Ok(url)
    }

    async fn password_request(
        &self,
        action: &str,
        email: &str,
        password: &str,
    ) -> Result<FirebaseSession, AuthError> {
        let payload = serde_json::json!({
            "email": email,
            "password": password,
            "returnSecureToken": true,
        });

        let response = self
            .http_client
            .post(self.endpoint(action)?)
            .json(&payload)
            .send()
            .await?;

        let session: FirebaseSession = read_json(response).await?;
        self.set_session(Some(session.clone()));

        Ok(session)
    }

    /// Create an account. Firebase signs the new account in immediately.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<FirebaseSession, AuthError> {
        debug!("firebase sign-up for {}", email);
        self.password_request("signUp", email, password).await
    }

    /// Sign in with email and password.
    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<FirebaseSession, AuthError> {
        debug!("firebase sign-in for {}", email);
        self.password_request("signInWithPassword", email, password)
            .await
    }

    /// Forget the local session.
    pub fn sign_out(&self) {
        self.set_session(None);
    }

    pub fn get_session(&self) -> Option<FirebaseSession> {
        self.current_session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_session(&self, session: Option<FirebaseSession>) {
        let mut guard = self
            .current_session
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *guard = session;
    }

    fn id_token(&self) -> Result<String, AuthError> {
        self.get_session()
            .map(|session| session.id_token)
            .ok_or(AuthError::MissingSession)
    }

    /// Look up the signed-in account.
    pub async fn get_user(&self) -> Result<FirebaseUser, AuthError> {
        let id_token = self.id_token()?;

        let response = self
            .http_client
            .post(self.endpoint("lookup")?)
            .json(&serde_json::json!({ "idToken": id_token }))
            .send()
            .await?;

        let lookup: LookupResponse = read_json(response).await?;
        lookup
            .users
            .into_iter()
            .next()
            .ok_or_else(|| AuthError::ApiError("USER_NOT_FOUND".to_string()))
    }

    /// Change the display name and/or photo URL of the signed-in account.
    pub async fn update_profile(
        &self,
        display_name: Option<&str>,
        photo_url: Option<&str>,
    ) -> Result<FirebaseUser, AuthError> {
        let id_token = self.id_token()?;

        let request = UpdateRequest {
            id_token: &id_token,
            display_name,
            photo_url,
            return_secure_token: false,
        };

        let response = self
            .http_client
            .post(self.endpoint("update")?)
            .json(&request)
            .send()
            .await?;

        let user: FirebaseUser = read_json(response).await?;

        let mut guard = self
            .current_session
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(session) = guard.as_mut() {
            session.display_name = user.display_name.clone();
        }

        Ok(user)
    }
}

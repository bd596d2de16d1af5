//! Identity provider clients for gigboard
//!
//! This crate talks to the hosted identity providers the marketplace can be
//! configured with: Supabase GoTrue ([`Auth`]) and Firebase Identity Toolkit
//! ([`firebase::FirebaseAuth`]). Both keep the active session in memory so that
//! later calls (user lookup, profile updates, data requests) can use its token.

pub mod firebase;

use log::{debug, info, warn};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

/// エラー型
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("API error: {0}")]
    ApiError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),

    #[error("Missing session")]
    MissingSession,
}

/// ユーザー情報
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub app_metadata: serde_json::Value,
    #[serde(default)]
    pub user_metadata: serde_json::Value,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl User {
    /// Read a string field from the user metadata, if present.
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.user_metadata.get(key).and_then(serde_json::Value::as_str)
    }
}

/// セッション情報
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub token_type: String,
    pub user: User,
}

/// Result of a sign-up.
///
/// GoTrue answers with a full session when email confirmation is disabled and
/// with the bare user record while confirmation is pending.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthResponse {
    pub user: User,
    pub session: Option<Session>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SignUpBody {
    Session(Session),
    User(User),
}

/// Attributes accepted by `PUT /auth/v1/user`.
///
/// `data` is merged key by key into the user's metadata by GoTrue.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// クライアントオプション
#[derive(Debug, Clone)]
pub struct AuthOptions {
    pub persist_session: bool,
}

impl Default for AuthOptions {
    fn default() -> Self {
        Self {
            persist_session: true,
        }
    }
}

/// Supabase GoTrue クライアント
pub struct Auth {
    url: String,
    key: String,
    http_client: Client,
    options: AuthOptions,
    current_session: Arc<RwLock<Option<Session>>>,
}

impl Auth {
    /// 新しい Auth クライアントを作成
    pub fn new(url: &str, key: &str, http_client: Client, options: AuthOptions) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            key: key.to_string(),
            http_client,
            options,
            current_session: Arc::new(RwLock::new(None)),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/auth/v1{}", self.url, path)
    }

    /// ユーザー登録
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<AuthResponse, AuthError> {
        debug!("signing up {}", email);
        let payload = serde_json::json!({
            "email": email,
            "password": password,
        });

        let response = self
            .http_client
            .post(self.endpoint("/signup"))
            .header("apikey", &self.key)
            .json(&payload)
            .send()
            .await?;

        let result = match read_json::<SignUpBody>(response).await? {
            SignUpBody::Session(session) => {
                self.store_session(&session);
                AuthResponse {
                    user: session.user.clone(),
                    session: Some(session),
                }
            }
            SignUpBody::User(user) => {
                info!("sign-up for {} is awaiting email confirmation", email);
                AuthResponse {
                    user,
                    session: None,
                }
            }
        };

        Ok(result)
    }

    /// メール・パスワードでログイン
    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, AuthError> {
        debug!("signing in {}", email);
        let payload = serde_json::json!({
            "email": email,
            "password": password,
        });

        let response = self
            .http_client
            .post(self.endpoint("/token?grant_type=password"))
            .header("apikey", &self.key)
            .json(&payload)
            .send()
            .await?;

        let session: Session = read_json(response).await?;
        self.store_session(&session);

        Ok(session)
    }

    /// 現在のセッションを取得
    pub fn get_session(&self) -> Option<Session> {
        self.current_session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// セッションを設定
    pub fn set_session(&self, session: Option<Session>) {
        let mut guard = self
            .current_session
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *guard = session;
    }

    fn store_session(&self, session: &Session) {
        if self.options.persist_session {
            self.set_session(Some(session.clone()));
        }
    }

    fn access_token(&self) -> Result<String, AuthError> {
        self.get_session()
            .map(|session| session.access_token)
            .ok_or(AuthError::MissingSession)
    }

    /// 現在のユーザーを取得
    pub async fn get_user(&self) -> Result<User, AuthError> {
        let token = self.access_token()?;

        let response = self
            .http_client
            .get(self.endpoint("/user"))
            .header("apikey", &self.key)
            .bearer_auth(token)
            .send()
            .await?;

        read_json(response).await
    }

    /// ユーザー情報を更新
    ///
    /// The stored session picks up the returned user so that later reads see
    /// the merged metadata without another round trip.
    pub async fn update_user(&self, attributes: &UserAttributes) -> Result<User, AuthError> {
        let token = self.access_token()?;

        let response = self
            .http_client
            .put(self.endpoint("/user"))
            .header("apikey", &self.key)
            .bearer_auth(token)
            .json(attributes)
            .send()
            .await?;

        let user: User = read_json(response).await?;

        let mut guard = self
            .current_session
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(session) = guard.as_mut() {
            session.user = user.clone();
        }

        Ok(user)
    }

    /// セッションをリフレッシュ
    pub async fn refresh_session(&self) -> Result<Session, AuthError> {
        let session = self.get_session().ok_or(AuthError::MissingSession)?;

        let payload = serde_json::json!({
            "refresh_token": session.refresh_token,
        });

        let response = self
            .http_client
            .post(self.endpoint("/token?grant_type=refresh_token"))
            .header("apikey", &self.key)
            .json(&payload)
            .send()
            .await?;

        let new_session: Session = read_json(response).await?;
        self.store_session(&new_session);

        Ok(new_session)
    }

    /// サインアウト
    ///
    /// The local session is dropped before the server is told, so the client
    /// ends up signed out even when the logout request fails.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let previous = {
            let mut guard = self
                .current_session
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            guard.take()
        };

        let Some(session) = previous else {
            debug!("sign-out without an active session");
            return Ok(());
        };

        let response = self
            .http_client
            .post(self.endpoint("/logout"))
            .header("apikey", &self.key)
            .bearer_auth(&session.access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            let message = error_message(response).await;
            warn!("logout request failed: {}", message);
            return Err(AuthError::ApiError(message));
        }

        Ok(())
    }

    /// パスワードリセットメールの送信
    pub async fn reset_password_for_email(&self, email: &str) -> Result<(), AuthError> {
        let payload = serde_json::json!({
            "email": email,
        });

        let response = self
            .http_client
            .post(self.endpoint("/recover"))
            .header("apikey", &self.key)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AuthError::ApiError(error_message(response).await));
        }

        Ok(())
    }
}

/// Parse a successful JSON body, or turn a failed response into `ApiError`.
pub(crate) async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, AuthError> {
    if !response.status().is_success() {
        return Err(AuthError::ApiError(error_message(response).await));
    }

    let body = response.text().await?;
    Ok(serde_json::from_str(&body)?)
}

/// Pull the human readable message out of a provider error body.
///
/// GoTrue uses `msg`, `error_description` or `message` depending on the
/// endpoint; Identity Toolkit nests it as `error.message`.
pub(crate) async fn error_message(response: Response) -> String {
    let status = response.status();
    let text = response
        .text()
        .await
        .unwrap_or_else(|_| "Failed to read error response".to_string());

    let parsed = serde_json::from_str::<serde_json::Value>(&text).ok();
    let message = parsed.as_ref().and_then(|body| {
        ["msg", "error_description", "message"]
            .iter()
            .find_map(|key| body.get(*key).and_then(serde_json::Value::as_str))
            .or_else(|| body.pointer("/error/message").and_then(serde_json::Value::as_str))
            .or_else(|| body.get("error").and_then(serde_json::Value::as_str))
            .map(str::to_string)
    });

    match message {
        Some(message) => message,
        None if text.is_empty() => format!("request failed with status {}", status),
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn session_body() -> serde_json::Value {
        json!({
            "access_token": "test_access_token",
            "refresh_token": "test_refresh_token",
            "expires_in": 3600,
            "token_type": "bearer",
            "user": {
                "id": "8d0fd2b3-9ca7-4a0c-8f5e-3c1a2b4d5e6f",
                "email": "test@example.com",
                "phone": null,
                "app_metadata": {},
                "user_metadata": { "display_name": "Test User" },
                "created_at": "2024-01-01T00:00:00Z",
                "updated_at": "2024-01-01T00:00:00Z"
            }
        })
    }

    fn auth_for(server: &MockServer) -> Auth {
        Auth::new(&server.uri(), "test_key", Client::new(), AuthOptions::default())
    }

    #[test]
    fn test_sign_up_with_session() {
        tokio_test::block_on(async {
            let mock_server = MockServer::start().await;

            Mock::given(method("POST"))
                .and(path("/auth/v1/signup"))
                .and(header("apikey", "test_key"))
                .respond_with(ResponseTemplate::new(200).set_body_json(session_body()))
                .mount(&mock_server)
                .await;

            let auth = auth_for(&mock_server);
            let result = auth.sign_up("test@example.com", "password123").await;

            assert!(result.is_ok(), "sign_up failed: {:?}", result.err());
            let response = result.unwrap();
            assert!(response.session.is_some());
            assert_eq!(response.user.email.as_deref(), Some("test@example.com"));
            assert_eq!(
                auth.get_session().map(|s| s.access_token),
                Some("test_access_token".to_string())
            );
        });
    }

    #[tokio::test]
    async fn test_sign_up_pending_confirmation() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/auth/v1/signup"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "8d0fd2b3-9ca7-4a0c-8f5e-3c1a2b4d5e6f",
                "email": "new@example.com",
                "user_metadata": {},
                "app_metadata": {}
            })))
            .mount(&mock_server)
            .await;

        let auth = auth_for(&mock_server);
        let response = auth.sign_up("new@example.com", "password123").await.unwrap();

        assert!(response.session.is_none());
        assert_eq!(response.user.email.as_deref(), Some("new@example.com"));
        assert!(auth.get_session().is_none());
    }

    #[tokio::test]
    async fn test_sign_in_error_message() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .and(query_param("grant_type", "password"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_grant",
                "error_description": "Invalid login credentials"
            })))
            .mount(&mock_server)
            .await;

        let auth = auth_for(&mock_server);
        let result = auth.sign_in_with_password("test@example.com", "wrong").await;

        match result {
            Err(AuthError::ApiError(message)) => assert_eq!(message, "Invalid login credentials"),
            other => panic!("Expected ApiError, got {:?}", other),
        }
        assert!(auth.get_session().is_none());
    }

    #[tokio::test]
    async fn test_update_user_merges_into_session() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(session_body()))
            .mount(&mock_server)
            .await;

        Mock::given(method("PUT"))
            .and(path("/auth/v1/user"))
            .and(header("authorization", "Bearer test_access_token"))
            .and(body_json(json!({ "data": { "display_name": "Renamed" } })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "8d0fd2b3-9ca7-4a0c-8f5e-3c1a2b4d5e6f",
                "email": "test@example.com",
                "user_metadata": { "display_name": "Renamed" },
                "app_metadata": {}
            })))
            .mount(&mock_server)
            .await;

        let auth = auth_for(&mock_server);
        auth.sign_in_with_password("test@example.com", "password123")
            .await
            .unwrap();

        let attributes = UserAttributes {
            data: Some(json!({ "display_name": "Renamed" })),
            ..Default::default()
        };
        let user = auth.update_user(&attributes).await.unwrap();

        assert_eq!(user.metadata_str("display_name"), Some("Renamed"));
        let session = auth.get_session().unwrap();
        assert_eq!(session.user.metadata_str("display_name"), Some("Renamed"));
    }

    #[tokio::test]
    async fn test_sign_out_clears_session_even_on_failure() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(session_body()))
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/auth/v1/logout"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&mock_server)
            .await;

        let auth = auth_for(&mock_server);
        auth.sign_in_with_password("test@example.com", "password123")
            .await
            .unwrap();

        let result = auth.sign_out().await;
        assert!(matches!(result, Err(AuthError::ApiError(_))));
        assert!(auth.get_session().is_none());

        // A second sign-out has nothing to do.
        assert!(auth.sign_out().await.is_ok());
    }

    #[tokio::test]
    async fn test_get_user_requires_session() {
        let auth = Auth::new(
            "http://localhost:54321",
            "test_key",
            Client::new(),
            AuthOptions::default(),
        );

        assert!(matches!(auth.get_user().await, Err(AuthError::MissingSession)));
    }
}

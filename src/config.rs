//! Configuration for the gigboard client

use log::warn;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use gigboard_auth::firebase::IDENTITY_TOOLKIT_URL;

/// Which hosted identity provider signs users in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    #[default]
    Supabase,
    Firebase,
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "supabase" => Ok(Backend::Supabase),
            "firebase" => Ok(Backend::Firebase),
            other => Err(format!("unknown backend: {}", other)),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Supabase => f.write_str("supabase"),
            Backend::Firebase => f.write_str("firebase"),
        }
    }
}

/// Configuration options for the gigboard client
///
/// Missing values are left empty rather than rejected; the first request
/// against an unconfigured backend fails instead.
#[derive(Debug, Clone)]
pub struct GigboardConfig {
    /// The identity provider
    pub backend: Backend,

    /// Base URL of the Supabase project (auth, PostgREST and storage)
    pub supabase_url: String,

    /// Anonymous API key of the Supabase project
    pub supabase_anon_key: String,

    /// Firebase web API key
    pub firebase_api_key: String,

    /// Identity Toolkit base URL
    pub firebase_auth_url: String,

    /// Public bucket holding profile pictures
    pub avatar_bucket: String,

    /// The request timeout
    pub request_timeout: Option<Duration>,

    /// Keep the session in memory after sign-in
    pub persist_session: bool,
}

impl Default for GigboardConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Supabase,
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            firebase_api_key: String::new(),
            firebase_auth_url: IDENTITY_TOOLKIT_URL.to_string(),
            avatar_bucket: "avatars".to_string(),
            request_timeout: Some(Duration::from_secs(30)),
            persist_session: true,
        }
    }
}

impl GigboardConfig {
    /// Read the configuration from the environment, loading `.env` first if present.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let backend = match read("GIGBOARD_BACKEND") {
            Some(value) => value.parse().unwrap_or_else(|err| {
                warn!("{}, falling back to {}", err, Backend::default());
                Backend::default()
            }),
            None => Backend::default(),
        };

        let request_timeout = match read("GIGBOARD_REQUEST_TIMEOUT_SECS") {
            Some(value) => match value.trim().parse::<u64>() {
                Ok(0) => None,
                Ok(secs) => Some(Duration::from_secs(secs)),
                Err(_) => {
                    warn!("ignoring invalid GIGBOARD_REQUEST_TIMEOUT_SECS={}", value);
                    defaults.request_timeout
                }
            },
            None => defaults.request_timeout,
        };

        Self {
            backend,
            supabase_url: read("SUPABASE_URL").unwrap_or_default(),
            supabase_anon_key: read("SUPABASE_ANON_KEY").unwrap_or_default(),
            firebase_api_key: read("FIREBASE_API_KEY").unwrap_or_default(),
            firebase_auth_url: read("FIREBASE_AUTH_URL").unwrap_or(defaults.firebase_auth_url),
            avatar_bucket: read("GIGBOARD_AVATAR_BUCKET").unwrap_or(defaults.avatar_bucket),
            request_timeout,
            persist_session: defaults.persist_session,
        }
    }

    /// Set the identity provider
    pub fn with_backend(mut self, value: Backend) -> Self {
        self.backend = value;
        self
    }

    /// Set the Supabase project URL and anon key
    pub fn with_supabase(mut self, url: &str, anon_key: &str) -> Self {
        self.supabase_url = url.to_string();
        self.supabase_anon_key = anon_key.to_string();
        self
    }

    /// Set the Firebase API key and Identity Toolkit URL
    pub fn with_firebase(mut self, api_key: &str, auth_url: &str) -> Self {
        self.firebase_api_key = api_key.to_string();
        self.firebase_auth_url = auth_url.to_string();
        self
    }

    /// Set the avatar bucket
    pub fn with_avatar_bucket(mut self, value: &str) -> Self {
        self.avatar_bucket = value.to_string();
        self
    }

    /// Set the request timeout
    pub fn with_request_timeout(mut self, value: Option<Duration>) -> Self {
        self.request_timeout = value;
        self
    }

    /// Set whether to persist the session
    pub fn with_persist_session(mut self, value: bool) -> Self {
        self.persist_session = value;
        self
    }
}

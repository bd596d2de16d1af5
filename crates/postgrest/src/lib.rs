//! PostgREST client for gigboard
//!
//! A small, table-scoped query builder over the PostgREST HTTP API:
//!
//! - `select` with embedded joins (`include`)
//! - exact-match filtering (`eq`), ordering and limits
//! - single-row reads that tolerate zero rows (`maybe_single`)
//! - `insert`, `upsert`, `update` and `delete` returning the affected rows

use log::debug;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use url::Url;

/// PostgREST APIエラーの詳細情報
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PostgrestApiErrorDetails {
    pub code: Option<String>,
    pub message: Option<String>,
    pub details: Option<String>,
    pub hint: Option<String>,
}

impl fmt::Display for PostgrestApiErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(code) = &self.code {
            parts.push(format!("Code: {}", code));
        }
        if let Some(message) = &self.message {
            parts.push(format!("Message: {}", message));
        }
        if let Some(details) = &self.details {
            parts.push(format!("Details: {}", details));
        }
        if let Some(hint) = &self.hint {
            parts.push(format!("Hint: {}", hint));
        }
        write!(f, "{}", parts.join(", "))
    }
}

/// エラー型
#[derive(Error, Debug)]
pub enum PostgrestError {
    #[error("API error: {details} (Status: {status})")]
    ApiError {
        details: PostgrestApiErrorDetails,
        status: StatusCode,
    },

    #[error("API error (unparsed): {message} (Status: {status})")]
    UnparsedApiError { message: String, status: StatusCode },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Expected a single row, found {0}")]
    UnexpectedRowCount(usize),
}

impl PostgrestError {
    /// The message a person should see, without codes or status lines.
    pub fn user_message(&self) -> String {
        match self {
            PostgrestError::ApiError { details, .. } => details
                .message
                .clone()
                .unwrap_or_else(|| details.to_string()),
            PostgrestError::UnparsedApiError { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// ソート方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// PostgREST クライアント
#[derive(Clone)]
pub struct PostgrestClient {
    base_url: String,
    table: String,
    http_client: Client,
    headers: HeaderMap,
    query_params: HashMap<String, String>,
}

impl PostgrestClient {
    /// 新しい PostgREST クライアントを作成
    ///
    /// The anon key doubles as the bearer token until [`with_auth`] replaces
    /// it with a user's access token.
    ///
    /// [`with_auth`]: PostgrestClient::with_auth
    pub fn new(base_url: &str, api_key: &str, table: &str, http_client: Client) -> Self {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(api_key) {
            headers.insert("apikey", value);
        }
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", api_key)) {
            headers.insert(reqwest::header::AUTHORIZATION, value);
        }
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            table: table.to_string(),
            http_client,
            headers,
            query_params: HashMap::new(),
        }
    }

    /// ヘッダーを追加
    pub fn with_header(mut self, key: &str, value: &str) -> Result<Self, PostgrestError> {
        let header_value = HeaderValue::from_str(value).map_err(|_| {
            PostgrestError::InvalidParameters(format!("Invalid header value: {}", value))
        })?;
        let header_name = HeaderName::from_bytes(key.as_bytes()).map_err(|_| {
            PostgrestError::InvalidParameters(format!("Invalid header name: {}", key))
        })?;

        self.headers.insert(header_name, header_value);
        Ok(self)
    }

    /// 認証トークンを設定
    pub fn with_auth(self, token: &str) -> Result<Self, PostgrestError> {
        self.with_header("Authorization", &format!("Bearer {}", token))
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// 取得するカラムを指定
    pub fn select(mut self, columns: &str) -> Self {
        self.query_params
            .insert("select".to_string(), columns.to_string());
        self
    }

    /// Embed rows of a related table, e.g. `users(name,avatar_url)`.
    ///
    /// PostgREST resolves the relationship from the foreign key, returning an
    /// object for many-to-one links and an array for one-to-many.
    pub fn include(mut self, foreign_table: &str, columns: Option<&str>) -> Self {
        let current_select = self
            .query_params
            .get("select")
            .cloned()
            .unwrap_or_else(|| "*".to_string());
        let new_select = format!(
            "{},{}({})",
            current_select,
            foreign_table,
            columns.unwrap_or("*")
        );

        self.query_params.insert("select".to_string(), new_select);
        self
    }

    /// 等価フィルター
    pub fn eq(mut self, column: &str, value: &str) -> Self {
        self.query_params
            .insert(column.to_string(), format!("eq.{}", value));
        self
    }

    /// ソート順を指定
    pub fn order(mut self, column: &str, order: SortOrder) -> Self {
        let order_str = match order {
            SortOrder::Ascending => "asc",
            SortOrder::Descending => "desc",
        };
        self.query_params
            .insert("order".to_string(), format!("{}.{}", column, order_str));
        self
    }

    /// 取得件数を制限
    pub fn limit(mut self, count: u32) -> Self {
        self.query_params
            .insert("limit".to_string(), count.to_string());
        self
    }

    /// Conflict target for [`upsert`](PostgrestClient::upsert).
    pub fn on_conflict(mut self, columns: &str) -> Self {
        self.query_params
            .insert("on_conflict".to_string(), columns.to_string());
        self
    }

    fn build_url(&self) -> Result<Url, PostgrestError> {
        let mut url = Url::parse(&format!("{}/rest/v1/{}", self.base_url, self.table))?;

        if !self.query_params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.query_params {
                pairs.append_pair(key, value);
            }
        }

        Ok(url)
    }

    /// データを取得
    pub async fn execute<T: DeserializeOwned>(&self) -> Result<Vec<T>, PostgrestError> {
        let url = self.build_url()?;
        debug!("GET {}", url);

        let response = self
            .http_client
            .get(url)
            .headers(self.headers.clone())
            .send()
            .await?;

        let response = check_status(response).await?;
        response
            .json::<Vec<T>>()
            .await
            .map_err(|e| PostgrestError::DeserializationError(e.to_string()))
    }

    /// Fetch at most one row: zero rows is `Ok(None)`, more than one is an error.
    pub async fn maybe_single<T: DeserializeOwned>(&self) -> Result<Option<T>, PostgrestError> {
        let mut rows = self.execute::<T>().await?;
        match rows.len() {
            0 => Ok(None),
            1 => Ok(rows.pop()),
            count => Err(PostgrestError::UnexpectedRowCount(count)),
        }
    }

    /// Fetch exactly one row.
    pub async fn single<T: DeserializeOwned>(&self) -> Result<T, PostgrestError> {
        self.maybe_single()
            .await?
            .ok_or(PostgrestError::UnexpectedRowCount(0))
    }

    /// データを挿入
    pub async fn insert<T, R>(&self, values: &T) -> Result<Vec<R>, PostgrestError>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let body = serde_json::to_value(values)?;
        self.send_mutation(Method::POST, Some(body), "return=representation")
            .await
    }

    /// Insert, or merge into the row that collides on the primary key (or the
    /// `on_conflict` columns).
    pub async fn upsert<T, R>(&self, values: &T) -> Result<Vec<R>, PostgrestError>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let body = serde_json::to_value(values)?;
        self.send_mutation(
            Method::POST,
            Some(body),
            "return=representation,resolution=merge-duplicates",
        )
        .await
    }

    /// データを更新
    pub async fn update<T, R>(&self, values: &T) -> Result<Vec<R>, PostgrestError>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let body = serde_json::to_value(values)?;
        self.send_mutation(Method::PATCH, Some(body), "return=representation")
            .await
    }

    /// データを削除
    pub async fn delete<R: DeserializeOwned>(&self) -> Result<Vec<R>, PostgrestError> {
        self.send_mutation(Method::DELETE, None, "return=representation")
            .await
    }

    async fn send_mutation<R: DeserializeOwned>(
        &self,
        method: Method,
        body: Option<serde_json::Value>,
        prefer: &'static str,
    ) -> Result<Vec<R>, PostgrestError> {
        let url = self.build_url()?;
        debug!("{} {}", method, url);

        let mut headers = self.headers.clone();
        headers.insert(
            HeaderName::from_static("prefer"),
            HeaderValue::from_static(prefer),
        );

        let mut request = self
            .http_client
            .request(method, url)
            .headers(headers);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = check_status(request.send().await?).await?;

        // 204 No Content などの空レスポンス
        let body_text = response.text().await.map_err(|e| {
            PostgrestError::DeserializationError(format!("Failed to read response body: {}", e))
        })?;
        if body_text.trim().is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_str::<Vec<R>>(&body_text)
            .map_err(|e| PostgrestError::DeserializationError(e.to_string()))
    }
}

async fn check_status(response: Response) -> Result<Response, PostgrestError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Failed to read error response".to_string());

    match serde_json::from_str::<PostgrestApiErrorDetails>(&error_text) {
        Ok(details) => Err(PostgrestError::ApiError { details, status }),
        Err(_) => Err(PostgrestError::UnparsedApiError {
            message: error_text,
            status,
        }),
    }
}

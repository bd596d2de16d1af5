//! Object storage client for gigboard
//!
//! Wraps the bucket/object endpoints of the storage API that gigboard needs
//! for profile pictures: upload (optionally overwriting), public URL
//! construction and removal.

use log::debug;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// 結果型
pub type Result<T> = std::result::Result<T, StorageError>;

/// エラー型
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("API error: {0}")]
    ApiError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),

    #[error("Invalid object path: {0}")]
    InvalidPath(String),
}

/// ファイルアップロードオプション
#[derive(Debug, Clone, Serialize, Default)]
pub struct FileOptions {
    pub content_type: Option<String>,
    pub upsert: Option<bool>,
}

impl FileOptions {
    /// 新しいファイルオプションを作成
    pub fn new() -> Self {
        Self::default()
    }

    /// コンテンツタイプを設定
    pub fn with_content_type(mut self, content_type: &str) -> Self {
        self.content_type = Some(content_type.to_string());
        self
    }

    /// アップサートを設定
    pub fn with_upsert(mut self, upsert: bool) -> Self {
        self.upsert = Some(upsert);
        self
    }
}

/// Body returned by a successful upload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadResponse {
    /// `{bucket}/{path}` of the stored object.
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "Id", default)]
    pub id: Option<String>,
}

/// ファイル情報
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileObject {
    pub name: String,
    #[serde(default)]
    pub bucket_id: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// ストレージクライアント
#[derive(Clone)]
pub struct StorageClient {
    base_url: String,
    api_key: String,
    access_token: Option<String>,
    http_client: Client,
}

/// ストレージバケットクライアント
pub struct StorageBucketClient<'a> {
    parent: &'a StorageClient,
    bucket_id: String,
}

impl StorageClient {
    /// 新しいストレージクライアントを作成
    pub fn new(base_url: &str, api_key: &str, http_client: Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            access_token: None,
            http_client,
        }
    }

    /// Act as the signed-in user instead of the anonymous role.
    pub fn with_auth(mut self, token: &str) -> Self {
        self.access_token = Some(token.to_string());
        self
    }

    /// バケットを指定
    pub fn from<'a>(&'a self, bucket_id: &str) -> StorageBucketClient<'a> {
        StorageBucketClient {
            parent: self,
            bucket_id: bucket_id.to_string(),
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let bearer = self.access_token.as_deref().unwrap_or(&self.api_key);
        request.header("apikey", &self.api_key).bearer_auth(bearer)
    }

    fn object_url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)?;
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| StorageError::InvalidPath(self.base_url.clone()))?;
            path.pop_if_empty().extend(["storage", "v1", "object"]);
            for segment in segments {
                path.extend(segment.split('/').filter(|part| !part.is_empty()));
            }
        }
        Ok(url)
    }
}

impl<'a> StorageBucketClient<'a> {
    /// ファイルをアップロード
    pub async fn upload(
        &self,
        path: &str,
        data: Vec<u8>,
        options: Option<FileOptions>,
    ) -> Result<UploadResponse> {
        if path.trim_matches('/').is_empty() {
            return Err(StorageError::InvalidPath(path.to_string()));
        }

        let url = self.parent.object_url(&[&self.bucket_id, path])?;
        let options = options.unwrap_or_default();
        debug!("uploading {} bytes to {}", data.len(), url);

        let file_name = path.rsplit('/').next().unwrap_or(path).to_string();
        let mut part = Part::bytes(data).file_name(file_name);
        if let Some(content_type) = &options.content_type {
            part = part.mime_str(content_type)?;
        }
        let form = Form::new().part("file", part);

        let request = self
            .parent
            .authorize(self.parent.http_client.post(url))
            .header("x-upsert", options.upsert.unwrap_or(false).to_string());

        let response = check_status(request.multipart(form).send().await?).await?;
        Ok(response.json::<UploadResponse>().await?)
    }

    /// ファイルを削除
    pub async fn remove(&self, paths: &[&str]) -> Result<Vec<FileObject>> {
        let url = self.parent.object_url(&[&self.bucket_id])?;

        let payload = serde_json::json!({
            "prefixes": paths
        });

        let response = self
            .parent
            .authorize(self.parent.http_client.delete(url))
            .json(&payload)
            .send()
            .await?;

        let response = check_status(response).await?;
        Ok(response.json::<Vec<FileObject>>().await?)
    }

    /// 公開URLを取得
    ///
    /// Only meaningful for public buckets; no request is made.
    pub fn get_public_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.parent.base_url,
            self.bucket_id,
            path.trim_start_matches('/')
        )
    }
}

async fn check_status(response: Response) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let error_text = response.text().await?;
    let message = serde_json::from_str::<serde_json::Value>(&error_text)
        .ok()
        .and_then(|body| {
            body.get("message")
                .or_else(|| body.get("error"))
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| format!("{} ({})", error_text, status));

    Err(StorageError::ApiError(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_upload_with_upsert_uses_user_token() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/storage/v1/object/avatars/user-1/me.png"))
            .and(header("x-upsert", "true"))
            .and(header("apikey", "anon-key"))
            .and(header("authorization", "Bearer user-token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "Key": "avatars/user-1/me.png" })),
            )
            .mount(&mock_server)
            .await;

        let storage =
            StorageClient::new(&mock_server.uri(), "anon-key", Client::new()).with_auth("user-token");
        let options = FileOptions::new()
            .with_content_type("image/png")
            .with_upsert(true);

        let response = storage
            .from("avatars")
            .upload("user-1/me.png", vec![0x89, 0x50, 0x4e, 0x47], Some(options))
            .await
            .unwrap();

        assert_eq!(response.key, "avatars/user-1/me.png");
    }

    #[tokio::test]
    async fn test_upload_conflict_reports_message() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/storage/v1/object/avatars/user-1/me.png"))
            .and(header("x-upsert", "false"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "statusCode": "409",
                "error": "Duplicate",
                "message": "The resource already exists"
            })))
            .mount(&mock_server)
            .await;

        let storage = StorageClient::new(&mock_server.uri(), "anon-key", Client::new());
        let result = storage
            .from("avatars")
            .upload("user-1/me.png", b"png".to_vec(), None)
            .await;

        match result {
            Err(StorageError::ApiError(message)) => {
                assert_eq!(message, "The resource already exists")
            }
            other => panic!("Expected ApiError, got {:?}", other),
        }
    }

    #[test]
    fn test_upload_rejects_empty_path() {
        tokio_test::block_on(async {
            let storage = StorageClient::new("http://localhost:54321", "anon-key", Client::new());
            let result = storage.from("avatars").upload("/", Vec::new(), None).await;
            assert!(matches!(result, Err(StorageError::InvalidPath(_))));
        });
    }

    #[tokio::test]
    async fn test_remove() {
        let mock_server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/storage/v1/object/avatars"))
            .and(body_json(json!({ "prefixes": ["user-1/old.png"] })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "name": "user-1/old.png", "bucket_id": "avatars" }
            ])))
            .mount(&mock_server)
            .await;

        let storage = StorageClient::new(&mock_server.uri(), "anon-key", Client::new());
        let removed = storage
            .from("avatars")
            .remove(&["user-1/old.png"])
            .await
            .unwrap();

        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].name, "user-1/old.png");
    }

    #[test]
    fn test_get_public_url() {
        let storage = StorageClient::new("https://example.supabase.co/", "anon-key", Client::new());
        assert_eq!(
            storage.from("avatars").get_public_url("user-1/me.png"),
            "https://example.supabase.co/storage/v1/object/public/avatars/user-1/me.png"
        );
    }
}

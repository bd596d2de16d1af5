//! File Gateway: profile pictures and other uploads in object storage.

use log::debug;
use reqwest::Client;
use std::sync::Arc;

use gigboard_storage::{FileOptions, StorageClient};

use crate::error::{Error, Result};
use crate::gateway::auth::AuthGateway;

pub struct FileGateway {
    base_url: String,
    anon_key: String,
    bucket: String,
    http_client: Client,
    auth: Arc<AuthGateway>,
}

impl FileGateway {
    pub fn new(
        base_url: &str,
        anon_key: &str,
        bucket: &str,
        http_client: Client,
        auth: Arc<AuthGateway>,
    ) -> Self {
        Self {
            base_url: base_url.to_string(),
            anon_key: anon_key.to_string(),
            bucket: bucket.to_string(),
            http_client,
            auth,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn storage(&self) -> StorageClient {
        let client = StorageClient::new(&self.base_url, &self.anon_key, self.http_client.clone());
        match self.auth.backend_token() {
            Some(token) => client.with_auth(&token),
            None => client,
        }
    }

    /// Store `bytes` at `path`, replacing any existing object. Returns the
    /// stored key.
    pub async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<String> {
        let options = FileOptions::new()
            .with_content_type(content_type)
            .with_upsert(true);
        let response = self
            .storage()
            .from(&self.bucket)
            .upload(path, bytes, Some(options))
            .await?;
        debug!("stored {}", response.key);
        Ok(response.key)
    }

    pub fn public_url(&self, path: &str) -> String {
        self.storage().from(&self.bucket).get_public_url(path)
    }

    pub async fn remove(&self, path: &str) -> Result<()> {
        self.storage().from(&self.bucket).remove(&[path]).await?;
        Ok(())
    }

    /// Upload a profile picture under `{user_id}/{file_name}` and return its
    /// public URL.
    pub async fn upload_avatar(
        &self,
        user_id: &str,
        file_name: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String> {
        let file_name = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
        if user_id.is_empty() || file_name.is_empty() {
            return Err(Error::general("avatar needs a user and a file name"));
        }

        let path = format!("{}/{}", user_id, file_name);
        self.upload(&path, bytes, content_type).await?;
        Ok(self.public_url(&path))
    }
}

//! Data Gateway: typed passthroughs to the marketplace tables.
//!
//! Every request runs as the signed-in user when there is one, so row-level
//! security decides what is visible and writable. Nothing is cached, retried
//! or paginated.

use chrono::Utc;
use log::debug;
use reqwest::Client;
use std::sync::Arc;

use gigboard_postgrest::{PostgrestClient, SortOrder};

use crate::error::{Error, Result};
use crate::gateway::auth::AuthGateway;
use crate::models::{
    Category, NewPost, NewService, Post, PostChanges, Profile, ProfileChanges, ProfileUpsert,
    Service, ServiceChanges, Subcategory,
};

pub const USERS: &str = "users";
pub const POSTS: &str = "posts";
pub const SERVICES: &str = "services";
pub const CATEGORIES: &str = "categories";
pub const SUBCATEGORIES: &str = "subcategories";

const POST_AUTHOR_COLUMNS: &str = "name,avatar_url";

pub struct DataGateway {
    base_url: String,
    anon_key: String,
    http_client: Client,
    auth: Arc<AuthGateway>,
}

impl DataGateway {
    pub fn new(base_url: &str, anon_key: &str, http_client: Client, auth: Arc<AuthGateway>) -> Self {
        Self {
            base_url: base_url.to_string(),
            anon_key: anon_key.to_string(),
            http_client,
            auth,
        }
    }

    /// Query builder for `table`, authorized as the current user if any.
    pub fn from(&self, table: &str) -> Result<PostgrestClient> {
        let client = PostgrestClient::new(
            &self.base_url,
            &self.anon_key,
            table,
            self.http_client.clone(),
        );
        match self.auth.backend_token() {
            Some(token) => Ok(client.with_auth(&token)?),
            None => Ok(client),
        }
    }

    fn first<T>(rows: Vec<T>, table: &str) -> Result<T> {
        rows.into_iter()
            .next()
            .ok_or_else(|| Error::general(format!("{} returned no row", table)))
    }

    // --- profiles ---

    /// `None` when the identity has no profile row yet.
    pub async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>> {
        debug!("loading profile {}", user_id);
        Ok(self
            .from(USERS)?
            .select("*")
            .eq("id", user_id)
            .maybe_single()
            .await?)
    }

    /// Insert the profile or replace the existing row with the same id.
    pub async fn upsert_profile(&self, profile: &ProfileUpsert) -> Result<Profile> {
        let rows = self
            .from(USERS)?
            .on_conflict("id")
            .upsert(profile)
            .await?;
        Self::first(rows, USERS)
    }

    pub async fn update_profile(&self, user_id: &str, changes: &ProfileChanges) -> Result<Profile> {
        let rows = self
            .from(USERS)?
            .eq("id", user_id)
            .update(changes)
            .await?;
        Self::first(rows, USERS)
    }

    // --- posts ---

    /// All posts, newest first, with the author's name and avatar.
    pub async fn list_posts(&self) -> Result<Vec<Post>> {
        Ok(self
            .from(POSTS)?
            .select("*")
            .include(USERS, Some(POST_AUTHOR_COLUMNS))
            .order("created_at", SortOrder::Descending)
            .execute()
            .await?)
    }

    pub async fn list_posts_by_user(&self, user_id: &str) -> Result<Vec<Post>> {
        Ok(self
            .from(POSTS)?
            .select("*")
            .include(USERS, Some(POST_AUTHOR_COLUMNS))
            .eq("user_id", user_id)
            .order("created_at", SortOrder::Descending)
            .execute()
            .await?)
    }

    pub async fn get_post(&self, post_id: i64) -> Result<Option<Post>> {
        Ok(self
            .from(POSTS)?
            .select("*")
            .include(USERS, Some(POST_AUTHOR_COLUMNS))
            .eq("id", &post_id.to_string())
            .maybe_single()
            .await?)
    }

    pub async fn create_post(&self, post: &NewPost) -> Result<Post> {
        let rows = self.from(POSTS)?.insert(post).await?;
        Self::first(rows, POSTS)
    }

    pub async fn update_post(&self, post_id: i64, changes: &PostChanges) -> Result<Post> {
        let rows = self
            .from(POSTS)?
            .eq("id", &post_id.to_string())
            .update(changes)
            .await?;
        Self::first(rows, POSTS)
    }

    pub async fn delete_post(&self, post_id: i64) -> Result<()> {
        self.from(POSTS)?
            .eq("id", &post_id.to_string())
            .delete::<Post>()
            .await?;
        Ok(())
    }

    // --- services ---

    /// The user's services with category and subcategory names.
    pub async fn list_services_by_user(&self, user_id: &str) -> Result<Vec<Service>> {
        Ok(self
            .from(SERVICES)?
            .select("*")
            .include(CATEGORIES, Some("name"))
            .include(SUBCATEGORIES, Some("name"))
            .eq("user_id", user_id)
            .order("created_at", SortOrder::Ascending)
            .execute()
            .await?)
    }

    pub async fn create_service(&self, service: &NewService) -> Result<Service> {
        let rows = self.from(SERVICES)?.insert(service).await?;
        Self::first(rows, SERVICES)
    }

    pub async fn update_service(&self, service_id: i64, changes: &ServiceChanges) -> Result<Service> {
        let rows = self
            .from(SERVICES)?
            .eq("id", &service_id.to_string())
            .update(changes)
            .await?;
        Self::first(rows, SERVICES)
    }

    pub async fn delete_service(&self, service_id: i64) -> Result<()> {
        self.from(SERVICES)?
            .eq("id", &service_id.to_string())
            .delete::<Service>()
            .await?;
        Ok(())
    }

    // --- reference data ---

    pub async fn list_categories(&self) -> Result<Vec<Category>> {
        Ok(self
            .from(CATEGORIES)?
            .select("*")
            .order("name", SortOrder::Ascending)
            .execute()
            .await?)
    }

    pub async fn list_subcategories(&self, category_id: i64) -> Result<Vec<Subcategory>> {
        Ok(self
            .from(SUBCATEGORIES)?
            .select("*")
            .eq("category_id", &category_id.to_string())
            .order("name", SortOrder::Ascending)
            .execute()
            .await?)
    }
}

/// Changes for an existing service, stamped with the current time.
pub fn service_changes(service: &NewService) -> ServiceChanges {
    ServiceChanges {
        category_id: service.category_id,
        subcategory_id: service.subcategory_id,
        description: service.description.clone(),
        rate: service.rate,
        currency: service.currency.clone(),
        updated_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Backend, GigboardConfig};
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gateway_for(server: &MockServer) -> DataGateway {
        let config = GigboardConfig::default().with_supabase(&server.uri(), "anon-key");
        let auth = Arc::new(AuthGateway::from_config(&config, Client::new()));
        DataGateway::new(&server.uri(), "anon-key", Client::new(), auth)
    }

    #[tokio::test]
    async fn test_missing_profile_is_none() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/users"))
            .and(query_param("id", "eq.user-1"))
            .and(header("authorization", "Bearer anon-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&mock_server)
            .await;

        let data = gateway_for(&mock_server);
        assert_eq!(data.get_profile("user-1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_list_posts_joins_author() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/posts"))
            .and(query_param("select", "*,users(name,avatar_url)"))
            .and(query_param("order", "created_at.desc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "id": 1,
                "title": "Hello",
                "content": "First post",
                "user_id": "user-1",
                "image_url": null,
                "created_at": "2024-03-01T10:00:00+00:00",
                "users": { "name": "Ada", "avatar_url": null }
            }])))
            .mount(&mock_server)
            .await;

        let posts = gateway_for(&mock_server).list_posts().await.unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(
            posts[0].author.as_ref().and_then(|a| a.name.as_deref()),
            Some("Ada")
        );
    }

    #[tokio::test]
    async fn test_list_subcategories_filters_by_category() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/subcategories"))
            .and(query_param("category_id", "eq.2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "id": 7, "name": "Logo Design", "category_id": 2 }
            ])))
            .mount(&mock_server)
            .await;

        let subcategories = gateway_for(&mock_server)
            .list_subcategories(2)
            .await
            .unwrap();
        assert_eq!(subcategories[0].name, "Logo Design");
    }

    #[tokio::test]
    async fn test_rls_rejection_is_an_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/rest/v1/services"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "code": "42501",
                "message": "permission denied for table services"
            })))
            .mount(&mock_server)
            .await;

        let err = gateway_for(&mock_server)
            .delete_service(9)
            .await
            .unwrap_err();
        assert_eq!(err.user_message(), "permission denied for table services");
    }

    #[tokio::test]
    async fn test_firebase_identity_reads_with_anon_key() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/accounts:signInWithPassword"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "localId": "fb-1",
                "email": "grace@example.com",
                "idToken": "firebase-id-token",
                "refreshToken": "refresh",
                "expiresIn": "3600"
            })))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/categories"))
            .and(header("authorization", "Bearer anon-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "id": 1, "name": "Web Development" }
            ])))
            .expect(1)
            .mount(&mock_server)
            .await;

        let config = GigboardConfig::default()
            .with_backend(Backend::Firebase)
            .with_supabase(&mock_server.uri(), "anon-key")
            .with_firebase("web-key", &mock_server.uri());
        let auth = Arc::new(AuthGateway::from_config(&config, Client::new()));
        auth.sign_in("grace@example.com", "secret").await.unwrap();

        let data = DataGateway::new(&mock_server.uri(), "anon-key", Client::new(), auth);
        let categories = data.list_categories().await.unwrap();
        assert_eq!(categories[0].name, "Web Development");
    }
}

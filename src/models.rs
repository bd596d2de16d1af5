//! Row types for the marketplace tables and the signed-in identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The signed-in user as seen by the rest of the client, whichever provider
/// issued it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    /// Provider-specific user metadata.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// A row of `users`. `id` is the identity id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Insert-or-replace payload for `users`, keyed by `id`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileUpsert {
    pub id: String,
    pub name: String,
    pub email: String,
    pub bio: String,
    /// Left out when unset so an upsert keeps the stored picture.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// Partial update of a `users` row.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProfileChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subcategory {
    pub id: i64,
    pub name: String,
    pub category_id: i64,
}

/// `name` of an embedded row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameRef {
    pub name: String,
}

/// A row of `services`, with the category and subcategory names embedded when
/// the query asked for them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub id: i64,
    pub user_id: String,
    pub category_id: i64,
    pub subcategory_id: i64,
    pub description: String,
    pub rate: f64,
    pub currency: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, rename = "categories", skip_serializing)]
    pub category: Option<NameRef>,
    #[serde(default, rename = "subcategories", skip_serializing)]
    pub subcategory: Option<NameRef>,
}

impl Service {
    pub fn category_name(&self) -> Option<&str> {
        self.category.as_ref().map(|c| c.name.as_str())
    }

    pub fn subcategory_name(&self) -> Option<&str> {
        self.subcategory.as_ref().map(|s| s.name.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewService {
    pub user_id: String,
    pub category_id: i64,
    pub subcategory_id: i64,
    pub description: String,
    pub rate: f64,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceChanges {
    pub category_id: i64,
    pub subcategory_id: i64,
    pub description: String,
    pub rate: f64,
    pub currency: String,
    pub updated_at: DateTime<Utc>,
}

/// Author columns embedded into a post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// A row of `posts`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub user_id: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, rename = "users", skip_serializing)]
    pub author: Option<Author>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PostChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_service_with_embedded_names() {
        let service: Service = serde_json::from_value(json!({
            "id": 4,
            "user_id": "8d0fd2b3-9ca7-4a0c-8f5e-3c1a2b4d5e6f",
            "category_id": 1,
            "subcategory_id": 3,
            "description": "Storefronts",
            "rate": 55.5,
            "currency": "EUR",
            "created_at": "2024-03-01T10:00:00.123456+00:00",
            "updated_at": null,
            "categories": { "name": "Web Development" },
            "subcategories": { "name": "E-commerce Development" }
        }))
        .unwrap();

        assert_eq!(service.category_name(), Some("Web Development"));
        assert_eq!(service.subcategory_name(), Some("E-commerce Development"));
        assert!(service.created_at.is_some());

        // 埋め込み列は書き込まない
        let value = serde_json::to_value(&service).unwrap();
        assert!(value.get("categories").is_none());
    }

    #[test]
    fn test_upsert_omits_missing_avatar() {
        let upsert = ProfileUpsert {
            id: "u1".to_string(),
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            bio: String::new(),
            avatar_url: None,
        };

        let value = serde_json::to_value(&upsert).unwrap();
        assert_eq!(
            value,
            json!({ "id": "u1", "name": "Ada", "email": "ada@example.com", "bio": "" })
        );
    }
}

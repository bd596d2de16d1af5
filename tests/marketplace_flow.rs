use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use gigboard::forms::FieldError;
use gigboard::prelude::*;

const USER_ID: &str = "8d0fd2b3-9ca7-4a0c-8f5e-3c1a2b4d5e6f";

fn user_body(display_name: &str) -> Value {
    json!({
        "id": USER_ID,
        "email": "ada@example.com",
        "app_metadata": {},
        "user_metadata": { "display_name": display_name }
    })
}

async fn mount_auth(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-1",
            "refresh_token": "refresh-1",
            "expires_in": 3600,
            "token_type": "bearer",
            "user": user_body("Ada")
        })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/auth/v1/logout"))
        .respond_with(ResponseTemplate::new(204))
        .mount(server)
        .await;
}

async fn mount_reference_data(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/categories"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 1, "name": "Web Development" }
        ])))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/subcategories"))
        .and(query_param("category_id", "eq.1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 3, "name": "E-commerce Development", "category_id": 1 }
        ])))
        .mount(server)
        .await;
}

async fn signed_in_app(server: &MockServer) -> Gigboard {
    mount_auth(server).await;
    let app =
        Gigboard::new(GigboardConfig::default().with_supabase(&server.uri(), "anon-key")).unwrap();
    app.auth.sign_in("ada@example.com", "secret").await.unwrap();
    app
}

fn service_row(id: i64) -> Value {
    json!({
        "id": id,
        "user_id": USER_ID,
        "category_id": 1,
        "subcategory_id": 3,
        "description": "Shopify storefronts",
        "rate": 45.5,
        "currency": "USD",
        "created_at": "2024-03-01T10:00:00+00:00",
        "updated_at": null
    })
}

fn service_form() -> ServiceForm {
    ServiceForm {
        category_id: Some(1),
        subcategory_id: Some(3),
        description: "Shopify storefronts".to_string(),
        rate: "45.50".to_string(),
        currency: "usd".to_string(),
    }
}

#[tokio::test]
async fn signing_out_redirects_protected_pages_to_login() {
    let mock_server = MockServer::start().await;
    mount_auth(&mock_server).await;

    let app =
        Gigboard::new(GigboardConfig::default().with_supabase(&mock_server.uri(), "anon-key")).unwrap();
    let (mut store, _writer) = app.session();

    let initial = store.wait_until_ready().await;
    assert!(initial.identity.is_none());

    app.auth.sign_in("ada@example.com", "secret").await.unwrap();
    let state = store.wait_for(|state| state.is_signed_in()).await.unwrap();
    assert_eq!(state.identity.map(|i| i.id), Some(USER_ID.to_string()));

    let mut route_guard = RouteGuard::new(store.clone());
    assert_eq!(route_guard.check(Route::Profile), GuardDecision::Allow);
    assert_eq!(route_guard.check(Route::Login), GuardDecision::Redirect(Route::Home));

    app.auth.sign_out().await.unwrap();

    assert_eq!(route_guard.watch(Route::Profile).await, Some(Route::Login));
    assert!(store.identity().is_none());
}

#[tokio::test]
async fn an_incomplete_service_form_never_reaches_the_backend() {
    let mock_server = MockServer::start().await;
    let app = signed_in_app(&mock_server).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/services"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([service_row(1)])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let (notifier, mut notices) = gigboard::notify::channel();
    let mut editor = ServiceEditor::new(app.data.clone(), notifier, USER_ID);

    for form in [
        ServiceForm { category_id: None, ..service_form() },
        ServiceForm { description: "  ".to_string(), ..service_form() },
        ServiceForm { rate: String::new(), ..service_form() },
        ServiceForm { currency: String::new(), ..service_form() },
    ] {
        let err = editor.submit(&form, &[], &[]).await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(notices.try_recv().unwrap().level, NoticeLevel::Error);
    }

    match editor.submit(&ServiceForm::default(), &[], &[]).await {
        Err(Error::Validation(errors)) => {
            assert!(errors.contains(&FieldError::Missing("subcategory")));
            assert!(errors.contains(&FieldError::Missing("rate")));
        }
        other => panic!("expected validation errors, got {:?}", other.map(|d| d.clone())),
    }
    assert!(editor.drafts().is_empty());
}

#[tokio::test]
async fn creating_a_service_appends_a_draft_with_names() {
    let mock_server = MockServer::start().await;
    let app = signed_in_app(&mock_server).await;
    mount_reference_data(&mock_server).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/services"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([service_row(41)])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let categories = CategoriesHook::mount(app.data.clone()).await;
    let subcategories = SubcategoriesHook::mount(app.data.clone());
    subcategories.select_category(Some(1)).await;

    let (notifier, mut notices) = gigboard::notify::channel();
    let mut editor = ServiceEditor::new(app.data.clone(), notifier, USER_ID);
    let before = editor.drafts().len();

    let draft = editor
        .submit(
            &service_form(),
            categories.state().items(),
            subcategories.state().items(),
        )
        .await
        .unwrap()
        .clone();

    assert_eq!(editor.drafts().len(), before + 1);
    assert_eq!(draft.id, Some(41));
    assert_eq!(draft.category_name.as_deref(), Some("Web Development"));
    assert_eq!(draft.subcategory_name.as_deref(), Some("E-commerce Development"));
    assert_eq!(draft.currency, "USD");
    assert_eq!(notices.try_recv().unwrap().level, NoticeLevel::Success);

    let requests = mock_server.received_requests().await.unwrap();
    let insert = requests
        .iter()
        .find(|r| r.url.path() == "/rest/v1/services")
        .unwrap();
    let body: Value = serde_json::from_slice(&insert.body).unwrap();
    assert_eq!(body["user_id"], USER_ID);
    assert_eq!(body["rate"], 45.5);
}

#[tokio::test]
async fn save_all_reports_entries_that_failed() {
    let mock_server = MockServer::start().await;
    let app = signed_in_app(&mock_server).await;
    mount_reference_data(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/services"))
        .and(query_param("user_id", format!("eq.{}", USER_ID).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([service_row(7)])))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/services"))
        .and(query_param("id", "eq.7"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "code": "42501",
            "message": "permission denied for table services"
        })))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/services"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([service_row(8)])))
        .mount(&mock_server)
        .await;

    let categories = CategoriesHook::mount(app.data.clone()).await;
    let subcategories = SubcategoriesHook::mount(app.data.clone());
    subcategories.select_category(Some(1)).await;

    let (notifier, _notices) = gigboard::notify::channel();
    let mut editor = ServiceEditor::new(app.data.clone(), notifier, USER_ID);
    editor.load().await.unwrap();
    editor
        .add_draft(
            &service_form(),
            categories.state().items(),
            subcategories.state().items(),
        )
        .unwrap();

    let report = editor.save_all().await;

    assert_eq!(report.saved, 1);
    assert_eq!(
        report.failures,
        vec![(0, "permission denied for table services".to_string())]
    );
    assert_eq!(editor.drafts()[1].id, Some(8));
}

#[tokio::test]
async fn a_new_user_loads_an_empty_profile() {
    let mock_server = MockServer::start().await;
    let app = signed_in_app(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/users"))
        .and(query_param("id", format!("eq.{}", USER_ID).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let identity = app.auth.current_identity().unwrap();
    let (notifier, _notices) = gigboard::notify::channel();
    let editor = ProfileEditor::new(
        app.data.clone(),
        app.files.clone(),
        app.auth.clone(),
        notifier,
        identity,
    );

    assert_eq!(editor.load().await.unwrap(), ProfileForm::default());
}

#[tokio::test]
async fn saving_the_same_profile_twice_stores_the_same_row() {
    let mock_server = MockServer::start().await;
    let app = signed_in_app(&mock_server).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/users"))
        .and(query_param("on_conflict", "id"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([{
            "id": USER_ID,
            "name": "Ada Lovelace",
            "email": "ada@example.com",
            "bio": "Analytical engines",
            "avatar_url": null,
            "created_at": "2024-03-01T10:00:00+00:00"
        }])))
        .expect(2)
        .mount(&mock_server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/auth/v1/user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(user_body("Ada Lovelace")))
        .expect(2)
        .mount(&mock_server)
        .await;

    let identity = app.auth.current_identity().unwrap();
    let (notifier, mut notices) = gigboard::notify::channel();
    let editor = ProfileEditor::new(
        app.data.clone(),
        app.files.clone(),
        app.auth.clone(),
        notifier,
        identity,
    );

    let form = ProfileForm {
        name: "Ada Lovelace".to_string(),
        email: "ada@example.com".to_string(),
        bio: "Analytical engines".to_string(),
        avatar_url: None,
    };
    let first = editor.save(&form).await.unwrap();
    let second = editor.save(&form).await.unwrap();
    assert_eq!(first, second);

    let upserts: Vec<Value> = mock_server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/rest/v1/users")
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect();
    assert_eq!(upserts.len(), 2);
    assert_eq!(upserts[0], upserts[1]);
    assert_eq!(upserts[0]["id"], USER_ID);

    assert_eq!(
        app.auth.current_identity().and_then(|i| i.display_name),
        Some("Ada Lovelace".to_string())
    );
    assert_eq!(notices.try_recv().unwrap().level, NoticeLevel::Success);
}

#[tokio::test]
async fn an_invalid_profile_is_rejected_locally() {
    let mock_server = MockServer::start().await;
    let app = signed_in_app(&mock_server).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/users"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let identity = app.auth.current_identity().unwrap();
    let (notifier, _notices) = gigboard::notify::channel();
    let editor = ProfileEditor::new(
        app.data.clone(),
        app.files.clone(),
        app.auth.clone(),
        notifier,
        identity,
    );

    let form = ProfileForm {
        name: "Ada".to_string(),
        email: "not-an-email".to_string(),
        ..Default::default()
    };
    let err = editor.save(&form).await.unwrap_err();
    assert!(err.is_validation());
}

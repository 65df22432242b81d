//! HTTP surface of the dream journal.
//!
//! Public routes cover auth, share links and database setup; everything under
//! the protected router needs a bearer JWT whose `sub` identifies the user.

pub mod ai;
pub mod auth;
pub mod dreams;
pub mod error;
pub mod middleware;
pub mod profile;
pub mod setup;
pub mod shares;
pub mod state;
pub mod storage;
pub mod subscription;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, post},
};

pub use state::{AppState, AppStateInner, DebugInfo};

use crate::middleware::require_auth;
use crate::storage::MAX_AVATAR_BYTES;

pub async fn health() -> &'static str {
    "ok"
}

pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/share/{id}", get(shares::get_share))
        .route("/api/check-connection", get(setup::check_connection))
        .route("/api/setup/status", get(setup::setup_status))
        .route("/api/init-db", post(setup::init_db))
        .route("/api/run-migration", get(setup::run_migration).post(setup::run_migration))
        .route("/api/debug", get(setup::debug));

    let protected_routes = Router::new()
        .route("/api/profile", get(profile::get_profile).put(profile::update_profile))
        .route(
            "/api/profile/avatar",
            post(profile::upload_avatar).layer(DefaultBodyLimit::max(MAX_AVATAR_BYTES)),
        )
        .route("/api/subscription", post(subscription::update_subscription))
        .route("/api/dreams", get(dreams::list_dreams).post(dreams::create_dream))
        .route("/api/dreams/{id}", get(dreams::get_dream).delete(dreams::delete_dream))
        .route("/api/interpret-dream", post(ai::interpret))
        .route("/api/generate-title", post(ai::title))
        .route("/api/generate-artwork", post(ai::artwork))
        .route("/api/generate-horoscope", post(ai::horoscope))
        .route("/api/share", post(shares::create_share))
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use uuid::Uuid;

    use dreamvault_ai::{AiError, ChatRequest, ImageRequest, LanguageModel};
    use dreamvault_db::Database;

    use super::*;
    use crate::storage::AvatarStore;

    const BIRTHDAY_MESSAGE: &str = "Please set your birthday in settings to generate horoscopes";

    struct StubModel {
        reply: Option<String>,
        image: Option<String>,
    }

    #[async_trait]
    impl LanguageModel for StubModel {
        async fn chat(&self, _request: ChatRequest) -> Result<String, AiError> {
            self.reply.clone().ok_or(AiError::Upstream { status: 500, body: "boom".into() })
        }

        async fn generate_image(&self, _request: ImageRequest) -> Result<Option<String>, AiError> {
            Ok(self.image.clone())
        }
    }

    fn silent_model() -> StubModel {
        StubModel { reply: None, image: None }
    }

    fn test_state(ai: StubModel, provisioned: bool) -> AppState {
        let db = Database::open_in_memory().unwrap();
        if provisioned {
            db.init_core_schema().unwrap();
            db.run_column_migrations().unwrap();
        }
        Arc::new(AppStateInner {
            db,
            ai: Arc::new(ai),
            avatars: AvatarStore::disabled(),
            jwt_secret: "test-secret".into(),
            app_url: "https://dreamvault.test".into(),
            debug: DebugInfo::default(),
        })
    }

    /// Token for a fresh user id, without going through password hashing.
    fn token_for(state: &AppState) -> (Uuid, String) {
        let user_id = Uuid::new_v4();
        let token = auth::create_token(&state.jwt_secret, user_id, "dreamer@example.com").unwrap();
        (user_id, token)
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let body = match body {
            Some(v) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };

        let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn set_dreams_count(state: &AppState, user_id: Uuid, count: i64) {
        state
            .db
            .with_conn(|conn| {
                conn.execute(
                    "UPDATE profiles SET dreams_count = ?1 WHERE user_id = ?2",
                    (count, user_id.to_string()),
                )?;
                Ok(())
            })
            .unwrap();
    }

    fn count_dreams(state: &AppState) -> i64 {
        state
            .db
            .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM dreams", [], |row| row.get(0))?))
            .unwrap()
    }

    #[tokio::test]
    async fn register_login_and_profile() {
        let state = test_state(silent_model(), true);
        let app = router(state);

        let creds = json!({ "email": "Ada@Example.com", "password": "correct horse" });
        let (status, body) = send(&app, "POST", "/api/auth/register", None, Some(creds.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(body["token"].is_string());

        let (status, _) = send(&app, "POST", "/api/auth/register", None, Some(creds)).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let wrong = json!({ "email": "ada@example.com", "password": "wrong password" });
        let (status, _) = send(&app, "POST", "/api/auth/login", None, Some(wrong)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let right = json!({ "email": "ada@example.com", "password": "correct horse" });
        let (status, body) = send(&app, "POST", "/api/auth/login", None, Some(right)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["email"], "ada@example.com");
        let token = body["token"].as_str().unwrap().to_string();

        let (status, profile) = send(&app, "GET", "/api/profile", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(profile["subscription_tier"], "free");
        assert_eq!(profile["quota"]["remaining"], 5);
        assert_eq!(profile["repairs"], json!([]));
    }

    #[tokio::test]
    async fn register_treats_blank_birthday_as_unset() {
        let state = test_state(silent_model(), true);
        let app = router(state);

        let creds = json!({ "email": "blank@example.com", "password": "correct horse", "birthday": "  " });
        let (status, body) = send(&app, "POST", "/api/auth/register", None, Some(creds)).await;
        assert_eq!(status, StatusCode::CREATED);
        let token = body["token"].as_str().unwrap().to_string();

        let (status, profile) = send(&app, "GET", "/api/profile", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(profile["birthday"], Value::Null);
        assert_eq!(profile["full_name"], Value::Null);
    }

    #[tokio::test]
    async fn protected_routes_need_a_valid_token() {
        let app = router(test_state(silent_model(), true));

        let (status, body) = send(&app, "GET", "/api/dreams", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "unauthorized");

        let (status, _) = send(&app, "GET", "/api/dreams", Some("not-a-jwt"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let basic = Request::builder()
            .uri("/api/dreams")
            .header(header::AUTHORIZATION, "Basic YWRhOnNlY3JldA==")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(basic).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "unauthorized");

        let (status, _) = send(&app, "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn exhausted_quota_rejects_without_writing() {
        let state = test_state(silent_model(), true);
        let app = router(state.clone());
        let (user_id, token) = token_for(&state);

        send(&app, "GET", "/api/profile", Some(&token), None).await;
        set_dreams_count(&state, user_id, 5);

        let dream = json!({ "title": "Falling", "content": "I fell through clouds", "tags": ["sky"] });
        let (status, body) = send(&app, "POST", "/api/dreams", Some(&token), Some(dream)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "quota_exceeded");
        assert!(body["message"].as_str().unwrap().contains("limit of 5"));
        assert_eq!(body["quota"]["remaining"], 0);
        assert_eq!(count_dreams(&state), 0);
    }

    #[tokio::test]
    async fn create_dream_counts_quota_and_attaches_artwork() {
        let ai = StubModel { reply: None, image: Some("https://img.test/1.png".into()) };
        let state = test_state(ai, true);
        let app = router(state.clone());
        let (_, token) = token_for(&state);
        send(&app, "GET", "/api/profile", Some(&token), None).await;

        let dream = json!({
            "title": "Lanterns",
            "content": "Lanterns floated over a lake",
            "interpretation": { "summary": "Hope", "symbols": [{ "name": "lantern" }] },
            "tags": ["water", " ", "light"]
        });
        let (status, body) = send(&app, "POST", "/api/dreams", Some(&token), Some(dream)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["quota"]["dreams_count"], 1);
        assert_eq!(body["artwork_url"], "https://img.test/1.png");
        assert_eq!(body["has_artwork"], true);
        assert_eq!(body["tags"], json!(["water", "light"]));

        let (status, list) = send(&app, "GET", "/api/dreams", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_artwork_still_saves_dream() {
        let state = test_state(silent_model(), true);
        let app = router(state.clone());
        let (_, token) = token_for(&state);

        let dream = json!({
            "title": "Keys",
            "content": "A door of keys",
            "interpretation": { "summary": "Access" }
        });
        let (status, body) = send(&app, "POST", "/api/dreams", Some(&token), Some(dream)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["has_artwork"], true);
        assert_eq!(body["artwork_url"], Value::Null);
        assert_eq!(count_dreams(&state), 1);
    }

    #[tokio::test]
    async fn listing_dreams_without_schema_is_empty() {
        let state = test_state(silent_model(), false);
        let app = router(state.clone());
        let (_, token) = token_for(&state);

        let (status, body) = send(&app, "GET", "/api/dreams", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn dream_validation_and_missing_schema() {
        let state = test_state(silent_model(), false);
        let app = router(state.clone());
        let (_, token) = token_for(&state);

        let blank = json!({ "title": " ", "content": "x" });
        let (status, _) = send(&app, "POST", "/api/dreams", Some(&token), Some(blank)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let dream = json!({ "title": "t", "content": "c" });
        let (status, body) = send(&app, "POST", "/api/dreams", Some(&token), Some(dream)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "schema_missing");
    }

    #[tokio::test]
    async fn dreams_are_private_and_deletable() {
        let state = test_state(silent_model(), true);
        let app = router(state.clone());
        let (_, owner) = token_for(&state);
        let (_, stranger) = token_for(&state);

        let dream = json!({ "title": "Owls", "content": "Owls talking", "tags": ["night"] });
        let (_, created) = send(&app, "POST", "/api/dreams", Some(&owner), Some(dream)).await;
        let uri = format!("/api/dreams/{}", created["id"].as_str().unwrap());

        let (status, _) = send(&app, "GET", &uri, Some(&stranger), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, "DELETE", &uri, Some(&stranger), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(&app, "GET", &uri, Some(&owner), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tags"], json!(["night"]));

        let (status, _) = send(&app, "DELETE", &uri, Some(&owner), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, "GET", &uri, Some(&owner), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn subscription_changes_tier_and_limit() {
        let state = test_state(silent_model(), true);
        let app = router(state.clone());
        let (_, token) = token_for(&state);

        let (status, body) =
            send(&app, "POST", "/api/subscription", Some(&token), Some(json!({ "newTier": "platinum" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid subscription tier");

        let (status, body) =
            send(&app, "POST", "/api/subscription", Some(&token), Some(json!({ "newTier": "pro" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["newTier"], "pro");
        assert_eq!(body["dreamsLimit"], 30);

        let (_, profile) = send(&app, "GET", "/api/profile", Some(&token), None).await;
        assert_eq!(profile["dreams_limit"], 30);
        assert_eq!(profile["quota"]["remaining"], 30);
    }

    #[tokio::test]
    async fn share_links_count_views() {
        let state = test_state(silent_model(), true);
        let app = router(state.clone());
        let (_, token) = token_for(&state);

        let (status, _) =
            send(&app, "POST", "/api/share", Some(&token), Some(json!({ "type": "poem", "content": "x" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let req = json!({ "type": "affirmation", "content": "I am calm" });
        let (status, body) = send(&app, "POST", "/api/share", Some(&token), Some(req)).await;
        assert_eq!(status, StatusCode::OK);
        let share_id = body["shareId"].as_str().unwrap().to_string();
        assert_eq!(share_id.len(), 10);
        assert_eq!(body["shareUrl"], format!("https://dreamvault.test/share/{}", share_id));

        let uri = format!("/api/share/{}", share_id);
        send(&app, "GET", &uri, None, None).await;
        let (status, shared) = send(&app, "GET", &uri, None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(shared["views"], 2);
        assert_eq!(shared["title"], "Shared Dream");

        let (status, _) = send(&app, "GET", "/api/share/missing0000", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn horoscope_needs_a_birthday() {
        let reply = json!({
            "dailyHoroscope": "A tide turns",
            "dreamConnection": "Water mirrors your moods",
            "cosmicInsight": "The moon favors rest",
            "advice": "Journal tonight"
        });
        let state = test_state(StubModel { reply: Some(reply.to_string()), image: None }, true);
        let app = router(state.clone());
        let (_, token) = token_for(&state);
        let req = json!({ "dreamText": "I swam with whales" });

        let (status, body) = send(&app, "POST", "/api/generate-horoscope", Some(&token), Some(req.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], BIRTHDAY_MESSAGE);

        let (status, _) =
            send(&app, "PUT", "/api/profile", Some(&token), Some(json!({ "birthday": "1990-07-10" }))).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&app, "POST", "/api/generate-horoscope", Some(&token), Some(req)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["zodiacSign"], "Cancer");
        assert_eq!(body["horoscope"]["advice"], "Journal tonight");
    }

    #[tokio::test]
    async fn interpretation_falls_back_and_title_defaults() {
        let state = test_state(silent_model(), true);
        let app = router(state.clone());
        let (_, token) = token_for(&state);
        let req = json!({ "dreamText": "I was late for an exam" });

        let (status, body) = send(&app, "POST", "/api/interpret-dream", Some(&token), Some(req.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["error"], "Failed to interpret dream");

        let (status, body) = send(&app, "POST", "/api/generate-title", Some(&token), Some(req)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["title"], "Untitled Dream");

        let (status, _) =
            send(&app, "POST", "/api/interpret-dream", Some(&token), Some(json!({ "dreamText": "" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn setup_flow_reports_and_migrates() {
        let state = test_state(silent_model(), false);
        let app = router(state);

        let (status, body) = send(&app, "GET", "/api/run-migration", None, None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body["message"].as_str().unwrap().contains("profiles"));

        let (_, body) = send(&app, "GET", "/api/setup/status", None, None).await;
        assert_eq!(body["tables"]["allTablesExist"], false);

        let (status, _) = send(&app, "POST", "/api/init-db", None, None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&app, "POST", "/api/run-migration", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["added"].as_array().unwrap().len(), 3);

        let (_, body) = send(&app, "GET", "/api/run-migration", None, None).await;
        assert_eq!(body["message"], "All migrations already applied");

        let (_, body) = send(&app, "GET", "/api/setup/status", None, None).await;
        assert_eq!(body["tables"]["allTablesExist"], true);
        assert_eq!(body["capabilities"]["artworkUrl"], true);

        let (_, body) = send(&app, "GET", "/api/check-connection", None, None).await;
        assert_eq!(body["success"], true);

        let (_, body) = send(&app, "GET", "/api/debug", None, None).await;
        assert_eq!(body["openaiApiKey"], "Not set");
    }

    #[tokio::test]
    async fn avatar_upload_falls_back_inline() {
        let state = test_state(silent_model(), true);
        let app = router(state.clone());
        let (_, token) = token_for(&state);

        let upload = |content_type: &'static str| {
            Request::builder()
                .method("POST")
                .uri("/api/profile/avatar")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .header(header::CONTENT_TYPE, content_type)
                .body(Body::from(vec![1u8, 2, 3]))
                .unwrap()
        };

        let response = app.clone().oneshot(upload("text/plain")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app.clone().oneshot(upload("image/png")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["stored"], "inline");
        assert_eq!(body["url"], "data:image/png;base64,AQID");

        let (_, profile) = send(&app, "GET", "/api/profile", Some(&token), None).await;
        assert_eq!(profile["avatar_url"], "data:image/png;base64,AQID");
    }
}

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::header;
use axum::routing::{get, put};
use tower::ServiceBuilder;
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};

use super::{profiles, users};
use crate::AppState;

/// Admin routes. The host inserts an [`super::Actor`] extension on every
/// request before nesting this router.
pub fn router(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(tracing::Level::INFO))
                .on_response(DefaultOnResponse::new().level(tracing::Level::INFO)),
        )
        // Remove sensitive headers from trace.
        .layer(SetSensitiveHeadersLayer::new([
            header::AUTHORIZATION,
            header::COOKIE,
        ]));

    // Raw uploads are bounded by the media limit, JSON bodies by the default.
    let upload_limit = DefaultBodyLimit::max(state.config.media.max_upload_bytes + 1);

    Router::new()
        .route("/users", get(users::list).post(users::create))
        .route("/users/{id}", get(users::get).patch(users::update))
        .route(
            "/users/{id}/image",
            put(users::upload_image).layer(upload_limit.clone()),
        )
        .route("/profiles", get(profiles::list).post(profiles::create))
        .route("/profiles/{id}", get(profiles::get).patch(profiles::update))
        .route(
            "/profiles/{id}/avatar",
            put(profiles::upload_avatar).layer(upload_limit),
        )
        .with_state(state)
        .layer(middleware)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::admin::Actor;
    use crate::database::memory::{MemoryProfileRepository, MemoryUserRepository};
    use crate::error::{AccountError, Result};
    use crate::user::{NewUser, Roles, User, UserQuery, UserRepository};

    /// Readable users whose updates always fail.
    struct FrozenUsers(Arc<MemoryUserRepository>);

    #[async_trait]
    impl UserRepository for FrozenUsers {
        async fn find_by_id(&self, id: i64) -> Result<Option<User>> {
            self.0.find_by_id(id).await
        }

        async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
            self.0.find_by_email(email).await
        }

        async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
            self.0.find_by_username(username).await
        }

        async fn insert(&self, user: &NewUser, promote: Option<Roles>) -> Result<User> {
            self.0.insert(user, promote).await
        }

        async fn update(&self, _: &User) -> Result<()> {
            Err(AccountError::Internal {
                details: "connection lost".into(),
            })
        }

        async fn list(&self, query: &UserQuery) -> Result<Vec<User>> {
            self.0.list(query).await
        }

        async fn count(&self, query: &UserQuery) -> Result<u64> {
            self.0.count(query).await
        }
    }

    struct TestApp {
        state: AppState,
        _media: tempfile::TempDir,
    }

    async fn app() -> TestApp {
        let media = tempfile::tempdir().unwrap();
        let state = crate::memory_state(media.path());

        TestApp {
            state,
            _media: media,
        }
    }

    async fn actor(state: &AppState, roles: Roles, groups: &[&str]) -> Actor {
        let user = state
            .manager
            .create_user(&format!("actor{}@user.com", groups.len()), "actor", Some("password"))
            .await
            .unwrap();
        let mut user = user;
        user.set_roles(roles);
        state.users.update(&user).await.unwrap();

        Actor::new(user, groups.iter().copied())
    }

    async fn send(
        state: &AppState,
        actor: Option<&Actor>,
        method: Method,
        path: &str,
        body: Body,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder()
            .method(method)
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body)
            .unwrap();
        if let Some(actor) = actor {
            request.extensions_mut().insert(actor.clone());
        }

        let response = router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();

        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    fn json(value: Value) -> Body {
        Body::from(value.to_string())
    }

    #[tokio::test]
    async fn test_requires_actor() {
        let app = app().await;

        let (status, _) = send(&app.state, None, Method::GET, "/users", Body::empty()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_site_gate() {
        let app = app().await;
        // Staff users are created inactive.
        let actor = actor(&app.state, Roles::staff(), &[]).await;

        let (status, _) =
            send(&app.state, Some(&actor), Method::GET, "/users", Body::empty()).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_change_list() {
        let app = app().await;
        let actor = actor(&app.state, Roles::superuser(), &[]).await;
        for (email, username) in [("carol@user.com", "carol"), ("alice@user.com", "wonder")] {
            app.state
                .manager
                .create_user(email, username, Some("password"))
                .await
                .unwrap();
        }

        let (status, body) =
            send(&app.state, Some(&actor), Method::GET, "/users", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 3);
        assert_eq!(body["date_hierarchy"], "date_joined");
        let emails = body["results"]
            .as_array()
            .unwrap()
            .iter()
            .map(|row| row["email"].as_str().unwrap().to_owned())
            .collect::<Vec<_>>();
        assert_eq!(emails, ["actor0@user.com", "alice@user.com", "carol@user.com"]);
        assert!(body["results"][0].get("password").is_none());
        assert!(body["results"][0].get("bio").is_none());

        let (_, body) = send(
            &app.state,
            Some(&actor),
            Method::GET,
            "/users?q=WONDER",
            Body::empty(),
        )
        .await;
        assert_eq!(body["count"], 1);
        assert_eq!(body["results"][0]["email"], "alice@user.com");

        let (_, body) = send(
            &app.state,
            Some(&actor),
            Method::GET,
            "/users?is_admin=true&o=-email",
            Body::empty(),
        )
        .await;
        assert_eq!(body["count"], 1);
        assert_eq!(body["results"][0]["username"], "actor");
    }

    #[tokio::test]
    async fn test_create_user() {
        let app = app().await;
        let actor = actor(&app.state, Roles::superuser(), &["staff"]).await;

        let (status, body) = send(
            &app.state,
            Some(&actor),
            Method::POST,
            "/users",
            json(json!({
                "email": "New@User.com",
                "username": "NewUser",
                "password1": "secret",
                "password2": "secret",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["email"], "new@user.com");
        assert_eq!(body["username"], "newuser");
        assert!(body.get("password").is_none());

        let (status, body) = send(
            &app.state,
            Some(&actor),
            Method::POST,
            "/users",
            json(json!({
                "email": "new@user.com",
                "username": "other",
                "password1": "secret",
                "password2": "different",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let fields = body["errors"]
            .as_array()
            .unwrap()
            .iter()
            .map(|error| error["field"].as_str().unwrap().to_owned())
            .collect::<Vec<_>>();
        assert_eq!(fields, ["email", "password2"]);
    }

    #[tokio::test]
    async fn test_staff_group_cannot_change() {
        let app = app().await;
        let actor = actor(&app.state, Roles::superuser(), &["staff"]).await;
        let path = format!("/users/{}", actor.user.id);

        let (status, _) = send(
            &app.state,
            Some(&actor),
            Method::PATCH,
            &path,
            json(json!({ "bio": "hello" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) =
            send(&app.state, Some(&actor), Method::GET, &path, Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["can_change"], false);
        assert_eq!(body["can_delete"], true);
        assert_eq!(body["password"]["algorithm"], "argon2id");
    }

    #[tokio::test]
    async fn test_change_user() {
        let app = app().await;
        let actor = actor(&app.state, Roles::superuser(), &[]).await;
        let target = app
            .state
            .manager
            .create_user("a@user.com", "a", Some("password"))
            .await
            .unwrap();

        let (status, body) = send(
            &app.state,
            Some(&actor),
            Method::PATCH,
            &format!("/users/{}", target.id),
            json(json!({ "password": "hijacked", "is_active": true, "id": 999 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["id"], target.id);
        assert_eq!(body["user"]["is_active"], true);

        let stored = app.state.users.find_by_id(target.id).await.unwrap().unwrap();
        assert_eq!(stored.password, target.password);

        let (status, _) = send(
            &app.state,
            Some(&actor),
            Method::GET,
            "/users/4242",
            Body::empty(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_upload_profile_image() {
        let app = app().await;
        let actor = actor(&app.state, Roles::superuser(), &[]).await;

        let (status, body) = send(
            &app.state,
            Some(&actor),
            Method::PUT,
            &format!("/users/{}/image", actor.user.id),
            Body::from(crate::media::png(640, 480)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let reference = body["user"]["profile_image"].as_str().unwrap();
        assert!(reference.starts_with("images/profile_pics/"));
        assert_eq!(body["profile_image_url"], format!("media/{reference}"));

        let stored = app.state.media.config().root.join(reference);
        let img = image::open(stored).unwrap();
        assert_eq!((img.width(), img.height()), (320, 320));

        let (status, _) = send(
            &app.state,
            Some(&actor),
            Method::PUT,
            &format!("/users/{}/image", actor.user.id),
            Body::from("not an image"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let app = app().await;
        let actor = actor(&app.state, Roles::superuser(), &[]).await;
        let path = format!("/users/{}", actor.user.id);

        let (status, body) = send(
            &app.state,
            Some(&actor),
            Method::PATCH,
            &path,
            json(json!({ "is_active": "yes" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], 400);
        assert_eq!(body["title"], "Request body could not be parsed.");

        let (status, body) = send(
            &app.state,
            Some(&actor),
            Method::POST,
            "/users",
            Body::from("{\"email\": "),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["title"], "Request body could not be parsed.");

        let stored = app.state.users.find_by_id(actor.user.id).await.unwrap().unwrap();
        assert_eq!(stored.is_active, actor.user.is_active);
    }

    #[tokio::test]
    async fn test_upload_storage_failure() {
        // The media root is a regular file, so no directory can be created.
        let root = tempfile::NamedTempFile::new().unwrap();
        let state = crate::memory_state(root.path());
        let actor = actor(&state, Roles::superuser(), &[]).await;

        let (status, body) = send(
            &state,
            Some(&actor),
            Method::PUT,
            &format!("/users/{}/image", actor.user.id),
            Body::from(crate::media::png(64, 64)),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["status"], 500);

        let stored = state.users.find_by_id(actor.user.id).await.unwrap().unwrap();
        assert_eq!(stored.profile_image, actor.user.profile_image);
    }

    #[tokio::test]
    async fn test_upload_discarded_when_update_fails() {
        let app = app().await;
        let users = Arc::new(MemoryUserRepository::default());
        let profiles = Arc::new(MemoryProfileRepository::default());
        let writable =
            AppState::new(Arc::clone(&app.state.config), users.clone(), profiles.clone())
                .unwrap();
        let actor = actor(&writable, Roles::superuser(), &[]).await;
        let frozen =
            AppState::new(Arc::clone(&app.state.config), Arc::new(FrozenUsers(users)), profiles)
                .unwrap();

        let (status, _) = send(
            &frozen,
            Some(&actor),
            Method::PUT,
            &format!("/users/{}/image", actor.user.id),
            Body::from(crate::media::png(64, 64)),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

        let directory = app.state.media.config().root.join("images/profile_pics");
        assert_eq!(std::fs::read_dir(directory).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_profiles() {
        let app = app().await;
        let actor = actor(&app.state, Roles::superuser(), &[]).await;

        let (status, body) = send(
            &app.state,
            Some(&actor),
            Method::POST,
            "/profiles",
            json(json!({
                "user_id": actor.user.id,
                "first_name": "Ada",
                "phonenumber": "9876543210",
                "gender": "Female",
                "website": "example.com",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["phonenumber"], "+919876543210");
        assert_eq!(body["website"], "https://example.com/");
        let id = body["id"].as_i64().unwrap();

        let (status, body) = send(
            &app.state,
            Some(&actor),
            Method::POST,
            "/profiles",
            json(json!({ "user_id": actor.user.id, "phonenumber": "9876543210" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errors"][0]["field"], "user");

        let (status, _) = send(
            &app.state,
            Some(&actor),
            Method::POST,
            "/profiles",
            json(json!({ "user_id": 4242, "phonenumber": "9876543210" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(
            &app.state,
            Some(&actor),
            Method::PATCH,
            &format!("/profiles/{id}"),
            json(json!({ "phonenumber": "12" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errors"][0]["field"], "phonenumber");

        let (status, body) = send(
            &app.state,
            Some(&actor),
            Method::PUT,
            &format!("/profiles/{id}/avatar"),
            Body::from(crate::media::png(100, 100)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["avatar"].as_str().unwrap().starts_with("images/avatars/"));

        let (status, body) =
            send(&app.state, Some(&actor), Method::GET, "/profiles", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);
        assert_eq!(body["results"][0]["first_name"], "Ada");
    }
}

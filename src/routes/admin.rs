use actix_multipart::Multipart;
use actix_session::Session;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use crate::config::Config;
use crate::helper::{admin_helpers, sanitization_helpers, OpError};
use crate::middleware::AuthenticatedUser;
use crate::models::db_operations::media_db_operations::MediaFilters;
use crate::models::db_operations::posts_db_operations::AdminPostFilters;
use crate::models::{
    ApiEnvelope, FileType, LoginInput, PasswordChangeInput, PostInput, PostStatus, PostType,
};
use crate::{DbPool, PasswordService};

#[derive(Deserialize)]
pub struct AdminPostsQuery {
    #[serde(rename = "type")]
    post_type: Option<String>,
    status: Option<String>,
    search: Option<String>,
    page: Option<i64>,
    per_page: Option<i64>,
}

#[derive(Deserialize)]
pub struct AdminMediaQuery {
    #[serde(rename = "type")]
    file_type: Option<String>,
    search: Option<String>,
    page: Option<i64>,
    per_page: Option<i64>,
}

#[derive(Deserialize)]
pub struct PreviewInput {
    content: String,
}

#[derive(Deserialize)]
pub struct SettingInput {
    value: String,
}

pub fn config_admin(cfg: &mut web::ServiceConfig) {
    cfg.route("/login", web::post().to(login))
        .route("/logout", web::post().to(logout))
        .route("/profile", web::get().to(profile))
        .route("/password", web::post().to(change_password))
        .route("/stats", web::get().to(stats))
        .route("/posts", web::get().to(list_posts))
        .route("/posts", web::post().to(create_post))
        .route("/posts/{post_id}", web::get().to(get_post))
        .route("/posts/{post_id}", web::put().to(update_post))
        .route("/posts/{post_id}", web::delete().to(delete_post))
        .route("/preview", web::post().to(preview))
        .route("/media", web::get().to(list_media))
        .route("/media/upload", web::post().to(upload_media))
        .route("/media/{media_id}", web::delete().to(delete_media))
        .route("/settings", web::get().to(list_settings))
        .route("/settings/{key}", web::put().to(update_setting));
}

async fn login(
    session: Session,
    pool: web::Data<DbPool>,
    passwords: web::Data<PasswordService>,
    input: web::Json<LoginInput>,
) -> actix_web::Result<HttpResponse> {
    let user = admin_helpers::login(&pool, &passwords, &input)?;

    session.renew();
    session.insert("user_id", user.id)?;
    session.insert("username", user.username.clone())?;
    session.insert("role", user.role)?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Login successful",
        "user": user,
    })))
}

async fn logout(user: AuthenticatedUser, session: Session) -> HttpResponse {
    log::info!("User '{}' logged out", user.username);
    session.purge();
    HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Logout successful",
    }))
}

async fn profile(
    user: AuthenticatedUser,
    pool: web::Data<DbPool>,
) -> actix_web::Result<HttpResponse> {
    let user = admin_helpers::profile(&pool, user.user_id)?;
    Ok(HttpResponse::Ok().json(ApiEnvelope::data(user)))
}

async fn change_password(
    user: AuthenticatedUser,
    pool: web::Data<DbPool>,
    passwords: web::Data<PasswordService>,
    input: web::Json<PasswordChangeInput>,
) -> actix_web::Result<HttpResponse> {
    admin_helpers::change_password(&pool, &passwords, user.user_id, &input)?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Password updated successfully",
    })))
}

async fn stats(
    _user: AuthenticatedUser,
    pool: web::Data<DbPool>,
) -> actix_web::Result<HttpResponse> {
    let stats = admin_helpers::dashboard_stats(&pool)?;
    Ok(HttpResponse::Ok().json(ApiEnvelope::data(stats)))
}

async fn list_posts(
    _user: AuthenticatedUser,
    pool: web::Data<DbPool>,
    query: web::Query<AdminPostsQuery>,
) -> actix_web::Result<HttpResponse> {
    let filters = AdminPostFilters {
        post_type: parse_all_or::<PostType>(query.post_type.as_deref())?,
        status: parse_all_or::<PostStatus>(query.status.as_deref())?,
        search: query.search.clone().filter(|s| !s.is_empty()),
        page: query.page.unwrap_or(1).max(1),
        per_page: query.per_page.unwrap_or(10).max(1),
    };
    let page = admin_helpers::list_posts(&pool, &filters)?;
    Ok(HttpResponse::Ok().json(ApiEnvelope::data(page)))
}

async fn get_post(
    _user: AuthenticatedUser,
    pool: web::Data<DbPool>,
    post_id: web::Path<i64>,
) -> actix_web::Result<HttpResponse> {
    let post = admin_helpers::get_post(&pool, *post_id)?;
    Ok(HttpResponse::Ok().json(ApiEnvelope::data(post)))
}

async fn create_post(
    user: AuthenticatedUser,
    pool: web::Data<DbPool>,
    input: web::Json<PostInput>,
) -> actix_web::Result<HttpResponse> {
    let post = admin_helpers::create_post(&pool, user.user_id, &input)?;
    log::info!("User '{}' created post '{}'", user.username, post.post.slug);
    Ok(HttpResponse::Created().json(json!({
        "success": true,
        "message": "Post created successfully",
        "post": post,
    })))
}

async fn update_post(
    user: AuthenticatedUser,
    pool: web::Data<DbPool>,
    post_id: web::Path<i64>,
    input: web::Json<PostInput>,
) -> actix_web::Result<HttpResponse> {
    let post = admin_helpers::update_post(&pool, *post_id, &input)?;
    log::info!("User '{}' updated post '{}'", user.username, post.post.slug);
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Post updated successfully",
        "post": post,
    })))
}

async fn delete_post(
    user: AuthenticatedUser,
    pool: web::Data<DbPool>,
    post_id: web::Path<i64>,
) -> actix_web::Result<HttpResponse> {
    admin_helpers::delete_post(&pool, user.user_id, user.role, *post_id).await?;
    log::info!("User '{}' deleted post {}", user.username, post_id);
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Post deleted successfully",
    })))
}

/// Renders Markdown the same way a save would, for the editor's
/// live preview pane.
async fn preview(
    _user: AuthenticatedUser,
    input: web::Json<PreviewInput>,
) -> actix_web::Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "html": sanitization_helpers::render_markdown(&input.content),
    })))
}

async fn list_media(
    _user: AuthenticatedUser,
    pool: web::Data<DbPool>,
    query: web::Query<AdminMediaQuery>,
) -> actix_web::Result<HttpResponse> {
    let filters = MediaFilters {
        file_type: parse_all_or::<FileType>(Some(query.file_type.as_deref().unwrap_or("image")))?,
        search: query.search.clone().filter(|s| !s.is_empty()),
        page: query.page.unwrap_or(1).max(1),
        per_page: query.per_page.unwrap_or(20).max(1),
    };
    let page = admin_helpers::list_media(&pool, &filters)?;
    Ok(HttpResponse::Ok().json(ApiEnvelope::data(page)))
}

async fn upload_media(
    user: AuthenticatedUser,
    config: web::Data<Config>,
    pool: web::Data<DbPool>,
    payload: Multipart,
) -> actix_web::Result<HttpResponse> {
    let media = admin_helpers::upload_media(&config, &pool, user.user_id, payload).await?;
    log::info!("User '{}' uploaded '{}'", user.username, media.filename);
    Ok(HttpResponse::Created().json(json!({
        "success": true,
        "message": "File uploaded successfully",
        "media": media,
    })))
}

async fn delete_media(
    user: AuthenticatedUser,
    pool: web::Data<DbPool>,
    media_id: web::Path<i64>,
) -> actix_web::Result<HttpResponse> {
    admin_helpers::delete_media(&pool, *media_id).await?;
    log::info!("User '{}' deleted media {}", user.username, media_id);
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "File deleted successfully",
    })))
}

async fn list_settings(
    _user: AuthenticatedUser,
    pool: web::Data<DbPool>,
) -> actix_web::Result<HttpResponse> {
    let settings = admin_helpers::list_settings(&pool)?;
    Ok(HttpResponse::Ok().json(ApiEnvelope::data(settings)))
}

async fn update_setting(
    _user: AuthenticatedUser,
    pool: web::Data<DbPool>,
    key: web::Path<String>,
    input: web::Json<SettingInput>,
) -> actix_web::Result<HttpResponse> {
    let setting = admin_helpers::update_setting(&pool, &key, &input.value)?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Setting updated successfully",
        "setting": setting,
    })))
}

fn parse_all_or<T: std::str::FromStr<Err = String>>(
    raw: Option<&str>,
) -> Result<Option<T>, OpError> {
    match raw {
        None | Some("all") => Ok(None),
        Some(other) => Ok(Some(other.parse().map_err(OpError::Validation)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::db_operations::users_db_operations;
    use crate::models::Role;
    use crate::setup::db_setup::setup_cms_db;
    use actix_session::storage::CookieSessionStore;
    use actix_session::SessionMiddleware;
    use actix_web::cookie::Key;
    use actix_web::{test, App};
    use r2d2_sqlite::SqliteConnectionManager;
    use tempfile::TempDir;

    fn test_pool(dir: &TempDir) -> DbPool {
        let manager = SqliteConnectionManager::file(dir.path().join("test.db"));
        let pool = r2d2::Pool::builder().max_size(2).build(manager).unwrap();
        let mut conn = pool.get().unwrap();
        setup_cms_db(&mut conn).unwrap();
        pool
    }

    fn add_user(pool: &DbPool, username: &str, password: &str, role: Role) {
        let conn = pool.get().unwrap();
        let hash = PasswordService::new(4).hash(password).unwrap();
        users_db_operations::create_user(
            &conn,
            username,
            &format!("{}@example.org", username),
            &hash,
            None,
            None,
            role,
        )
        .unwrap();
    }

    fn session_layer() -> SessionMiddleware<CookieSessionStore> {
        SessionMiddleware::builder(CookieSessionStore::default(), Key::from(&[0; 64]))
            .cookie_secure(false)
            .build()
    }

    macro_rules! admin_app {
        ($pool:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($pool.clone()))
                    .app_data(web::Data::new(PasswordService::new(4)))
                    .service(
                        web::scope("/admin")
                            .wrap(session_layer())
                            .configure(config_admin),
                    ),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn login_opens_a_session_and_never_leaks_the_hash() {
        let dir = TempDir::new().unwrap();
        let pool = test_pool(&dir);
        add_user(&pool, "root", "root-pass-123", Role::Admin);
        let app = admin_app!(pool);

        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/admin/login")
                .set_json(serde_json::json!({"username": "root", "password": "root-pass-123"}))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::OK);
        let cookie = resp.response().cookies().next().unwrap().into_owned();

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["message"], "Login successful");
        assert_eq!(body["user"]["username"], "root");
        assert!(!body["user"]
            .as_object()
            .unwrap()
            .contains_key("password_hash"));

        let body: serde_json::Value = test::call_and_read_body_json(
            &app,
            test::TestRequest::get()
                .uri("/admin/profile")
                .cookie(cookie)
                .to_request(),
        )
        .await;
        assert_eq!(body["data"]["username"], "root");
        assert_eq!(body["data"]["role"], "admin");
    }

    #[actix_web::test]
    async fn bad_credentials_and_anonymous_requests_are_unauthorized() {
        let dir = TempDir::new().unwrap();
        let pool = test_pool(&dir);
        add_user(&pool, "root", "root-pass-123", Role::Admin);
        let app = admin_app!(pool);

        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/admin/login")
                .set_json(serde_json::json!({"username": "root", "password": "nope"}))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::UNAUTHORIZED);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Invalid username or password");

        let resp = test::call_service(
            &app,
            test::TestRequest::get().uri("/admin/profile").to_request(),
        )
        .await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn the_editor_workflow_round_trips() {
        let dir = TempDir::new().unwrap();
        let pool = test_pool(&dir);
        add_user(&pool, "marie", "s3cretpass", Role::Editor);
        let app = admin_app!(pool);

        let login = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/admin/login")
                .set_json(serde_json::json!({"username": "marie", "password": "s3cretpass"}))
                .to_request(),
        )
        .await;
        let cookie = login.response().cookies().next().unwrap().into_owned();

        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/admin/posts")
                .cookie(cookie.clone())
                .set_json(serde_json::json!({
                    "title": "Première note",
                    "content": "Contenu **fort**",
                    "post_type": "article",
                    "status": "published",
                    "tags": "labo"
                }))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::CREATED);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["post"]["slug"], "premiere-note");
        assert!(body["post"]["content_html"]
            .as_str()
            .unwrap()
            .contains("<strong>fort</strong>"));
        assert_eq!(body["post"]["tags"][0], "labo");

        let body: serde_json::Value = test::call_and_read_body_json(
            &app,
            test::TestRequest::get()
                .uri("/admin/posts?status=published")
                .cookie(cookie.clone())
                .to_request(),
        )
        .await;
        assert_eq!(body["data"]["total"], 1);
        assert_eq!(body["data"]["items"][0]["title"], "Première note");

        let resp = test::call_service(
            &app,
            test::TestRequest::put()
                .uri("/admin/settings/posts_per_page")
                .cookie(cookie.clone())
                .set_json(serde_json::json!({"value": "not a number"}))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::BAD_REQUEST);

        let body: serde_json::Value = test::call_and_read_body_json(
            &app,
            test::TestRequest::put()
                .uri("/admin/settings/posts_per_page")
                .cookie(cookie.clone())
                .set_json(serde_json::json!({"value": "25"}))
                .to_request(),
        )
        .await;
        assert_eq!(body["setting"]["value"], "25");

        let body: serde_json::Value = test::call_and_read_body_json(
            &app,
            test::TestRequest::get()
                .uri("/admin/stats")
                .cookie(cookie)
                .to_request(),
        )
        .await;
        assert_eq!(body["data"]["total_posts"], 1);
        assert_eq!(body["data"]["published_posts"], 1);
    }
}

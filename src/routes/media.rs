use actix_files::NamedFile;
use actix_web::{web, HttpRequest, HttpResponse};

use crate::config::Config;
use crate::helper::{get_conn, OpError};
use crate::models::db_operations::media_db_operations;
use crate::models::MediaItem;
use crate::DbPool;

pub fn config_media(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/media")
            .route("/{media_id}/file", web::get().to(serve_original))
            .route("/{media_id}/thumbnail", web::get().to(serve_thumbnail))
            .route("/{filename}", web::get().to(serve_by_filename)),
    );
}

async fn serve_original(
    req: HttpRequest,
    pool: web::Data<DbPool>,
    media_id: web::Path<i64>,
) -> Result<HttpResponse, OpError> {
    let item = media_row(&pool, *media_id)?;
    serve_path(&req, &item.file_path).await
}

/// Serves the stored thumbnail, falling back to the original for files
/// that never got one.
async fn serve_thumbnail(
    req: HttpRequest,
    pool: web::Data<DbPool>,
    media_id: web::Path<i64>,
) -> Result<HttpResponse, OpError> {
    let item = media_row(&pool, *media_id)?;
    if let Some(thumbnail) = item.thumbnail_path.as_deref() {
        if let Ok(file) = NamedFile::open_async(thumbnail).await {
            return Ok(file.into_response(&req));
        }
    }
    serve_path(&req, &item.file_path).await
}

/// Lookup by stored filename, the form posts reference images under.
/// Checks the image bucket first, then documents.
async fn serve_by_filename(
    req: HttpRequest,
    config: web::Data<Config>,
    filename: web::Path<String>,
) -> Result<HttpResponse, OpError> {
    let name = filename.into_inner();
    if name.contains(['/', '\\']) || name.contains("..") {
        return Err(OpError::NotFound("File not found".to_string()));
    }
    for dir in [config.images_dir(), config.documents_dir()] {
        if let Ok(file) = NamedFile::open_async(dir.join(&name)).await {
            return Ok(file.into_response(&req));
        }
    }
    Err(OpError::NotFound("File not found".to_string()))
}

fn media_row(pool: &DbPool, media_id: i64) -> Result<MediaItem, OpError> {
    let conn = get_conn(pool)?;
    media_db_operations::read_media_by_id(&conn, media_id)?
        .ok_or_else(|| OpError::NotFound("File not found".to_string()))
}

async fn serve_path(req: &HttpRequest, path: &str) -> Result<HttpResponse, OpError> {
    match NamedFile::open_async(path).await {
        Ok(file) => Ok(file.into_response(req)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            Err(OpError::NotFound("File not found".to_string()))
        }
        Err(err) => Err(OpError::Io(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WebConfig;
    use crate::models::db_operations::media_db_operations::NewMedia;
    use crate::models::FileType;
    use crate::setup::db_setup::setup_cms_db;
    use actix_web::{test, App};
    use r2d2_sqlite::SqliteConnectionManager;
    use std::fs;
    use tempfile::TempDir;

    fn test_config(root: &std::path::Path) -> Config {
        Config {
            web: WebConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            database_path: root.join("db").display().to_string(),
            upload_path: root.join("uploads").display().to_string(),
            allowed_origins: String::new(),
            log_level: "info".to_string(),
            session_secret_key: "0".repeat(128),
            use_secure_cookies: false,
            allowed_extensions: "png,jpg,pdf".to_string(),
            max_upload_bytes: 1024 * 1024,
            bcrypt_cost: 4,
        }
    }

    fn test_pool(dir: &TempDir) -> DbPool {
        let manager = SqliteConnectionManager::file(dir.path().join("test.db"));
        let pool = r2d2::Pool::builder().max_size(2).build(manager).unwrap();
        let mut conn = pool.get().unwrap();
        setup_cms_db(&mut conn).unwrap();
        pool
    }

    fn store_file(config: &Config, name: &str, bytes: &[u8]) -> String {
        let dir = config.images_dir();
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, bytes).unwrap();
        path.display().to_string()
    }

    fn insert_row(pool: &DbPool, filename: &str, file_path: &str) -> i64 {
        let conn = pool.get().unwrap();
        media_db_operations::create_media(
            &conn,
            &NewMedia {
                filename,
                original_filename: filename,
                file_type: FileType::Image,
                mime_type: "image/png",
                file_size: 4,
                file_path,
                thumbnail_path: None,
                width: None,
                height: None,
                description: None,
                alt_text: None,
                uploaded_by: None,
            },
        )
        .unwrap()
    }

    #[actix_web::test]
    async fn files_are_served_by_id_and_by_filename() {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path());
        let pool = test_pool(&dir);
        let path = store_file(&config, "cover.png", b"data");
        let id = insert_row(&pool, "cover.png", &path);

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(config))
                .app_data(web::Data::new(pool.clone()))
                .configure(config_media),
        )
        .await;

        let body = test::call_and_read_body(
            &app,
            test::TestRequest::get()
                .uri(&format!("/media/{id}/file"))
                .to_request(),
        )
        .await;
        assert_eq!(&body[..], b"data");

        let body = test::call_and_read_body(
            &app,
            test::TestRequest::get().uri("/media/cover.png").to_request(),
        )
        .await;
        assert_eq!(&body[..], b"data");
    }

    #[actix_web::test]
    async fn thumbnails_fall_back_to_the_original() {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path());
        let pool = test_pool(&dir);
        let path = store_file(&config, "cover.png", b"data");
        let id = insert_row(&pool, "cover.png", &path);

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(config))
                .app_data(web::Data::new(pool.clone()))
                .configure(config_media),
        )
        .await;

        let body = test::call_and_read_body(
            &app,
            test::TestRequest::get()
                .uri(&format!("/media/{id}/thumbnail"))
                .to_request(),
        )
        .await;
        assert_eq!(&body[..], b"data");
    }

    #[actix_web::test]
    async fn missing_and_dangling_files_answer_404() {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path());
        let pool = test_pool(&dir);
        let id = insert_row(&pool, "gone.png", "/nowhere/gone.png");

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(config))
                .app_data(web::Data::new(pool.clone()))
                .configure(config_media),
        )
        .await;

        let resp = test::call_service(
            &app,
            test::TestRequest::get()
                .uri(&format!("/media/{id}/file"))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::NOT_FOUND);

        let resp = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/media/no-such-file.png")
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::NOT_FOUND);

        let resp = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/media/..%2Fsecret.txt")
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::NOT_FOUND);
    }
}

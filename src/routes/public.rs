use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;

use crate::helper::{get_conn, public_helpers, OpError};
use crate::models::db_operations::posts_db_operations::{
    ActivityFilters, OfferFilters, PublicPostFilters,
};
use crate::models::db_operations;
use crate::models::db_operations::tokens_db_operations::{self, TokenCheck};
use crate::models::{ActivityStatus, OfferStatus, PostType};
use crate::DbPool;

#[derive(Deserialize)]
pub struct PostsQuery {
    #[serde(rename = "type")]
    post_type: Option<String>,
    category: Option<String>,
    featured: Option<bool>,
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Deserialize)]
pub struct ActivitiesQuery {
    status: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Deserialize)]
pub struct OffersQuery {
    #[serde(rename = "type")]
    offer_type: Option<String>,
    status: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Deserialize)]
pub struct SyncQuery {
    api_key: Option<String>,
}

pub fn config_api(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/posts", web::get().to(get_posts))
            .route("/posts/{slug}", web::get().to(get_post))
            .route("/activities", web::get().to(get_activities))
            .route("/offers", web::get().to(get_offers))
            .route("/categories", web::get().to(get_categories))
            .route("/sync", web::post().to(sync))
            .route("/health", web::get().to(health)),
    );
}

async fn get_posts(
    pool: web::Data<DbPool>,
    query: web::Query<PostsQuery>,
) -> Result<HttpResponse, OpError> {
    let filters = PublicPostFilters {
        post_type: parse_post_type(query.post_type.as_deref())?,
        category_slug: query.category.clone(),
        featured: query.featured.unwrap_or(false),
        limit: query.limit.unwrap_or(10),
        offset: query.offset.unwrap_or(0),
    };
    Ok(HttpResponse::Ok().json(public_helpers::list_posts(&pool, &filters)?))
}

async fn get_post(
    pool: web::Data<DbPool>,
    slug: web::Path<String>,
) -> Result<HttpResponse, OpError> {
    Ok(HttpResponse::Ok().json(public_helpers::get_post_by_slug(&pool, &slug)?))
}

async fn get_activities(
    pool: web::Data<DbPool>,
    query: web::Query<ActivitiesQuery>,
) -> Result<HttpResponse, OpError> {
    let filters = ActivityFilters {
        status: parse_activity_status(query.status.as_deref())?,
        now: db_operations::now(),
        limit: query.limit.unwrap_or(10),
        offset: query.offset.unwrap_or(0),
    };
    Ok(HttpResponse::Ok().json(public_helpers::list_activities(&pool, &filters)?))
}

async fn get_offers(
    pool: web::Data<DbPool>,
    query: web::Query<OffersQuery>,
) -> Result<HttpResponse, OpError> {
    let filters = OfferFilters {
        offer_type: match query.offer_type.as_deref() {
            None | Some("all") => None,
            Some(other) => Some(other.to_string()),
        },
        status: parse_offer_status(query.status.as_deref())?,
        limit: query.limit.unwrap_or(10),
        offset: query.offset.unwrap_or(0),
    };
    Ok(HttpResponse::Ok().json(public_helpers::list_offers(&pool, &filters)?))
}

async fn get_categories(pool: web::Data<DbPool>) -> Result<HttpResponse, OpError> {
    Ok(HttpResponse::Ok().json(public_helpers::list_categories(&pool)?))
}

/// Sync endpoint for the main site. Takes the token from the X-API-Key
/// header, falling back to an api_key query parameter.
async fn sync(
    req: HttpRequest,
    pool: web::Data<DbPool>,
    query: web::Query<SyncQuery>,
) -> Result<HttpResponse, OpError> {
    let presented = req
        .headers()
        .get("X-API-Key")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .or_else(|| query.api_key.clone())
        .ok_or_else(|| OpError::Unauthorized("API token missing".to_string()))?;

    {
        let conn = get_conn(&pool)?;
        match tokens_db_operations::authenticate_token(&conn, &presented, db_operations::now())? {
            TokenCheck::Valid(_) => {}
            TokenCheck::Unknown => {
                return Err(OpError::Unauthorized("Invalid API token".to_string()))
            }
            TokenCheck::Expired => {
                return Err(OpError::Unauthorized("API token expired".to_string()))
            }
        }
    }

    Ok(HttpResponse::Ok().json(public_helpers::sync_summary(&pool)?))
}

async fn health(pool: web::Data<DbPool>) -> HttpResponse {
    HttpResponse::Ok().json(public_helpers::health_report(&pool))
}

fn parse_post_type(raw: Option<&str>) -> Result<Option<PostType>, OpError> {
    match raw {
        None | Some("all") => Ok(None),
        Some(other) => Ok(Some(other.parse().map_err(OpError::Validation)?)),
    }
}

fn parse_activity_status(raw: Option<&str>) -> Result<Option<ActivityStatus>, OpError> {
    match raw.unwrap_or("upcoming") {
        "all" => Ok(None),
        other => Ok(Some(other.parse().map_err(OpError::Validation)?)),
    }
}

fn parse_offer_status(raw: Option<&str>) -> Result<Option<OfferStatus>, OpError> {
    match raw.unwrap_or("open") {
        "all" => Ok(None),
        other => Ok(Some(other.parse().map_err(OpError::Validation)?)),
    }
}

use chrono::NaiveDateTime;
use rusqlite::Connection;
use serde::Serialize;
use serde_json::json;

use crate::helper::{get_conn, OpError};
use crate::models::db_operations::posts_db_operations::{
    self, ActivityFilters, OfferFilters, PublicPostFilters,
};
use crate::models::db_operations::{self, taxonomy_db_operations};
use crate::models::{
    Activity, ActivityStatus, ApiEnvelope, Offer, OfferStatus, PageMeta, PostExtension,
    PostStatus, PostType,
};
use crate::DbPool;

/// The category fields the public surface exposes.
#[derive(Debug, Serialize)]
pub struct CategoryRef {
    pub name: String,
    pub slug: String,
    pub color: String,
}

#[derive(Debug, Serialize)]
pub struct AuthorRef {
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Sub-type summary carried by feed items. The full payload is only on
/// the detail view.
#[derive(Serialize)]
pub struct ActivityBrief {
    pub activity_type: Option<String>,
    pub start_date: NaiveDateTime,
    pub end_date: Option<NaiveDateTime>,
    pub location: Option<String>,
    pub is_online: bool,
    pub status: ActivityStatus,
}

#[derive(Debug, Serialize)]
pub struct ActivityFull {
    pub activity_type: Option<String>,
    pub start_date: NaiveDateTime,
    pub end_date: Option<NaiveDateTime>,
    pub location: Option<String>,
    pub is_online: bool,
    pub registration_url: Option<String>,
    pub status: ActivityStatus,
}

#[derive(Serialize)]
pub struct OfferBrief {
    pub offer_type: String,
    pub contract_type: Option<String>,
    pub location: Option<String>,
    pub salary_range: Option<String>,
    pub application_deadline: Option<NaiveDateTime>,
    pub status: OfferStatus,
}

#[derive(Debug, Serialize)]
pub struct OfferFull {
    pub offer_type: String,
    pub contract_type: Option<String>,
    pub location: Option<String>,
    pub salary_range: Option<String>,
    pub experience_required: Option<String>,
    pub application_deadline: Option<NaiveDateTime>,
    pub start_date: Option<NaiveDateTime>,
    pub is_remote: bool,
    pub status: OfferStatus,
}

/// A published post as the feed shows it. `content` is the rendered
/// HTML cache, never the Markdown source.
#[derive(Serialize)]
pub struct PostFeedItem {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub excerpt: Option<String>,
    pub content: String,
    pub post_type: PostType,
    pub featured_image: Option<String>,
    pub published_at: Option<NaiveDateTime>,
    pub author: String,
    pub category: Option<CategoryRef>,
    pub tags: Vec<String>,
    pub activity: Option<ActivityBrief>,
    pub offer: Option<OfferBrief>,
}

#[derive(Debug, Serialize)]
pub struct PostDetail {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub excerpt: Option<String>,
    pub content: String,
    pub post_type: PostType,
    pub featured_image: Option<String>,
    pub published_at: Option<NaiveDateTime>,
    pub author: AuthorRef,
    pub category: Option<CategoryRef>,
    pub tags: Vec<String>,
    pub activity: Option<ActivityFull>,
    pub offer: Option<OfferFull>,
    pub views: i64,
    pub likes: i64,
}

#[derive(Serialize)]
pub struct ActivityFeedItem {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub description: Option<String>,
    pub activity_type: Option<String>,
    pub start_date: NaiveDateTime,
    pub end_date: Option<NaiveDateTime>,
    pub location: Option<String>,
    pub is_online: bool,
    pub registration_url: Option<String>,
    pub max_participants: Option<i64>,
    pub current_participants: i64,
    pub status: ActivityStatus,
    pub featured_image: Option<String>,
    pub post_slug: String,
}

#[derive(Serialize)]
pub struct OfferFeedItem {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub offer_type: String,
    pub contract_type: Option<String>,
    pub location: Option<String>,
    pub salary_range: Option<String>,
    pub experience_required: Option<String>,
    pub application_deadline: Option<NaiveDateTime>,
    pub start_date: Option<NaiveDateTime>,
    pub is_remote: bool,
    pub status: OfferStatus,
    pub views: i64,
    pub applications_count: i64,
    pub featured_image: Option<String>,
    pub post_slug: String,
}

#[derive(Serialize)]
pub struct CategoryFeedItem {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub color: String,
    pub icon: Option<String>,
    pub post_count: i64,
}

pub fn list_posts(
    pool: &DbPool,
    filters: &PublicPostFilters,
) -> Result<ApiEnvelope<Vec<PostFeedItem>>, OpError> {
    let conn = get_conn(pool)?;
    let (total, rows) = posts_db_operations::list_published_posts(&conn, filters)?;
    let returned = rows.len();
    let items = rows
        .into_iter()
        .map(|row| feed_item(&conn, row))
        .collect::<Result<Vec<_>, OpError>>()?;
    Ok(ApiEnvelope::page(
        items,
        PageMeta::new(total, filters.limit, filters.offset, returned),
    ))
}

/// Looks up a published post by slug, counting the view. The increment
/// lands first so the returned `views` already includes this read.
pub fn get_post_by_slug(pool: &DbPool, slug: &str) -> Result<ApiEnvelope<PostDetail>, OpError> {
    let conn = get_conn(pool)?;
    if posts_db_operations::increment_views_for_published_slug(&conn, slug)? == 0 {
        return Err(OpError::NotFound("Post not found".to_string()));
    }
    let row = posts_db_operations::read_published_post_by_slug(&conn, slug)?
        .ok_or_else(|| OpError::NotFound("Post not found".to_string()))?;

    let tags = taxonomy_db_operations::read_tag_names_for_post(&conn, row.post.id)?;
    let (activity, offer) =
        split_extension(posts_db_operations::fetch_extension(&conn, row.post.id)?);
    let post = row.post;

    Ok(ApiEnvelope::data(PostDetail {
        id: post.id,
        title: post.title,
        slug: post.slug,
        excerpt: post.excerpt,
        content: post.content_html,
        post_type: post.post_type,
        featured_image: media_url(post.featured_image.as_deref()),
        published_at: post.published_at,
        author: AuthorRef {
            username: row.author_username,
            first_name: row.author_first_name,
            last_name: row.author_last_name,
        },
        category: row
            .category
            .map(|(name, slug, color)| CategoryRef { name, slug, color }),
        tags,
        activity: activity.map(activity_full),
        offer: offer.map(offer_full),
        views: post.views,
        likes: post.likes,
    }))
}

pub fn list_activities(
    pool: &DbPool,
    filters: &ActivityFilters,
) -> Result<ApiEnvelope<Vec<ActivityFeedItem>>, OpError> {
    let conn = get_conn(pool)?;
    let (total, rows) = posts_db_operations::list_activities(&conn, filters)?;
    let returned = rows.len();
    let items = rows
        .into_iter()
        .map(|(activity, post_slug, post_image)| {
            let image = activity.featured_image.clone().or(post_image);
            ActivityFeedItem {
                id: activity.id,
                title: activity.title,
                slug: activity.slug,
                description: activity.description,
                activity_type: activity.activity_type,
                start_date: activity.start_date,
                end_date: activity.end_date,
                location: activity.location,
                is_online: activity.is_online,
                registration_url: activity.registration_url,
                max_participants: activity.max_participants,
                current_participants: activity.current_participants,
                status: activity.status,
                featured_image: media_url(image.as_deref()),
                post_slug,
            }
        })
        .collect();
    Ok(ApiEnvelope::page(
        items,
        PageMeta::new(total, filters.limit, filters.offset, returned),
    ))
}

pub fn list_offers(
    pool: &DbPool,
    filters: &OfferFilters,
) -> Result<ApiEnvelope<Vec<OfferFeedItem>>, OpError> {
    let conn = get_conn(pool)?;
    let (total, rows) = posts_db_operations::list_offers(&conn, filters)?;
    let returned = rows.len();
    let items = rows
        .into_iter()
        .map(|(offer, post_slug, post_image)| OfferFeedItem {
            id: offer.id,
            title: offer.title,
            slug: offer.slug,
            description: offer.description,
            offer_type: offer.offer_type,
            contract_type: offer.contract_type,
            location: offer.location,
            salary_range: offer.salary_range,
            experience_required: offer.experience_required,
            application_deadline: offer.application_deadline,
            start_date: offer.start_date,
            is_remote: offer.is_remote,
            status: offer.status,
            views: offer.views,
            applications_count: offer.applications_count,
            featured_image: media_url(post_image.as_deref()),
            post_slug,
        })
        .collect();
    Ok(ApiEnvelope::page(
        items,
        PageMeta::new(total, filters.limit, filters.offset, returned),
    ))
}

pub fn list_categories(pool: &DbPool) -> Result<ApiEnvelope<Vec<CategoryFeedItem>>, OpError> {
    let conn = get_conn(pool)?;
    let items = taxonomy_db_operations::categories_with_published_counts(&conn)?
        .into_iter()
        .map(|(cat, post_count)| CategoryFeedItem {
            id: cat.id,
            name: cat.name,
            slug: cat.slug,
            description: cat.description,
            color: cat.color,
            icon: cat.icon,
            post_count,
        })
        .collect();
    Ok(ApiEnvelope::data(items))
}

/// What the main site gets back when it asks for a sync: the sizes of
/// everything it could pull.
pub fn sync_summary(pool: &DbPool) -> Result<serde_json::Value, OpError> {
    let conn = get_conn(pool)?;
    Ok(json!({
        "success": true,
        "message": "Sync completed",
        "timestamp": db_operations::now(),
        "synced_items": {
            "posts": posts_db_operations::count_posts_by_status(&conn, Some(PostStatus::Published))?,
            "activities": posts_db_operations::count_activities(&conn)?,
            "offers": posts_db_operations::count_offers(&conn)?,
        }
    }))
}

pub fn health_report(pool: &DbPool) -> serde_json::Value {
    let database = match pool.get() {
        Ok(conn) => match conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)) {
            Ok(_) => "connected",
            Err(_) => "disconnected",
        },
        Err(_) => "disconnected",
    };
    json!({
        "status": "healthy",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": db_operations::now(),
        "database": database,
    })
}

fn feed_item(
    conn: &Connection,
    row: posts_db_operations::PostWithRefs,
) -> Result<PostFeedItem, OpError> {
    let tags = taxonomy_db_operations::read_tag_names_for_post(conn, row.post.id)?;
    let (activity, offer) =
        split_extension(posts_db_operations::fetch_extension(conn, row.post.id)?);
    let post = row.post;
    Ok(PostFeedItem {
        id: post.id,
        title: post.title,
        slug: post.slug,
        excerpt: post.excerpt,
        content: post.content_html,
        post_type: post.post_type,
        featured_image: media_url(post.featured_image.as_deref()),
        published_at: post.published_at,
        author: row.author_username,
        category: row
            .category
            .map(|(name, slug, color)| CategoryRef { name, slug, color }),
        tags,
        activity: activity.map(activity_brief),
        offer: offer.map(offer_brief),
    })
}

fn split_extension(extension: Option<PostExtension>) -> (Option<Activity>, Option<Offer>) {
    match extension {
        Some(PostExtension::Activity(activity)) => (Some(activity), None),
        Some(PostExtension::Offer(offer)) => (None, Some(offer)),
        None => (None, None),
    }
}

fn media_url(filename: Option<&str>) -> Option<String> {
    filename.map(|f| format!("/media/{}", f))
}

fn activity_brief(activity: Activity) -> ActivityBrief {
    ActivityBrief {
        activity_type: activity.activity_type,
        start_date: activity.start_date,
        end_date: activity.end_date,
        location: activity.location,
        is_online: activity.is_online,
        status: activity.status,
    }
}

fn activity_full(activity: Activity) -> ActivityFull {
    ActivityFull {
        activity_type: activity.activity_type,
        start_date: activity.start_date,
        end_date: activity.end_date,
        location: activity.location,
        is_online: activity.is_online,
        registration_url: activity.registration_url,
        status: activity.status,
    }
}

fn offer_brief(offer: Offer) -> OfferBrief {
    OfferBrief {
        offer_type: offer.offer_type,
        contract_type: offer.contract_type,
        location: offer.location,
        salary_range: offer.salary_range,
        application_deadline: offer.application_deadline,
        status: offer.status,
    }
}

fn offer_full(offer: Offer) -> OfferFull {
    OfferFull {
        offer_type: offer.offer_type,
        contract_type: offer.contract_type,
        location: offer.location,
        salary_range: offer.salary_range,
        experience_required: offer.experience_required,
        application_deadline: offer.application_deadline,
        start_date: offer.start_date,
        is_remote: offer.is_remote,
        status: offer.status,
    }
}

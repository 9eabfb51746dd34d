use actix_multipart::Multipart;
use actix_web::web;
use chrono::{Duration, NaiveDateTime};
use rusqlite::Connection;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::Config;
use crate::helper::{get_conn, media_helpers, reject_duplicate, sanitization_helpers, OpError};
use crate::middleware;
use crate::models::db_operations::media_db_operations::{self, MediaFilters, NewMedia};
use crate::models::db_operations::posts_db_operations::{
    self, ActivityUpsert, AdminPostFilters, NewPost, OfferUpsert, PostUpdate, PostWithRefs,
};
use crate::models::db_operations::{
    self, settings_db_operations, taxonomy_db_operations, users_db_operations,
};
use crate::models::{
    ActivityStatus, AdminPage, LoginInput, MediaItem, OfferStatus, PasswordChangeInput,
    PostExtension, PostInput, PostMedia, PostStatus, PostType, Role, Setting, SettingValue, User,
};
use crate::{DbPool, PasswordService};

/// A post as the editing surface sees it: the full row, its author,
/// its tag names, the sub-type payload and the attached files.
#[derive(Debug, Serialize)]
pub struct AdminPostDetail {
    #[serde(flatten)]
    pub post: crate::models::Post,
    pub author: String,
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub extension: Option<PostExtension>,
    pub attachments: Vec<PostMedia>,
}

#[derive(Serialize)]
pub struct AdminPostSummary {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub post_type: PostType,
    pub status: PostStatus,
    pub author: String,
    pub category: Option<String>,
    pub is_featured: bool,
    pub views: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub published_at: Option<NaiveDateTime>,
}

#[derive(Serialize)]
pub struct DashboardStats {
    pub total_posts: i64,
    pub published_posts: i64,
    pub draft_posts: i64,
    pub posts_by_type: BTreeMap<String, i64>,
    pub activities_by_status: BTreeMap<String, i64>,
    pub recent_posts: i64,
    pub total_users: i64,
    pub total_media: i64,
    pub total_activities: i64,
    pub total_offers: i64,
}

#[derive(Serialize)]
pub struct MediaSummary {
    pub id: i64,
    pub filename: String,
    pub original_filename: String,
    pub url: String,
    pub thumbnail_url: Option<String>,
    pub file_type: crate::models::FileType,
    pub mime_type: String,
    pub file_size: i64,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub description: Option<String>,
    pub alt_text: Option<String>,
    pub created_at: NaiveDateTime,
}

pub fn login(
    pool: &DbPool,
    passwords: &PasswordService,
    input: &LoginInput,
) -> Result<User, OpError> {
    let conn = get_conn(pool)?;
    let mut user = users_db_operations::read_user_by_username(&conn, &input.username)?
        .ok_or_else(|| OpError::Unauthorized("Invalid username or password".to_string()))?;
    if !passwords.verify(&input.password, &user.password_hash) {
        return Err(OpError::Unauthorized(
            "Invalid username or password".to_string(),
        ));
    }
    if !user.is_active {
        return Err(OpError::Unauthorized(
            "This account is disabled".to_string(),
        ));
    }

    let now = db_operations::now();
    users_db_operations::update_last_login(&conn, user.id, now)?;
    user.last_login = Some(now);
    Ok(user)
}

pub fn profile(pool: &DbPool, user_id: i64) -> Result<User, OpError> {
    let conn = get_conn(pool)?;
    users_db_operations::read_user_by_id(&conn, user_id)?
        .ok_or_else(|| OpError::NotFound("User not found".to_string()))
}

pub fn change_password(
    pool: &DbPool,
    passwords: &PasswordService,
    user_id: i64,
    input: &PasswordChangeInput,
) -> Result<(), OpError> {
    let conn = get_conn(pool)?;
    let user = users_db_operations::read_user_by_id(&conn, user_id)?
        .ok_or_else(|| OpError::NotFound("User not found".to_string()))?;

    if !passwords.verify(&input.current_password, &user.password_hash) {
        return Err(OpError::Validation(
            "Current password is incorrect".to_string(),
        ));
    }
    if input.new_password != input.confirm_password {
        return Err(OpError::Validation(
            "New passwords do not match".to_string(),
        ));
    }
    if input.new_password.len() < 8 {
        return Err(OpError::Validation(
            "New password must be at least 8 characters".to_string(),
        ));
    }

    let hash = passwords.hash(&input.new_password)?;
    users_db_operations::update_password(&conn, user_id, &hash)?;
    Ok(())
}

pub fn list_posts(
    pool: &DbPool,
    filters: &AdminPostFilters,
) -> Result<AdminPage<AdminPostSummary>, OpError> {
    let conn = get_conn(pool)?;
    let (total, rows) = posts_db_operations::list_posts_admin(&conn, filters)?;
    Ok(AdminPage {
        items: rows.into_iter().map(post_summary).collect(),
        total,
        pages: page_count(total, filters.per_page),
        current_page: filters.page,
    })
}

pub fn get_post(pool: &DbPool, post_id: i64) -> Result<AdminPostDetail, OpError> {
    let conn = get_conn(pool)?;
    assemble_post_detail(&conn, post_id)
}

pub fn create_post(
    pool: &DbPool,
    author_id: i64,
    input: &PostInput,
) -> Result<AdminPostDetail, OpError> {
    let mut conn = get_conn(pool)?;

    let title = sanitization_helpers::strip_all_html(input.title.trim());
    if title.is_empty() {
        return Err(OpError::Validation("Title is required".to_string()));
    }
    check_extension_payload(input)?;

    let slug = match input.slug.as_deref().map(str::trim) {
        Some(given) if !given.is_empty() => sanitization_helpers::derive_slug(given),
        _ => sanitization_helpers::derive_slug(&title),
    };
    if slug.is_empty() {
        return Err(OpError::Validation(
            "Title does not reduce to a usable slug".to_string(),
        ));
    }

    let content_html = sanitization_helpers::render_markdown(&input.content);
    let tags = parse_tags(input.tags.as_deref());

    let new_post = NewPost {
        title: &title,
        slug: &slug,
        excerpt: input.excerpt.as_deref(),
        content: &input.content,
        content_html: &content_html,
        post_type: input.post_type,
        status: input.status.unwrap_or(PostStatus::Draft),
        featured_image: input.featured_image.as_deref(),
        is_featured: input.is_featured,
        allow_comments: input.allow_comments,
        user_id: author_id,
        category_id: input.category_id,
        tags: &tags,
    };
    let post_id = posts_db_operations::create_post(&mut conn, &new_post)
        .map_err(|e| reject_duplicate(e, "A post with this slug"))?;

    apply_extension_payload(&conn, post_id, &title, input)?;
    assemble_post_detail(&conn, post_id)
}

pub fn update_post(
    pool: &DbPool,
    post_id: i64,
    input: &PostInput,
) -> Result<AdminPostDetail, OpError> {
    let mut conn = get_conn(pool)?;

    let title = sanitization_helpers::strip_all_html(input.title.trim());
    if title.is_empty() {
        return Err(OpError::Validation("Title is required".to_string()));
    }
    check_extension_payload(input)?;

    let content_html = sanitization_helpers::render_markdown(&input.content);
    let tags = parse_tags(input.tags.as_deref());

    let upd = PostUpdate {
        title: &title,
        excerpt: input.excerpt.as_deref(),
        content: &input.content,
        content_html: &content_html,
        post_type: input.post_type,
        status: input.status.unwrap_or(PostStatus::Draft),
        featured_image: input.featured_image.as_deref(),
        is_featured: input.is_featured,
        allow_comments: input.allow_comments,
        category_id: input.category_id,
        tags: &tags,
    };
    if !posts_db_operations::update_post(&mut conn, post_id, &upd)? {
        return Err(OpError::NotFound("Post not found".to_string()));
    }

    apply_extension_payload(&conn, post_id, &title, input)?;
    assemble_post_detail(&conn, post_id)
}

/// Only admins and the author may delete a post. Attachment files are
/// removed after the rows, best-effort.
pub async fn delete_post(
    pool: &DbPool,
    actor_id: i64,
    actor_role: Role,
    post_id: i64,
) -> Result<(), OpError> {
    let attachments = {
        let mut conn = get_conn(pool)?;
        let post = posts_db_operations::read_post_by_id(&conn, post_id)?
            .ok_or_else(|| OpError::NotFound("Post not found".to_string()))?;
        if !middleware::may_modify(actor_role, actor_id, post.user_id) {
            return Err(OpError::Forbidden(
                "You do not have permission to delete this post".to_string(),
            ));
        }
        let attachments = media_db_operations::list_post_media(&conn, post_id)?;
        posts_db_operations::delete_post(&mut conn, post_id)?;
        attachments
    };

    if !attachments.is_empty() {
        web::block(move || {
            for item in &attachments {
                media_helpers::remove_stored_files(
                    &item.file_path,
                    item.thumbnail_path.as_deref(),
                );
            }
        })
        .await?;
    }
    Ok(())
}

pub fn dashboard_stats(pool: &DbPool) -> Result<DashboardStats, OpError> {
    let conn = get_conn(pool)?;
    let thirty_days_ago = db_operations::now() - Duration::days(30);

    Ok(DashboardStats {
        total_posts: posts_db_operations::count_posts_by_status(&conn, None)?,
        published_posts: posts_db_operations::count_posts_by_status(
            &conn,
            Some(PostStatus::Published),
        )?,
        draft_posts: posts_db_operations::count_posts_by_status(&conn, Some(PostStatus::Draft))?,
        posts_by_type: posts_db_operations::count_posts_by_type(&conn)?
            .into_iter()
            .collect(),
        activities_by_status: posts_db_operations::count_activities_by_status(&conn)?
            .into_iter()
            .collect(),
        recent_posts: posts_db_operations::count_posts_created_since(&conn, thirty_days_ago)?,
        total_users: users_db_operations::count_users(&conn)?,
        total_media: media_db_operations::count_media(&conn)?,
        total_activities: posts_db_operations::count_activities(&conn)?,
        total_offers: posts_db_operations::count_offers(&conn)?,
    })
}

pub fn list_media(
    pool: &DbPool,
    filters: &MediaFilters,
) -> Result<AdminPage<MediaSummary>, OpError> {
    let conn = get_conn(pool)?;
    let (total, items) = media_db_operations::list_media(&conn, filters)?;
    Ok(AdminPage {
        items: items.iter().map(media_summary).collect(),
        total,
        pages: page_count(total, filters.per_page),
        current_page: filters.page,
    })
}

pub async fn upload_media(
    config: &Config,
    pool: &DbPool,
    user_id: i64,
    payload: Multipart,
) -> Result<MediaSummary, OpError> {
    let saved = media_helpers::save_upload(config, payload).await?;

    let file_path = saved.file_path.to_string_lossy().replace('\\', "/");
    let thumbnail_path = saved
        .thumbnail_path
        .as_ref()
        .map(|p| p.to_string_lossy().replace('\\', "/"));

    let row = {
        let conn = get_conn(pool)?;
        let new = NewMedia {
            filename: &saved.filename,
            original_filename: &saved.original_filename,
            file_type: saved.file_type,
            mime_type: &saved.mime_type,
            file_size: saved.file_size,
            file_path: &file_path,
            thumbnail_path: thumbnail_path.as_deref(),
            width: saved.width,
            height: saved.height,
            description: saved.description.as_deref(),
            alt_text: saved.alt_text.as_deref(),
            uploaded_by: Some(user_id),
        };
        media_db_operations::create_media(&conn, &new)
            .and_then(|id| media_db_operations::read_media_by_id(&conn, id))
    };

    match row {
        Ok(Some(item)) => Ok(media_summary(&item)),
        Ok(None) => Err(OpError::NotFound("Media not found".to_string())),
        Err(err) => {
            let file_path = saved.file_path.clone();
            let thumbnail = saved.thumbnail_path.clone();
            web::block(move || {
                media_helpers::remove_file_quietly(&file_path);
                if let Some(thumb) = thumbnail {
                    media_helpers::remove_file_quietly(&thumb);
                }
            })
            .await?;
            Err(err.into())
        }
    }
}

/// Files go before the row, so a failed removal still leaves the entry
/// resolvable through the serving fallback.
pub async fn delete_media(pool: &DbPool, media_id: i64) -> Result<(), OpError> {
    let item = {
        let conn = get_conn(pool)?;
        media_db_operations::read_media_by_id(&conn, media_id)?
            .ok_or_else(|| OpError::NotFound("Media not found".to_string()))?
    };

    let file_path = item.file_path.clone();
    let thumbnail_path = item.thumbnail_path.clone();
    web::block(move || media_helpers::remove_stored_files(&file_path, thumbnail_path.as_deref()))
        .await?;

    let conn = get_conn(pool)?;
    media_db_operations::delete_media_row(&conn, media_id)?;
    Ok(())
}

pub fn list_settings(pool: &DbPool) -> Result<Vec<Setting>, OpError> {
    let conn = get_conn(pool)?;
    Ok(settings_db_operations::read_all_settings(&conn)?)
}

/// The new value must resolve against the row's declared `value_type`
/// before it is written.
pub fn update_setting(pool: &DbPool, key: &str, new_value: &str) -> Result<Setting, OpError> {
    let conn = get_conn(pool)?;
    let current = settings_db_operations::read_setting(&conn, key)?
        .ok_or_else(|| OpError::NotFound("Setting not found".to_string()))?;
    SettingValue::parse(new_value, current.value_type).map_err(OpError::Validation)?;

    settings_db_operations::update_setting_value(&conn, key, new_value)?;
    settings_db_operations::read_setting(&conn, key)?
        .ok_or_else(|| OpError::NotFound("Setting not found".to_string()))
}

pub fn media_summary(item: &MediaItem) -> MediaSummary {
    MediaSummary {
        id: item.id,
        filename: item.filename.clone(),
        original_filename: item.original_filename.clone(),
        url: format!("/media/{}/file", item.id),
        thumbnail_url: item
            .thumbnail_path
            .as_ref()
            .map(|_| format!("/media/{}/thumbnail", item.id)),
        file_type: item.file_type,
        mime_type: item.mime_type.clone(),
        file_size: item.file_size,
        width: item.width,
        height: item.height,
        description: item.description.clone(),
        alt_text: item.alt_text.clone(),
        created_at: item.created_at,
    }
}

fn post_summary(row: PostWithRefs) -> AdminPostSummary {
    AdminPostSummary {
        id: row.post.id,
        title: row.post.title,
        slug: row.post.slug,
        post_type: row.post.post_type,
        status: row.post.status,
        author: row.author_username,
        category: row.category.map(|(name, _, _)| name),
        is_featured: row.post.is_featured,
        views: row.post.views,
        created_at: row.post.created_at,
        updated_at: row.post.updated_at,
        published_at: row.post.published_at,
    }
}

fn assemble_post_detail(conn: &Connection, post_id: i64) -> Result<AdminPostDetail, OpError> {
    let post = posts_db_operations::read_post_by_id(conn, post_id)?
        .ok_or_else(|| OpError::NotFound("Post not found".to_string()))?;
    let author = users_db_operations::read_user_by_id(conn, post.user_id)?
        .map(|u| u.username)
        .unwrap_or_default();
    let tags = taxonomy_db_operations::read_tag_names_for_post(conn, post_id)?;
    let extension = posts_db_operations::fetch_extension(conn, post_id)?;
    let attachments = media_db_operations::list_post_media(conn, post_id)?;
    Ok(AdminPostDetail {
        post,
        author,
        tags,
        extension,
        attachments,
    })
}

fn check_extension_payload(input: &PostInput) -> Result<(), OpError> {
    if input.activity.is_some() && input.post_type != PostType::Activity {
        return Err(OpError::Validation(
            "An activity payload requires post_type 'activity'".to_string(),
        ));
    }
    if input.offer.is_some() && input.post_type != PostType::Offer {
        return Err(OpError::Validation(
            "An offer payload requires post_type 'offer'".to_string(),
        ));
    }
    Ok(())
}

fn apply_extension_payload(
    conn: &Connection,
    post_id: i64,
    post_title: &str,
    input: &PostInput,
) -> Result<(), OpError> {
    if let Some(ref activity) = input.activity {
        let title = activity.title.as_deref().unwrap_or(post_title);
        let slug = sanitization_helpers::derive_slug(title);
        let upsert = ActivityUpsert {
            title,
            slug: &slug,
            description: activity.description.as_deref(),
            activity_type: activity.activity_type.as_deref(),
            start_date: activity.start_date,
            end_date: activity.end_date,
            location: activity.location.as_deref(),
            is_online: activity.is_online,
            registration_url: activity.registration_url.as_deref(),
            max_participants: activity.max_participants,
            status: activity.status.unwrap_or(ActivityStatus::Upcoming),
            featured_image: activity.featured_image.as_deref(),
        };
        posts_db_operations::upsert_activity(conn, post_id, &upsert)
            .map_err(|e| reject_duplicate(e, "An activity with this slug"))?;
    }

    if let Some(ref offer) = input.offer {
        let title = offer.title.as_deref().unwrap_or(post_title);
        let slug = sanitization_helpers::derive_slug(title);
        let upsert = OfferUpsert {
            title,
            slug: &slug,
            description: offer.description.as_deref().unwrap_or(""),
            offer_type: &offer.offer_type,
            contract_type: offer.contract_type.as_deref(),
            location: offer.location.as_deref(),
            salary_range: offer.salary_range.as_deref(),
            experience_required: offer.experience_required.as_deref(),
            application_deadline: offer.application_deadline,
            start_date: offer.start_date,
            is_remote: offer.is_remote,
            status: offer.status.unwrap_or(OfferStatus::Open),
        };
        posts_db_operations::upsert_offer(conn, post_id, &upsert)
            .map_err(|e| reject_duplicate(e, "An offer with this slug"))?;
    }
    Ok(())
}

/// Comma separated operator input to unique (name, slug) pairs, first
/// spelling wins.
fn parse_tags(raw: Option<&str>) -> Vec<(String, String)> {
    let mut tags: Vec<(String, String)> = Vec::new();
    if let Some(raw) = raw {
        for name in raw.split(',') {
            let name = name.trim();
            if name.is_empty() || tags.iter().any(|(existing, _)| existing == name) {
                continue;
            }
            tags.push((name.to_string(), sanitization_helpers::derive_slug(name)));
        }
    }
    tags
}

fn page_count(total: i64, per_page: i64) -> i64 {
    if per_page <= 0 {
        return 0;
    }
    (total + per_page - 1) / per_page
}

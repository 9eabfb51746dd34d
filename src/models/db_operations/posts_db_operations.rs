use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Result as RusqliteResult, Row, ToSql};

use crate::models::{
    Activity, ActivityStatus, Offer, OfferStatus, Post, PostExtension, PostStatus, PostType,
};

use super::taxonomy_db_operations;

const POST_COLUMNS: &str = "p.id, p.title, p.slug, p.excerpt, p.content, p.content_html, \
     p.post_type, p.status, p.featured_image, p.views, p.likes, p.is_featured, \
     p.allow_comments, p.published_at, p.created_at, p.updated_at, p.user_id, p.category_id";

const ACTIVITY_COLUMNS: &str = "a.id, a.post_id, a.title, a.slug, a.description, \
     a.activity_type, a.start_date, a.end_date, a.location, a.is_online, a.registration_url, \
     a.max_participants, a.current_participants, a.status, a.featured_image, \
     a.created_at, a.updated_at";

const OFFER_COLUMNS: &str = "o.id, o.post_id, o.title, o.slug, o.description, o.offer_type, \
     o.contract_type, o.location, o.salary_range, o.experience_required, \
     o.application_deadline, o.start_date, o.is_remote, o.status, o.views, \
     o.applications_count, o.created_at, o.updated_at";

fn post_from_row(row: &Row) -> RusqliteResult<Post> {
    Ok(Post {
        id: row.get(0)?,
        title: row.get(1)?,
        slug: row.get(2)?,
        excerpt: row.get(3)?,
        content: row.get(4)?,
        content_html: row.get(5)?,
        post_type: row.get(6)?,
        status: row.get(7)?,
        featured_image: row.get(8)?,
        views: row.get(9)?,
        likes: row.get(10)?,
        is_featured: row.get(11)?,
        allow_comments: row.get(12)?,
        published_at: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
        user_id: row.get(16)?,
        category_id: row.get(17)?,
    })
}

fn activity_from_row(row: &Row) -> RusqliteResult<Activity> {
    Ok(Activity {
        id: row.get(0)?,
        post_id: row.get(1)?,
        title: row.get(2)?,
        slug: row.get(3)?,
        description: row.get(4)?,
        activity_type: row.get(5)?,
        start_date: row.get(6)?,
        end_date: row.get(7)?,
        location: row.get(8)?,
        is_online: row.get(9)?,
        registration_url: row.get(10)?,
        max_participants: row.get(11)?,
        current_participants: row.get(12)?,
        status: row.get(13)?,
        featured_image: row.get(14)?,
        created_at: row.get(15)?,
        updated_at: row.get(16)?,
    })
}

fn offer_from_row(row: &Row) -> RusqliteResult<Offer> {
    Ok(Offer {
        id: row.get(0)?,
        post_id: row.get(1)?,
        title: row.get(2)?,
        slug: row.get(3)?,
        description: row.get(4)?,
        offer_type: row.get(5)?,
        contract_type: row.get(6)?,
        location: row.get(7)?,
        salary_range: row.get(8)?,
        experience_required: row.get(9)?,
        application_deadline: row.get(10)?,
        start_date: row.get(11)?,
        is_remote: row.get(12)?,
        status: row.get(13)?,
        views: row.get(14)?,
        applications_count: row.get(15)?,
        created_at: row.get(16)?,
        updated_at: row.get(17)?,
    })
}

/// A post row joined with the author and category columns the feeds need.
#[derive(Debug, Clone)]
pub struct PostWithRefs {
    pub post: Post,
    pub author_username: String,
    pub author_first_name: Option<String>,
    pub author_last_name: Option<String>,
    pub category: Option<(String, String, String)>,
}

fn post_with_refs_from_row(row: &Row) -> RusqliteResult<PostWithRefs> {
    let category = match row.get::<_, Option<String>>(21)? {
        Some(name) => Some((name, row.get(22)?, row.get(23)?)),
        None => None,
    };
    Ok(PostWithRefs {
        post: post_from_row(row)?,
        author_username: row.get(18)?,
        author_first_name: row.get(19)?,
        author_last_name: row.get(20)?,
        category,
    })
}

pub struct NewPost<'a> {
    pub title: &'a str,
    pub slug: &'a str,
    pub excerpt: Option<&'a str>,
    pub content: &'a str,
    pub content_html: &'a str,
    pub post_type: PostType,
    pub status: PostStatus,
    pub featured_image: Option<&'a str>,
    pub is_featured: bool,
    pub allow_comments: bool,
    pub user_id: i64,
    pub category_id: Option<i64>,
    pub tags: &'a [(String, String)],
}

/// Inserts the post and its tag set in one transaction. `published_at`
/// is stamped when the post is born published.
pub fn create_post(conn: &mut Connection, new: &NewPost) -> RusqliteResult<i64> {
    let tx = conn.transaction()?;
    let now = super::now();
    tx.execute(
        "INSERT INTO posts (title, slug, excerpt, content, content_html, post_type, status,
                            featured_image, is_featured, allow_comments, published_at,
                            created_at, updated_at, user_id, category_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                 CASE WHEN ?7 = 'published' THEN ?11 ELSE NULL END,
                 ?11, ?11, ?12, ?13)",
        params![
            new.title,
            new.slug,
            new.excerpt,
            new.content,
            new.content_html,
            new.post_type,
            new.status,
            new.featured_image,
            new.is_featured,
            new.allow_comments,
            now,
            new.user_id,
            new.category_id,
        ],
    )?;
    let post_id = tx.last_insert_rowid();
    taxonomy_db_operations::replace_post_tags(&tx, post_id, new.tags)?;
    tx.commit()?;
    Ok(post_id)
}

pub struct PostUpdate<'a> {
    pub title: &'a str,
    pub excerpt: Option<&'a str>,
    pub content: &'a str,
    pub content_html: &'a str,
    pub post_type: PostType,
    pub status: PostStatus,
    pub featured_image: Option<&'a str>,
    pub is_featured: bool,
    pub allow_comments: bool,
    pub category_id: Option<i64>,
    pub tags: &'a [(String, String)],
}

/// Full-replace update. The slug never changes; `published_at` is stamped
/// on the first transition into published and kept forever after. A
/// post_type moving away from activity/offer drops the now-unreachable
/// extension row.
pub fn update_post(conn: &mut Connection, post_id: i64, upd: &PostUpdate) -> RusqliteResult<bool> {
    let tx = conn.transaction()?;
    let now = super::now();
    let changed = tx.execute(
        "UPDATE posts
         SET title = ?1, excerpt = ?2, content = ?3, content_html = ?4, post_type = ?5,
             status = ?6, featured_image = ?7, is_featured = ?8, allow_comments = ?9,
             category_id = ?10, updated_at = ?11,
             published_at = CASE
                 WHEN ?6 = 'published' AND published_at IS NULL THEN ?11
                 ELSE published_at
             END
         WHERE id = ?12",
        params![
            upd.title,
            upd.excerpt,
            upd.content,
            upd.content_html,
            upd.post_type,
            upd.status,
            upd.featured_image,
            upd.is_featured,
            upd.allow_comments,
            upd.category_id,
            now,
            post_id,
        ],
    )?;
    if changed == 0 {
        return Ok(false);
    }

    taxonomy_db_operations::replace_post_tags(&tx, post_id, upd.tags)?;

    if upd.post_type != PostType::Activity {
        tx.execute("DELETE FROM activities WHERE post_id = ?1", params![post_id])?;
    }
    if upd.post_type != PostType::Offer {
        tx.execute("DELETE FROM offers WHERE post_id = ?1", params![post_id])?;
    }

    tx.commit()?;
    Ok(true)
}

pub fn delete_post(conn: &mut Connection, post_id: i64) -> RusqliteResult<bool> {
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM post_media WHERE post_id = ?1", params![post_id])?;
    tx.execute("DELETE FROM activities WHERE post_id = ?1", params![post_id])?;
    tx.execute("DELETE FROM offers WHERE post_id = ?1", params![post_id])?;
    tx.execute("DELETE FROM post_tags WHERE post_id = ?1", params![post_id])?;
    let deleted = tx.execute("DELETE FROM posts WHERE id = ?1", params![post_id])?;
    tx.commit()?;
    Ok(deleted > 0)
}

pub fn read_post_by_id(conn: &Connection, post_id: i64) -> RusqliteResult<Option<Post>> {
    conn.query_row(
        &format!("SELECT {POST_COLUMNS} FROM posts p WHERE p.id = ?1"),
        params![post_id],
        post_from_row,
    )
    .optional()
}

pub fn read_published_post_by_slug(
    conn: &Connection,
    slug: &str,
) -> RusqliteResult<Option<PostWithRefs>> {
    conn.query_row(
        &format!(
            "SELECT {POST_COLUMNS}, u.username, u.first_name, u.last_name,
                    c.name, c.slug, c.color
             FROM posts p
             JOIN users u ON u.id = p.user_id
             LEFT JOIN categories c ON c.id = p.category_id
             WHERE p.slug = ?1 AND p.status = 'published'"
        ),
        params![slug],
        post_with_refs_from_row,
    )
    .optional()
}

/// Atomic view bump; touches only published posts so a draft slug cannot
/// be probed. Returns the number of rows hit.
pub fn increment_views_for_published_slug(conn: &Connection, slug: &str) -> RusqliteResult<usize> {
    conn.execute(
        "UPDATE posts SET views = views + 1 WHERE slug = ?1 AND status = 'published'",
        params![slug],
    )
}

pub struct PublicPostFilters {
    pub post_type: Option<PostType>,
    pub category_slug: Option<String>,
    pub featured: bool,
    pub limit: i64,
    pub offset: i64,
}

/// Published posts for the public feed, newest publication first, with
/// the total count the caller folds into the page meta.
pub fn list_published_posts(
    conn: &Connection,
    filters: &PublicPostFilters,
) -> RusqliteResult<(i64, Vec<PostWithRefs>)> {
    let mut where_sql = String::from("p.status = 'published'");
    let mut bound: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(post_type) = filters.post_type {
        where_sql.push_str(" AND p.post_type = ?");
        bound.push(Box::new(post_type.as_str().to_string()));
    }
    if let Some(ref category_slug) = filters.category_slug {
        where_sql.push_str(" AND c.slug = ?");
        bound.push(Box::new(category_slug.clone()));
    }
    if filters.featured {
        where_sql.push_str(" AND p.is_featured = 1");
    }

    let count_refs: Vec<&dyn ToSql> = bound.iter().map(|b| b.as_ref()).collect();
    let total: i64 = conn.query_row(
        &format!(
            "SELECT COUNT(*) FROM posts p
             LEFT JOIN categories c ON c.id = p.category_id
             WHERE {where_sql}"
        ),
        &count_refs[..],
        |row| row.get(0),
    )?;

    bound.push(Box::new(filters.limit));
    bound.push(Box::new(filters.offset));
    let list_refs: Vec<&dyn ToSql> = bound.iter().map(|b| b.as_ref()).collect();

    let mut stmt = conn.prepare(&format!(
        "SELECT {POST_COLUMNS}, u.username, u.first_name, u.last_name,
                c.name, c.slug, c.color
         FROM posts p
         JOIN users u ON u.id = p.user_id
         LEFT JOIN categories c ON c.id = p.category_id
         WHERE {where_sql}
         ORDER BY p.published_at DESC
         LIMIT ? OFFSET ?"
    ))?;
    let posts = stmt
        .query_map(&list_refs[..], post_with_refs_from_row)?
        .collect::<RusqliteResult<Vec<_>>>()?;

    Ok((total, posts))
}

pub struct AdminPostFilters {
    pub post_type: Option<PostType>,
    pub status: Option<PostStatus>,
    pub search: Option<String>,
    pub page: i64,
    pub per_page: i64,
}

/// Admin listing over every status, newest creation first.
pub fn list_posts_admin(
    conn: &Connection,
    filters: &AdminPostFilters,
) -> RusqliteResult<(i64, Vec<PostWithRefs>)> {
    let mut where_sql = String::from("1 = 1");
    let mut bound: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(post_type) = filters.post_type {
        where_sql.push_str(" AND p.post_type = ?");
        bound.push(Box::new(post_type.as_str().to_string()));
    }
    if let Some(status) = filters.status {
        where_sql.push_str(" AND p.status = ?");
        bound.push(Box::new(status.as_str().to_string()));
    }
    if let Some(ref search) = filters.search {
        where_sql.push_str(" AND p.title LIKE ?");
        bound.push(Box::new(format!("%{search}%")));
    }

    let count_refs: Vec<&dyn ToSql> = bound.iter().map(|b| b.as_ref()).collect();
    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM posts p WHERE {where_sql}"),
        &count_refs[..],
        |row| row.get(0),
    )?;

    bound.push(Box::new(filters.per_page));
    bound.push(Box::new((filters.page - 1) * filters.per_page));
    let list_refs: Vec<&dyn ToSql> = bound.iter().map(|b| b.as_ref()).collect();

    let mut stmt = conn.prepare(&format!(
        "SELECT {POST_COLUMNS}, u.username, u.first_name, u.last_name,
                c.name, c.slug, c.color
         FROM posts p
         JOIN users u ON u.id = p.user_id
         LEFT JOIN categories c ON c.id = p.category_id
         WHERE {where_sql}
         ORDER BY p.created_at DESC
         LIMIT ? OFFSET ?"
    ))?;
    let posts = stmt
        .query_map(&list_refs[..], post_with_refs_from_row)?
        .collect::<RusqliteResult<Vec<_>>>()?;

    Ok((total, posts))
}

/// The activity or offer payload attached to a post, if any.
pub fn fetch_extension(conn: &Connection, post_id: i64) -> RusqliteResult<Option<PostExtension>> {
    let activity = conn
        .query_row(
            &format!("SELECT {ACTIVITY_COLUMNS} FROM activities a WHERE a.post_id = ?1"),
            params![post_id],
            activity_from_row,
        )
        .optional()?;
    if let Some(activity) = activity {
        return Ok(Some(PostExtension::Activity(activity)));
    }

    let offer = conn
        .query_row(
            &format!("SELECT {OFFER_COLUMNS} FROM offers o WHERE o.post_id = ?1"),
            params![post_id],
            offer_from_row,
        )
        .optional()?;
    Ok(offer.map(PostExtension::Offer))
}

pub struct ActivityUpsert<'a> {
    pub title: &'a str,
    pub slug: &'a str,
    pub description: Option<&'a str>,
    pub activity_type: Option<&'a str>,
    pub start_date: NaiveDateTime,
    pub end_date: Option<NaiveDateTime>,
    pub location: Option<&'a str>,
    pub is_online: bool,
    pub registration_url: Option<&'a str>,
    pub max_participants: Option<i64>,
    pub status: ActivityStatus,
    pub featured_image: Option<&'a str>,
}

/// Creates or refreshes the activity payload of a post. The slug is set
/// at creation and left alone on every later save, like the post's own.
pub fn upsert_activity(
    conn: &Connection,
    post_id: i64,
    upsert: &ActivityUpsert,
) -> RusqliteResult<()> {
    let now = super::now();
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM activities WHERE post_id = ?1",
            params![post_id],
            |row| row.get(0),
        )
        .optional()?;

    match existing {
        Some(id) => {
            conn.execute(
                "UPDATE activities
                 SET title = ?1, description = ?2, activity_type = ?3, start_date = ?4,
                     end_date = ?5, location = ?6, is_online = ?7, registration_url = ?8,
                     max_participants = ?9, status = ?10, featured_image = ?11, updated_at = ?12
                 WHERE id = ?13",
                params![
                    upsert.title,
                    upsert.description,
                    upsert.activity_type,
                    upsert.start_date,
                    upsert.end_date,
                    upsert.location,
                    upsert.is_online,
                    upsert.registration_url,
                    upsert.max_participants,
                    upsert.status,
                    upsert.featured_image,
                    now,
                    id,
                ],
            )?;
        }
        None => {
            conn.execute(
                "INSERT INTO activities
                    (post_id, title, slug, description, activity_type, start_date, end_date,
                     location, is_online, registration_url, max_participants, status,
                     featured_image, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)",
                params![
                    post_id,
                    upsert.title,
                    upsert.slug,
                    upsert.description,
                    upsert.activity_type,
                    upsert.start_date,
                    upsert.end_date,
                    upsert.location,
                    upsert.is_online,
                    upsert.registration_url,
                    upsert.max_participants,
                    upsert.status,
                    upsert.featured_image,
                    now,
                ],
            )?;
        }
    }
    Ok(())
}

pub struct OfferUpsert<'a> {
    pub title: &'a str,
    pub slug: &'a str,
    pub description: &'a str,
    pub offer_type: &'a str,
    pub contract_type: Option<&'a str>,
    pub location: Option<&'a str>,
    pub salary_range: Option<&'a str>,
    pub experience_required: Option<&'a str>,
    pub application_deadline: Option<NaiveDateTime>,
    pub start_date: Option<NaiveDateTime>,
    pub is_remote: bool,
    pub status: OfferStatus,
}

pub fn upsert_offer(conn: &Connection, post_id: i64, upsert: &OfferUpsert) -> RusqliteResult<()> {
    let now = super::now();
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM offers WHERE post_id = ?1",
            params![post_id],
            |row| row.get(0),
        )
        .optional()?;

    match existing {
        Some(id) => {
            conn.execute(
                "UPDATE offers
                 SET title = ?1, description = ?2, offer_type = ?3, contract_type = ?4,
                     location = ?5, salary_range = ?6, experience_required = ?7,
                     application_deadline = ?8, start_date = ?9, is_remote = ?10,
                     status = ?11, updated_at = ?12
                 WHERE id = ?13",
                params![
                    upsert.title,
                    upsert.description,
                    upsert.offer_type,
                    upsert.contract_type,
                    upsert.location,
                    upsert.salary_range,
                    upsert.experience_required,
                    upsert.application_deadline,
                    upsert.start_date,
                    upsert.is_remote,
                    upsert.status,
                    now,
                    id,
                ],
            )?;
        }
        None => {
            conn.execute(
                "INSERT INTO offers
                    (post_id, title, slug, description, offer_type, contract_type, location,
                     salary_range, experience_required, application_deadline, start_date,
                     is_remote, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)",
                params![
                    post_id,
                    upsert.title,
                    upsert.slug,
                    upsert.description,
                    upsert.offer_type,
                    upsert.contract_type,
                    upsert.location,
                    upsert.salary_range,
                    upsert.experience_required,
                    upsert.application_deadline,
                    upsert.start_date,
                    upsert.is_remote,
                    upsert.status,
                    now,
                ],
            )?;
        }
    }
    Ok(())
}

pub struct ActivityFilters {
    pub status: Option<ActivityStatus>,
    pub now: NaiveDateTime,
    pub limit: i64,
    pub offset: i64,
}

/// Activities soonest first. The upcoming and ongoing filters also
/// constrain on the event dates relative to `now`; the status column
/// itself is operator-set and never derived.
pub fn list_activities(
    conn: &Connection,
    filters: &ActivityFilters,
) -> RusqliteResult<(i64, Vec<(Activity, String, Option<String>)>)> {
    let mut where_sql = String::from("1 = 1");
    let mut bound: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(status) = filters.status {
        where_sql.push_str(" AND a.status = ?");
        bound.push(Box::new(status.as_str().to_string()));
    }
    match filters.status {
        Some(ActivityStatus::Upcoming) => {
            where_sql.push_str(" AND a.start_date >= ?");
            bound.push(Box::new(filters.now));
        }
        Some(ActivityStatus::Ongoing) => {
            where_sql.push_str(" AND a.start_date <= ? AND a.end_date >= ?");
            bound.push(Box::new(filters.now));
            bound.push(Box::new(filters.now));
        }
        _ => {}
    }

    let count_refs: Vec<&dyn ToSql> = bound.iter().map(|b| b.as_ref()).collect();
    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM activities a WHERE {where_sql}"),
        &count_refs[..],
        |row| row.get(0),
    )?;

    bound.push(Box::new(filters.limit));
    bound.push(Box::new(filters.offset));
    let list_refs: Vec<&dyn ToSql> = bound.iter().map(|b| b.as_ref()).collect();

    let mut stmt = conn.prepare(&format!(
        "SELECT {ACTIVITY_COLUMNS}, p.slug, p.featured_image
         FROM activities a
         JOIN posts p ON p.id = a.post_id
         WHERE {where_sql}
         ORDER BY a.start_date
         LIMIT ? OFFSET ?"
    ))?;
    let activities = stmt
        .query_map(&list_refs[..], |row| {
            Ok((activity_from_row(row)?, row.get(17)?, row.get(18)?))
        })?
        .collect::<RusqliteResult<Vec<_>>>()?;

    Ok((total, activities))
}

pub struct OfferFilters {
    pub offer_type: Option<String>,
    pub status: Option<OfferStatus>,
    pub limit: i64,
    pub offset: i64,
}

/// Offers newest first.
pub fn list_offers(
    conn: &Connection,
    filters: &OfferFilters,
) -> RusqliteResult<(i64, Vec<(Offer, String, Option<String>)>)> {
    let mut where_sql = String::from("1 = 1");
    let mut bound: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(ref offer_type) = filters.offer_type {
        where_sql.push_str(" AND o.offer_type = ?");
        bound.push(Box::new(offer_type.clone()));
    }
    if let Some(status) = filters.status {
        where_sql.push_str(" AND o.status = ?");
        bound.push(Box::new(status.as_str().to_string()));
    }

    let count_refs: Vec<&dyn ToSql> = bound.iter().map(|b| b.as_ref()).collect();
    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM offers o WHERE {where_sql}"),
        &count_refs[..],
        |row| row.get(0),
    )?;

    bound.push(Box::new(filters.limit));
    bound.push(Box::new(filters.offset));
    let list_refs: Vec<&dyn ToSql> = bound.iter().map(|b| b.as_ref()).collect();

    let mut stmt = conn.prepare(&format!(
        "SELECT {OFFER_COLUMNS}, p.slug, p.featured_image
         FROM offers o
         JOIN posts p ON p.id = o.post_id
         WHERE {where_sql}
         ORDER BY o.created_at DESC
         LIMIT ? OFFSET ?"
    ))?;
    let offers = stmt
        .query_map(&list_refs[..], |row| {
            Ok((offer_from_row(row)?, row.get(18)?, row.get(19)?))
        })?
        .collect::<RusqliteResult<Vec<_>>>()?;

    Ok((total, offers))
}

pub fn count_posts_by_status(
    conn: &Connection,
    status: Option<PostStatus>,
) -> RusqliteResult<i64> {
    match status {
        Some(status) => conn.query_row(
            "SELECT COUNT(*) FROM posts WHERE status = ?1",
            params![status],
            |row| row.get(0),
        ),
        None => conn.query_row("SELECT COUNT(*) FROM posts", [], |row| row.get(0)),
    }
}

pub fn count_posts_by_type(conn: &Connection) -> RusqliteResult<Vec<(String, i64)>> {
    let mut stmt = conn.prepare("SELECT post_type, COUNT(*) FROM posts GROUP BY post_type")?;
    let counts = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<RusqliteResult<Vec<_>>>()?;
    Ok(counts)
}

pub fn count_activities_by_status(conn: &Connection) -> RusqliteResult<Vec<(String, i64)>> {
    let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM activities GROUP BY status")?;
    let counts = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<RusqliteResult<Vec<_>>>()?;
    Ok(counts)
}

pub fn count_posts_created_since(conn: &Connection, since: NaiveDateTime) -> RusqliteResult<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM posts WHERE created_at >= ?1",
        params![since],
        |row| row.get(0),
    )
}

pub fn count_activities(conn: &Connection) -> RusqliteResult<i64> {
    conn.query_row("SELECT COUNT(*) FROM activities", [], |row| row.get(0))
}

pub fn count_offers(conn: &Connection) -> RusqliteResult<i64> {
    conn.query_row("SELECT COUNT(*) FROM offers", [], |row| row.get(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::db_setup::setup_cms_db;

    fn test_conn() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        setup_cms_db(&mut conn).unwrap();
        conn.execute(
            "INSERT INTO users (username, email, password_hash, role, created_at)
             VALUES ('admin', 'admin@example.org', 'h', 'admin', datetime('now'))",
            [],
        )
        .unwrap();
        conn
    }

    fn draft(title: &'static str, slug: &'static str) -> NewPost<'static> {
        NewPost {
            title,
            slug,
            excerpt: None,
            content: "body",
            content_html: "<p>body</p>",
            post_type: PostType::Article,
            status: PostStatus::Draft,
            featured_image: None,
            is_featured: false,
            allow_comments: true,
            user_id: 1,
            category_id: None,
            tags: &[],
        }
    }

    fn update_from(post: &Post, status: PostStatus) -> PostUpdate<'static> {
        PostUpdate {
            title: "T",
            excerpt: None,
            content: "body",
            content_html: "<p>body</p>",
            post_type: post.post_type,
            status,
            featured_image: None,
            is_featured: false,
            allow_comments: true,
            category_id: None,
            tags: &[],
        }
    }

    fn sample_activity(slug: &'static str, start: &str) -> ActivityUpsert<'static> {
        ActivityUpsert {
            title: "A",
            slug,
            description: None,
            activity_type: None,
            start_date: start.parse().unwrap(),
            end_date: None,
            location: None,
            is_online: false,
            registration_url: None,
            max_participants: None,
            status: ActivityStatus::Upcoming,
            featured_image: None,
        }
    }

    #[test]
    fn published_at_is_stamped_once() {
        let mut conn = test_conn();
        let id = create_post(&mut conn, &draft("T", "t")).unwrap();
        let post = read_post_by_id(&conn, id).unwrap().unwrap();
        assert!(post.published_at.is_none());

        update_post(&mut conn, id, &update_from(&post, PostStatus::Published)).unwrap();
        let published = read_post_by_id(&conn, id).unwrap().unwrap();
        let stamped = published.published_at.unwrap();

        update_post(&mut conn, id, &update_from(&published, PostStatus::Archived)).unwrap();
        update_post(&mut conn, id, &update_from(&published, PostStatus::Published)).unwrap();
        let republished = read_post_by_id(&conn, id).unwrap().unwrap();
        assert_eq!(republished.published_at, Some(stamped));
    }

    #[test]
    fn born_published_posts_are_stamped_at_creation() {
        let mut conn = test_conn();
        let mut new = draft("T", "t");
        new.status = PostStatus::Published;
        let id = create_post(&mut conn, &new).unwrap();
        let post = read_post_by_id(&conn, id).unwrap().unwrap();
        assert!(post.published_at.is_some());
    }

    #[test]
    fn public_list_never_contains_drafts() {
        let mut conn = test_conn();
        create_post(&mut conn, &draft("Draft", "draft-post")).unwrap();
        let mut new = draft("Live", "live-post");
        new.status = PostStatus::Published;
        create_post(&mut conn, &new).unwrap();

        let (total, posts) = list_published_posts(
            &conn,
            &PublicPostFilters {
                post_type: None,
                category_slug: None,
                featured: false,
                limit: 10,
                offset: 0,
            },
        )
        .unwrap();
        assert_eq!(total, 1);
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].post.slug, "live-post");
    }

    #[test]
    fn view_increment_ignores_unpublished_slugs() {
        let mut conn = test_conn();
        create_post(&mut conn, &draft("Draft", "draft-post")).unwrap();
        assert_eq!(
            increment_views_for_published_slug(&conn, "draft-post").unwrap(),
            0
        );

        let mut new = draft("Live", "live-post");
        new.status = PostStatus::Published;
        let id = create_post(&mut conn, &new).unwrap();
        assert_eq!(
            increment_views_for_published_slug(&conn, "live-post").unwrap(),
            1
        );
        assert_eq!(read_post_by_id(&conn, id).unwrap().unwrap().views, 1);
    }

    #[test]
    fn changing_type_away_from_activity_drops_the_extension() {
        let mut conn = test_conn();
        let mut new = draft("Conf", "conf");
        new.post_type = PostType::Activity;
        let id = create_post(&mut conn, &new).unwrap();

        upsert_activity(&conn, id, &sample_activity("conf", "2025-06-01T00:00:00")).unwrap();
        assert!(fetch_extension(&conn, id).unwrap().is_some());

        let post = read_post_by_id(&conn, id).unwrap().unwrap();
        let mut upd = update_from(&post, PostStatus::Draft);
        upd.post_type = PostType::Article;
        update_post(&mut conn, id, &upd).unwrap();
        assert!(fetch_extension(&conn, id).unwrap().is_none());
    }

    #[test]
    fn upsert_activity_keeps_the_original_slug() {
        let mut conn = test_conn();
        let mut new = draft("Conf", "conf");
        new.post_type = PostType::Activity;
        let id = create_post(&mut conn, &new).unwrap();

        let mut first = sample_activity("conference-annuelle", "2025-06-01T00:00:00");
        first.title = "Conférence Annuelle";
        upsert_activity(&conn, id, &first).unwrap();

        let mut second = sample_activity("conference-2026", "2025-06-01T00:00:00");
        second.title = "Conférence 2026";
        upsert_activity(&conn, id, &second).unwrap();

        match fetch_extension(&conn, id).unwrap().unwrap() {
            PostExtension::Activity(activity) => {
                assert_eq!(activity.title, "Conférence 2026");
                assert_eq!(activity.slug, "conference-annuelle");
            }
            PostExtension::Offer(_) => panic!("expected an activity"),
        }
    }

    #[test]
    fn deleting_a_post_cascades_to_attachments_and_extensions() {
        let mut conn = test_conn();
        let mut new = draft("Conf", "conf");
        new.post_type = PostType::Activity;
        let id = create_post(&mut conn, &new).unwrap();
        upsert_activity(&conn, id, &sample_activity("conf", "2025-06-01T00:00:00")).unwrap();
        conn.execute(
            "INSERT INTO post_media (post_id, filename, original_filename, file_type,
                                     mime_type, file_size, file_path, created_at)
             VALUES (?1, 'f.png', 'f.png', 'image', 'image/png', 10, '/tmp/f.png',
                     datetime('now'))",
            params![id],
        )
        .unwrap();

        assert!(delete_post(&mut conn, id).unwrap());
        let attachments: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM post_media WHERE post_id = ?1",
                params![id],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(attachments, 0);
        assert!(fetch_extension(&conn, id).unwrap().is_none());
    }

    #[test]
    fn activity_listing_filters_upcoming_by_date() {
        let mut conn = test_conn();
        for (slug, start) in [("past", "2020-01-01T09:00:00"), ("future", "2999-01-01T09:00:00")] {
            let mut new = draft("A", slug);
            new.post_type = PostType::Activity;
            let id = create_post(&mut conn, &new).unwrap();
            upsert_activity(&conn, id, &sample_activity(slug, start)).unwrap();
        }

        let (total, rows) = list_activities(
            &conn,
            &ActivityFilters {
                status: Some(ActivityStatus::Upcoming),
                now: super::super::now(),
                limit: 10,
                offset: 0,
            },
        )
        .unwrap();
        assert_eq!(total, 1);
        assert_eq!(rows[0].0.slug, "future");

        let (all_total, _) = list_activities(
            &conn,
            &ActivityFilters {
                status: None,
                now: super::super::now(),
                limit: 10,
                offset: 0,
            },
        )
        .unwrap();
        assert_eq!(all_total, 2);
    }
}

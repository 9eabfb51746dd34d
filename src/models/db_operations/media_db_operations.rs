use rusqlite::{params, Connection, OptionalExtension, Result as RusqliteResult, Row, ToSql};

use crate::models::{FileType, MediaItem, PostMedia};

const MEDIA_COLUMNS: &str = "id, filename, original_filename, file_type, mime_type, \
     file_size, file_path, thumbnail_path, width, height, description, alt_text, \
     is_public, uploaded_by, created_at";

fn media_from_row(row: &Row) -> RusqliteResult<MediaItem> {
    Ok(MediaItem {
        id: row.get(0)?,
        filename: row.get(1)?,
        original_filename: row.get(2)?,
        file_type: row.get(3)?,
        mime_type: row.get(4)?,
        file_size: row.get(5)?,
        file_path: row.get(6)?,
        thumbnail_path: row.get(7)?,
        width: row.get(8)?,
        height: row.get(9)?,
        description: row.get(10)?,
        alt_text: row.get(11)?,
        is_public: row.get(12)?,
        uploaded_by: row.get(13)?,
        created_at: row.get(14)?,
    })
}

fn post_media_from_row(row: &Row) -> RusqliteResult<PostMedia> {
    Ok(PostMedia {
        id: row.get(0)?,
        post_id: row.get(1)?,
        filename: row.get(2)?,
        original_filename: row.get(3)?,
        file_type: row.get(4)?,
        mime_type: row.get(5)?,
        file_size: row.get(6)?,
        file_path: row.get(7)?,
        thumbnail_path: row.get(8)?,
        width: row.get(9)?,
        height: row.get(10)?,
        caption: row.get(11)?,
        alt_text: row.get(12)?,
        sort_order: row.get(13)?,
        created_at: row.get(14)?,
    })
}

pub struct NewMedia<'a> {
    pub filename: &'a str,
    pub original_filename: &'a str,
    pub file_type: FileType,
    pub mime_type: &'a str,
    pub file_size: i64,
    pub file_path: &'a str,
    pub thumbnail_path: Option<&'a str>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub description: Option<&'a str>,
    pub alt_text: Option<&'a str>,
    pub uploaded_by: Option<i64>,
}

pub fn create_media(conn: &Connection, new: &NewMedia) -> RusqliteResult<i64> {
    conn.execute(
        "INSERT INTO media (filename, original_filename, file_type, mime_type, file_size,
                            file_path, thumbnail_path, width, height, description, alt_text,
                            uploaded_by, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            new.filename,
            new.original_filename,
            new.file_type,
            new.mime_type,
            new.file_size,
            new.file_path,
            new.thumbnail_path,
            new.width,
            new.height,
            new.description,
            new.alt_text,
            new.uploaded_by,
            super::now(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn read_media_by_id(conn: &Connection, media_id: i64) -> RusqliteResult<Option<MediaItem>> {
    conn.query_row(
        &format!("SELECT {MEDIA_COLUMNS} FROM media WHERE id = ?1"),
        params![media_id],
        media_from_row,
    )
    .optional()
}

pub struct MediaFilters {
    pub file_type: Option<FileType>,
    pub search: Option<String>,
    pub page: i64,
    pub per_page: i64,
}

/// Library listing, newest upload first. The search term matches both the
/// stored and the original filename.
pub fn list_media(
    conn: &Connection,
    filters: &MediaFilters,
) -> RusqliteResult<(i64, Vec<MediaItem>)> {
    let mut where_sql = String::from("1 = 1");
    let mut bound: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(file_type) = filters.file_type {
        where_sql.push_str(" AND file_type = ?");
        bound.push(Box::new(file_type.as_str().to_string()));
    }
    if let Some(ref search) = filters.search {
        where_sql.push_str(" AND (filename LIKE ? OR original_filename LIKE ?)");
        let needle = format!("%{search}%");
        bound.push(Box::new(needle.clone()));
        bound.push(Box::new(needle));
    }

    let count_refs: Vec<&dyn ToSql> = bound.iter().map(|b| b.as_ref()).collect();
    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM media WHERE {where_sql}"),
        &count_refs[..],
        |row| row.get(0),
    )?;

    bound.push(Box::new(filters.per_page));
    bound.push(Box::new((filters.page - 1) * filters.per_page));
    let list_refs: Vec<&dyn ToSql> = bound.iter().map(|b| b.as_ref()).collect();

    let mut stmt = conn.prepare(&format!(
        "SELECT {MEDIA_COLUMNS} FROM media
         WHERE {where_sql}
         ORDER BY created_at DESC
         LIMIT ? OFFSET ?"
    ))?;
    let items = stmt
        .query_map(&list_refs[..], media_from_row)?
        .collect::<RusqliteResult<Vec<_>>>()?;

    Ok((total, items))
}

pub fn delete_media_row(conn: &Connection, media_id: i64) -> RusqliteResult<bool> {
    let deleted = conn.execute("DELETE FROM media WHERE id = ?1", params![media_id])?;
    Ok(deleted > 0)
}

pub fn count_media(conn: &Connection) -> RusqliteResult<i64> {
    conn.query_row("SELECT COUNT(*) FROM media", [], |row| row.get(0))
}

/// Copies a library item's file fields into a post attachment.
pub fn attach_media_to_post(
    conn: &Connection,
    post_id: i64,
    item: &MediaItem,
    caption: Option<&str>,
    sort_order: i64,
) -> RusqliteResult<i64> {
    conn.execute(
        "INSERT INTO post_media (post_id, filename, original_filename, file_type, mime_type,
                                 file_size, file_path, thumbnail_path, width, height,
                                 caption, alt_text, sort_order, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            post_id,
            item.filename,
            item.original_filename,
            item.file_type,
            item.mime_type,
            item.file_size,
            item.file_path,
            item.thumbnail_path,
            item.width,
            item.height,
            caption,
            item.alt_text,
            sort_order,
            super::now(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn list_post_media(conn: &Connection, post_id: i64) -> RusqliteResult<Vec<PostMedia>> {
    let mut stmt = conn.prepare(
        "SELECT id, post_id, filename, original_filename, file_type, mime_type, file_size,
                file_path, thumbnail_path, width, height, caption, alt_text, sort_order,
                created_at
         FROM post_media
         WHERE post_id = ?1
         ORDER BY sort_order, id",
    )?;
    let attachments = stmt
        .query_map(params![post_id], post_media_from_row)?
        .collect::<RusqliteResult<Vec<_>>>()?;
    Ok(attachments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::db_setup::setup_cms_db;

    fn test_conn() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        setup_cms_db(&mut conn).unwrap();
        conn
    }

    fn png(filename: &'static str) -> NewMedia<'static> {
        NewMedia {
            filename,
            original_filename: "photo.png",
            file_type: FileType::Image,
            mime_type: "image/png",
            file_size: 2048,
            file_path: "/uploads/images/photo.png",
            thumbnail_path: None,
            width: Some(640),
            height: Some(480),
            description: None,
            alt_text: None,
            uploaded_by: None,
        }
    }

    #[test]
    fn create_and_read_back_a_media_row() {
        let conn = test_conn();
        let id = create_media(&conn, &png("20250101_000000_photo.png")).unwrap();
        let item = read_media_by_id(&conn, id).unwrap().unwrap();
        assert_eq!(item.filename, "20250101_000000_photo.png");
        assert_eq!(item.file_type, FileType::Image);
        assert_eq!(item.width, Some(640));
        assert!(item.is_public);
    }

    #[test]
    fn listing_filters_by_type_and_filename() {
        let conn = test_conn();
        create_media(&conn, &png("a_photo.png")).unwrap();
        let mut doc = png("report.pdf");
        doc.file_type = FileType::Document;
        doc.mime_type = "application/pdf";
        doc.original_filename = "report.pdf";
        create_media(&conn, &doc).unwrap();

        let (total, items) = list_media(
            &conn,
            &MediaFilters {
                file_type: Some(FileType::Image),
                search: None,
                page: 1,
                per_page: 20,
            },
        )
        .unwrap();
        assert_eq!(total, 1);
        assert_eq!(items[0].filename, "a_photo.png");

        let (total, items) = list_media(
            &conn,
            &MediaFilters {
                file_type: None,
                search: Some("report".into()),
                page: 1,
                per_page: 20,
            },
        )
        .unwrap();
        assert_eq!(total, 1);
        assert_eq!(items[0].filename, "report.pdf");
    }

    #[test]
    fn deleting_a_row_reports_whether_it_existed() {
        let conn = test_conn();
        let id = create_media(&conn, &png("a.png")).unwrap();
        assert!(delete_media_row(&conn, id).unwrap());
        assert!(!delete_media_row(&conn, id).unwrap());
        assert!(read_media_by_id(&conn, id).unwrap().is_none());
    }

    #[test]
    fn attachments_come_back_in_sort_order() {
        let conn = test_conn();
        conn.execute(
            "INSERT INTO users (username, email, password_hash, role, created_at)
             VALUES ('e', 'e@example.org', 'h', 'editor', datetime('now'))",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO posts (title, slug, content, content_html, post_type, status,
                                created_at, updated_at, user_id)
             VALUES ('P', 'p', 'c', '<p>c</p>', 'article', 'draft',
                     datetime('now'), datetime('now'), 1)",
            [],
        )
        .unwrap();
        let post_id = conn.last_insert_rowid();

        let first = create_media(&conn, &png("first.png")).unwrap();
        let second = create_media(&conn, &png("second.png")).unwrap();
        let first = read_media_by_id(&conn, first).unwrap().unwrap();
        let second = read_media_by_id(&conn, second).unwrap().unwrap();
        attach_media_to_post(&conn, post_id, &second, Some("two"), 2).unwrap();
        attach_media_to_post(&conn, post_id, &first, Some("one"), 1).unwrap();

        let attachments = list_post_media(&conn, post_id).unwrap();
        assert_eq!(attachments.len(), 2);
        assert_eq!(attachments[0].filename, "first.png");
        assert_eq!(attachments[0].caption.as_deref(), Some("one"));
        assert_eq!(attachments[1].filename, "second.png");
    }
}

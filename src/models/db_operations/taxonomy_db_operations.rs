use rusqlite::{params, Connection, OptionalExtension, Result as RusqliteResult};

use crate::models::Category;

/// Active categories ordered for display, each with its live count of
/// published posts.
pub fn categories_with_published_counts(
    conn: &Connection,
) -> RusqliteResult<Vec<(Category, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT c.id, c.name, c.slug, c.description, c.color, c.icon,
                c.sort_order, c.is_active, c.created_at,
                (SELECT COUNT(*) FROM posts p
                 WHERE p.category_id = c.id AND p.status = 'published')
         FROM categories c
         WHERE c.is_active = 1
         ORDER BY c.sort_order, c.name",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                Category {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    slug: row.get(2)?,
                    description: row.get(3)?,
                    color: row.get(4)?,
                    icon: row.get(5)?,
                    sort_order: row.get(6)?,
                    is_active: row.get(7)?,
                    created_at: row.get(8)?,
                },
                row.get(9)?,
            ))
        })?
        .collect::<RusqliteResult<Vec<_>>>()?;
    Ok(rows)
}

/// Tags are deduplicated by name; a fresh name gets the supplied slug.
pub fn get_or_create_tag(conn: &Connection, name: &str, slug: &str) -> RusqliteResult<i64> {
    if let Some(id) = conn
        .query_row(
            "SELECT id FROM tags WHERE name = ?1",
            params![name],
            |row| row.get::<_, i64>(0),
        )
        .optional()?
    {
        return Ok(id);
    }
    conn.execute(
        "INSERT INTO tags (name, slug) VALUES (?1, ?2)",
        params![name, slug],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Replaces the tag set of a post wholesale with the given (name, slug)
/// pairs. Meant to run inside the surrounding post transaction.
pub fn replace_post_tags(
    conn: &Connection,
    post_id: i64,
    tags: &[(String, String)],
) -> RusqliteResult<()> {
    conn.execute(
        "DELETE FROM post_tags WHERE post_id = ?1",
        params![post_id],
    )?;
    for (name, slug) in tags {
        let tag_id = get_or_create_tag(conn, name, slug)?;
        conn.execute(
            "INSERT OR IGNORE INTO post_tags (post_id, tag_id) VALUES (?1, ?2)",
            params![post_id, tag_id],
        )?;
    }
    Ok(())
}

pub fn read_tag_names_for_post(conn: &Connection, post_id: i64) -> RusqliteResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT t.name FROM tags t
         JOIN post_tags pt ON pt.tag_id = t.id
         WHERE pt.post_id = ?1
         ORDER BY t.name",
    )?;
    let names = stmt
        .query_map(params![post_id], |row| row.get(0))?
        .collect::<RusqliteResult<Vec<_>>>()?;
    Ok(names)
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

    fn insert_bare_post(conn: &Connection, slug: &str) -> i64 {
        conn.execute(
            "INSERT INTO users (username, email, password_hash, role, created_at)
             VALUES ('t', 't@example.org', 'h', 'admin', datetime('now'))
             ON CONFLICT(username) DO NOTHING",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO posts (title, slug, content, content_html, post_type, status,
                                created_at, updated_at, user_id)
             VALUES ('T', ?1, 'c', '<p>c</p>', 'article', 'draft',
                     datetime('now'), datetime('now'), 1)",
            params![slug],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    #[test]
    fn tag_creation_is_deduplicated_by_name() {
        let conn = test_conn();
        let first = get_or_create_tag(&conn, "analyse", "analyse").unwrap();
        let second = get_or_create_tag(&conn, "analyse", "analyse").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn new_tag_with_colliding_slug_fails() {
        let conn = test_conn();
        get_or_create_tag(&conn, "C++", "c").unwrap();
        assert!(get_or_create_tag(&conn, "c++", "c").is_err());
    }

    #[test]
    fn replacing_post_tags_drops_the_old_set() {
        let conn = test_conn();
        let post_id = insert_bare_post(&conn, "p1");

        replace_post_tags(
            &conn,
            post_id,
            &[
                ("algèbre".to_string(), "algebre".to_string()),
                ("analyse".to_string(), "analyse".to_string()),
            ],
        )
        .unwrap();
        assert_eq!(
            read_tag_names_for_post(&conn, post_id).unwrap(),
            vec!["algèbre".to_string(), "analyse".to_string()]
        );

        replace_post_tags(
            &conn,
            post_id,
            &[("analyse".to_string(), "analyse".to_string())],
        )
        .unwrap();
        assert_eq!(
            read_tag_names_for_post(&conn, post_id).unwrap(),
            vec!["analyse".to_string()]
        );
    }

    #[test]
    fn category_counts_only_see_published_posts() {
        let conn = test_conn();
        let post_id = insert_bare_post(&conn, "p1");
        conn.execute(
            "UPDATE posts SET category_id = (SELECT id FROM categories WHERE slug = 'recherche')
             WHERE id = ?1",
            params![post_id],
        )
        .unwrap();

        let counts = categories_with_published_counts(&conn).unwrap();
        let recherche = counts.iter().find(|(c, _)| c.slug == "recherche").unwrap();
        assert_eq!(recherche.1, 0);

        conn.execute(
            "UPDATE posts SET status = 'published', published_at = datetime('now')
             WHERE id = ?1",
            params![post_id],
        )
        .unwrap();
        let counts = categories_with_published_counts(&conn).unwrap();
        let recherche = counts.iter().find(|(c, _)| c.slug == "recherche").unwrap();
        assert_eq!(recherche.1, 1);
    }
}

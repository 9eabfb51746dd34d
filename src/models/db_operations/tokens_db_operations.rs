use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Result as RusqliteResult, Row};

use crate::models::ApiToken;

const TOKEN_COLUMNS: &str = "id, token, name, description, expires_at, is_active, \
     last_used, created_at, created_by";

fn token_from_row(row: &Row) -> RusqliteResult<ApiToken> {
    Ok(ApiToken {
        id: row.get(0)?,
        token: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        expires_at: row.get(4)?,
        is_active: row.get(5)?,
        last_used: row.get(6)?,
        created_at: row.get(7)?,
        created_by: row.get(8)?,
    })
}

pub fn create_token(
    conn: &Connection,
    token: &str,
    name: &str,
    description: Option<&str>,
    expires_at: Option<NaiveDateTime>,
    created_by: Option<i64>,
) -> RusqliteResult<i64> {
    conn.execute(
        "INSERT INTO api_tokens (token, name, description, expires_at, created_at, created_by)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![token, name, description, expires_at, super::now(), created_by],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn list_tokens(conn: &Connection) -> RusqliteResult<Vec<ApiToken>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TOKEN_COLUMNS} FROM api_tokens ORDER BY created_at DESC"
    ))?;
    let tokens = stmt
        .query_map([], token_from_row)?
        .collect::<RusqliteResult<Vec<_>>>()?;
    Ok(tokens)
}

pub fn revoke_token_by_name(conn: &Connection, name: &str) -> RusqliteResult<usize> {
    conn.execute(
        "UPDATE api_tokens SET is_active = 0 WHERE name = ?1",
        params![name],
    )
}

/// Outcome of presenting a token value, so the caller can answer with the
/// matching message.
pub enum TokenCheck {
    Valid(ApiToken),
    Unknown,
    Expired,
}

/// Looks up an active token row and, only when it is usable, records the
/// use. Unknown and expired presentations leave `last_used` untouched.
pub fn authenticate_token(
    conn: &Connection,
    presented: &str,
    now: NaiveDateTime,
) -> RusqliteResult<TokenCheck> {
    let found = conn
        .query_row(
            &format!("SELECT {TOKEN_COLUMNS} FROM api_tokens WHERE token = ?1 AND is_active = 1"),
            params![presented],
            token_from_row,
        )
        .optional()?;

    let mut token = match found {
        Some(token) => token,
        None => return Ok(TokenCheck::Unknown),
    };

    if token.expires_at.is_some_and(|at| at < now) {
        return Ok(TokenCheck::Expired);
    }

    conn.execute(
        "UPDATE api_tokens SET last_used = ?1 WHERE id = ?2",
        params![now, token.id],
    )?;
    token.last_used = Some(now);
    Ok(TokenCheck::Valid(token))
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

    fn last_used_of(conn: &Connection, name: &str) -> Option<NaiveDateTime> {
        conn.query_row(
            "SELECT last_used FROM api_tokens WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn a_valid_token_authenticates_and_records_the_use() {
        let conn = test_conn();
        create_token(&conn, "abc123", "sync", None, None, None).unwrap();

        match authenticate_token(&conn, "abc123", super::super::now()).unwrap() {
            TokenCheck::Valid(token) => assert_eq!(token.name, "sync"),
            _ => panic!("expected a valid token"),
        }
        assert!(last_used_of(&conn, "sync").is_some());
    }

    #[test]
    fn unknown_and_revoked_tokens_are_rejected_without_a_trace() {
        let conn = test_conn();
        create_token(&conn, "abc123", "sync", None, None, None).unwrap();
        revoke_token_by_name(&conn, "sync").unwrap();

        assert!(matches!(
            authenticate_token(&conn, "nope", super::super::now()).unwrap(),
            TokenCheck::Unknown
        ));
        assert!(matches!(
            authenticate_token(&conn, "abc123", super::super::now()).unwrap(),
            TokenCheck::Unknown
        ));
        assert_eq!(last_used_of(&conn, "sync"), None);
    }

    #[test]
    fn expired_tokens_are_rejected_without_updating_last_used() {
        let conn = test_conn();
        create_token(
            &conn,
            "abc123",
            "sync",
            None,
            Some("2020-01-01T00:00:00".parse().unwrap()),
            None,
        )
        .unwrap();

        assert!(matches!(
            authenticate_token(&conn, "abc123", super::super::now()).unwrap(),
            TokenCheck::Expired
        ));
        assert_eq!(last_used_of(&conn, "sync"), None);
    }

    #[test]
    fn expiry_in_the_future_still_authenticates() {
        let conn = test_conn();
        create_token(
            &conn,
            "abc123",
            "sync",
            None,
            Some("2999-01-01T00:00:00".parse().unwrap()),
            None,
        )
        .unwrap();
        assert!(matches!(
            authenticate_token(&conn, "abc123", super::super::now()).unwrap(),
            TokenCheck::Valid(_)
        ));
    }
}

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Result as RusqliteResult, Row};

use crate::models::{Role, User};

const USER_COLUMNS: &str = "id, username, email, password_hash, first_name, last_name, \
     role, is_active, last_login, created_at";

fn user_from_row(row: &Row) -> RusqliteResult<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        first_name: row.get(4)?,
        last_name: row.get(5)?,
        role: row.get(6)?,
        is_active: row.get(7)?,
        last_login: row.get(8)?,
        created_at: row.get(9)?,
    })
}

pub fn create_user(
    conn: &Connection,
    username: &str,
    email: &str,
    password_hash: &str,
    first_name: Option<&str>,
    last_name: Option<&str>,
    role: Role,
) -> RusqliteResult<i64> {
    conn.execute(
        "INSERT INTO users (username, email, password_hash, first_name, last_name, role, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            username,
            email,
            password_hash,
            first_name,
            last_name,
            role,
            super::now()
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn read_all_users(conn: &Connection) -> RusqliteResult<Vec<User>> {
    let mut stmt =
        conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY username"))?;
    let users = stmt
        .query_map([], user_from_row)?
        .collect::<RusqliteResult<Vec<_>>>()?;
    Ok(users)
}

pub fn read_user_by_username(conn: &Connection, username: &str) -> RusqliteResult<Option<User>> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
        params![username],
        user_from_row,
    )
    .optional()
}

pub fn read_user_by_id(conn: &Connection, user_id: i64) -> RusqliteResult<Option<User>> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
        params![user_id],
        user_from_row,
    )
    .optional()
}

pub fn update_password(
    conn: &Connection,
    user_id: i64,
    password_hash: &str,
) -> RusqliteResult<usize> {
    conn.execute(
        "UPDATE users SET password_hash = ?1 WHERE id = ?2",
        params![password_hash, user_id],
    )
}

pub fn set_user_active(conn: &Connection, username: &str, active: bool) -> RusqliteResult<usize> {
    conn.execute(
        "UPDATE users SET is_active = ?1 WHERE username = ?2",
        params![active, username],
    )
}

pub fn update_last_login(
    conn: &Connection,
    user_id: i64,
    when: NaiveDateTime,
) -> RusqliteResult<()> {
    conn.execute(
        "UPDATE users SET last_login = ?1 WHERE id = ?2",
        params![when, user_id],
    )?;
    Ok(())
}

pub fn count_users(conn: &Connection) -> RusqliteResult<i64> {
    conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
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

    #[test]
    fn create_and_read_back_a_user() {
        let conn = test_conn();
        let id = create_user(
            &conn,
            "marie",
            "marie@example.org",
            "$2b$12$fakehash",
            Some("Marie"),
            None,
            Role::Editor,
        )
        .unwrap();

        let user = read_user_by_username(&conn, "marie").unwrap().unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.role, Role::Editor);
        assert!(user.is_active);
        assert!(user.last_login.is_none());
    }

    #[test]
    fn duplicate_username_is_rejected() {
        let conn = test_conn();
        create_user(&conn, "marie", "a@example.org", "h", None, None, Role::Editor).unwrap();
        let second = create_user(&conn, "marie", "b@example.org", "h", None, None, Role::Editor);
        assert!(second.is_err());
    }

    #[test]
    fn deactivation_flips_the_flag() {
        let conn = test_conn();
        create_user(&conn, "marie", "a@example.org", "h", None, None, Role::Editor).unwrap();
        assert_eq!(set_user_active(&conn, "marie", false).unwrap(), 1);
        let user = read_user_by_username(&conn, "marie").unwrap().unwrap();
        assert!(!user.is_active);
    }
}

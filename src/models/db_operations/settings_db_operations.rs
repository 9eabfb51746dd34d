use rusqlite::{params, Connection, OptionalExtension, Result as RusqliteResult, Row};

use crate::models::Setting;

const SETTING_COLUMNS: &str = "key, value, value_type, category, description, updated_at";

fn setting_from_row(row: &Row) -> RusqliteResult<Setting> {
    Ok(Setting {
        key: row.get(0)?,
        value: row.get(1)?,
        value_type: row.get(2)?,
        category: row.get(3)?,
        description: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

pub fn read_setting(conn: &Connection, key: &str) -> RusqliteResult<Option<Setting>> {
    conn.query_row(
        &format!("SELECT {SETTING_COLUMNS} FROM settings WHERE key = ?1"),
        params![key],
        setting_from_row,
    )
    .optional()
}

pub fn read_all_settings(conn: &Connection) -> RusqliteResult<Vec<Setting>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SETTING_COLUMNS} FROM settings ORDER BY category, key"
    ))?;
    let settings = stmt
        .query_map([], setting_from_row)?
        .collect::<RusqliteResult<Vec<_>>>()?;
    Ok(settings)
}

/// Raw value write. The caller is responsible for validating the new value
/// against the row's declared `value_type` first.
pub fn update_setting_value(conn: &Connection, key: &str, value: &str) -> RusqliteResult<usize> {
    conn.execute(
        "UPDATE settings SET value = ?1, updated_at = ?2 WHERE key = ?3",
        params![value, super::now(), key],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SettingValue;
    use crate::setup::db_setup::setup_cms_db;

    fn test_conn() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        setup_cms_db(&mut conn).unwrap();
        conn
    }

    #[test]
    fn seeded_settings_resolve_to_their_declared_types() {
        let conn = test_conn();
        let per_page = read_setting(&conn, "posts_per_page").unwrap().unwrap();
        assert_eq!(per_page.typed_value().unwrap(), SettingValue::Integer(10));

        let api_enabled = read_setting(&conn, "api_enabled").unwrap().unwrap();
        assert_eq!(api_enabled.typed_value().unwrap(), SettingValue::Boolean(true));

        let site_name = read_setting(&conn, "site_name").unwrap().unwrap();
        assert_eq!(
            site_name.typed_value().unwrap(),
            SettingValue::String("Lab_Math".into())
        );
    }

    #[test]
    fn all_settings_come_back_grouped_by_category() {
        let conn = test_conn();
        let settings = read_all_settings(&conn).unwrap();
        assert_eq!(settings.len(), 6);
        assert_eq!(settings[0].key, "api_enabled");
        assert_eq!(settings[0].category, "api");
    }

    #[test]
    fn updates_replace_the_stored_value() {
        let conn = test_conn();
        assert_eq!(update_setting_value(&conn, "posts_per_page", "25").unwrap(), 1);
        let per_page = read_setting(&conn, "posts_per_page").unwrap().unwrap();
        assert_eq!(per_page.typed_value().unwrap(), SettingValue::Integer(25));

        assert_eq!(update_setting_value(&conn, "no_such_key", "x").unwrap(), 0);
    }

    #[test]
    fn a_value_that_contradicts_its_type_fails_to_resolve() {
        let conn = test_conn();
        update_setting_value(&conn, "posts_per_page", "lots").unwrap();
        let per_page = read_setting(&conn, "posts_per_page").unwrap().unwrap();
        assert!(per_page.typed_value().is_err());
    }
}

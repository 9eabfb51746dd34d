use chrono::{NaiveDateTime, Utc};

pub mod media_db_operations;
pub mod posts_db_operations;
pub mod settings_db_operations;
pub mod taxonomy_db_operations;
pub mod tokens_db_operations;
pub mod users_db_operations;

/// Current UTC wall-clock time, the value every datetime column stores.
pub fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

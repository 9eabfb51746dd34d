use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::ToSql;
use serde::{Deserialize, Serialize};

/// Wires an enum to its lowercase text form for SQL columns, JSON and
/// parsing, so every representation of the value agrees.
macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(format!("unknown {} '{}'", stringify!($name), other)),
                }
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: String| FromSqlError::Other(e.into()))
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostType {
    Article,
    Activity,
    Announcement,
    Offer,
}

text_enum!(PostType {
    Article => "article",
    Activity => "activity",
    Announcement => "announcement",
    Offer => "offer",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Draft,
    Published,
    Archived,
}

text_enum!(PostStatus {
    Draft => "draft",
    Published => "published",
    Archived => "archived",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
    Upcoming,
    Ongoing,
    Completed,
    Cancelled,
}

text_enum!(ActivityStatus {
    Upcoming => "upcoming",
    Ongoing => "ongoing",
    Completed => "completed",
    Cancelled => "cancelled",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfferStatus {
    Open,
    Closed,
    Filled,
}

text_enum!(OfferStatus {
    Open => "open",
    Closed => "closed",
    Filled => "filled",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Editor,
    Viewer,
}

text_enum!(Role {
    Admin => "admin",
    Editor => "editor",
    Viewer => "viewer",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Image,
    Document,
    Video,
    Audio,
}

text_enum!(FileType {
    Image => "image",
    Document => "document",
    Video => "video",
    Audio => "audio",
});

impl FileType {
    /// Buckets a sniffed MIME type; anything that is not image, video or
    /// audio counts as a document.
    pub fn from_mime(mime_type: &str) -> Self {
        match mime_type.split('/').next().unwrap_or("") {
            "image" => Self::Image,
            "video" => Self::Video,
            "audio" => Self::Audio,
            _ => Self::Document,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Integer,
    Boolean,
    Json,
}

text_enum!(ValueType {
    String => "string",
    Integer => "integer",
    Boolean => "boolean",
    Json => "json",
});

/// A setting value resolved against its declared type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SettingValue {
    String(String),
    Integer(i64),
    Boolean(bool),
    Json(serde_json::Value),
}

impl SettingValue {
    pub fn parse(raw: &str, value_type: ValueType) -> Result<Self, String> {
        match value_type {
            ValueType::String => Ok(Self::String(raw.to_string())),
            ValueType::Integer => raw
                .parse::<i64>()
                .map(Self::Integer)
                .map_err(|_| format!("'{raw}' is not an integer")),
            ValueType::Boolean => match raw {
                "true" | "1" => Ok(Self::Boolean(true)),
                "false" | "0" => Ok(Self::Boolean(false)),
                _ => Err(format!("'{raw}' is not a boolean")),
            },
            ValueType::Json => serde_json::from_str(raw)
                .map(Self::Json)
                .map_err(|_| format!("'{raw}' is not valid JSON")),
        }
    }

    pub fn to_raw(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            Self::Integer(i) => i.to_string(),
            Self::Boolean(b) => b.to_string(),
            Self::Json(v) => v.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Role,
    pub is_active: bool,
    pub last_login: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub color: String,
    pub icon: Option<String>,
    pub sort_order: i64,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub excerpt: Option<String>,
    pub content: String,
    pub content_html: String,
    pub post_type: PostType,
    pub status: PostStatus,
    pub featured_image: Option<String>,
    pub views: i64,
    pub likes: i64,
    pub is_featured: bool,
    pub allow_comments: bool,
    pub published_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub user_id: i64,
    pub category_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Activity {
    pub id: i64,
    pub post_id: i64,
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
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct Offer {
    pub id: i64,
    pub post_id: i64,
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
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// The at-most-one sub-type payload a post can carry, keyed by its
/// `post_type`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PostExtension {
    Activity(Activity),
    Offer(Offer),
}

#[derive(Debug, Clone, Serialize)]
pub struct MediaItem {
    pub id: i64,
    pub filename: String,
    pub original_filename: String,
    pub file_type: FileType,
    pub mime_type: String,
    pub file_size: i64,
    pub file_path: String,
    pub thumbnail_path: Option<String>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub description: Option<String>,
    pub alt_text: Option<String>,
    pub is_public: bool,
    pub uploaded_by: Option<i64>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostMedia {
    pub id: i64,
    pub post_id: i64,
    pub filename: String,
    pub original_filename: String,
    pub file_type: FileType,
    pub mime_type: String,
    pub file_size: i64,
    pub file_path: String,
    pub thumbnail_path: Option<String>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub caption: Option<String>,
    pub alt_text: Option<String>,
    pub sort_order: i64,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct Setting {
    pub key: String,
    pub value: String,
    pub value_type: ValueType,
    pub category: String,
    pub description: Option<String>,
    pub updated_at: NaiveDateTime,
}

impl Setting {
    pub fn typed_value(&self) -> Result<SettingValue, String> {
        SettingValue::parse(&self.value, self.value_type)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiToken {
    pub id: i64,
    #[serde(skip_serializing)]
    pub token: String,
    pub name: String,
    pub description: Option<String>,
    pub expires_at: Option<NaiveDateTime>,
    pub is_active: bool,
    pub last_used: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub created_by: Option<i64>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct PostInput {
    pub title: String,
    pub slug: Option<String>,
    pub excerpt: Option<String>,
    pub content: String,
    pub post_type: PostType,
    pub status: Option<PostStatus>,
    pub category_id: Option<i64>,
    pub featured_image: Option<String>,
    #[serde(default)]
    pub is_featured: bool,
    #[serde(default = "default_true")]
    pub allow_comments: bool,
    /// Comma separated tag names, as typed by the operator.
    pub tags: Option<String>,
    /// Inline sub-type payload, only accepted when `post_type` matches.
    pub activity: Option<ActivityInput>,
    pub offer: Option<OfferInput>,
}

#[derive(Debug, Deserialize)]
pub struct ActivityInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub activity_type: Option<String>,
    pub start_date: NaiveDateTime,
    pub end_date: Option<NaiveDateTime>,
    pub location: Option<String>,
    #[serde(default)]
    pub is_online: bool,
    pub registration_url: Option<String>,
    pub max_participants: Option<i64>,
    pub status: Option<ActivityStatus>,
    pub featured_image: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OfferInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub offer_type: String,
    pub contract_type: Option<String>,
    pub location: Option<String>,
    pub salary_range: Option<String>,
    pub experience_required: Option<String>,
    pub application_deadline: Option<NaiveDateTime>,
    pub start_date: Option<NaiveDateTime>,
    #[serde(default)]
    pub is_remote: bool,
    pub status: Option<OfferStatus>,
}

#[derive(Debug, Deserialize)]
pub struct LoginInput {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordChangeInput {
    pub current_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

#[derive(Debug, Serialize)]
pub struct PageMeta {
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
    pub has_more: bool,
}

impl PageMeta {
    pub fn new(total: i64, limit: i64, offset: i64, returned: usize) -> Self {
        Self {
            total,
            limit,
            offset,
            has_more: offset + (returned as i64) < total,
        }
    }
}

/// The `{success, data, meta?}` body every public endpoint answers with.
#[derive(Debug, Serialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<PageMeta>,
}

impl<T: Serialize> ApiEnvelope<T> {
    pub fn data(data: T) -> Self {
        Self {
            success: true,
            data,
            meta: None,
        }
    }

    pub fn page(data: T, meta: PageMeta) -> Self {
        Self {
            success: true,
            data,
            meta: Some(meta),
        }
    }
}

/// Page body for the admin-side listings.
#[derive(Serialize)]
pub struct AdminPage<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub pages: i64,
    pub current_page: i64,
}

pub mod db_operations;

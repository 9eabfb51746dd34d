use rusqlite::{params, Connection, Result as RusqliteResult, Transaction};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SetupError {
    #[error("Rusqlite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
}

/// Creates the full schema and seeds the default categories and settings.
/// Every statement is idempotent, so running this against an existing
/// database is safe.
pub fn setup_cms_db(conn: &mut Connection) -> Result<(), SetupError> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;

    let tx = conn.transaction()?;

    println!("- Creating 'users' table...");
    tx.execute(
        "CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            first_name TEXT,
            last_name TEXT,
            role TEXT NOT NULL DEFAULT 'editor' CHECK(role IN ('admin', 'editor', 'viewer')),
            is_active INTEGER NOT NULL DEFAULT 1,
            last_login TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    println!("- Creating 'categories' table...");
    tx.execute(
        "CREATE TABLE IF NOT EXISTS categories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            slug TEXT NOT NULL UNIQUE,
            description TEXT,
            color TEXT NOT NULL DEFAULT '#00bcd4',
            icon TEXT,
            sort_order INTEGER NOT NULL DEFAULT 0,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    println!("- Creating 'tags' table...");
    tx.execute(
        "CREATE TABLE IF NOT EXISTS tags (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            slug TEXT NOT NULL UNIQUE
        )",
        [],
    )?;

    println!("- Creating 'posts' table...");
    tx.execute(
        "CREATE TABLE IF NOT EXISTS posts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            slug TEXT NOT NULL UNIQUE,
            excerpt TEXT,
            content TEXT NOT NULL,
            content_html TEXT NOT NULL,
            post_type TEXT NOT NULL
                CHECK(post_type IN ('article', 'activity', 'announcement', 'offer')),
            status TEXT NOT NULL DEFAULT 'draft'
                CHECK(status IN ('draft', 'published', 'archived')),
            featured_image TEXT,
            views INTEGER NOT NULL DEFAULT 0,
            likes INTEGER NOT NULL DEFAULT 0,
            is_featured INTEGER NOT NULL DEFAULT 0,
            allow_comments INTEGER NOT NULL DEFAULT 1,
            published_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            user_id INTEGER NOT NULL,
            category_id INTEGER,
            FOREIGN KEY (user_id) REFERENCES users(id),
            FOREIGN KEY (category_id) REFERENCES categories(id) ON DELETE SET NULL
        )",
        [],
    )?;

    println!("- Creating 'post_tags' table...");
    tx.execute(
        "CREATE TABLE IF NOT EXISTS post_tags (
            post_id INTEGER NOT NULL,
            tag_id INTEGER NOT NULL,
            PRIMARY KEY (post_id, tag_id),
            FOREIGN KEY (post_id) REFERENCES posts(id) ON DELETE CASCADE,
            FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE
        )",
        [],
    )?;

    println!("- Creating 'activities' table...");
    tx.execute(
        "CREATE TABLE IF NOT EXISTS activities (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            post_id INTEGER NOT NULL UNIQUE,
            title TEXT NOT NULL,
            slug TEXT NOT NULL UNIQUE,
            description TEXT,
            activity_type TEXT,
            start_date TEXT NOT NULL,
            end_date TEXT,
            location TEXT,
            is_online INTEGER NOT NULL DEFAULT 0,
            registration_url TEXT,
            max_participants INTEGER,
            current_participants INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'upcoming'
                CHECK(status IN ('upcoming', 'ongoing', 'completed', 'cancelled')),
            featured_image TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY (post_id) REFERENCES posts(id) ON DELETE CASCADE
        )",
        [],
    )?;

    println!("- Creating 'offers' table...");
    tx.execute(
        "CREATE TABLE IF NOT EXISTS offers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            post_id INTEGER NOT NULL UNIQUE,
            title TEXT NOT NULL,
            slug TEXT NOT NULL UNIQUE,
            description TEXT NOT NULL,
            offer_type TEXT NOT NULL,
            contract_type TEXT,
            location TEXT,
            salary_range TEXT,
            experience_required TEXT,
            application_deadline TEXT,
            start_date TEXT,
            is_remote INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'open'
                CHECK(status IN ('open', 'closed', 'filled')),
            views INTEGER NOT NULL DEFAULT 0,
            applications_count INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY (post_id) REFERENCES posts(id) ON DELETE CASCADE
        )",
        [],
    )?;

    println!("- Creating 'media' table...");
    tx.execute(
        "CREATE TABLE IF NOT EXISTS media (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            filename TEXT NOT NULL,
            original_filename TEXT NOT NULL,
            file_type TEXT NOT NULL
                CHECK(file_type IN ('image', 'document', 'video', 'audio')),
            mime_type TEXT NOT NULL,
            file_size INTEGER NOT NULL,
            file_path TEXT NOT NULL,
            thumbnail_path TEXT,
            width INTEGER,
            height INTEGER,
            description TEXT,
            alt_text TEXT,
            is_public INTEGER NOT NULL DEFAULT 1,
            uploaded_by INTEGER,
            created_at TEXT NOT NULL,
            FOREIGN KEY (uploaded_by) REFERENCES users(id)
        )",
        [],
    )?;

    println!("- Creating 'post_media' table...");
    tx.execute(
        "CREATE TABLE IF NOT EXISTS post_media (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            post_id INTEGER NOT NULL,
            filename TEXT NOT NULL,
            original_filename TEXT NOT NULL,
            file_type TEXT NOT NULL
                CHECK(file_type IN ('image', 'document', 'video', 'audio')),
            mime_type TEXT NOT NULL,
            file_size INTEGER NOT NULL,
            file_path TEXT NOT NULL,
            thumbnail_path TEXT,
            width INTEGER,
            height INTEGER,
            caption TEXT,
            alt_text TEXT,
            sort_order INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            FOREIGN KEY (post_id) REFERENCES posts(id) ON DELETE CASCADE
        )",
        [],
    )?;

    println!("- Creating 'settings' table...");
    tx.execute(
        "CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            value_type TEXT NOT NULL DEFAULT 'string'
                CHECK(value_type IN ('string', 'integer', 'boolean', 'json')),
            category TEXT NOT NULL DEFAULT 'general',
            description TEXT,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    println!("- Creating 'api_tokens' table...");
    tx.execute(
        "CREATE TABLE IF NOT EXISTS api_tokens (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            token TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            description TEXT,
            expires_at TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            last_used TEXT,
            created_at TEXT NOT NULL,
            created_by INTEGER,
            FOREIGN KEY (created_by) REFERENCES users(id)
        )",
        [],
    )?;

    println!("- Creating indexes...");
    tx.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_posts_status_published ON posts(status, published_at);
         CREATE INDEX IF NOT EXISTS idx_posts_type ON posts(post_type);
         CREATE INDEX IF NOT EXISTS idx_activities_start ON activities(start_date);
         CREATE INDEX IF NOT EXISTS idx_offers_status_created ON offers(status, created_at);
         CREATE INDEX IF NOT EXISTS idx_media_type_created ON media(file_type, created_at);
         CREATE INDEX IF NOT EXISTS idx_post_media_post ON post_media(post_id);",
    )?;

    seed_initial_categories(&tx)?;
    seed_initial_settings(&tx)?;

    tx.commit()?;
    Ok(())
}

fn seed_initial_categories(tx: &Transaction) -> RusqliteResult<()> {
    println!("- Seeding default categories...");
    let categories: [(&str, &str, &str, &str); 6] = [
        ("Actualités", "actualites", "#00bcd4", "newspaper"),
        ("Recherche", "recherche", "#00ffcc", "flask"),
        ("Publications", "publications", "#ffd700", "book"),
        ("Événements", "evenements", "#9c27b0", "calendar"),
        ("Annonces", "annonces", "#ff9800", "bullhorn"),
        ("Offres", "offres", "#4caf50", "briefcase"),
    ];

    for (position, (name, slug, color, icon)) in categories.iter().enumerate() {
        tx.execute(
            "INSERT OR IGNORE INTO categories (name, slug, color, icon, sort_order)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![name, slug, color, icon, position as i64],
        )?;
    }
    println!("  > {} default categories in place", categories.len());

    Ok(())
}

fn seed_initial_settings(tx: &Transaction) -> RusqliteResult<()> {
    println!("- Seeding default settings...");
    let settings: [(&str, &str, &str, &str); 6] = [
        ("site_name", "Lab_Math", "string", "general"),
        (
            "site_description",
            "Laboratoire de Mathématiques Appliquées",
            "string",
            "general",
        ),
        (
            "main_site_url",
            "https://labmath-scsmaubmar-org.onrender.com",
            "string",
            "integration",
        ),
        ("api_enabled", "true", "boolean", "api"),
        ("posts_per_page", "10", "integer", "display"),
        ("maintenance_mode", "false", "boolean", "general"),
    ];

    for (key, value, value_type, category) in settings {
        tx.execute(
            "INSERT OR IGNORE INTO settings (key, value, value_type, category, updated_at)
             VALUES (?1, ?2, ?3, ?4, datetime('now'))",
            params![key, value, value_type, category],
        )?;
    }
    println!("  > {} default settings in place", settings.len());

    Ok(())
}

/// Seeds the first admin account. Returns false if the username is taken.
pub fn seed_admin_user(
    conn: &Connection,
    username: &str,
    email: &str,
    password_hash: &str,
) -> Result<bool, SetupError> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO users
            (username, email, password_hash, first_name, last_name, role, created_at)
         VALUES (?1, ?2, ?3, 'Admin', 'LabMath', 'admin', datetime('now'))",
        params![username, email, password_hash],
    )?;
    Ok(inserted > 0)
}

/// Drops every table so an init --reset starts from a clean slate.
pub fn drop_cms_db(conn: &mut Connection) -> Result<(), SetupError> {
    let tx = conn.transaction()?;
    println!("- Dropping all tables...");
    tx.execute_batch(
        "DROP TABLE IF EXISTS post_tags;
         DROP TABLE IF EXISTS post_media;
         DROP TABLE IF EXISTS activities;
         DROP TABLE IF EXISTS offers;
         DROP TABLE IF EXISTS posts;
         DROP TABLE IF EXISTS tags;
         DROP TABLE IF EXISTS categories;
         DROP TABLE IF EXISTS media;
         DROP TABLE IF EXISTS api_tokens;
         DROP TABLE IF EXISTS settings;
         DROP TABLE IF EXISTS users;",
    )?;
    tx.commit()?;
    Ok(())
}

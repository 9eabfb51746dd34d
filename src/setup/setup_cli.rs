use chrono::Duration;
use clap::{Parser, Subcommand};
use rand::RngCore;
use rusqlite::Connection;
use std::fs;
use std::path::PathBuf;

use labcms_backend::config::Config;
use labcms_backend::models::db_operations::{self, tokens_db_operations, users_db_operations};
use labcms_backend::models::Role;
use labcms_backend::setup::db_setup;
use labcms_backend::PasswordService;

#[derive(Parser, Debug)]
#[command(name = "labcms_setup", author, version, about = "A CLI for lab CMS setup and account management.", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the .env configuration file.
    #[arg(long, required = true, value_name = "FILE")]
    env_file: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Database {
        #[command(subcommand)]
        action: DatabaseAction,
    },
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    Token {
        #[command(subcommand)]
        action: TokenAction,
    },
}

#[derive(Subcommand, Debug)]
enum DatabaseAction {
    /// Create the schema and seed the default admin, categories and settings.
    Init {
        /// Drop all existing tables first.
        #[arg(long)]
        reset: bool,
    },
}

#[derive(Subcommand, Debug)]
enum UserAction {
    Add {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
        /// One of: admin, editor, viewer.
        #[arg(long, default_value = "editor")]
        role: String,
    },
    List,
    SetPassword {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
    Activate {
        #[arg(long)]
        username: String,
    },
    Deactivate {
        #[arg(long)]
        username: String,
    },
}

#[derive(Subcommand, Debug)]
enum TokenAction {
    /// Generate a token for the public sync endpoint.
    Generate {
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
        /// Days until the token expires. Omit for a token that never expires.
        #[arg(long)]
        expires_days: Option<i64>,
    },
    List,
    Revoke {
        #[arg(long)]
        name: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let config =
        Config::from_env(&cli.env_file).expect("FATAL: Failed to load or parse configuration.");

    match &cli.command {
        Commands::Database { action } => match action {
            DatabaseAction::Init { reset } => init_database(&config, *reset),
        },
        Commands::User { action } => match action {
            UserAction::Add {
                username,
                email,
                password,
                first_name,
                last_name,
                role,
            } => add_user(
                &config,
                username,
                email,
                password,
                first_name.as_deref(),
                last_name.as_deref(),
                role,
            ),
            UserAction::List => list_users(&config),
            UserAction::SetPassword { username, password } => {
                set_password(&config, username, password)
            }
            UserAction::Activate { username } => set_active(&config, username, true),
            UserAction::Deactivate { username } => set_active(&config, username, false),
        },
        Commands::Token { action } => match action {
            TokenAction::Generate {
                name,
                description,
                expires_days,
            } => generate_token(&config, name, description.as_deref(), *expires_days),
            TokenAction::List => list_tokens(&config),
            TokenAction::Revoke { name } => revoke_token(&config, name),
        },
    }
}

fn open_database(config: &Config) -> Option<Connection> {
    let db_path = config.db_file_path();
    if !db_path.exists() {
        eprintln!(
            "❌ Error: Database not found at '{}'. Run `labcms_setup database init` first.",
            db_path.display()
        );
        return None;
    }
    match Connection::open(&db_path) {
        Ok(conn) => Some(conn),
        Err(e) => {
            eprintln!("❌ Error opening database: {}", e);
            None
        }
    }
}

fn init_database(config: &Config, reset: bool) {
    let db_path = config.db_file_path();
    if db_path.exists() && !reset {
        println!(
            "ℹ️ Database already exists at '{}'. Use --reset to start over.",
            db_path.display()
        );
        return;
    }
    if let Some(parent_dir) = db_path.parent() {
        fs::create_dir_all(parent_dir).expect("Could not create database directory.");
    }

    println!("\nSetting up the CMS database at '{}'...", db_path.display());
    let mut conn = Connection::open(&db_path).expect("Could not open the database file.");

    if reset {
        if let Err(e) = db_setup::drop_cms_db(&mut conn) {
            eprintln!("❌ Error resetting the database: {}", e);
            return;
        }
    }
    if let Err(e) = db_setup::setup_cms_db(&mut conn) {
        eprintln!("❌ Error setting up the database: {}", e);
        return;
    }

    let passwords = PasswordService::new(config.bcrypt_cost);
    let hash = passwords
        .hash("admin123")
        .expect("Failed to hash the default password");
    match db_setup::seed_admin_user(&conn, "admin", "admin@labmath.com", &hash) {
        Ok(true) => {
            println!("✅ Database initialized successfully.");
            println!("👤 Administrator account created:");
            println!("   Username: admin");
            println!("   Password: admin123");
            println!("   Email: admin@labmath.com");
            println!("\n⚠️  IMPORTANT: Change this password after your first login.");
        }
        Ok(false) => println!("✅ Database initialized. The admin account already existed."),
        Err(e) => eprintln!("❌ Error creating the default admin user: {}", e),
    }
}

fn add_user(
    config: &Config,
    username: &str,
    email: &str,
    password: &str,
    first_name: Option<&str>,
    last_name: Option<&str>,
    role: &str,
) {
    let conn = match open_database(config) {
        Some(c) => c,
        None => return,
    };
    let role: Role = match role.parse() {
        Ok(role) => role,
        Err(message) => {
            eprintln!("❌ Error: {}. Use 'admin', 'editor' or 'viewer'.", message);
            return;
        }
    };

    let passwords = PasswordService::new(config.bcrypt_cost);
    let hash = passwords.hash(password).expect("Failed to hash password");

    match users_db_operations::create_user(
        &conn, username, email, &hash, first_name, last_name, role,
    ) {
        Ok(_) => println!("✅ User '{}' created successfully.", username),
        Err(e) => eprintln!(
            "❌ Error creating user: {}. The username or email might already be taken.",
            e
        ),
    }
}

fn list_users(config: &Config) {
    let conn = match open_database(config) {
        Some(c) => c,
        None => return,
    };
    match users_db_operations::read_all_users(&conn) {
        Ok(users) if users.is_empty() => println!("No users yet."),
        Ok(users) => {
            println!("Users:");
            for user in users {
                let state = if user.is_active { "active" } else { "disabled" };
                println!(
                    "- {} ({}, {}, {})",
                    user.username, user.role, state, user.email
                );
            }
        }
        Err(e) => eprintln!("❌ Error fetching users: {}", e),
    }
}

fn set_password(config: &Config, username: &str, password: &str) {
    let conn = match open_database(config) {
        Some(c) => c,
        None => return,
    };
    let user = match users_db_operations::read_user_by_username(&conn, username) {
        Ok(Some(user)) => user,
        Ok(None) => {
            eprintln!("❌ Error: No user named '{}' found.", username);
            return;
        }
        Err(e) => {
            eprintln!("❌ Error looking up user: {}", e);
            return;
        }
    };

    let passwords = PasswordService::new(config.bcrypt_cost);
    let hash = passwords
        .hash(password)
        .expect("Failed to hash new password");
    match users_db_operations::update_password(&conn, user.id, &hash) {
        Ok(_) => println!("✅ Password for '{}' changed successfully.", username),
        Err(e) => eprintln!("❌ Error updating password: {}", e),
    }
}

fn set_active(config: &Config, username: &str, active: bool) {
    let conn = match open_database(config) {
        Some(c) => c,
        None => return,
    };
    let verb = if active { "activated" } else { "deactivated" };
    match users_db_operations::set_user_active(&conn, username, active) {
        Ok(0) => eprintln!("❌ Error: No user named '{}' found.", username),
        Ok(_) => println!("✅ User '{}' {}.", username, verb),
        Err(e) => eprintln!("❌ Error updating user: {}", e),
    }
}

fn generate_token(
    config: &Config,
    name: &str,
    description: Option<&str>,
    expires_days: Option<i64>,
) {
    let conn = match open_database(config) {
        Some(c) => c,
        None => return,
    };

    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    let token = hex::encode(bytes);

    let expires_at = expires_days.map(|days| db_operations::now() + Duration::days(days));

    match tokens_db_operations::create_token(&conn, &token, name, description, expires_at, None) {
        Ok(_) => {
            println!("✅ API token '{}' created.", name);
            println!("   Token: {}", token);
            println!("\n⚠️  Store this value now. It is not shown again.");
        }
        Err(e) => eprintln!("❌ Error creating token: {}", e),
    }
}

fn list_tokens(config: &Config) {
    let conn = match open_database(config) {
        Some(c) => c,
        None => return,
    };
    match tokens_db_operations::list_tokens(&conn) {
        Ok(tokens) if tokens.is_empty() => println!("No API tokens yet."),
        Ok(tokens) => {
            println!("API tokens:");
            for token in tokens {
                let state = if token.is_active { "active" } else { "revoked" };
                let expiry = token
                    .expires_at
                    .map(|at| at.format("%Y-%m-%d").to_string())
                    .unwrap_or_else(|| "never".to_string());
                let last_used = token
                    .last_used
                    .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "never".to_string());
                println!(
                    "- {} ({}, expires: {}, last used: {})",
                    token.name, state, expiry, last_used
                );
            }
        }
        Err(e) => eprintln!("❌ Error fetching tokens: {}", e),
    }
}

fn revoke_token(config: &Config, name: &str) {
    let conn = match open_database(config) {
        Some(c) => c,
        None => return,
    };
    match tokens_db_operations::revoke_token_by_name(&conn, name) {
        Ok(0) => eprintln!("❌ Error: No token named '{}' found.", name),
        Ok(_) => println!("✅ Token '{}' revoked.", name),
        Err(e) => eprintln!("❌ Error revoking token: {}", e),
    }
}

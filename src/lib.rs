use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// bcrypt hashing behind an explicit service, so the cost factor is set
/// once at startup instead of being re-read wherever a password is touched.
pub struct PasswordService {
    cost: u32,
}

impl PasswordService {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub fn hash(&self, plain: &str) -> Result<String, bcrypt::BcryptError> {
        bcrypt::hash(plain, self.cost)
    }

    /// A malformed stored hash counts as a failed verification.
    pub fn verify(&self, plain: &str, stored_hash: &str) -> bool {
        bcrypt::verify(plain, stored_hash).unwrap_or(false)
    }
}

pub mod config;
pub mod helper;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod setup;

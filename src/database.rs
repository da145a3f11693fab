//! Persistence adapters.
//!
//! [`postgres`] is the production backend, [`memory`] keeps everything in
//! process and is used by tests and embedders.

pub mod memory;
pub mod postgres;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::error::{AccountError, Result};

pub const DEFAULT_CREDENTIALS: &str = "postgres";
pub const DEFAULT_DATABASE_NAME: &str = "accounts";
pub const DEFAULT_POOL_SIZE: u32 = 10;

/// PostgreSQL connection pool.
#[derive(Clone, Debug)]
pub struct Database {
    pub postgres: PgPool,
}

impl Database {
    /// Init database connections.
    pub async fn new(
        hostname: &str,
        username: &str,
        password: &str,
        db: &str,
        pool: u32,
    ) -> Result<Self> {
        let addr = format!("postgres://{username}:{password}@{hostname}/{db}");
        let pool = PgPoolOptions::new().max_connections(pool);
        let postgres = pool.connect(&addr).await?;

        tracing::info!(%hostname, %db, "postgres connected");

        Ok(Self { postgres })
    }

    /// Connect using the `postgres` configuration entry.
    pub async fn from_config(config: &crate::config::Postgres) -> Result<Self> {
        Self::new(
            &config.address,
            config.username.as_deref().unwrap_or(DEFAULT_CREDENTIALS),
            config.password.as_deref().unwrap_or(DEFAULT_CREDENTIALS),
            config.database.as_deref().unwrap_or(DEFAULT_DATABASE_NAME),
            config.pool_size.unwrap_or(DEFAULT_POOL_SIZE),
        )
        .await
    }

    /// Apply pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!().run(&self.postgres).await?;
        tracing::info!("migrations applied");
        Ok(())
    }
}

/// Map constraint violations of a [`sqlx::Error`] onto [`AccountError`].
pub(crate) trait ToAccountError<T> {
    fn catch(self) -> Result<T>;
}

impl<T> ToAccountError<T> for std::result::Result<T, sqlx::Error> {
    fn catch(self) -> Result<T> {
        self.map_err(|err| {
            let sqlx::Error::Database(db) = &err else {
                return AccountError::Sql(err);
            };

            if db.is_unique_violation() {
                if let Some(field) = db.constraint().and_then(unique_field) {
                    return AccountError::Duplicate { field };
                }
            }
            if db.is_foreign_key_violation() {
                return AccountError::NotFound;
            }

            AccountError::Sql(err)
        })
    }
}

/// Field guarded by a unique constraint.
fn unique_field(constraint: &str) -> Option<&'static str> {
    match constraint {
        "users_email_key" => Some("email"),
        "users_username_key" => Some("username"),
        "profiles_user_id_key" => Some("user"),
        _ => None,
    }
}

/// Escape `LIKE` wildcards.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// `LIMIT`/`OFFSET` value. PostgreSQL takes a signed `BIGINT`.
fn sql_bound(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

use diesel::r2d2::{ConnectionManager, Pool};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tracing::debug;

pub mod models;
pub mod schema;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./src/db/migrations");

#[cfg(feature = "sqlite")]
type DbConnection = diesel::sqlite::SqliteConnection;
#[cfg(feature = "postgres")]
type DbConnection = diesel::pg::PgConnection;

pub type PooledConnection = diesel::r2d2::PooledConnection<ConnectionManager<DbConnection>>;

pub type DbPool = Pool<ConnectionManager<DbConnection>>;

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Database connection error: {0}")]
    ConnectionError(String),
    #[error("Database migration error")]
    MigrationError(#[from] Box<dyn std::error::Error + Send + Sync>),
    #[error("Failed to save billable: {0}")]
    SaveBillableError(diesel::result::Error),
    #[error("Failed to find billable: {0}")]
    FindBillableError(diesel::result::Error),
    #[error("Failed to insert charge: {0}")]
    InsertChargeError(diesel::result::Error),
    #[error("Failed to find charge: {0}")]
    FindChargeError(diesel::result::Error),
    #[error("Failed to save subscription: {0}")]
    SaveSubscriptionError(diesel::result::Error),
    #[error("Failed to find subscription: {0}")]
    FindSubscriptionError(diesel::result::Error),
}

fn run_migrations(conn: &mut PooledConnection) -> Result<(), DbError> {
    conn.run_pending_migrations(MIGRATIONS)?;
    Ok(())
}

/// Owns the connection pool for the billing tables and runs migrations on
/// startup.
#[derive(Debug, Clone)]
pub struct DbManager {
    pool: DbPool,
}

impl DbManager {
    pub fn local(database_url: &str) -> DbResult<Self> {
        debug!("Establishing connection to database at {}", database_url);
        let manager = ConnectionManager::<DbConnection>::new(database_url);
        let pool = Pool::builder()
            .build(manager)
            .map_err(|e| DbError::ConnectionError(e.to_string()))?;

        let mut pooled_connection = pool
            .get()
            .map_err(|e| DbError::ConnectionError(e.to_string()))?;

        debug!("Running database migrations...");
        run_migrations(&mut pooled_connection)?;
        Ok(Self { pool })
    }

    /// In-memory sqlite database. The pool is capped at a single connection
    /// because each sqlite `:memory:` connection is its own database.
    #[cfg(feature = "sqlite")]
    pub fn in_memory() -> DbResult<Self> {
        let manager = ConnectionManager::<DbConnection>::new(":memory:");
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| DbError::ConnectionError(e.to_string()))?;

        let mut pooled_connection = pool
            .get()
            .map_err(|e| DbError::ConnectionError(e.to_string()))?;
        run_migrations(&mut pooled_connection)?;
        Ok(Self { pool })
    }

    pub fn conn(&self) -> DbResult<PooledConnection> {
        self.pool
            .get()
            .map_err(|e| DbError::ConnectionError(e.to_string()))
    }
}

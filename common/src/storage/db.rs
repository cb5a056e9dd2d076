//! Connection pool (A4, §5): a singleton `sqlx::PgPool`, initialized once
//! at boot and closed at shutdown, with embedded migrations applied before
//! traffic is served.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::error::AppError;
use crate::utils::config::AppConfig;

#[derive(Clone)]
pub struct PgDb {
    pub pool: PgPool,
}

impl PgDb {
    pub async fn connect(config: &AppConfig) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .connect(&config.database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Applies the embedded migration set. Mirrors the teacher's
    /// `db.apply_migrations().await?` call site in `main`.
    pub async fn apply_migrations(&self) -> Result<(), AppError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("migration failed: {e}")))?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

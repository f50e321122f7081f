use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use cronlease_core::config::models::DatabaseConfig;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite, SqlitePool};
use tracing::debug;

pub type DbPool = Pool<Sqlite>;

pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let mut connect_options = SqliteConnectOptions::from_str(&config.url)
            .with_context(|| format!("无效的数据库地址: {}", config.url))?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        // 内存数据库每个连接各自独立，只能使用单连接
        let max_connections = if config.is_in_memory() {
            1
        } else {
            connect_options = connect_options.journal_mode(SqliteJournalMode::Wal);
            config.max_connections
        };

        debug!(
            "连接SQLite数据库: {} (最大连接数: {})",
            config.url, max_connections
        );

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .min_connections(config.min_connections.min(max_connections))
            .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds));

        pool_options = if config.is_in_memory() {
            // 连接关闭即丢失数据
            pool_options.idle_timeout(None).max_lifetime(None)
        } else {
            pool_options
                .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
                .max_lifetime(Duration::from_secs(1800)) // 30分钟默认生命周期
        };

        let pool = pool_options
            .connect_with(connect_options)
            .await
            .context("无法连接SQLite数据库")?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

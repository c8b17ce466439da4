//! PostgreSQL 连接池
//!
//! 只负责按 `DatabaseConfig` 构建连接池，池的所有权交给使用方（通知存储）。
//! 事务不设额外超时，沿用连接本身的默认行为。

use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use tracing::{info, instrument};

use crate::config::DatabaseConfig;
use crate::error::Result;

/// 按配置构建连接池参数
pub fn pool_options(config: &DatabaseConfig) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
        .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
}

/// 建立连接池
///
/// 日志只记录主机和库名，连接串中的凭据不出现在日志里
#[instrument(skip(config))]
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool> {
    let options: PgConnectOptions = config.url.parse()?;
    info!(
        host = options.get_host(),
        port = options.get_port(),
        database = options.get_database().unwrap_or_default(),
        max_connections = config.max_connections,
        "Connecting to database..."
    );

    let pool = pool_options(config).connect_with(options).await?;
    info!("Database connection pool created");

    Ok(pool)
}

/// 构建延迟连接的池，首次使用时才建立连接
pub fn connect_lazy(config: &DatabaseConfig) -> Result<PgPool> {
    let options: PgConnectOptions = config.url.parse()?;
    Ok(pool_options(config).connect_lazy_with(options))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_options_follow_config() {
        let config = DatabaseConfig {
            max_connections: 4,
            min_connections: 2,
            connect_timeout_seconds: 5,
            idle_timeout_seconds: 60,
            ..Default::default()
        };

        let options = pool_options(&config);
        assert_eq!(options.get_max_connections(), 4);
        assert_eq!(options.get_min_connections(), 2);
        assert_eq!(options.get_acquire_timeout(), Duration::from_secs(5));
        assert_eq!(options.get_idle_timeout(), Some(Duration::from_secs(60)));
    }

    #[tokio::test]
    async fn test_connect_rejects_malformed_url() {
        let config = DatabaseConfig {
            url: "not a url".to_string(),
            ..Default::default()
        };

        assert!(connect(&config).await.is_err());
        assert!(connect_lazy(&config).is_err());
    }

    #[tokio::test]
    #[ignore] // 需要数据库连接
    async fn test_database_connection() {
        let config = DatabaseConfig {
            url: std::env::var("DATABASE_URL").unwrap_or_else(|_| DatabaseConfig::default().url),
            ..Default::default()
        };
        let pool = connect(&config).await.unwrap();
        sqlx::query("SELECT 1").execute(&pool).await.unwrap();
        pool.close().await;
    }
}

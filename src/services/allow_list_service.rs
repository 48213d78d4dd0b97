use std::collections::HashSet;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::Result;

/// Decides whether a verified Telegram user may use the application.
///
/// Implementations return `Ok(false)` for unknown ids.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TelegramAuthorizer: Send + Sync {
    async fn is_authorized(&self, telegram_id: i64) -> Result<bool>;
}

/// Allow-list stored in Postgres, scoped to one application. Only active
/// members whose account may create users are authorized.
#[derive(Clone)]
pub struct PgAllowList {
    pool: PgPool,
    app_name: String,
}

impl PgAllowList {
    pub fn new(pool: PgPool, app_name: String) -> Self {
        Self { pool, app_name }
    }
}

#[async_trait]
impl TelegramAuthorizer for PgAllowList {
    async fn is_authorized(&self, telegram_id: i64) -> Result<bool> {
        let row = sqlx::query(
            r#"
            SELECT 1
            FROM telegram_accounts a
            JOIN members m ON m.id = a.member_id
            JOIN apps ap ON ap.id = a.app_id
            WHERE a.telegram_id = $1
              AND a.allow_create_user = TRUE
              AND m.is_active = TRUE
              AND ap.name = $2
            LIMIT 1
            "#,
        )
        .bind(telegram_id)
        .bind(self.app_name.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }
}

/// Fixed allow-list, for local development without a database.
#[derive(Debug, Clone, Default)]
pub struct StaticAllowList {
    ids: HashSet<i64>,
}

impl StaticAllowList {
    pub fn new(ids: impl IntoIterator<Item = i64>) -> Self {
        Self {
            ids: ids.into_iter().collect(),
        }
    }
}

#[async_trait]
impl TelegramAuthorizer for StaticAllowList {
    async fn is_authorized(&self, telegram_id: i64) -> Result<bool> {
        Ok(self.ids.contains(&telegram_id))
    }
}

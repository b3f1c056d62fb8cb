//! Wake History Persistence
//!
//! Append-only analytics record per session: when it started, when it
//! ended, whether it was released, and how hard the wake-up fought back.
//! Active sessions never live here; this table is for adaptation and
//! analytics, not control flow, so every failure is logged and swallowed.

use async_trait::async_trait;
use rouse_core::protocol::WakeHistory;
use rouse_core::session::WakeSession;
use sqlx::PgPool;
use tracing::error;

/// A wrapper around the `PgPool` to provide a clear data access interface.
#[derive(Clone)]
pub struct WakeHistoryDb {
    pool: PgPool,
}

impl WakeHistoryDb {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs all pending `sqlx` migrations.
    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl WakeHistory for WakeHistoryDb {
    async fn record_start(&self, session: &WakeSession) {
        let result = sqlx::query(
            r#"
            INSERT INTO wake_history (session_id, started_at, released, failed_attempts, nudge_count)
            VALUES ($1, $2, FALSE, 0, 0)
            ON CONFLICT (session_id) DO NOTHING
            "#,
        )
        .bind(session.id)
        .bind(session.created_at)
        .execute(&self.pool)
        .await;
        if let Err(e) = result {
            error!(session_id = %session.id, error = %e, "failed to record session start");
        }
    }

    async fn record_end(&self, session: &WakeSession) {
        let result = sqlx::query(
            r#"
            UPDATE wake_history
            SET ended_at = $2,
                released = $3,
                failed_attempts = $4,
                nudge_count = $5
            WHERE session_id = $1
            "#,
        )
        .bind(session.id)
        .bind(session.released_at)
        .bind(session.is_released())
        .bind(session.failed_attempts as i32)
        .bind(session.nudge_count as i32)
        .execute(&self.pool)
        .await;
        if let Err(e) = result {
            error!(session_id = %session.id, error = %e, "failed to record session end");
        }
    }
}

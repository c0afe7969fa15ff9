use sqlx::{Row, SqlitePool};

use crate::core::errors::ApiError;
use crate::schemas::ChatTurn;

/// Append-only log of completed query/response round-trips.
#[derive(Debug, Clone)]
pub struct ChatLogStore {
    pool: SqlitePool,
}

impl ChatLogStore {
    pub(super) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn record_chat(
        &self,
        session_id: &str,
        user_query: &str,
        model_response: &str,
        model: &str,
    ) -> Result<(), ApiError> {
        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;

        sqlx::query(
            "\
            INSERT INTO application_logs (session_id, user_query, gpt_response, model)
            VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(session_id)
        .bind(user_query)
        .bind(model_response)
        .bind(model)
        .execute(&mut *tx)
        .await
        .map_err(ApiError::internal)?;

        tx.commit().await.map_err(ApiError::internal)?;
        tracing::debug!(session_id, model, "Recorded chat interaction");
        Ok(())
    }

    /// Every logged round-trip of the session, oldest first, as human/ai turn pairs.
    pub async fn fetch_history(&self, session_id: &str) -> Result<Vec<ChatTurn>, ApiError> {
        let rows = sqlx::query(
            "\
            SELECT user_query, gpt_response
            FROM application_logs
            WHERE session_id = ?1
            ORDER BY created_at ASC, id ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        let mut turns = Vec::with_capacity(rows.len() * 2);
        for row in rows {
            let query: String = row.try_get("user_query").map_err(ApiError::internal)?;
            let response: String = row.try_get("gpt_response").map_err(ApiError::internal)?;
            turns.push(ChatTurn::human(query));
            turns.push(ChatTurn::ai(response));
        }
        Ok(turns)
    }
}

use chrono::Utc;
use sqlx::Row;
use workout_core::model::{SessionSnapshot, UserId};

use super::SqliteRepository;
use super::mapping::{db_err, from_payload, ser, to_payload};
use crate::repository::{ActiveSessionRepository, PausedSessionRepository, StorageError};

#[derive(Clone, Copy)]
enum SessionTable {
    Active,
    Paused,
}

impl SessionTable {
    fn name(self) -> &'static str {
        match self {
            Self::Active => "active_sessions",
            Self::Paused => "paused_sessions",
        }
    }
}

impl SqliteRepository {
    async fn upsert_snapshot(
        &self,
        table: SessionTable,
        user: &UserId,
        snapshot: &SessionSnapshot,
    ) -> Result<(), StorageError> {
        let payload = to_payload(snapshot)?;
        let saved_at = snapshot.saved_at.unwrap_or_else(Utc::now);
        let sql = format!(
            r"
                INSERT INTO {} (user_id, session_id, payload, saved_at)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(user_id) DO UPDATE SET
                    session_id = excluded.session_id,
                    payload = excluded.payload,
                    saved_at = excluded.saved_at
            ",
            table.name()
        );

        sqlx::query(&sql)
            .bind(user.as_str())
            .bind(snapshot.session_id().to_string())
            .bind(payload)
            .bind(saved_at)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn get_snapshot(
        &self,
        table: SessionTable,
        user: &UserId,
    ) -> Result<Option<SessionSnapshot>, StorageError> {
        let sql = format!("SELECT payload FROM {} WHERE user_id = ?1", table.name());
        let row = sqlx::query(&sql)
            .bind(user.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.map(|row| {
            let payload: String = row.try_get("payload").map_err(ser)?;
            from_payload(&payload)
        })
        .transpose()
    }

    async fn delete_snapshot(&self, table: SessionTable, user: &UserId) -> Result<(), StorageError> {
        let sql = format!("DELETE FROM {} WHERE user_id = ?1", table.name());
        sqlx::query(&sql)
            .bind(user.as_str())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ActiveSessionRepository for SqliteRepository {
    async fn upsert_active(&self, user: &UserId, snapshot: &SessionSnapshot) -> Result<(), StorageError> {
        self.upsert_snapshot(SessionTable::Active, user, snapshot).await
    }

    async fn get_active(&self, user: &UserId) -> Result<Option<SessionSnapshot>, StorageError> {
        self.get_snapshot(SessionTable::Active, user).await
    }

    async fn delete_active(&self, user: &UserId) -> Result<(), StorageError> {
        self.delete_snapshot(SessionTable::Active, user).await
    }
}

#[async_trait::async_trait]
impl PausedSessionRepository for SqliteRepository {
    async fn upsert_paused(&self, user: &UserId, snapshot: &SessionSnapshot) -> Result<(), StorageError> {
        self.upsert_snapshot(SessionTable::Paused, user, snapshot).await
    }

    async fn get_paused(&self, user: &UserId) -> Result<Option<SessionSnapshot>, StorageError> {
        self.get_snapshot(SessionTable::Paused, user).await
    }

    async fn delete_paused(&self, user: &UserId) -> Result<(), StorageError> {
        self.delete_snapshot(SessionTable::Paused, user).await
    }
}

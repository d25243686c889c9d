use sqlx::Row;
use workout_core::model::{SessionType, UserId, WorkoutRecord};

use super::SqliteRepository;
use super::mapping::{db_err, from_payload, ser, to_payload};
use crate::repository::{StorageError, WorkoutLogRepository};

fn session_type_str(kind: SessionType) -> &'static str {
    match kind {
        SessionType::Workout => "workout",
        SessionType::Recovery => "recovery",
    }
}

#[async_trait::async_trait]
impl WorkoutLogRepository for SqliteRepository {
    async fn append_workout(&self, user: &UserId, record: &WorkoutRecord) -> Result<(), StorageError> {
        let duration = i64::try_from(record.duration_seconds)
            .map_err(|_| StorageError::Serialization("duration_seconds overflow".into()))?;

        sqlx::query(
            r"
                INSERT INTO workout_logs (id, user_id, date, duration_seconds, session_type, payload)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(id) DO UPDATE SET
                    date = excluded.date,
                    duration_seconds = excluded.duration_seconds,
                    session_type = excluded.session_type,
                    payload = excluded.payload
            ",
        )
        .bind(record.id.to_string())
        .bind(user.as_str())
        .bind(record.date)
        .bind(duration)
        .bind(session_type_str(record.session_type))
        .bind(to_payload(record)?)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn list_workouts(&self, user: &UserId, limit: u32) -> Result<Vec<WorkoutRecord>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT payload
                FROM workout_logs
                WHERE user_id = ?1
                ORDER BY date DESC, id DESC
                LIMIT ?2
            ",
        )
        .bind(user.as_str())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let payload: String = row.try_get("payload").map_err(ser)?;
            out.push(from_payload(&payload)?);
        }
        Ok(out)
    }
}

use anyhow::Context;
use chrono::{NaiveDateTime, TimeDelta};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::LogEntry;
use crate::report::SessionSummary;

/// Aggregates of one archived session, as listed by `trends`.
#[derive(Debug, Clone)]
pub struct SessionTrend {
    pub source_key: String,
    pub started_at: NaiveDateTime,
    pub entry_count: i64,
    pub duration_secs: i64,
    pub focused_pct: f64,
    pub distracted_pct: f64,
    pub drowsy_pct: f64,
    pub avg_blinks_per_min: f64,
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Stores a parsed session log under `source_key`. Returns `false` when the
/// key was archived before.
pub async fn archive_log(
    pool: &PgPool,
    source_key: &str,
    entries: &[LogEntry],
) -> anyhow::Result<bool> {
    let first = entries.first().context("session log has no entries")?;
    let summary = SessionSummary::from_log(entries);
    let session_id = Uuid::new_v4();
    let started_at = i64::try_from(first.elapsed_seconds)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .and_then(|offset| first.timestamp.checked_sub_signed(offset))
        .unwrap_or(first.timestamp);

    let mut tx = pool.begin().await?;

    let inserted = sqlx::query(
        r#"
        INSERT INTO focustrack.sessions (id, source_key, started_at, entry_count, duration_secs)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(session_id)
    .bind(source_key)
    .bind(started_at)
    .bind(i32::try_from(summary.entries).context("too many entries")?)
    .bind(i64::try_from(summary.duration_secs).context("duration out of range")?)
    .execute(&mut *tx)
    .await?;

    if inserted.rows_affected() == 0 {
        tx.rollback().await?;
        return Ok(false);
    }

    for (seq, entry) in entries.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO focustrack.log_entries
            (session_id, seq, recorded_at, elapsed_seconds, eyes_detected, num_eyes,
             emotion, confidence, blink_state, blinks_per_min, focus_state)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(session_id)
        .bind(seq as i32)
        .bind(entry.timestamp)
        .bind(entry.elapsed_seconds as i64)
        .bind(entry.eyes_detected)
        .bind(entry.eye_count as i32)
        .bind(entry.emotion.as_str())
        .bind(entry.confidence)
        .bind(entry.blink_rate_category.as_str())
        .bind(entry.blinks_per_minute as i32)
        .bind(entry.focus_state.as_str())
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(true)
}

pub async fn fetch_trends(pool: &PgPool, limit: i64) -> anyhow::Result<Vec<SessionTrend>> {
    let rows = sqlx::query(
        r#"
        SELECT s.source_key, s.started_at, s.entry_count::BIGINT AS entry_count, s.duration_secs,
               100.0 * AVG(CASE WHEN e.focus_state = 'focused' THEN 1.0 ELSE 0.0 END)::FLOAT8
                   AS focused_pct,
               100.0 * AVG(CASE WHEN e.focus_state = 'distracted' THEN 1.0 ELSE 0.0 END)::FLOAT8
                   AS distracted_pct,
               100.0 * AVG(CASE WHEN e.focus_state = 'drowsy' THEN 1.0 ELSE 0.0 END)::FLOAT8
                   AS drowsy_pct,
               AVG(e.blinks_per_min)::FLOAT8 AS avg_blinks_per_min
        FROM focustrack.sessions s
        JOIN focustrack.log_entries e ON e.session_id = s.id
        GROUP BY s.id
        ORDER BY s.started_at DESC
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    let mut trends = Vec::new();
    for row in rows {
        trends.push(SessionTrend {
            source_key: row.get("source_key"),
            started_at: row.get("started_at"),
            entry_count: row.get("entry_count"),
            duration_secs: row.get("duration_secs"),
            focused_pct: row.get("focused_pct"),
            distracted_pct: row.get("distracted_pct"),
            drowsy_pct: row.get("drowsy_pct"),
            avg_blinks_per_min: row.get("avg_blinks_per_min"),
        });
    }

    Ok(trends)
}

//! Performance persistence
//!
//! A performance records one musician playing one instrument on one song and
//! the fee paid for it.

use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite};

use crate::{Error, Result};

const SELECT_DETAILS: &str = r#"
    SELECT
        p.id, p.comments, p.fee_paid, p.song_id, p.musician_id, p.instrument_id,
        s.title AS song_title,
        i.name AS instrument_name,
        m.first_name AS musician_first_name,
        m.middle_name AS musician_middle_name,
        m.last_name AS musician_last_name
    FROM performances p
    JOIN songs s ON s.id = p.song_id
    JOIN instruments i ON i.id = p.instrument_id
    JOIN musicians m ON m.id = p.musician_id
"#;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Performance {
    pub id: i64,
    pub comments: Option<String>,
    pub fee_paid: f64,
    pub song_id: i64,
    pub musician_id: i64,
    pub instrument_id: i64,
}

/// Performance with the names of everything it references
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct PerformanceDetail {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub performance: Performance,
    pub song_title: String,
    pub instrument_name: String,
    pub musician_first_name: String,
    pub musician_middle_name: Option<String>,
    pub musician_last_name: String,
}

impl PerformanceDetail {
    pub fn musician_summary(&self) -> String {
        crate::db::musicians::summary_name(
            &self.musician_first_name,
            self.musician_middle_name.as_deref(),
            &self.musician_last_name,
        )
    }
}

/// Performance fields as submitted by a form
#[derive(Debug, Clone, Deserialize)]
pub struct PerformanceDraft {
    #[serde(default)]
    pub comments: Option<String>,
    #[serde(default)]
    pub fee_paid: f64,
    pub song_id: i64,
    pub musician_id: i64,
    pub instrument_id: i64,
}

impl PerformanceDraft {
    pub fn normalized(self) -> Result<Self> {
        if !self.fee_paid.is_finite() || self.fee_paid < 0.0 {
            return Err(Error::InvalidInput(
                "Fee paid must be zero or a positive amount".to_string(),
            ));
        }
        let comments = self
            .comments
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        if comments.as_ref().is_some_and(|c| c.chars().count() > 2000) {
            return Err(Error::InvalidInput(
                "Comments cannot be more than 2000 characters long".to_string(),
            ));
        }
        Ok(Self { comments, ..self })
    }
}

pub async fn list_details<'e, E>(db: E) -> Result<Vec<PerformanceDetail>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query_as::<_, PerformanceDetail>(&format!(
        "{SELECT_DETAILS} ORDER BY s.title, m.last_name, m.first_name, p.id"
    ))
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn find_detail<'e, E>(db: E, id: i64) -> Result<Option<PerformanceDetail>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, PerformanceDetail>(&format!("{SELECT_DETAILS} WHERE p.id = ?"))
        .bind(id)
        .fetch_optional(db)
        .await?;
    Ok(row)
}

pub async fn insert<'e, E>(db: E, draft: &PerformanceDraft) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "INSERT INTO performances (comments, fee_paid, song_id, musician_id, instrument_id) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&draft.comments)
    .bind(draft.fee_paid)
    .bind(draft.song_id)
    .bind(draft.musician_id)
    .bind(draft.instrument_id)
    .execute(db)
    .await?;
    Ok(result.last_insert_rowid())
}

pub async fn update<'e, E>(db: E, id: i64, draft: &PerformanceDraft) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "UPDATE performances SET comments = ?, fee_paid = ?, song_id = ?, musician_id = ?, instrument_id = ? WHERE id = ?",
    )
    .bind(&draft.comments)
    .bind(draft.fee_paid)
    .bind(draft.song_id)
    .bind(draft.musician_id)
    .bind(draft.instrument_id)
    .bind(id)
    .execute(db)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete<'e, E>(db: E, id: i64) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("DELETE FROM performances WHERE id = ?")
        .bind(id)
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}

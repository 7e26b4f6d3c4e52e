//! Song persistence

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool};

use crate::pagination::PaginatedList;
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Song {
    pub id: i64,
    pub title: String,
    pub date_recorded: Option<NaiveDate>,
}

/// Song fields as submitted by a form
#[derive(Debug, Clone, Deserialize)]
pub struct SongDraft {
    pub title: String,
    #[serde(default)]
    pub date_recorded: Option<NaiveDate>,
}

impl SongDraft {
    pub fn normalized(self) -> Result<Self> {
        let title = self.title.trim().to_string();
        if title.is_empty() {
            return Err(Error::InvalidInput("You must enter a title".to_string()));
        }
        if title.chars().count() > 80 {
            return Err(Error::InvalidInput(
                "Title cannot be more than 80 characters long".to_string(),
            ));
        }
        Ok(Self {
            title,
            date_recorded: self.date_recorded,
        })
    }
}

pub async fn list_all<'e, E>(db: E) -> Result<Vec<Song>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let songs = sqlx::query_as::<_, Song>("SELECT id, title, date_recorded FROM songs ORDER BY title")
        .fetch_all(db)
        .await?;
    Ok(songs)
}

pub async fn list_page(pool: &SqlitePool, page: i64, page_size: i64) -> Result<PaginatedList<Song>> {
    PaginatedList::fetch(
        pool,
        "SELECT id, title, date_recorded FROM songs ORDER BY title, id",
        page,
        page_size,
    )
    .await
}

pub async fn find<'e, E>(db: E, id: i64) -> Result<Option<Song>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let song = sqlx::query_as::<_, Song>("SELECT id, title, date_recorded FROM songs WHERE id = ?")
        .bind(id)
        .fetch_optional(db)
        .await?;
    Ok(song)
}

pub async fn insert<'e, E>(db: E, draft: &SongDraft) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("INSERT INTO songs (title, date_recorded) VALUES (?, ?)")
        .bind(&draft.title)
        .bind(draft.date_recorded)
        .execute(db)
        .await?;
    Ok(result.last_insert_rowid())
}

pub async fn update<'e, E>(db: E, id: i64, draft: &SongDraft) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("UPDATE songs SET title = ?, date_recorded = ? WHERE id = ?")
        .bind(&draft.title)
        .bind(draft.date_recorded)
        .bind(id)
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete<'e, E>(db: E, id: i64) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("DELETE FROM songs WHERE id = ?")
        .bind(id)
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}

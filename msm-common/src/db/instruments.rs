//! Instrument persistence

use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool};

use crate::pagination::PaginatedList;
use crate::{Error, Result};

/// Longest accepted instrument name
pub const MAX_NAME_LEN: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Instrument {
    pub id: i64,
    pub name: String,
}

/// Instrument fields as submitted by a form
#[derive(Debug, Clone, Deserialize)]
pub struct InstrumentDraft {
    pub name: String,
}

impl InstrumentDraft {
    pub fn normalized(self) -> Result<Self> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(Error::InvalidInput(
                "You cannot leave the name blank".to_string(),
            ));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(Error::InvalidInput(format!(
                "Instrument name cannot be more than {} characters long",
                MAX_NAME_LEN
            )));
        }
        Ok(Self { name })
    }
}

pub async fn list_all<'e, E>(db: E) -> Result<Vec<Instrument>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let instruments =
        sqlx::query_as::<_, Instrument>("SELECT id, name FROM instruments ORDER BY name")
            .fetch_all(db)
            .await?;
    Ok(instruments)
}

pub async fn list_page(
    pool: &SqlitePool,
    page: i64,
    page_size: i64,
) -> Result<PaginatedList<Instrument>> {
    PaginatedList::fetch(
        pool,
        "SELECT id, name FROM instruments ORDER BY name",
        page,
        page_size,
    )
    .await
}

pub async fn find<'e, E>(db: E, id: i64) -> Result<Option<Instrument>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let instrument = sqlx::query_as::<_, Instrument>("SELECT id, name FROM instruments WHERE id = ?")
        .bind(id)
        .fetch_optional(db)
        .await?;
    Ok(instrument)
}

pub async fn exists<'e, E>(db: E, id: i64) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM instruments WHERE id = ?)")
        .bind(id)
        .fetch_one(db)
        .await?;
    Ok(exists)
}

pub async fn insert<'e, E>(db: E, draft: &InstrumentDraft) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("INSERT INTO instruments (name) VALUES (?)")
        .bind(&draft.name)
        .execute(db)
        .await?;
    Ok(result.last_insert_rowid())
}

/// Returns false when no instrument has `id`
pub async fn update<'e, E>(db: E, id: i64, draft: &InstrumentDraft) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("UPDATE instruments SET name = ? WHERE id = ?")
        .bind(&draft.name)
        .bind(id)
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Returns false when no instrument has `id`
///
/// Fails with a foreign-key [`Error::Integrity`] while plays or performances
/// still reference the instrument.
pub async fn delete<'e, E>(db: E, id: i64) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("DELETE FROM instruments WHERE id = ?")
        .bind(id)
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(name: &str) -> InstrumentDraft {
        InstrumentDraft {
            name: name.to_string(),
        }
    }

    #[test]
    fn test_name_validation() {
        assert_eq!(draft("  Viola ").normalized().unwrap().name, "Viola");
        assert!(draft("   ").normalized().is_err());
        assert!(draft(&"x".repeat(MAX_NAME_LEN + 1)).normalized().is_err());
    }

    #[tokio::test]
    async fn test_duplicate_name_is_unique_violation() {
        let pool = crate::db::init_in_memory().await.unwrap();
        insert(&pool, &draft("Harp")).await.unwrap();

        let err = insert(&pool, &draft("Harp")).await.unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[tokio::test]
    async fn test_page_is_ordered_by_name() {
        let pool = crate::db::init_in_memory().await.unwrap();
        for name in ["Tuba", "Banjo", "Organ", "Cello"] {
            insert(&pool, &draft(name)).await.unwrap();
        }

        let page = list_page(&pool, 1, 3).await.unwrap();
        let names: Vec<&str> = page.items.iter().map(|i| i.name.as_str()).collect();

        assert_eq!(names, vec!["Banjo", "Cello", "Organ"]);
        assert_eq!(page.total_items, 4);
        assert_eq!(page.total_pages, 2);
    }
}

//! Musician persistence

use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool};

use crate::pagination::PaginatedList;
use crate::reconcile::Candidate;
use crate::{Error, Result};

const SELECT_MUSICIANS: &str = "SELECT id, first_name, middle_name, last_name, phone FROM musicians";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Musician {
    pub id: i64,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub phone: String,
}

impl Musician {
    /// "Last, First M."
    pub fn formal_name(&self) -> String {
        let mut name = format!("{}, {}", self.last_name, self.first_name);
        if let Some(initial) = middle_initial(self.middle_name.as_deref()) {
            name.push(' ');
            name.push(initial);
            name.push('.');
        }
        name
    }

    /// "First M. Last"
    pub fn summary(&self) -> String {
        summary_name(&self.first_name, self.middle_name.as_deref(), &self.last_name)
    }
}

impl Candidate for Musician {
    type Key = i64;

    fn key(&self) -> i64 {
        self.id
    }
}

fn middle_initial(middle_name: Option<&str>) -> Option<char> {
    middle_name
        .and_then(|m| m.trim().chars().next())
        .map(|c| c.to_ascii_uppercase())
}

/// "First M. Last", or "First Last" without a middle name
pub fn summary_name(first_name: &str, middle_name: Option<&str>, last_name: &str) -> String {
    match middle_initial(middle_name) {
        Some(initial) => format!("{} {}. {}", first_name, initial, last_name),
        None => format!("{} {}", first_name, last_name),
    }
}

/// Musician fields as submitted by a form
#[derive(Debug, Clone, Deserialize)]
pub struct MusicianDraft {
    pub first_name: String,
    #[serde(default)]
    pub middle_name: Option<String>,
    pub last_name: String,
    pub phone: String,
}

impl MusicianDraft {
    /// Trim names and reduce the phone number to its 10 digits
    pub fn normalized(self) -> Result<Self> {
        let first_name = self.first_name.trim().to_string();
        let last_name = self.last_name.trim().to_string();
        if first_name.is_empty() || last_name.is_empty() {
            return Err(Error::InvalidInput(
                "First and last name are required".to_string(),
            ));
        }

        let middle_name = self
            .middle_name
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty());

        let phone: String = self.phone.chars().filter(|c| c.is_ascii_digit()).collect();
        if phone.len() != 10 {
            return Err(Error::InvalidInput(
                "Phone number must be exactly 10 digits".to_string(),
            ));
        }

        Ok(Self {
            first_name,
            middle_name,
            last_name,
            phone,
        })
    }
}

/// Every musician, ordered by last name then first name
pub async fn list_all<'e, E>(db: E) -> Result<Vec<Musician>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let musicians = sqlx::query_as::<_, Musician>(&format!(
        "{SELECT_MUSICIANS} ORDER BY last_name, first_name, id"
    ))
    .fetch_all(db)
    .await?;
    Ok(musicians)
}

pub async fn list_page(pool: &SqlitePool, page: i64, page_size: i64) -> Result<PaginatedList<Musician>> {
    PaginatedList::fetch(
        pool,
        &format!("{SELECT_MUSICIANS} ORDER BY last_name, first_name, id"),
        page,
        page_size,
    )
    .await
}

pub async fn find<'e, E>(db: E, id: i64) -> Result<Option<Musician>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let musician = sqlx::query_as::<_, Musician>(&format!("{SELECT_MUSICIANS} WHERE id = ?"))
        .bind(id)
        .fetch_optional(db)
        .await?;
    Ok(musician)
}

pub async fn insert<'e, E>(db: E, draft: &MusicianDraft) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "INSERT INTO musicians (first_name, middle_name, last_name, phone) VALUES (?, ?, ?, ?)",
    )
    .bind(&draft.first_name)
    .bind(&draft.middle_name)
    .bind(&draft.last_name)
    .bind(&draft.phone)
    .execute(db)
    .await?;
    Ok(result.last_insert_rowid())
}

/// Returns false when no musician has `id`
pub async fn update<'e, E>(db: E, id: i64, draft: &MusicianDraft) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "UPDATE musicians SET first_name = ?, middle_name = ?, last_name = ?, phone = ? WHERE id = ?",
    )
    .bind(&draft.first_name)
    .bind(&draft.middle_name)
    .bind(&draft.last_name)
    .bind(&draft.phone)
    .bind(id)
    .execute(db)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Returns false when no musician has `id`
pub async fn delete<'e, E>(db: E, id: i64) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("DELETE FROM musicians WHERE id = ?")
        .bind(id)
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(first: &str, middle: Option<&str>, last: &str) -> MusicianDraft {
        MusicianDraft {
            first_name: first.to_string(),
            middle_name: middle.map(str::to_string),
            last_name: last.to_string(),
            phone: "(905) 555-1234".to_string(),
        }
    }

    #[test]
    fn test_display_names() {
        let m = Musician {
            id: 1,
            first_name: "Fred".to_string(),
            middle_name: Some("reginald".to_string()),
            last_name: "Flintstone".to_string(),
            phone: "9055551234".to_string(),
        };

        assert_eq!(m.formal_name(), "Flintstone, Fred R.");
        assert_eq!(m.summary(), "Fred R. Flintstone");
        assert_eq!(summary_name("Wilma", None, "Flintstone"), "Wilma Flintstone");
    }

    #[test]
    fn test_draft_normalization() {
        let d = draft("  Betty ", Some("  "), "Rubble").normalized().unwrap();
        assert_eq!(d.first_name, "Betty");
        assert_eq!(d.middle_name, None);
        assert_eq!(d.phone, "9055551234");

        let mut bad_phone = draft("Betty", None, "Rubble");
        bad_phone.phone = "555-1234".to_string();
        assert!(matches!(bad_phone.normalized(), Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_list_all_ordered_by_last_then_first() {
        let pool = crate::db::init_in_memory().await.unwrap();
        for (first, last) in [("Zed", "Adams"), ("Amy", "Brown"), ("Abe", "Adams")] {
            insert(&pool, &draft(first, None, last).normalized().unwrap())
                .await
                .unwrap();
        }

        let names: Vec<String> = list_all(&pool)
            .await
            .unwrap()
            .iter()
            .map(Musician::formal_name)
            .collect();

        assert_eq!(names, vec!["Adams, Abe", "Adams, Zed", "Brown, Amy"]);
    }

    #[tokio::test]
    async fn test_update_and_delete_missing_return_false() {
        let pool = crate::db::init_in_memory().await.unwrap();
        let d = draft("Amy", None, "Brown").normalized().unwrap();

        assert!(!update(&pool, 42, &d).await.unwrap());
        assert!(!delete(&pool, 42).await.unwrap());

        let id = insert(&pool, &d).await.unwrap();
        assert!(update(&pool, id, &draft("Amelia", None, "Brown").normalized().unwrap())
            .await
            .unwrap());
        assert_eq!(find(&pool, id).await.unwrap().unwrap().first_name, "Amelia");
    }
}

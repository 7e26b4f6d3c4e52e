//! Performance fee report
//!
//! One row per musician with at least one performance, read from the
//! `performance_summaries` view.

use serde::Serialize;
use sqlx::{FromRow, SqlitePool};

use crate::pagination::PaginatedList;
use crate::Result;

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct PerformanceReport {
    /// Musician id
    pub id: i64,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub average_fee: f64,
    pub highest_fee: f64,
    pub lowest_fee: f64,
    pub total_performances: i64,
}

impl PerformanceReport {
    /// "First M. Last"
    pub fn summary(&self) -> String {
        crate::db::musicians::summary_name(
            &self.first_name,
            self.middle_name.as_deref(),
            &self.last_name,
        )
    }
}

/// One page of the report, ordered by last name then first name
pub async fn report_page(
    pool: &SqlitePool,
    page: i64,
    page_size: i64,
) -> Result<PaginatedList<PerformanceReport>> {
    PaginatedList::fetch(
        pool,
        "SELECT id, first_name, middle_name, last_name, average_fee, highest_fee, lowest_fee, total_performances \
         FROM performance_summaries ORDER BY last_name, first_name, id",
        page,
        page_size,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::performances::{self, PerformanceDraft};
    use crate::db::{instruments, musicians, songs};

    async fn musician(pool: &SqlitePool, first: &str, last: &str) -> i64 {
        musicians::insert(
            pool,
            &musicians::MusicianDraft {
                first_name: first.to_string(),
                middle_name: None,
                last_name: last.to_string(),
                phone: "6135550123".to_string(),
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_report_aggregates_per_musician() {
        let pool = crate::db::init_in_memory().await.unwrap();
        let song_id = songs::insert(
            &pool,
            &songs::SongDraft {
                title: "Take Five".to_string(),
                date_recorded: None,
            },
        )
        .await
        .unwrap();
        let instrument_id = instruments::insert(
            &pool,
            &instruments::InstrumentDraft {
                name: "Saxophone".to_string(),
            },
        )
        .await
        .unwrap();
        let paul = musician(&pool, "Paul", "Desmond").await;
        let dave = musician(&pool, "Dave", "Brubeck").await;
        // No performances, so absent from the report
        musician(&pool, "Joe", "Morello").await;

        for (musician_id, fee) in [(paul, 100.0), (paul, 300.0), (dave, 50.0)] {
            performances::insert(
                &pool,
                &PerformanceDraft {
                    comments: None,
                    fee_paid: fee,
                    song_id,
                    musician_id,
                    instrument_id,
                },
            )
            .await
            .unwrap();
        }

        let report = report_page(&pool, 1, 10).await.unwrap();

        assert_eq!(report.total_items, 2);
        assert_eq!(report.items[0].summary(), "Dave Brubeck");
        let desmond = &report.items[1];
        assert_eq!(desmond.total_performances, 2);
        assert_eq!(desmond.average_fee, 200.0);
        assert_eq!(desmond.highest_fee, 300.0);
        assert_eq!(desmond.lowest_fee, 100.0);
    }

    #[tokio::test]
    async fn test_empty_report() {
        let pool = crate::db::init_in_memory().await.unwrap();

        let report = report_page(&pool, 3, 10).await.unwrap();

        assert!(report.items.is_empty());
        assert_eq!(report.page, 1);
        assert_eq!(report.total_pages, 0);
    }
}

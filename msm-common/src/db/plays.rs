//! Play link records (Instrument ↔ Musician)
//!
//! Plays are first-class rows in the `plays` table, one per
//! (instrument, musician) pair. [`PlayLinks`] is the [`LinkStore`] that edits
//! them for one instrument inside a single transaction.

use async_trait::async_trait;
use sqlx::{Executor, FromRow, QueryBuilder, Sqlite, SqliteConnection, SqlitePool, Transaction};
use std::collections::{BTreeMap, BTreeSet};

use crate::db::instruments::Instrument;
use crate::db::musicians::Musician;
use crate::reconcile::LinkStore;
use crate::{Error, Result};

/// Transactional link store over the `plays` table
///
/// Keyed by instrument id (parent) and musician id (related). Dropping it
/// without [`LinkStore::commit`] rolls every change back.
pub struct PlayLinks {
    tx: Transaction<'static, Sqlite>,
}

impl PlayLinks {
    pub async fn begin(pool: &SqlitePool) -> Result<Self> {
        Ok(Self {
            tx: pool.begin().await?,
        })
    }

    /// The underlying transaction, for writes that must commit together with
    /// the link changes (e.g. the instrument row itself)
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }
}

#[async_trait]
impl LinkStore for PlayLinks {
    type ParentKey = i64;
    type RelatedKey = i64;

    async fn list_links(&mut self, instrument_id: &i64) -> Result<BTreeSet<i64>> {
        let musician_ids: Vec<i64> =
            sqlx::query_scalar("SELECT musician_id FROM plays WHERE instrument_id = ?")
                .bind(instrument_id)
                .fetch_all(&mut *self.tx)
                .await?;
        Ok(musician_ids.into_iter().collect())
    }

    async fn add_link(&mut self, instrument_id: &i64, musician_id: &i64) -> Result<()> {
        sqlx::query("INSERT INTO plays (instrument_id, musician_id) VALUES (?, ?)")
            .bind(instrument_id)
            .bind(musician_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn remove_link(&mut self, instrument_id: &i64, musician_id: &i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM plays WHERE instrument_id = ? AND musician_id = ?")
            .bind(instrument_id)
            .bind(musician_id)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::Concurrency(format!(
                "play of instrument {} by musician {} no longer exists",
                instrument_id, musician_id
            )));
        }
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

/// Musicians playing `instrument_id`, ordered by last name then first name
pub async fn players_of<'e, E>(db: E, instrument_id: i64) -> Result<Vec<Musician>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let players = sqlx::query_as::<_, Musician>(
        r#"
        SELECT m.id, m.first_name, m.middle_name, m.last_name, m.phone
        FROM plays p
        JOIN musicians m ON m.id = p.musician_id
        WHERE p.instrument_id = ?
        ORDER BY m.last_name, m.first_name, m.id
        "#,
    )
    .bind(instrument_id)
    .fetch_all(db)
    .await?;
    Ok(players)
}

#[derive(FromRow)]
struct PlayerRow {
    instrument_id: i64,
    #[sqlx(flatten)]
    musician: Musician,
}

/// Players for several instruments at once (index pages)
pub async fn players_by_instrument<'e, E>(
    db: E,
    instrument_ids: &[i64],
) -> Result<BTreeMap<i64, Vec<Musician>>>
where
    E: Executor<'e, Database = Sqlite>,
{
    if instrument_ids.is_empty() {
        return Ok(BTreeMap::new());
    }

    let mut query = QueryBuilder::<Sqlite>::new(
        "SELECT p.instrument_id, m.id, m.first_name, m.middle_name, m.last_name, m.phone \
         FROM plays p JOIN musicians m ON m.id = p.musician_id WHERE p.instrument_id IN (",
    );
    let mut ids = query.separated(", ");
    for id in instrument_ids {
        ids.push_bind(*id);
    }
    query.push(") ORDER BY m.last_name, m.first_name, m.id");

    let rows = query.build_query_as::<PlayerRow>().fetch_all(db).await?;

    let mut players: BTreeMap<i64, Vec<Musician>> = BTreeMap::new();
    for row in rows {
        players.entry(row.instrument_id).or_default().push(row.musician);
    }
    Ok(players)
}

/// Instruments played by `musician_id`, ordered by name
pub async fn instruments_of<'e, E>(db: E, musician_id: i64) -> Result<Vec<Instrument>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let instruments = sqlx::query_as::<_, Instrument>(
        r#"
        SELECT i.id, i.name
        FROM plays p
        JOIN instruments i ON i.id = p.instrument_id
        WHERE p.musician_id = ?
        ORDER BY i.name
        "#,
    )
    .bind(musician_id)
    .fetch_all(db)
    .await?;
    Ok(instruments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{instruments, musicians};
    use crate::reconcile::Reconciler;

    async fn seeded() -> (SqlitePool, i64, Vec<Musician>) {
        let pool = crate::db::init_in_memory().await.unwrap();
        let instrument_id = instruments::insert(
            &pool,
            &instruments::InstrumentDraft {
                name: "Violin".to_string(),
            },
        )
        .await
        .unwrap();

        for (first, last) in [("Ann", "Avery"), ("Bob", "Baker"), ("Cy", "Cole"), ("Di", "Dunn")] {
            musicians::insert(
                &pool,
                &musicians::MusicianDraft {
                    first_name: first.to_string(),
                    middle_name: None,
                    last_name: last.to_string(),
                    phone: "4165550000".to_string(),
                },
            )
            .await
            .unwrap();
        }
        let universe = musicians::list_all(&pool).await.unwrap();
        (pool, instrument_id, universe)
    }

    #[tokio::test]
    async fn test_reconcile_through_plays_table() {
        let (pool, instrument_id, universe) = seeded().await;
        let ids: Vec<i64> = universe.iter().map(|m| m.id).collect();

        let mut links = PlayLinks::begin(&pool).await.unwrap();
        links.add_link(&instrument_id, &ids[0]).await.unwrap();
        links.add_link(&instrument_id, &ids[2]).await.unwrap();
        links.commit().await.unwrap();

        let selected = BTreeSet::from([ids[1], ids[2], ids[3]]);
        let mut links = PlayLinks::begin(&pool).await.unwrap();
        let delta = Reconciler::default()
            .reconcile(&mut links, &instrument_id, &universe, Some(&selected))
            .await
            .unwrap();
        links.commit().await.unwrap();

        assert_eq!(delta.adds, vec![ids[1], ids[3]]);
        assert_eq!(delta.removes, vec![ids[0]]);

        let players: BTreeSet<i64> = players_of(&pool, instrument_id)
            .await
            .unwrap()
            .iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(players, selected);
    }

    #[tokio::test]
    async fn test_dropped_store_rolls_back() {
        let (pool, instrument_id, universe) = seeded().await;

        {
            let mut links = PlayLinks::begin(&pool).await.unwrap();
            links.add_link(&instrument_id, &universe[0].id).await.unwrap();
            // dropped without commit
        }

        assert!(players_of(&pool, instrument_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_link_is_unique_violation() {
        let (pool, instrument_id, universe) = seeded().await;

        let mut links = PlayLinks::begin(&pool).await.unwrap();
        links.add_link(&instrument_id, &universe[0].id).await.unwrap();
        let err = links
            .add_link(&instrument_id, &universe[0].id)
            .await
            .unwrap_err();

        assert!(err.is_unique_violation());
    }

    #[tokio::test]
    async fn test_removing_missing_link_is_concurrency_error() {
        let (pool, instrument_id, universe) = seeded().await;

        let mut links = PlayLinks::begin(&pool).await.unwrap();
        let err = links
            .remove_link(&instrument_id, &universe[0].id)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Concurrency(_)));
    }

    #[tokio::test]
    async fn test_players_by_instrument_groups_rows() {
        let (pool, violin, universe) = seeded().await;
        let cello = instruments::insert(
            &pool,
            &instruments::InstrumentDraft {
                name: "Cello".to_string(),
            },
        )
        .await
        .unwrap();

        let mut links = PlayLinks::begin(&pool).await.unwrap();
        links.add_link(&violin, &universe[1].id).await.unwrap();
        links.add_link(&violin, &universe[0].id).await.unwrap();
        links.add_link(&cello, &universe[3].id).await.unwrap();
        links.commit().await.unwrap();

        let grouped = players_by_instrument(&pool, &[violin, cello]).await.unwrap();
        let violin_players: Vec<&str> = grouped[&violin].iter().map(|m| m.last_name.as_str()).collect();

        assert_eq!(violin_players, vec!["Avery", "Baker"]);
        assert_eq!(grouped[&cello].len(), 1);
        assert_eq!(
            instruments_of(&pool, universe[0].id).await.unwrap()[0].name,
            "Violin"
        );
    }
}

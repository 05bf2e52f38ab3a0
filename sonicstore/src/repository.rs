// SPDX-FileCopyrightText: The sonicstore authors
// SPDX-License-Identifier: MPL-2.0

use std::{collections::HashSet, fmt, marker::PhantomData};

use futures_util::TryStreamExt as _;
use itertools::Itertools as _;
use serde::Deserialize;
use sqlx::{
    FromRow, Sqlite, SqlitePool,
    query::Query,
    sqlite::{SqliteArguments, SqliteRow},
    types::time::OffsetDateTime,
};

use crate::{Error, Result};

/// Maximum number of bound parameters per bulk statement.
pub(crate) const BULK_CHUNK_SIZE: usize = 500;

pub type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

/// An entity that is stored in a table and keyed by an opaque string ID.
///
/// Every table has the columns `"id"`, `"created_at"` and `"updated_at"`
/// in addition to the entity specific [`Entity::COLUMNS`].
pub trait Entity: for<'r> FromRow<'r, SqliteRow> + Send + Unpin {
    const TABLE: &'static str;

    /// Data columns, excluding the ID and bookkeeping columns.
    ///
    /// The order must match the order of [`Entity::bind_columns`].
    const COLUMNS: &'static [&'static str];

    /// Columns that are permitted in [`QueryOptions::sort_by`].
    const SORT_COLUMNS: &'static [&'static str];

    fn id(&self) -> &str;

    fn bind_columns<'q>(&'q self, query: SqliteQuery<'q>) -> SqliteQuery<'q>;
}

/// Pagination and sorting of query results.
///
/// Never stored, passed by value or reference into repository calls.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QueryOptions {
    /// Column name. Overrides the default ordering of the operation.
    pub sort_by: Option<String>,
    pub desc: bool,
    pub offset: u32,
    /// Maximum number of results. Unlimited if `None`.
    pub size: Option<u32>,
}

impl QueryOptions {
    #[must_use]
    pub const fn page(offset: u32, size: u32) -> Self {
        Self {
            sort_by: None,
            desc: false,
            offset,
            size: Some(size),
        }
    }

    fn order_by_clause<E: Entity>(&self, default_order: &str) -> Result<String> {
        let Some(sort_by) = &self.sort_by else {
            return Ok(default_order.to_owned());
        };
        if !E::SORT_COLUMNS.contains(&sort_by.as_str()) {
            return Err(Error::Validation(format!(
                "cannot sort {table} by \"{sort_by}\"",
                table = E::TABLE
            )));
        }
        let direction = if self.desc { "DESC" } else { "ASC" };
        Ok(format!(r#""{sort_by}" {direction}"#))
    }

    fn limit_clause(&self) -> String {
        let Self { offset, size, .. } = self;
        // SQLite requires a LIMIT for an OFFSET, -1 disables the limit.
        let limit = size.map_or(-1, i64::from);
        format!("LIMIT {limit} OFFSET {offset}")
    }
}

/// Entity-agnostic data access.
pub struct Repository<E> {
    pool: SqlitePool,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for Repository<E> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> fmt::Debug for Repository<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("table", &E::TABLE)
            .finish_non_exhaustive()
    }
}

impl<E: Entity> Repository<E> {
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            _entity: PhantomData,
        }
    }

    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Inserts or fully overwrites an entity.
    ///
    /// Sets `updated_at` and, only when inserting, `created_at`.
    ///
    /// Fails with [`Error::Validation`] if the ID is empty.
    pub async fn put(&self, entity: &E) -> Result<()> {
        if entity.id().is_empty() {
            return Err(Error::Validation(format!(
                "cannot store {table} without an ID",
                table = E::TABLE
            )));
        }
        let sql = upsert_sql::<E>();
        let query = sqlx::query(&sql).bind(entity.id());
        entity
            .bind_columns(query)
            .bind(OffsetDateTime::now_utc())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Loads a single entity by ID.
    ///
    /// Returns `Ok(None)` if the requested entity has not been found.
    pub async fn try_load(&self, id: &str) -> Result<Option<E>> {
        let sql = format!(r#"SELECT * FROM "{table}" WHERE "id"=?1"#, table = E::TABLE);
        let entity = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(entity)
    }

    /// Loads a single entity by ID.
    ///
    /// Fails with [`Error::NotFound`] if the requested entity has not been found.
    pub async fn get(&self, id: &str) -> Result<E> {
        self.try_load(id).await?.ok_or(Error::NotFound)
    }

    pub async fn exists(&self, id: &str) -> Result<bool> {
        let sql = format!(
            r#"SELECT EXISTS(SELECT 1 FROM "{table}" WHERE "id"=?1)"#,
            table = E::TABLE
        );
        let exists = sqlx::query_scalar(&sql)
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    /// Deletes a single entity.
    ///
    /// Returns `false` if the requested entity has not been found.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let sql = format!(r#"DELETE FROM "{table}" WHERE "id"=?1"#, table = E::TABLE);
        let result = sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        debug_assert!(result.rows_affected() <= 1);
        Ok(result.rows_affected() > 0)
    }

    pub async fn count_all(&self) -> Result<u64> {
        let sql = format!(r#"SELECT COUNT(*) FROM "{table}""#, table = E::TABLE);
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        debug_assert!(count >= 0);
        Ok(count.cast_unsigned())
    }

    /// Loads the IDs of all stored entities in ascending order.
    pub async fn load_all_ids(&self) -> Result<Vec<String>> {
        let sql = format!(
            r#"SELECT "id" FROM "{table}" ORDER BY "id""#,
            table = E::TABLE
        );
        let ids = sqlx::query_scalar(&sql).fetch_all(&self.pool).await?;
        Ok(ids)
    }

    /// Loads a page of entities.
    pub async fn list(&self, options: &QueryOptions) -> Result<Vec<E>> {
        let sql = Self::select_sql(None, options, r#""id""#)?;
        let entities = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        Ok(entities)
    }

    /// Builds a `SELECT` statement with ordering and pagination.
    ///
    /// The optional `filter` is inserted verbatim as `WHERE` clause and
    /// may reference bound parameters.
    pub(crate) fn select_sql(
        filter: Option<&str>,
        options: &QueryOptions,
        default_order: &str,
    ) -> Result<String> {
        let order_by = options.order_by_clause::<E>(default_order)?;
        let limit = options.limit_clause();
        let table = E::TABLE;
        let sql = if let Some(filter) = filter {
            format!(r#"SELECT * FROM "{table}" WHERE {filter} ORDER BY {order_by} {limit}"#)
        } else {
            format!(r#"SELECT * FROM "{table}" ORDER BY {order_by} {limit}"#)
        };
        Ok(sql)
    }

    /// Deletes all stored entities that are not contained in `active`.
    ///
    /// Computes the set difference between a snapshot of all stored IDs and
    /// the active IDs in a single transaction. Returns the removed IDs in
    /// ascending order.
    pub async fn purge_inactive<'a, T>(
        &self,
        active: impl IntoIterator<Item = &'a T>,
        id_of: impl Fn(&'a T) -> &'a str,
    ) -> Result<Vec<String>>
    where
        T: 'a + ?Sized,
    {
        let active_ids = active.into_iter().map(id_of).collect::<HashSet<_>>();
        let mut tx = self.pool.begin().await?;
        let select_sql = format!(
            r#"SELECT "id" FROM "{table}" ORDER BY "id""#,
            table = E::TABLE
        );
        let removed_ids = sqlx::query_scalar::<_, String>(&select_sql)
            .fetch(&mut *tx)
            .try_filter(|id| std::future::ready(!active_ids.contains(id.as_str())))
            .try_collect::<Vec<_>>()
            .await?;
        for chunk in removed_ids.chunks(BULK_CHUNK_SIZE) {
            let delete_sql = format!(
                r#"DELETE FROM "{table}" WHERE "id" IN ({params})"#,
                table = E::TABLE,
                params = (1..=chunk.len()).map(|i| format!("?{i}")).join(",")
            );
            let query = chunk
                .iter()
                .fold(sqlx::query(&delete_sql), |query, id| query.bind(id));
            let result = query.execute(&mut *tx).await?;
            debug_assert_eq!(result.rows_affected(), chunk.len() as u64);
        }
        tx.commit().await?;
        if !removed_ids.is_empty() {
            log::info!(
                "Purged {count} inactive row(s) from {table}",
                count = removed_ids.len(),
                table = E::TABLE
            );
        }
        Ok(removed_ids)
    }
}

fn upsert_sql<E: Entity>() -> String {
    let table = E::TABLE;
    let columns = E::COLUMNS;
    // ?1 is the ID, ?2..=?n+1 the data columns, ?n+2 the current time.
    let now_param = columns.len() + 2;
    let column_list = std::iter::once("id")
        .chain(columns.iter().copied())
        .chain(["created_at", "updated_at"])
        .map(|column| format!(r#""{column}""#))
        .join(",");
    let value_list = (1..now_param)
        .map(|i| format!("?{i}"))
        .chain([format!("?{now_param}"), format!("?{now_param}")])
        .join(",");
    let update_list = columns
        .iter()
        .copied()
        .chain(std::iter::once("updated_at"))
        .map(|column| format!(r#""{column}"=excluded."{column}""#))
        .join(",");
    format!(
        r#"INSERT INTO "{table}" ({column_list}) VALUES ({value_list}) ON CONFLICT("id") DO UPDATE SET {update_list}"#
    )
}

#[cfg(test)]
mod tests {
    use crate::{MediaFile, QueryOptions, Repository, test_util};

    #[test]
    fn upsert_sql_preserves_created_at() {
        let sql = super::upsert_sql::<MediaFile>();
        assert!(sql.starts_with(r#"INSERT INTO "media_file" ("id","path","title","#));
        assert!(sql.contains(r#""updated_at"=excluded."updated_at""#));
        assert!(!sql.contains(r#""created_at"=excluded"#));
    }

    #[test]
    fn sort_by_unknown_column_is_rejected() {
        let options = QueryOptions {
            sort_by: Some("title; DROP TABLE media_file".to_owned()),
            ..Default::default()
        };
        assert!(
            options
                .order_by_clause::<MediaFile>(r#""id""#)
                .unwrap_err()
                .to_string()
                .starts_with("invalid input")
        );
    }

    #[test]
    fn limit_clause() {
        assert_eq!(
            QueryOptions::default().limit_clause(),
            "LIMIT -1 OFFSET 0"
        );
        assert_eq!(QueryOptions::page(20, 10).limit_clause(), "LIMIT 10 OFFSET 20");
    }

    #[tokio::test]
    async fn put_inserts_then_overwrites() {
        let pool = test_util::pool().await;
        let repo = Repository::<MediaFile>::new(pool);

        let mut media_file = test_util::media_file("1", "Come As You Are");
        repo.put(&media_file).await.unwrap();
        let first = repo.get("1").await.unwrap();
        assert_eq!(first.title, "Come As You Are");
        assert!(first.created_at.is_some());
        assert_eq!(first.created_at, first.updated_at);

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        media_file.title = "Lithium".to_owned();
        repo.put(&media_file).await.unwrap();
        let second = repo.get("1").await.unwrap();
        assert_eq!(second.title, "Lithium");
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at > first.updated_at);
        assert_eq!(repo.count_all().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn put_twice_with_identical_data() {
        let pool = test_util::pool().await;
        let repo = Repository::<MediaFile>::new(pool);

        let media_file = test_util::media_file("1", "Polly");
        repo.put(&media_file).await.unwrap();
        let first = repo.get("1").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        repo.put(&media_file).await.unwrap();
        let second = repo.get("1").await.unwrap();

        assert!(second.updated_at > first.updated_at);
        let strip = |mut m: MediaFile| {
            m.created_at = None;
            m.updated_at = None;
            m
        };
        assert_eq!(strip(second), strip(first));
    }

    #[tokio::test]
    async fn put_without_id_is_rejected() {
        let pool = test_util::pool().await;
        let repo = Repository::<MediaFile>::new(pool);
        let err = repo
            .put(&test_util::media_file("", "Drain You"))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::Error::Validation(_)));
        assert_eq!(repo.count_all().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let pool = test_util::pool().await;
        let repo = Repository::<MediaFile>::new(pool);
        assert!(repo.get("missing").await.unwrap_err().is_not_found());
        assert!(repo.try_load("missing").await.unwrap().is_none());
        assert!(!repo.exists("missing").await.unwrap());
        assert!(!repo.delete("missing").await.unwrap());
    }

    #[tokio::test]
    async fn delete_existing() {
        let pool = test_util::pool().await;
        let repo = Repository::<MediaFile>::new(pool);
        repo.put(&test_util::media_file("1", "Breed")).await.unwrap();
        assert!(repo.exists("1").await.unwrap());
        assert!(repo.delete("1").await.unwrap());
        assert!(!repo.exists("1").await.unwrap());
    }

    #[tokio::test]
    async fn list_sorted_and_paginated() {
        let pool = test_util::pool().await;
        let repo = Repository::<MediaFile>::new(pool);
        for (id, title) in [("1", "c"), ("2", "a"), ("3", "b")] {
            repo.put(&test_util::media_file(id, title)).await.unwrap();
        }
        let options = QueryOptions {
            sort_by: Some("title".to_owned()),
            desc: true,
            offset: 1,
            size: Some(5),
        };
        let titles = repo
            .list(&options)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.title)
            .collect::<Vec<_>>();
        assert_eq!(titles, ["b", "a"]);
    }

    #[tokio::test]
    async fn purge_inactive_removes_set_difference() {
        let pool = test_util::pool().await;
        let repo = Repository::<MediaFile>::new(pool);
        let stored = ["a", "b", "c", "d"]
            .into_iter()
            .map(|id| test_util::media_file(id, id))
            .collect::<Vec<_>>();
        for media_file in &stored {
            repo.put(media_file).await.unwrap();
        }

        // "x" is active but has never been stored.
        let active = [
            test_util::media_file("b", "b"),
            test_util::media_file("d", "d"),
            test_util::media_file("x", "x"),
        ];
        let removed = repo
            .purge_inactive(&active, |m| m.id.as_str())
            .await
            .unwrap();
        assert_eq!(removed, ["a", "c"]);
        assert_eq!(repo.load_all_ids().await.unwrap(), ["b", "d"]);

        // Idempotent
        let removed = repo
            .purge_inactive(&active, |m| m.id.as_str())
            .await
            .unwrap();
        assert!(removed.is_empty());
        assert_eq!(repo.load_all_ids().await.unwrap(), ["b", "d"]);
    }

    #[tokio::test]
    async fn purge_inactive_with_empty_active_set_removes_all() {
        let pool = test_util::pool().await;
        let repo = Repository::<MediaFile>::new(pool);
        // More rows than fit into a single bulk statement.
        let count = super::BULK_CHUNK_SIZE + 3;
        for i in 0..count {
            let id = format!("{i:04}");
            repo.put(&test_util::media_file(&id, "t")).await.unwrap();
        }
        let removed = repo
            .purge_inactive(std::iter::empty::<&str>(), |id| id)
            .await
            .unwrap();
        assert_eq!(removed.len(), count);
        assert_eq!(repo.count_all().await.unwrap(), 0);
    }
}

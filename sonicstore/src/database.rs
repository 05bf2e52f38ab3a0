// SPDX-FileCopyrightText: The sonicstore authors
// SPDX-License-Identifier: MPL-2.0

use std::{path::Path, str::FromStr as _};

use sqlx::{
    SqliteExecutor, SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};

const CREATE_SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS "media_file" (
        "id" TEXT PRIMARY KEY NOT NULL,
        "path" TEXT NOT NULL DEFAULT '',
        "title" TEXT NOT NULL DEFAULT '',
        "album" TEXT NOT NULL DEFAULT '',
        "artist" TEXT NOT NULL DEFAULT '',
        "artist_id" TEXT NOT NULL DEFAULT '',
        "album_artist" TEXT NOT NULL DEFAULT '',
        "album_id" TEXT NOT NULL DEFAULT '',
        "has_cover_art" INTEGER NOT NULL DEFAULT 0,
        "track_number" INTEGER NOT NULL DEFAULT 0,
        "disc_number" INTEGER NOT NULL DEFAULT 0,
        "year" INTEGER NOT NULL DEFAULT 0,
        "size" INTEGER NOT NULL DEFAULT 0,
        "suffix" TEXT NOT NULL DEFAULT '',
        "duration" INTEGER NOT NULL DEFAULT 0,
        "bit_rate" INTEGER NOT NULL DEFAULT 0,
        "genre" TEXT NOT NULL DEFAULT '',
        "compilation" INTEGER NOT NULL DEFAULT 0,
        "play_count" INTEGER NOT NULL DEFAULT 0,
        "play_date" TEXT,
        "rating" INTEGER NOT NULL DEFAULT 0,
        "starred" INTEGER NOT NULL DEFAULT 0,
        "starred_at" TEXT,
        "created_at" TEXT,
        "updated_at" TEXT
    )"#,
    r#"CREATE INDEX IF NOT EXISTS "media_file_title" ON "media_file" ("title")"#,
    r#"CREATE INDEX IF NOT EXISTS "media_file_album_id" ON "media_file" ("album_id")"#,
    r#"CREATE INDEX IF NOT EXISTS "media_file_starred" ON "media_file" ("starred")"#,
];

/// Opens (or creates) a database file.
///
/// The schema is created if missing.
pub async fn open_database(file_path: impl AsRef<Path>) -> sqlx::Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(file_path)
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(options).await?;
    create_schema(&pool).await?;
    Ok(pool)
}

/// Opens a transient, in-memory database.
///
/// Every connection of an in-memory database sees its own, private
/// database. The pool is therefore limited to a single connection
/// that is never closed while the pool is alive.
pub async fn open_in_memory_database() -> sqlx::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
    let pool = SqlitePoolOptions::new()
        .min_connections(1)
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;
    create_schema(&pool).await?;
    Ok(pool)
}

/// Creates all tables and indexes that do not exist yet.
pub async fn create_schema(pool: &SqlitePool) -> sqlx::Result<()> {
    let mut tx = pool.begin().await?;
    for statement in CREATE_SCHEMA {
        execute(&mut *tx, statement).await?;
    }
    tx.commit().await
}

async fn execute(executor: impl SqliteExecutor<'_>, statement: &str) -> sqlx::Result<()> {
    sqlx::query(statement).execute(executor).await?;
    Ok(())
}

pub async fn optimize_database(pool: &SqlitePool) -> sqlx::Result<()> {
    sqlx::query(r"VACUUM").execute(pool).await?;
    sqlx::query(r"ANALYZE").execute(pool).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    #[tokio::test]
    async fn create_schema_is_idempotent() {
        let pool = super::open_in_memory_database().await.unwrap();
        super::create_schema(&pool).await.unwrap();
        let count: i64 = sqlx::query_scalar(r#"SELECT COUNT(*) FROM "media_file""#)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}

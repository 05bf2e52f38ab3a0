// SPDX-FileCopyrightText: The sonicstore authors
// SPDX-License-Identifier: MPL-2.0

use futures_util::stream::BoxStream;
use itertools::Itertools as _;
use serde::Serialize;
use sqlx::{FromRow, SqlitePool, sqlite::SqliteRow, types::time::OffsetDateTime};

use crate::{
    Error, QueryOptions, Repository, Result,
    repository::{BULK_CHUNK_SIZE, Entity, SqliteQuery},
    search::{RELEVANCE_ORDER, TitleQuery},
};

crate::entity_id!(MediaFileId);
crate::entity_id!(AlbumId);
crate::entity_id!(ArtistId);

/// Upper bound of [`MediaFile::rating`].
pub const MAX_RATING: u8 = 5;

/// An audio track.
#[derive(Debug, Clone, Default, PartialEq, Eq, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaFile {
    pub id: MediaFileId,
    pub path: String,
    pub title: String,
    pub album: String,
    pub artist: String,
    pub artist_id: ArtistId,
    pub album_artist: String,
    pub album_id: AlbumId,
    pub has_cover_art: bool,
    pub track_number: u32,
    pub disc_number: u32,
    pub year: u32,
    /// File size in bytes.
    pub size: i64,
    pub suffix: String,
    /// Duration in seconds.
    pub duration: u32,
    pub bit_rate: u32,
    pub genre: String,
    pub compilation: bool,
    pub play_count: u32,
    #[serde(with = "time::serde::rfc3339::option")]
    pub play_date: Option<OffsetDateTime>,
    pub rating: u8,
    pub starred: bool,
    /// Only meaningful if `starred` is `true`.
    #[serde(with = "time::serde::rfc3339::option")]
    pub starred_at: Option<OffsetDateTime>,
    /// Set when stored for the first time.
    #[serde(with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
    /// Set whenever stored.
    #[serde(with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

impl Entity for MediaFile {
    const TABLE: &'static str = "media_file";

    const COLUMNS: &'static [&'static str] = &[
        "path",
        "title",
        "album",
        "artist",
        "artist_id",
        "album_artist",
        "album_id",
        "has_cover_art",
        "track_number",
        "disc_number",
        "year",
        "size",
        "suffix",
        "duration",
        "bit_rate",
        "genre",
        "compilation",
        "play_count",
        "play_date",
        "rating",
        "starred",
        "starred_at",
    ];

    const SORT_COLUMNS: &'static [&'static str] = &[
        "id",
        "title",
        "album",
        "artist",
        "album_artist",
        "genre",
        "year",
        "disc_number",
        "track_number",
        "duration",
        "play_count",
        "play_date",
        "rating",
        "starred_at",
        "created_at",
        "updated_at",
    ];

    fn id(&self) -> &str {
        self.id.as_str()
    }

    fn bind_columns<'q>(&'q self, query: SqliteQuery<'q>) -> SqliteQuery<'q> {
        let Self {
            id: _,
            path,
            title,
            album,
            artist,
            artist_id,
            album_artist,
            album_id,
            has_cover_art,
            track_number,
            disc_number,
            year,
            size,
            suffix,
            duration,
            bit_rate,
            genre,
            compilation,
            play_count,
            play_date,
            rating,
            starred,
            starred_at,
            created_at: _,
            updated_at: _,
        } = self;
        query
            .bind(path)
            .bind(title)
            .bind(album)
            .bind(artist)
            .bind(artist_id)
            .bind(album_artist)
            .bind(album_id)
            .bind(*has_cover_art)
            .bind(*track_number)
            .bind(*disc_number)
            .bind(*year)
            .bind(*size)
            .bind(suffix)
            .bind(*duration)
            .bind(*bit_rate)
            .bind(genre)
            .bind(*compilation)
            .bind(*play_count)
            .bind(*play_date)
            .bind(*rating)
            .bind(*starred)
            .bind(*starred_at)
    }
}

/// Data access for [`MediaFile`]s.
#[derive(Debug, Clone)]
pub struct MediaFileRepository {
    repo: Repository<MediaFile>,
}

impl MediaFileRepository {
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self {
            repo: Repository::new(pool),
        }
    }

    fn pool(&self) -> &SqlitePool {
        self.repo.pool()
    }

    /// Inserts or fully overwrites a media file.
    ///
    /// Fails with [`Error::Validation`] if the rating exceeds [`MAX_RATING`].
    pub async fn put(&self, media_file: &MediaFile) -> Result<()> {
        check_rating(media_file.rating)?;
        self.repo.put(media_file).await
    }

    /// Loads a single [`MediaFile`] by ID.
    ///
    /// Fails with [`Error::NotFound`] if the requested [`MediaFile`] has not been found.
    pub async fn get(&self, id: &MediaFileId) -> Result<MediaFile> {
        self.repo.get(id.as_str()).await
    }

    pub async fn exists(&self, id: &MediaFileId) -> Result<bool> {
        self.repo.exists(id.as_str()).await
    }

    pub async fn delete(&self, id: &MediaFileId) -> Result<bool> {
        self.repo.delete(id.as_str()).await
    }

    pub async fn count_all(&self) -> Result<u64> {
        self.repo.count_all().await
    }

    /// Fetches all [`MediaFile`]s.
    ///
    /// Unfiltered and ordered by ID.
    #[must_use]
    pub fn fetch_all(&self) -> BoxStream<'_, sqlx::Result<MediaFile>> {
        sqlx::query_as(r#"SELECT * FROM "media_file" ORDER BY "id""#).fetch(self.pool())
    }

    /// Loads all tracks of an album.
    ///
    /// Ordered by disc and track number.
    pub async fn find_by_album(&self, album_id: &AlbumId) -> Result<Vec<MediaFile>> {
        let media_files = sqlx::query_as(
            r#"SELECT * FROM "media_file" WHERE "album_id"=?1
               ORDER BY "disc_number", "track_number", "id""#,
        )
        .bind(album_id)
        .fetch_all(self.pool())
        .await?;
        Ok(media_files)
    }

    /// Loads a page of starred [`MediaFile`]s.
    ///
    /// Most recently starred first, unless ordered otherwise.
    pub async fn get_starred(&self, options: &QueryOptions) -> Result<Vec<MediaFile>> {
        let sql = Repository::<MediaFile>::select_sql(
            Some(r#""starred""#),
            options,
            r#""starred_at" DESC, "id""#,
        )?;
        let media_files = sqlx::query_as(&sql).fetch_all(self.pool()).await?;
        Ok(media_files)
    }

    /// Deletes all [`MediaFile`]s that are missing in `active`.
    ///
    /// Returns the IDs of the removed [`MediaFile`]s.
    pub async fn purge_inactive(&self, active: &[MediaFile]) -> Result<Vec<String>> {
        self.repo
            .purge_inactive(active, |media_file| media_file.id.as_str())
            .await
    }

    /// Searches titles for all terms of a free-text query.
    ///
    /// Matches are ranked by rating, starred and play count, then by ID.
    /// A `size` of 0 returns all matches after `offset`. Empty queries and
    /// terms that exceed the pattern length limit of SQLite match nothing.
    pub async fn search(&self, query: &str, offset: u32, size: u32) -> Result<Vec<MediaFile>> {
        let Some(query) = TitleQuery::parse(query) else {
            return Ok(Vec::new());
        };
        if query.exceeds_pattern_limit() {
            log::debug!("Search terms are too long to match any title");
            return Ok(Vec::new());
        }
        let options = QueryOptions {
            offset,
            size: (size > 0).then_some(size),
            ..Default::default()
        };
        let sql = Repository::<MediaFile>::select_sql(
            Some(&query.filter_sql()),
            &options,
            RELEVANCE_ORDER,
        )?;
        let media_files = query
            .bind_patterns(sqlx::query(&sql))
            .try_map(|row: SqliteRow| MediaFile::from_row(&row))
            .fetch_all(self.pool())
            .await?;
        debug_assert!(
            media_files
                .iter()
                .all(|media_file| query.matches(&media_file.title))
        );
        Ok(media_files)
    }

    /// Records a submitted play.
    ///
    /// Increments the play count and updates the play date within a single
    /// statement. Concurrent plays of the same media file are never lost.
    pub async fn record_play(
        &self,
        id: &MediaFileId,
        play_date: OffsetDateTime,
    ) -> Result<MediaFile> {
        sqlx::query_as(
            r#"UPDATE "media_file"
               SET "play_count"="play_count"+1, "play_date"=?2, "updated_at"=?3
               WHERE "id"=?1
               RETURNING *"#,
        )
        .bind(id)
        .bind(play_date)
        .bind(OffsetDateTime::now_utc())
        .fetch_optional(self.pool())
        .await?
        .ok_or(Error::NotFound)
    }

    /// Stars or unstars media files.
    ///
    /// `starred_at` is only set when a media file becomes starred. Unstarring
    /// leaves it untouched.
    ///
    /// Unknown IDs are skipped while all existing media files are updated,
    /// i.e. the update is partial if some IDs are unknown. Returns the number
    /// of affected media files, which is less than the number of distinct
    /// `ids` in this case.
    pub async fn set_starred(
        &self,
        ids: &[MediaFileId],
        starred: bool,
        starred_at: OffsetDateTime,
    ) -> Result<u64> {
        let ids = ids.iter().unique().collect::<Vec<_>>();
        if ids.is_empty() {
            return Ok(0);
        }
        let updated_at = OffsetDateTime::now_utc();
        let mut tx = self.pool().begin().await?;
        let mut affected_count = 0;
        for chunk in ids.chunks(BULK_CHUNK_SIZE) {
            // ?1 to ?3 are reserved, IDs start at ?4.
            let sql = format!(
                r#"UPDATE "media_file"
                   SET "starred_at"=CASE WHEN ?1 AND NOT "starred" THEN ?2 ELSE "starred_at" END,
                       "starred"=?1, "updated_at"=?3
                   WHERE "id" IN ({params})"#,
                params = (4..4 + chunk.len()).map(|i| format!("?{i}")).join(",")
            );
            let query = sqlx::query(&sql)
                .bind(starred)
                .bind(starred_at)
                .bind(updated_at);
            let result = chunk
                .iter()
                .fold(query, |query, id| query.bind(*id))
                .execute(&mut *tx)
                .await?;
            affected_count += result.rows_affected();
        }
        tx.commit().await?;
        Ok(affected_count)
    }

    /// Sets the rating of a single media file.
    ///
    /// Ratings range from 0 (unrated) to [`MAX_RATING`].
    pub async fn set_rating(&self, id: &MediaFileId, rating: u8) -> Result<()> {
        check_rating(rating)?;
        let result =
            sqlx::query(r#"UPDATE "media_file" SET "rating"=?2, "updated_at"=?3 WHERE "id"=?1"#)
                .bind(id)
                .bind(rating)
                .bind(OffsetDateTime::now_utc())
                .execute(self.pool())
                .await?;
        debug_assert!(result.rows_affected() <= 1);
        if result.rows_affected() == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }
}

fn check_rating(rating: u8) -> Result<()> {
    if rating > MAX_RATING {
        return Err(Error::Validation(format!(
            "rating {rating} exceeds maximum {MAX_RATING}"
        )));
    }
    Ok(())
}

// SPDX-FileCopyrightText: The sonicstore authors
// SPDX-License-Identifier: MPL-2.0

#![doc = include_str!("../README.md")]

pub mod api;

mod database;
pub use self::database::{
    create_schema, open_database, open_in_memory_database, optimize_database,
};

mod entity_id;

mod error;
pub use self::error::{Error, Result};

mod media_file;
pub use self::media_file::{
    AlbumId, ArtistId, MAX_RATING, MediaFile, MediaFileId, MediaFileRepository,
};

mod repository;
pub use self::repository::{Entity, QueryOptions, Repository, SqliteQuery};

mod scrobbler;
pub use self::scrobbler::Scrobbler;

mod search;
pub use self::search::{RELEVANCE_ORDER, TitleQuery};

#[cfg(test)]
mod test_util;

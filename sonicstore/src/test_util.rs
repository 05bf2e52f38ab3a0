// SPDX-FileCopyrightText: The sonicstore authors
// SPDX-License-Identifier: MPL-2.0

use sqlx::SqlitePool;

use crate::{MediaFile, open_in_memory_database};

pub(crate) async fn pool() -> SqlitePool {
    open_in_memory_database().await.unwrap()
}

pub(crate) fn media_file(id: &str, title: &str) -> MediaFile {
    MediaFile {
        id: id.into(),
        title: title.to_owned(),
        ..Default::default()
    }
}

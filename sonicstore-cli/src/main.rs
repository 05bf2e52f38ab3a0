// SPDX-FileCopyrightText: The sonicstore authors
// SPDX-License-Identifier: MPL-2.0

use std::{
    borrow::Cow,
    path::{Path, PathBuf},
};

use anyhow::{Context as _, bail};
use clap::{Parser, Subcommand};
use futures_util::StreamExt as _;
use sqlx::SqlitePool;
use time::OffsetDateTime;

use sonicstore::{
    AlbumId, MediaFile, MediaFileId, MediaFileRepository, QueryOptions, Repository, Scrobbler,
    open_database,
};

const DEFAULT_DB_FILE: &str = "sonicstore.db";

const DEFAULT_PAGE_SIZE: u32 = 20;

#[derive(Debug, Subcommand)]
enum Command {
    /// Read all media files to verify the database contents (read-only).
    Analyze,
    /// Search media file titles.
    Search(SearchArgs),
    /// List the tracks of an album in disc and track order.
    Album {
        album_id: String,
    },
    /// List starred media files, most recently starred first.
    Starred(PageArgs),
    /// Register playback of a media file.
    Scrobble(ScrobbleArgs),
    /// Star media files.
    Star {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Unstar media files.
    Unstar {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Rate a media file from 0 (unrated) to 5.
    Rate {
        id: String,
        rating: u8,
    },
    /// Delete all media files that are not listed as active.
    Purge {
        /// Text file with the IDs of all active media files, one per line.
        #[arg(long)]
        active_ids: PathBuf,
    },
    /// Optimize the database.
    Optimize,
}

#[derive(Debug, Parser)]
struct PageArgs {
    #[arg(long, default_value_t = 0)]
    offset: u32,

    /// Maximum number of results, 0 for unlimited.
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    size: u32,
}

#[derive(Debug, Parser)]
struct SearchArgs {
    /// Whitespace separated terms that must all match.
    query: String,

    #[command(flatten)]
    page: PageArgs,
}

#[derive(Debug, Parser)]
struct ScrobbleArgs {
    id: String,

    /// Time of playback in milliseconds since the UNIX epoch.
    ///
    /// Defaults to the current time.
    #[arg(long)]
    time: Option<i64>,

    /// Submit a completed play instead of a "now playing" notification.
    #[arg(long)]
    submission: bool,
}

#[derive(Debug, Parser)]
struct Args {
    #[arg(long)]
    db_file: Option<PathBuf>,

    #[clap(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // In Windows, we must request a virtual terminal environment to display colors correctly.
    // This enables support for the ANSI escape sequences used by `colored`.
    //
    // <https://github.com/colored-rs/colored/issues/59#issuecomment-954355180>
    #[cfg(windows)]
    let _unused = colored::control::set_virtual_terminal(true);

    env_logger::init();

    let Args { db_file, command } = Args::parse();

    let db_file = db_file.map_or(Cow::Borrowed(Path::new(DEFAULT_DB_FILE)), Cow::Owned);

    let pool = match open_database(&db_file).await {
        Ok(pool) => {
            log::info!(
                "Opened database file \"{db_file}\"",
                db_file = db_file.display()
            );
            pool
        }
        Err(err) => {
            log::error!(
                "Failed to open database file \"{db_file}\": {err:#}",
                db_file = db_file.display()
            );
            bail!("aborted");
        }
    };

    let media_files = MediaFileRepository::new(pool.clone());

    match command {
        Command::Analyze => {
            media_file_scan(&media_files).await;
        }
        Command::Search(SearchArgs {
            query,
            page: PageArgs { offset, size },
        }) => {
            let results = media_files.search(&query, offset, size).await?;
            log::info!(
                "Found {count} media file(s) matching \"{query}\"",
                count = results.len()
            );
            print_media_files(&results);
        }
        Command::Album { album_id } => {
            let tracks = media_files.find_by_album(&AlbumId::from(album_id)).await?;
            print_media_files(&tracks);
        }
        Command::Starred(PageArgs { offset, size }) => {
            let options = QueryOptions {
                offset,
                size: (size > 0).then_some(size),
                ..Default::default()
            };
            let starred = media_files.get_starred(&options).await?;
            print_media_files(&starred);
        }
        Command::Scrobble(args) => {
            scrobble(Scrobbler::new(media_files), args).await?;
        }
        Command::Star { ids } => {
            set_starred(&media_files, ids, true).await?;
        }
        Command::Unstar { ids } => {
            set_starred(&media_files, ids, false).await?;
        }
        Command::Rate { id, rating } => {
            let id = MediaFileId::from(id);
            media_files
                .set_rating(&id, rating)
                .await
                .with_context(|| format!("rate media file {id}"))?;
            log::info!("Rated media file {id} with {rating}");
        }
        Command::Purge { active_ids } => {
            purge_inactive(&pool, &active_ids).await?;
        }
        Command::Optimize => {
            optimize_database(&pool).await;
        }
    }

    Ok(())
}

fn print_media_files(media_files: &[MediaFile]) {
    for MediaFile {
        id,
        title,
        artist,
        album,
        disc_number,
        track_number,
        rating,
        starred,
        play_count,
        ..
    } in media_files
    {
        let star = if *starred { "*" } else { " " };
        println!(
            "{id}\t{star} {rating}/5 {play_count:>4}x\t{disc_number}-{track_number:02}\t{artist} - {album} - {title}"
        );
    }
}

async fn media_file_scan(media_files: &MediaFileRepository) {
    log::info!("MediaFile: Scanning...");
    let (ok_count, err_count) = media_files
        .fetch_all()
        .fold((0, 0), |(ok_count, err_count), result| {
            let counts = match result {
                Ok(_) => (ok_count + 1, err_count),
                Err(err) => {
                    log::warn!("MediaFile: Failed to read row: {err:#}");
                    (ok_count, err_count + 1)
                }
            };
            std::future::ready(counts)
        })
        .await;
    let count = ok_count + err_count;
    if err_count > 0 {
        log::warn!("MediaFile: Scanned {count} row(s): {err_count} unreadable");
    } else {
        log::info!("MediaFile: Scanned {count} row(s)");
    }
}

async fn scrobble(scrobbler: Scrobbler, args: ScrobbleArgs) -> anyhow::Result<()> {
    let ScrobbleArgs {
        id,
        time,
        submission,
    } = args;
    let time = match time {
        Some(millis) => OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
            .with_context(|| format!("invalid time {millis}"))?,
        None => OffsetDateTime::now_utc(),
    };
    let id = MediaFileId::from(id);
    let media_file = scrobbler
        .register(&id, time, submission)
        .await
        .with_context(|| format!("scrobble media file {id}"))?;
    if submission {
        log::info!(
            "Played \"{title}\" {play_count} time(s)",
            title = media_file.title,
            play_count = media_file.play_count
        );
    } else {
        log::info!("Now playing \"{title}\"", title = media_file.title);
    }
    Ok(())
}

async fn set_starred(
    media_files: &MediaFileRepository,
    ids: Vec<String>,
    starred: bool,
) -> anyhow::Result<()> {
    let ids = ids.into_iter().map(MediaFileId::from).collect::<Vec<_>>();
    let count = media_files
        .set_starred(&ids, starred, OffsetDateTime::now_utc())
        .await?;
    if count < ids.len() as u64 {
        log::warn!(
            "MediaFile: Updated {count} of {total} row(s), some IDs are unknown",
            total = ids.len()
        );
    } else {
        log::info!("MediaFile: Updated {count} row(s)");
    }
    Ok(())
}

async fn purge_inactive(pool: &SqlitePool, active_ids_file: &Path) -> anyhow::Result<()> {
    let active_ids = std::fs::read_to_string(active_ids_file).with_context(|| {
        format!(
            "read active IDs from \"{file}\"",
            file = active_ids_file.display()
        )
    })?;
    let active_ids = active_ids
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>();
    log::info!(
        "MediaFile: Purging all but {active_count} active row(s)...",
        active_count = active_ids.len()
    );
    let removed_ids = Repository::<MediaFile>::new(pool.clone())
        .purge_inactive(active_ids.iter().copied(), |id| id)
        .await?;
    for id in &removed_ids {
        log::debug!("MediaFile: Purged {id}");
    }
    log::info!(
        "MediaFile: Purged {removed_count} inactive row(s)",
        removed_count = removed_ids.len()
    );
    Ok(())
}

async fn optimize_database(pool: &SqlitePool) {
    log::info!("Optimizing database...");
    match sonicstore::optimize_database(pool).await {
        Ok(()) => {
            log::info!("Optimized database");
        }
        Err(err) => {
            log::warn!("Failed to optimize database: {err}");
        }
    }
}

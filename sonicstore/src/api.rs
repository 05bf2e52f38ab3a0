// SPDX-FileCopyrightText: The sonicstore authors
// SPDX-License-Identifier: MPL-2.0

//! Request boundary.
//!
//! Validates request parameters, invokes the services, and translates
//! their outcome into responses. Responses never carry error details of
//! the underlying store, those are only logged.

use itertools::Itertools as _;
use serde::{Deserialize, Serialize};
use sqlx::types::time::OffsetDateTime;

use crate::{Error, MediaFile, MediaFileId, MediaFileRepository, Scrobbler};

pub const ERROR_GENERIC: u16 = 0;
pub const ERROR_MISSING_PARAMETER: u16 = 10;
pub const ERROR_DATA_NOT_FOUND: u16 = 70;

const DEFAULT_SEARCH_SIZE: u32 = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiError {
    pub code: u16,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Payload {
    SearchResult(Vec<MediaFile>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Response {
    Ok {
        #[serde(skip_serializing_if = "Option::is_none")]
        payload: Option<Payload>,
    },
    Failed {
        error: ApiError,
    },
}

impl Response {
    #[must_use]
    pub const fn empty() -> Self {
        Self::Ok { payload: None }
    }

    #[must_use]
    pub fn failed(code: u16, message: impl Into<String>) -> Self {
        Self::Failed {
            error: ApiError {
                code,
                message: message.into(),
            },
        }
    }

    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }

    #[must_use]
    pub const fn error_code(&self) -> Option<u16> {
        match self {
            Self::Ok { .. } => None,
            Self::Failed { error } => Some(error.code),
        }
    }

    fn from_error(err: &Error) -> Self {
        match err {
            Error::NotFound => Self::failed(ERROR_DATA_NOT_FOUND, "Data not found"),
            Error::Validation(message) => Self::failed(ERROR_GENERIC, message.as_str()),
            Error::Store(_) => Self::failed(ERROR_GENERIC, "Internal error"),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScrobbleParams {
    pub id: String,
    /// Milliseconds since the UNIX epoch. Defaults to the current time.
    pub time: Option<i64>,
    pub submission: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StarParams {
    pub id: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SetRatingParams {
    pub id: String,
    pub rating: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SearchParams {
    pub query: String,
    pub offset: Option<u32>,
    pub size: Option<u32>,
}

fn required_id(id: String) -> Result<MediaFileId, Response> {
    if id.is_empty() {
        return Err(Response::failed(
            ERROR_MISSING_PARAMETER,
            "Required id parameter is missing",
        ));
    }
    Ok(MediaFileId::from(id))
}

fn time_from_unix_millis(millis: i64) -> Result<OffsetDateTime, Response> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
        .map_err(|_| Response::failed(ERROR_GENERIC, "Invalid time parameter"))
}

#[derive(Debug, Clone)]
pub struct MediaAnnotationController {
    scrobbler: Scrobbler,
    media_files: MediaFileRepository,
}

impl MediaAnnotationController {
    #[must_use]
    pub const fn new(scrobbler: Scrobbler, media_files: MediaFileRepository) -> Self {
        Self {
            scrobbler,
            media_files,
        }
    }

    /// Registers a playback event.
    ///
    /// Now playing notifications are accepted without being registered.
    pub async fn scrobble(&self, params: ScrobbleParams) -> Response {
        let ScrobbleParams {
            id,
            time,
            submission,
        } = params;
        let id = match required_id(id) {
            Ok(id) => id,
            Err(response) => return response,
        };
        let time = match time.map(time_from_unix_millis).transpose() {
            Ok(time) => time.unwrap_or_else(OffsetDateTime::now_utc),
            Err(response) => return response,
        };
        if submission.unwrap_or(false) {
            // Failures have already been logged by the scrobbler.
            if self.scrobbler.register(&id, time, true).await.is_err() {
                return Response::failed(ERROR_GENERIC, "Internal error");
            }
        }
        Response::empty()
    }

    /// Stars all requested media files.
    ///
    /// Fails with "data not found" if some IDs are unknown. All known
    /// media files have been starred nevertheless.
    pub async fn star(&self, params: StarParams) -> Response {
        self.set_starred(params, true).await
    }

    /// Unstars all requested media files.
    ///
    /// Partial updates are reported like for [`Self::star`].
    pub async fn unstar(&self, params: StarParams) -> Response {
        self.set_starred(params, false).await
    }

    async fn set_starred(&self, params: StarParams, starred: bool) -> Response {
        let StarParams { id: ids } = params;
        let ids = ids
            .into_iter()
            .filter(|id| !id.is_empty())
            .unique()
            .map(MediaFileId::from)
            .collect::<Vec<_>>();
        if ids.is_empty() {
            return Response::failed(ERROR_MISSING_PARAMETER, "Required id parameter is missing");
        }
        match self
            .media_files
            .set_starred(&ids, starred, OffsetDateTime::now_utc())
            .await
        {
            Ok(count) if count == ids.len() as u64 => Response::empty(),
            Ok(count) => {
                log::warn!(
                    "Updated only {count} of {total} media file(s) when setting starred = {starred}",
                    total = ids.len()
                );
                Response::from_error(&Error::NotFound)
            }
            Err(err) => {
                log::error!("Failed to set starred = {starred}: {err}");
                Response::from_error(&err)
            }
        }
    }

    pub async fn set_rating(&self, params: SetRatingParams) -> Response {
        let SetRatingParams { id, rating } = params;
        let id = match required_id(id) {
            Ok(id) => id,
            Err(response) => return response,
        };
        let Some(rating) = rating else {
            return Response::failed(
                ERROR_MISSING_PARAMETER,
                "Required rating parameter is missing",
            );
        };
        let Ok(rating) = u8::try_from(rating) else {
            return Response::from_error(&Error::Validation(format!("invalid rating {rating}")));
        };
        match self.media_files.set_rating(&id, rating).await {
            Ok(()) => {
                log::debug!("Rated ({id}) with {rating}");
                Response::empty()
            }
            Err(err) => {
                log::error!("Failed to rate ({id}) with {rating}: {err}");
                Response::from_error(&err)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchingController {
    media_files: MediaFileRepository,
}

impl SearchingController {
    #[must_use]
    pub const fn new(media_files: MediaFileRepository) -> Self {
        Self { media_files }
    }

    pub async fn search(&self, params: SearchParams) -> Response {
        let SearchParams {
            query,
            offset,
            size,
        } = params;
        let offset = offset.unwrap_or(0);
        let size = size.unwrap_or(DEFAULT_SEARCH_SIZE);
        match self.media_files.search(&query, offset, size).await {
            Ok(media_files) => Response::Ok {
                payload: Some(Payload::SearchResult(media_files)),
            },
            Err(err) => {
                log::error!(r#"Failed to search for "{query}": {err}"#);
                Response::from_error(&err)
            }
        }
    }
}

// SPDX-FileCopyrightText: The sonicstore authors
// SPDX-License-Identifier: MPL-2.0

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The requested entity does not exist.
    #[error("not found")]
    NotFound,

    /// Failure of the underlying store.
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    /// Malformed input that has been rejected before touching the store.
    #[error("invalid input: {0}")]
    Validation(String),
}

impl Error {
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

// SPDX-FileCopyrightText: The sonicstore authors
// SPDX-License-Identifier: MPL-2.0

use sqlx::types::time::OffsetDateTime;

use crate::{MediaFile, MediaFileId, MediaFileRepository, Result};

/// Records playback of media files.
///
/// Distinguishes transient "now playing" notifications from submitted
/// scrobbles. Only submissions modify the annotation state.
#[derive(Debug, Clone)]
pub struct Scrobbler {
    media_files: MediaFileRepository,
}

impl Scrobbler {
    #[must_use]
    pub const fn new(media_files: MediaFileRepository) -> Self {
        Self { media_files }
    }

    /// Registers a playback event.
    ///
    /// A submission increments the play count by exactly 1 and sets the play
    /// date to `time`. Otherwise the media file is returned unchanged.
    pub async fn register(
        &self,
        id: &MediaFileId,
        time: OffsetDateTime,
        submission: bool,
    ) -> Result<MediaFile> {
        if !submission {
            // Now playing.
            return self.media_files.get(id).await;
        }
        match self.media_files.record_play(id, time).await {
            Ok(media_file) => {
                log::info!(
                    r#"Scrobbled ({id}) "{title}" at {time}"#,
                    title = media_file.title
                );
                Ok(media_file)
            }
            Err(err) => {
                log::error!("Failed to scrobble ({id}) at {time}: {err}");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use futures_util::future::try_join_all;
    use sqlx::types::time::OffsetDateTime;

    use crate::{MediaFileId, MediaFileRepository, Scrobbler, test_util};

    async fn scrobbler_with(ids: &[&str]) -> Scrobbler {
        let media_files = MediaFileRepository::new(test_util::pool().await);
        for id in ids {
            media_files
                .put(&test_util::media_file(id, "Heart-Shaped Box"))
                .await
                .unwrap();
        }
        Scrobbler::new(media_files)
    }

    fn at(seconds: i64) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(seconds).unwrap()
    }

    #[tokio::test]
    async fn submissions_count_plays() {
        let scrobbler = scrobbler_with(&["1"]).await;
        let id = MediaFileId::new("1");

        let played = scrobbler.register(&id, at(10), true).await.unwrap();
        assert_eq!(played.play_count, 1);
        assert_eq!(played.play_date, Some(at(10)));

        scrobbler.register(&id, at(20), true).await.unwrap();
        let played = scrobbler.register(&id, at(30), true).await.unwrap();
        assert_eq!(played.play_count, 3);
        assert_eq!(played.play_date, Some(at(30)));
    }

    #[tokio::test]
    async fn now_playing_changes_nothing() {
        let scrobbler = scrobbler_with(&["1"]).await;
        let id = MediaFileId::new("1");

        let unplayed = scrobbler.register(&id, at(10), false).await.unwrap();
        assert_eq!(unplayed.play_count, 0);
        assert_eq!(unplayed.play_date, None);

        let played = scrobbler.register(&id, at(20), true).await.unwrap();
        let now_playing = scrobbler.register(&id, at(30), false).await.unwrap();
        assert_eq!(now_playing, played);
    }

    #[tokio::test]
    async fn missing_media_file_is_not_found() {
        let scrobbler = scrobbler_with(&[]).await;
        let id = MediaFileId::new("missing");
        for submission in [false, true] {
            let err = scrobbler
                .register(&id, at(10), submission)
                .await
                .unwrap_err();
            assert!(err.is_not_found());
        }
    }

    #[tokio::test]
    async fn concurrent_submissions_are_not_lost() {
        let scrobbler = scrobbler_with(&["1"]).await;
        let id = MediaFileId::new("1");
        let count = 25;
        try_join_all((1..=count).map(|i| scrobbler.register(&id, at(i), true)))
            .await
            .unwrap();
        let media_file = scrobbler.register(&id, at(0), false).await.unwrap();
        assert_eq!(media_file.play_count, 25);
    }
}

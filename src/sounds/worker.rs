//! Sound worker: plays queued alerts without blocking the dispatcher.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use globewatch_types::{Level, SourceKey};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

use super::{AudioPlayer, PlayedSound, PlayedSounds, SoundsConfig};
use crate::effects::EffectQueue;
use crate::error::ErrorKind;
use crate::notify::{Notification, Notifier};

/// A request to play the alert of a level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoundRequest {
    pub key: SourceKey,
    pub level: Level,
    pub at: DateTime<Utc>,
}

/// Most severe request of a batch; the earliest wins among equals.
fn most_severe(batch: Vec<SoundRequest>) -> Option<SoundRequest> {
    batch.into_iter().fold(None, |best, request| match best {
        Some(current) if current.level >= request.level => Some(current),
        _ => Some(request),
    })
}

/// Spawn the worker draining `queue`.
///
/// Each wake-up drains every pending request and plays only the most
/// severe one, so a lesser alert never cuts off a more serious one.
pub fn spawn_sound_worker(
    queue: Arc<EffectQueue<SoundRequest>>,
    player: Arc<dyn AudioPlayer>,
    sounds: SoundsConfig,
    played: Arc<Mutex<PlayedSounds>>,
    notifier: Notifier,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(batch) = queue.next_batch().await {
            let pending = batch.len();
            let Some(request) = most_severe(batch) else {
                continue;
            };
            if pending > 1 {
                debug!("coalesced {} sound requests into {}", pending, request.level);
            }

            let file = sounds.file_for(request.level);
            match player.play(request.level, file.as_deref()).await {
                Ok(()) => {
                    let record = PlayedSound {
                        at: request.at,
                        level: request.level,
                        key: request.key,
                    };
                    played.lock().record(record.clone());
                    notifier.send(Notification::SoundPlayed(record));
                }
                Err(err) => notifier.report(ErrorKind::Playback, request.key.to_string(), &err),
            }
        }
        debug!("sound worker stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlaybackError;
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};

    #[derive(Debug, Default)]
    struct Recorder {
        played: Mutex<Vec<(Level, Option<PathBuf>)>>,
        fail: bool,
    }

    #[async_trait]
    impl AudioPlayer for Recorder {
        async fn play(&self, level: Level, file: Option<&Path>) -> Result<(), PlaybackError> {
            if self.fail {
                return Err(PlaybackError {
                    level,
                    reason: "no device".to_string(),
                });
            }
            self.played.lock().push((level, file.map(Path::to_path_buf)));
            Ok(())
        }
    }

    fn request(source: &str, level: Level) -> SoundRequest {
        SoundRequest {
            key: SourceKey::new("plant", "temperature", source),
            level,
            at: Utc::now(),
        }
    }

    #[test]
    fn picks_most_severe_then_earliest() {
        let chosen = most_severe(vec![
            request("a", Level::Warning),
            request("b", Level::Critical),
            request("c", Level::Critical),
            request("d", Level::Error),
        ])
        .unwrap();
        assert_eq!(chosen.key.source, "b");
        assert!(most_severe(Vec::new()).is_none());
    }

    #[tokio::test]
    async fn plays_one_sound_per_batch() {
        let queue = Arc::new(EffectQueue::new(16));
        let recorder = Arc::new(Recorder::default());
        let played = Arc::new(Mutex::new(PlayedSounds::default()));
        let notifier = Notifier::new(16);
        let mut rx = notifier.subscribe();

        // Queued before the worker starts, so they arrive as one batch.
        queue.push(request("a", Level::Warning));
        queue.push(request("b", Level::Critical));

        let worker = spawn_sound_worker(
            queue.clone(),
            recorder.clone(),
            SoundsConfig::default(),
            played.clone(),
            notifier,
        );

        match rx.recv().await.unwrap() {
            Notification::SoundPlayed(sound) => {
                assert_eq!(sound.level, Level::Critical);
                assert_eq!(sound.key.source, "b");
            }
            other => panic!("unexpected notification: {:?}", other),
        }

        queue.close();
        worker.await.unwrap();

        let calls = recorder.played.lock().clone();
        assert_eq!(calls, vec![(Level::Critical, Some(PathBuf::from("critical.wav")))]);
        assert_eq!(played.lock().len(), 1);
    }

    #[tokio::test]
    async fn playback_failure_is_reported() {
        let queue = Arc::new(EffectQueue::new(4));
        let recorder = Arc::new(Recorder {
            fail: true,
            ..Default::default()
        });
        let played = Arc::new(Mutex::new(PlayedSounds::default()));
        let notifier = Notifier::new(16);
        let mut rx = notifier.subscribe();

        queue.push(request("a", Level::Error));
        let worker = spawn_sound_worker(
            queue.clone(),
            recorder,
            SoundsConfig::default(),
            played.clone(),
            notifier,
        );

        match rx.recv().await.unwrap() {
            Notification::Error(report) => assert_eq!(report.kind, ErrorKind::Playback),
            other => panic!("unexpected notification: {:?}", other),
        }
        queue.close();
        worker.await.unwrap();
        assert!(played.lock().is_empty());
    }
}

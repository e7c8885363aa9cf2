use std::sync::Arc;
use std::time::Duration;

use backon::{ConstantBuilder, Retryable};
use tokio_util::sync::CancellationToken;

use crate::ports::carrier::CoverCarrier;
use crate::ports::spotify::{CoverImage, SpotifyClient};
use crate::synchronized::SyncError;
use crate::synchronized::definition::SynchronizationDefinition;

/// Bounds for the two places the engine waits on the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverPolicy {
    /// Total upload attempts, the first one included.
    pub upload_attempts: usize,
    pub upload_retry_delay: Duration,
    pub poll_attempts: usize,
    pub poll_interval: Duration,
}

impl Default for CoverPolicy {
    fn default() -> Self {
        Self {
            upload_attempts: 20,
            upload_retry_delay: Duration::from_millis(500),
            poll_attempts: 5,
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// Decides whether an uploaded cover has finished processing on the platform side.
pub trait ReadinessProbe: Send + Sync {
    fn is_ready(&self, cover: &CoverImage) -> bool;
}

/// Spotify reports custom uploads without dimensions once processed, while the
/// intermediate thumbnails carry an explicit height.
///
/// This is an observed heuristic, only verified for the tiny placeholder covers
/// this tool uploads.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsizedCoverProbe;

impl ReadinessProbe for UnsizedCoverProbe {
    fn is_ready(&self, cover: &CoverImage) -> bool {
        cover.height.is_none()
    }
}

/// Writes a definition into a fresh placeholder cover and waits for the platform
/// to settle on it.
pub struct CoverProvisioner<C: SpotifyClient> {
    client: Arc<C>,
    carrier: Arc<dyn CoverCarrier>,
    probe: Arc<dyn ReadinessProbe>,
    policy: CoverPolicy,
}

impl<C: SpotifyClient> CoverProvisioner<C> {
    pub fn new(client: Arc<C>, carrier: Arc<dyn CoverCarrier>, policy: CoverPolicy) -> Self {
        Self {
            client,
            carrier,
            probe: Arc::new(UnsizedCoverProbe),
            policy,
        }
    }

    pub fn with_probe(mut self, probe: Arc<dyn ReadinessProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Uploads a cover carrying `definition` and waits for it to become durable.
    ///
    /// Returns `None` when the upload went through but readiness was not observed
    /// within the poll bound; the playlist then cannot be discovered later.
    #[tracing::instrument(skip(self, definition, cancel))]
    pub async fn provision(
        &self,
        playlist_id: &str,
        definition: &SynchronizationDefinition,
        cancel: &CancellationToken,
    ) -> Result<Option<CoverImage>, SyncError> {
        let payload = definition
            .encode()
            .map_err(|error| SyncError::definition(playlist_id, error))?;
        let image = self.carrier.render(&payload)?;

        self.upload(playlist_id, &image, cancel).await?;
        self.await_ready(playlist_id, cancel).await
    }

    async fn upload(
        &self,
        playlist_id: &str,
        image: &[u8],
        cancel: &CancellationToken,
    ) -> Result<(), SyncError> {
        let client = self.client.as_ref();
        let attempts = self.policy.upload_attempts.max(1);
        let backoff = ConstantBuilder::default()
            .with_delay(self.policy.upload_retry_delay)
            .with_max_times(attempts - 1);

        let upload = (move || async move { client.upload_cover_image(playlist_id, image).await })
            .retry(backoff)
            .when(|error| error.is_transient())
            .notify(|error, delay| {
                tracing::warn!(
                    "Cover upload for {} failed, retrying in {:?}: {}",
                    playlist_id,
                    delay,
                    error
                );
            });

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SyncError::Cancelled),
            result = upload => result,
        };

        match result {
            Ok(()) => {
                tracing::debug!("Uploaded cover for {}", playlist_id);
                Ok(())
            }
            Err(source) if source.is_transient() => Err(SyncError::CoverUploadFailed {
                playlist_id: playlist_id.to_string(),
                attempts,
                source,
            }),
            Err(source) => Err(source.into()),
        }
    }

    /// Polls the cover until the readiness probe accepts it, at most
    /// `poll_attempts` times. Transient fetch failures count as "not ready yet".
    #[tracing::instrument(skip(self, cancel))]
    pub async fn await_ready(
        &self,
        playlist_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<CoverImage>, SyncError> {
        for attempt in 1..=self.policy.poll_attempts {
            match self.client.fetch_cover_image(playlist_id).await {
                Ok(Some(cover)) if self.probe.is_ready(&cover) => {
                    tracing::debug!("Cover of {} ready after {} polls", playlist_id, attempt);
                    return Ok(Some(cover));
                }
                Ok(_) => tracing::debug!("Cover of {} not ready (poll {})", playlist_id, attempt),
                Err(error) if error.is_transient() => {
                    tracing::warn!("Polling cover of {} failed: {}", playlist_id, error)
                }
                Err(error) => return Err(error.into()),
            }

            if attempt < self.policy.poll_attempts {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(SyncError::Cancelled),
                    _ = tokio::time::sleep(self.policy.poll_interval) => {}
                }
            }
        }

        tracing::warn!(
            "Cover of {} not ready after {} polls",
            playlist_id,
            self.policy.poll_attempts
        );
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::jpeg::JpegCarrier;
    use crate::ports::spotify::{ApiError, MockSpotifyClient};

    fn fast_policy(upload_attempts: usize, poll_attempts: usize) -> CoverPolicy {
        CoverPolicy {
            upload_attempts,
            upload_retry_delay: Duration::ZERO,
            poll_attempts,
            poll_interval: Duration::ZERO,
        }
    }

    fn provisioner(client: MockSpotifyClient, policy: CoverPolicy) -> CoverProvisioner<MockSpotifyClient> {
        CoverProvisioner::new(Arc::new(client), Arc::new(JpegCarrier::default()), policy)
    }

    fn sized(url: &str) -> CoverImage {
        CoverImage {
            url: url.into(),
            width: Some(60),
            height: Some(60),
        }
    }

    fn r#unsized(url: &str) -> CoverImage {
        CoverImage {
            url: url.into(),
            width: None,
            height: None,
        }
    }

    fn unavailable() -> ApiError {
        ApiError::UnexpectedStatus {
            status: 503,
            body: "try later".into(),
        }
    }

    #[tokio::test]
    async fn test_provision_uploads_definition_and_waits_for_ready() {
        let uploaded = Arc::new(Mutex::new(Vec::new()));
        let uploaded_clone = uploaded.clone();
        let polls = Arc::new(AtomicUsize::new(0));
        let polls_clone = polls.clone();

        let mut client = MockSpotifyClient::new();
        client
            .expect_upload_cover_image()
            .times(1)
            .returning(move |_, jpeg| {
                *uploaded_clone.lock().unwrap() = jpeg.to_vec();
                Ok(())
            });
        client.expect_fetch_cover_image().returning(move |_| {
            if polls_clone.fetch_add(1, Ordering::SeqCst) < 2 {
                Ok(Some(sized("https://img/thumb")))
            } else {
                Ok(Some(r#unsized("https://img/custom")))
            }
        });

        let definition = SynchronizationDefinition::new(vec!["p1".into()], vec![], vec![]);
        let cover = provisioner(client, fast_policy(3, 5))
            .provision("target", &definition, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(cover.unwrap().url, "https://img/custom");
        assert_eq!(polls.load(Ordering::SeqCst), 3);

        let payload = JpegCarrier::default()
            .extract(&uploaded.lock().unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(SynchronizationDefinition::decode(&payload).unwrap(), definition);
    }

    #[tokio::test]
    async fn test_upload_retries_transient_failures() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let mut client = MockSpotifyClient::new();
        client.expect_upload_cover_image().returning(move |_, _| {
            if calls_clone.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(unavailable())
            } else {
                Ok(())
            }
        });
        client
            .expect_fetch_cover_image()
            .returning(|_| Ok(Some(r#unsized("https://img/custom"))));

        let cover = provisioner(client, fast_policy(5, 1))
            .provision("target", &SynchronizationDefinition::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(cover.is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_upload_gives_up_after_bound() {
        let mut client = MockSpotifyClient::new();
        client
            .expect_upload_cover_image()
            .times(3)
            .returning(|_, _| Err(unavailable()));
        client.expect_fetch_cover_image().never();

        let result = provisioner(client, fast_policy(3, 5))
            .provision("target", &SynchronizationDefinition::default(), &CancellationToken::new())
            .await;

        assert!(matches!(
            result,
            Err(SyncError::CoverUploadFailed { attempts: 3, .. })
        ));
    }

    #[tokio::test]
    async fn test_upload_does_not_retry_auth_failures() {
        let mut client = MockSpotifyClient::new();
        client
            .expect_upload_cover_image()
            .times(1)
            .returning(|_, _| Err(ApiError::AuthRequired));

        let result = provisioner(client, fast_policy(10, 5))
            .provision("target", &SynchronizationDefinition::default(), &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(SyncError::Api(ApiError::AuthRequired))));
    }

    #[tokio::test]
    async fn test_cancelled_upload_stops_retrying() {
        let mut client = MockSpotifyClient::new();
        client
            .expect_upload_cover_image()
            .returning(|_, _| Err(unavailable()));

        let policy = CoverPolicy {
            upload_attempts: usize::MAX,
            upload_retry_delay: Duration::from_millis(10),
            ..fast_policy(1, 1)
        };
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let result = provisioner(client, policy)
            .provision("target", &SynchronizationDefinition::default(), &cancel)
            .await;

        assert!(matches!(result, Err(SyncError::Cancelled)));
    }

    #[tokio::test]
    async fn test_await_ready_is_bounded() {
        let mut client = MockSpotifyClient::new();
        client
            .expect_fetch_cover_image()
            .times(4)
            .returning(|_| Ok(Some(sized("https://img/thumb"))));

        let cover = provisioner(client, fast_policy(1, 4))
            .await_ready("target", &CancellationToken::new())
            .await
            .unwrap();

        assert!(cover.is_none());
    }

    #[tokio::test]
    async fn test_await_ready_tolerates_transient_poll_failures() {
        let polls = Arc::new(AtomicUsize::new(0));
        let polls_clone = polls.clone();

        let mut client = MockSpotifyClient::new();
        client.expect_fetch_cover_image().returning(move |_| {
            match polls_clone.fetch_add(1, Ordering::SeqCst) {
                0 => Err(unavailable()),
                1 => Ok(None),
                _ => Ok(Some(r#unsized("https://img/custom"))),
            }
        });

        let cover = provisioner(client, fast_policy(1, 5))
            .await_ready("target", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(cover.unwrap().url, "https://img/custom");
    }

    #[tokio::test]
    async fn test_custom_probe() {
        struct AnySizeProbe;
        impl ReadinessProbe for AnySizeProbe {
            fn is_ready(&self, _cover: &CoverImage) -> bool {
                true
            }
        }

        let mut client = MockSpotifyClient::new();
        client
            .expect_fetch_cover_image()
            .times(1)
            .returning(|_| Ok(Some(sized("https://img/thumb"))));

        let cover = provisioner(client, fast_policy(1, 5))
            .with_probe(Arc::new(AnySizeProbe))
            .await_ready("target", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(cover.unwrap().url, "https://img/thumb");
    }
}

use std::sync::Arc;

use futures::future::{join_all, try_join_all};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::ports::carrier::CoverCarrier;
use crate::ports::spotify::{ApiError, Playlist, SpotifyClient, Track};
use crate::synchronized::cover::{CoverPolicy, CoverProvisioner, ReadinessProbe};
use crate::synchronized::definition::{DefinitionError, SynchronizationDefinition};
use crate::synchronized::reconcile::reconcile;
use crate::synchronized::{
    PlaylistGroups, SYNCHRONIZED_MARKER, SyncError, SynchronizedPlaylist, is_synchronized,
};

/// A marker playlist whose definition could not be recovered during discovery.
#[derive(Debug)]
pub struct DiscoveryFailure {
    pub playlist: Playlist,
    pub error: SyncError,
}

/// Result of scanning the user's playlists. Failures are per playlist.
#[derive(Debug, Default)]
pub struct Discovery {
    pub playlists: Vec<SynchronizedPlaylist>,
    pub failures: Vec<DiscoveryFailure>,
}

/// Result of resynchronizing one playlist as part of a batch.
#[derive(Debug)]
pub struct SyncOutcome {
    pub playlist: Playlist,
    pub result: Result<usize, SyncError>,
}

#[derive(Debug, Default)]
pub struct SyncReport {
    pub outcomes: Vec<SyncOutcome>,
    /// Playlists skipped because their definition could not be recovered.
    pub skipped: Vec<DiscoveryFailure>,
}

impl SyncReport {
    pub fn failed(&self) -> usize {
        self.skipped.len() + self.outcomes.iter().filter(|o| o.result.is_err()).count()
    }
}

fn track_uris(tracks: Vec<Track>) -> Vec<String> {
    tracks.into_iter().map(|track| track.uri).collect()
}

pub struct SynchronizationService<C: SpotifyClient> {
    client: Arc<C>,
    carrier: Arc<dyn CoverCarrier>,
    provisioner: CoverProvisioner<C>,
}

impl<C: SpotifyClient> SynchronizationService<C> {
    pub fn new(client: Arc<C>, carrier: Arc<dyn CoverCarrier>, policy: CoverPolicy) -> Self {
        let provisioner = CoverProvisioner::new(client.clone(), carrier.clone(), policy);
        Self {
            client,
            carrier,
            provisioner,
        }
    }

    pub fn with_probe(mut self, probe: Arc<dyn ReadinessProbe>) -> Self {
        self.provisioner = self.provisioner.with_probe(probe);
        self
    }

    /// Creates a new synchronized playlist and fills it.
    ///
    /// The cover is provisioned before any tracks are added. If its readiness was not
    /// observed, one more poll is made after populating; failing that the playlist is
    /// returned without a cover url.
    #[instrument(skip(self, groups, cancel))]
    pub async fn create(
        &self,
        name: &str,
        groups: PlaylistGroups,
        cancel: &CancellationToken,
    ) -> Result<SynchronizedPlaylist, SyncError> {
        let mut playlist = self
            .client
            .create_playlist(name, SYNCHRONIZED_MARKER)
            .await?;
        tracing::info!("Created playlist {}", playlist);

        let mut cover = self
            .provisioner
            .provision(&playlist.id, &groups.definition(), cancel)
            .await?;

        let uris = track_uris(reconcile(self.client.as_ref(), &groups).await?);
        self.client.add_tracks(&playlist.id, &uris).await?;
        tracing::info!("Added {} tracks to {}", uris.len(), playlist);

        if cover.is_none() {
            match self.provisioner.await_ready(&playlist.id, cancel).await {
                Ok(ready) => cover = ready,
                Err(error) => tracing::warn!("Could not confirm cover of {}: {}", playlist, error),
            }
        }
        if cover.is_none() {
            tracing::warn!(
                "Cover of {} is not confirmed, it will not be discoverable until it is",
                playlist
            );
        }
        playlist.cover = cover;

        Ok(SynchronizedPlaylist { playlist, groups })
    }

    /// Finds every synchronized playlist the user owns and recovers its definition.
    ///
    /// Only listing the playlists can fail the whole call; problems with a single
    /// playlist end up in [`Discovery::failures`].
    #[instrument(skip(self))]
    pub async fn discover(&self) -> Result<Discovery, SyncError> {
        let candidates: Vec<Playlist> = self
            .client
            .list_owned_playlists()
            .await?
            .into_iter()
            .filter(is_synchronized)
            .collect();
        tracing::debug!("Found {} synchronized playlist candidates", candidates.len());

        let results = join_all(candidates.into_iter().map(|playlist| async move {
            let result = self.materialize(&playlist).await;
            (playlist, result)
        }))
        .await;

        let mut discovery = Discovery::default();
        for (playlist, result) in results {
            match result {
                Ok(groups) => discovery
                    .playlists
                    .push(SynchronizedPlaylist { playlist, groups }),
                Err(error) => {
                    tracing::warn!("Skipping {}: {}", playlist, error);
                    discovery.failures.push(DiscoveryFailure { playlist, error });
                }
            }
        }

        Ok(discovery)
    }

    /// Recomputes the track list and overwrites the playlist with it.
    #[instrument(skip(self, synchronized), fields(playlist_id = %synchronized.playlist.id))]
    pub async fn resynchronize(
        &self,
        synchronized: &SynchronizedPlaylist,
    ) -> Result<usize, SyncError> {
        let uris = track_uris(reconcile(self.client.as_ref(), &synchronized.groups).await?);
        self.client
            .replace_tracks(&synchronized.playlist.id, &uris)
            .await?;
        tracing::info!("Synchronized {} with {} tracks", synchronized.playlist, uris.len());

        Ok(uris.len())
    }

    /// Resynchronizes a single playlist by id. Unlike discovery, an unreadable
    /// definition is an error here.
    #[instrument(skip(self))]
    pub async fn resynchronize_by_id(
        &self,
        playlist_id: &str,
    ) -> Result<(SynchronizedPlaylist, usize), SyncError> {
        let playlist = self.client.get_playlist(playlist_id).await?;
        if !is_synchronized(&playlist) {
            return Err(SyncError::NotSynchronized {
                playlist_id: playlist_id.to_string(),
            });
        }

        let groups = self.materialize(&playlist).await?;
        let synchronized = SynchronizedPlaylist { playlist, groups };
        let count = self.resynchronize(&synchronized).await?;

        Ok((synchronized, count))
    }

    /// Discovers and resynchronizes every synchronized playlist, one after the other.
    #[instrument(skip(self))]
    pub async fn resynchronize_all(&self) -> Result<SyncReport, SyncError> {
        let discovery = self.discover().await?;

        let mut outcomes = Vec::with_capacity(discovery.playlists.len());
        for synchronized in &discovery.playlists {
            let result = self.resynchronize(synchronized).await;
            if let Err(error) = &result {
                tracing::error!("Failed to synchronize {}: {}", synchronized.playlist, error);
            }
            outcomes.push(SyncOutcome {
                playlist: synchronized.playlist.clone(),
                result,
            });
        }

        Ok(SyncReport {
            outcomes,
            skipped: discovery.failures,
        })
    }

    /// Deletes (unfollows) a playlist, refusing ones this tool does not manage.
    #[instrument(skip(self))]
    pub async fn delete(&self, playlist_id: &str) -> Result<Playlist, SyncError> {
        let playlist = self.client.get_playlist(playlist_id).await?;
        if playlist.description != SYNCHRONIZED_MARKER {
            return Err(SyncError::NotSynchronized {
                playlist_id: playlist_id.to_string(),
            });
        }

        self.client.unfollow_playlist(playlist_id).await?;
        tracing::info!("Deleted {}", playlist);
        Ok(playlist)
    }

    /// Reads the definition from the playlist's cover and resolves its playlists.
    async fn materialize(&self, playlist: &Playlist) -> Result<PlaylistGroups, SyncError> {
        let definition = self.read_definition(playlist).await?;
        Ok(self.resolve(&definition).await?)
    }

    async fn read_definition(
        &self,
        playlist: &Playlist,
    ) -> Result<SynchronizationDefinition, SyncError> {
        let cover_url = playlist
            .cover_url()
            .ok_or_else(|| SyncError::definition(&playlist.id, DefinitionError::NotFound))?;
        let image = self.client.fetch_image_bytes(cover_url).await?;

        let payload = self
            .carrier
            .extract(&image)
            .map_err(|error| {
                SyncError::definition(&playlist.id, DefinitionError::Corrupt(error.to_string()))
            })?
            .ok_or_else(|| SyncError::definition(&playlist.id, DefinitionError::NotFound))?;

        SynchronizationDefinition::decode(&payload)
            .map_err(|error| SyncError::definition(&playlist.id, error))
    }

    /// Resolves every id of a definition, concurrently and in order.
    pub async fn resolve(
        &self,
        definition: &SynchronizationDefinition,
    ) -> Result<PlaylistGroups, ApiError> {
        let (included, excluded, required) = tokio::try_join!(
            self.resolve_group(&definition.included),
            self.resolve_group(&definition.excluded),
            self.resolve_group(&definition.required),
        )?;

        Ok(PlaylistGroups {
            included,
            excluded,
            required,
        })
    }

    async fn resolve_group(&self, ids: &[String]) -> Result<Vec<Playlist>, ApiError> {
        try_join_all(ids.iter().map(|id| self.client.get_playlist(id))).await
    }
}

//! Derives the track list of a synchronized playlist from its playlist groups.

use std::collections::HashSet;

use futures::future::try_join_all;

use crate::ports::spotify::{ApiError, Playlist, SpotifyClient, Track};
use crate::synchronized::PlaylistGroups;

/// Applies the set algebra to already fetched tracks.
///
/// `included` is deduplicated by URI keeping first occurrences, then anything in
/// `excluded` is dropped. `required` of `None` means there is no intersection
/// constraint, which is different from intersecting with an empty set.
pub fn filter_tracks(
    included: Vec<Track>,
    excluded: &[Track],
    required: Option<&[Track]>,
) -> Vec<Track> {
    let mut seen = HashSet::new();
    let excluded: HashSet<&str> = excluded.iter().map(|track| track.uri.as_str()).collect();
    let required: Option<HashSet<&str>> =
        required.map(|tracks| tracks.iter().map(|track| track.uri.as_str()).collect());

    included
        .into_iter()
        .filter(|track| seen.insert(track.uri.clone()))
        .filter(|track| !excluded.contains(track.uri.as_str()))
        .filter(|track| {
            required
                .as_ref()
                .is_none_or(|required| required.contains(track.uri.as_str()))
        })
        .collect()
}

/// Tracks of every playlist, concatenated in playlist order. Fetches run
/// concurrently and the first failure fails the whole group.
async fn tracks_of<C: SpotifyClient + ?Sized>(
    client: &C,
    playlists: &[Playlist],
) -> Result<Vec<Track>, ApiError> {
    let per_playlist = try_join_all(
        playlists
            .iter()
            .map(|playlist| client.get_tracks(&playlist.id)),
    )
    .await?;
    Ok(per_playlist.into_iter().flatten().collect())
}

/// Fetches every group and computes the final ordered track list.
///
/// There is no best-effort mode: if any constituent playlist cannot be read the
/// whole run fails, so an outage is never mistaken for an empty result.
#[tracing::instrument(skip_all, fields(
    included = groups.included.len(),
    excluded = groups.excluded.len(),
    required = groups.required.len(),
))]
pub async fn reconcile<C: SpotifyClient + ?Sized>(
    client: &C,
    groups: &PlaylistGroups,
) -> Result<Vec<Track>, ApiError> {
    let (included, excluded, required) = tokio::try_join!(
        tracks_of(client, &groups.included),
        tracks_of(client, &groups.excluded),
        async {
            if groups.required.is_empty() {
                Ok(None)
            } else {
                tracks_of(client, &groups.required).await.map(Some)
            }
        },
    )?;

    let fetched = included.len();
    let tracks = filter_tracks(included, &excluded, required.as_deref());
    tracing::debug!("Reconciled {} fetched tracks down to {}", fetched, tracks.len());

    Ok(tracks)
}

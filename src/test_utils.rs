use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::ports::spotify::{ApiError, CoverImage, Playlist, SpotifyClient, SpotifyUser, Track};
use crate::synchronized::SYNCHRONIZED_MARKER;

pub fn uri(id: &str) -> String {
    format!("spotify:track:{}", id)
}

#[derive(Default)]
struct FakeState {
    playlists: Vec<Playlist>,
    tracks: HashMap<String, Vec<Track>>,
    images: HashMap<String, Vec<u8>>,
    cover_polls: HashMap<String, usize>,
    hidden_tracks: HashSet<String>,
    polls_until_ready: usize,
    failing_uploads: usize,
    uploads: usize,
    next_id: usize,
}

impl FakeState {
    fn playlist_mut(&mut self, playlist_id: &str) -> Result<&mut Playlist, ApiError> {
        self.playlists
            .iter_mut()
            .find(|playlist| playlist.id == playlist_id)
            .ok_or_else(|| unavailable(playlist_id))
    }
}

fn unavailable(playlist_id: &str) -> ApiError {
    ApiError::PlaylistUnavailable {
        playlist_id: playlist_id.to_string(),
    }
}

fn to_tracks(uris: &[String]) -> Vec<Track> {
    uris.iter()
        .map(|uri| Track {
            uri: uri.clone(),
            name: uri.trim_start_matches("spotify:track:").to_string(),
        })
        .collect()
}

/// In-memory stand-in for the Spotify platform, owned by a single fake user.
///
/// Uploaded covers are stored byte for byte. Polling a cover reports a sized
/// thumbnail until `polls_until_ready` polls have been made for that playlist.
#[derive(Default)]
pub struct FakeSpotify {
    state: Mutex<FakeState>,
}

impl FakeSpotify {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_playlist(&self, id: &str, name: &str, track_ids: &[&str]) {
        self.add_playlist_with_description(id, name, "");
        self.set_tracks(id, track_ids);
    }

    pub fn add_playlist_with_description(&self, id: &str, name: &str, description: &str) {
        self.state.lock().unwrap().playlists.push(Playlist {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            cover: None,
            spotify_url: Some(format!("https://open.spotify.com/playlist/{}", id)),
        });
    }

    /// Adds a marker playlist whose cover is exactly `image`, valid or not.
    pub fn add_synchronized_playlist(&self, id: &str, image: Vec<u8>) {
        self.add_playlist_with_description(id, id, SYNCHRONIZED_MARKER);
        let mut state = self.state.lock().unwrap();
        let url = format!("https://fake.image/{}/seeded", id);
        state.images.insert(url.clone(), image);
        if let Ok(playlist) = state.playlist_mut(id) {
            playlist.cover = Some(CoverImage {
                url,
                width: None,
                height: None,
            });
        }
    }

    pub fn set_tracks(&self, playlist_id: &str, track_ids: &[&str]) {
        let uris: Vec<String> = track_ids.iter().map(|id| uri(id)).collect();
        self.state
            .lock()
            .unwrap()
            .tracks
            .insert(playlist_id.to_string(), to_tracks(&uris));
    }

    pub fn remove_playlist(&self, playlist_id: &str) {
        let mut state = self.state.lock().unwrap();
        state.playlists.retain(|playlist| playlist.id != playlist_id);
        state.tracks.remove(playlist_id);
    }

    /// The playlist stays visible but reading its tracks fails.
    pub fn hide_tracks(&self, playlist_id: &str) {
        self.state
            .lock()
            .unwrap()
            .hidden_tracks
            .insert(playlist_id.to_string());
    }

    pub fn set_polls_until_ready(&self, polls: usize) {
        self.state.lock().unwrap().polls_until_ready = polls;
    }

    /// The next `count` uploads fail with a 503.
    pub fn fail_next_uploads(&self, count: usize) {
        self.state.lock().unwrap().failing_uploads = count;
    }

    pub fn uploads(&self) -> usize {
        self.state.lock().unwrap().uploads
    }

    pub fn track_uris(&self, playlist_id: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .tracks
            .get(playlist_id)
            .map(|tracks| tracks.iter().map(|track| track.uri.clone()).collect())
            .unwrap_or_default()
    }

    pub fn cover_bytes(&self, playlist_id: &str) -> Option<Vec<u8>> {
        let state = self.state.lock().unwrap();
        let playlist = state.playlists.iter().find(|p| p.id == playlist_id)?;
        let url = &playlist.cover.as_ref()?.url;
        state.images.get(url).cloned()
    }

    pub fn cover_polls(&self, playlist_id: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .cover_polls
            .get(playlist_id)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl SpotifyClient for FakeSpotify {
    async fn current_user(&self) -> Result<SpotifyUser, ApiError> {
        Ok(SpotifyUser {
            id: "fake-user".to_string(),
            display_name: Some("Fake User".to_string()),
        })
    }

    async fn list_owned_playlists(&self) -> Result<Vec<Playlist>, ApiError> {
        Ok(self.state.lock().unwrap().playlists.clone())
    }

    async fn get_playlist(&self, playlist_id: &str) -> Result<Playlist, ApiError> {
        let mut state = self.state.lock().unwrap();
        let playlist = state.playlist_mut(playlist_id)?.clone();
        Ok(playlist)
    }

    async fn create_playlist(&self, name: &str, description: &str) -> Result<Playlist, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("created{}", state.next_id);
        let playlist = Playlist {
            id: id.clone(),
            name: name.to_string(),
            description: description.to_string(),
            cover: None,
            spotify_url: Some(format!("https://open.spotify.com/playlist/{}", id)),
        };
        state.playlists.push(playlist.clone());
        state.tracks.insert(id, Vec::new());
        Ok(playlist)
    }

    async fn unfollow_playlist(&self, playlist_id: &str) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        state.playlist_mut(playlist_id)?;
        state.playlists.retain(|playlist| playlist.id != playlist_id);
        Ok(())
    }

    async fn get_tracks(&self, playlist_id: &str) -> Result<Vec<Track>, ApiError> {
        let state = self.state.lock().unwrap();
        if state.hidden_tracks.contains(playlist_id) {
            return Err(unavailable(playlist_id));
        }
        state
            .tracks
            .get(playlist_id)
            .cloned()
            .ok_or_else(|| unavailable(playlist_id))
    }

    async fn add_tracks(&self, playlist_id: &str, uris: &[String]) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        state.playlist_mut(playlist_id)?;
        state
            .tracks
            .entry(playlist_id.to_string())
            .or_default()
            .extend(to_tracks(uris));
        Ok(())
    }

    async fn replace_tracks(&self, playlist_id: &str, uris: &[String]) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        state.playlist_mut(playlist_id)?;
        state
            .tracks
            .insert(playlist_id.to_string(), to_tracks(uris));
        Ok(())
    }

    async fn upload_cover_image(&self, playlist_id: &str, jpeg: &[u8]) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        if state.failing_uploads > 0 {
            state.failing_uploads -= 1;
            return Err(ApiError::UnexpectedStatus {
                status: 503,
                body: "upload failed".to_string(),
            });
        }

        state.uploads += 1;
        let url = format!("https://fake.image/{}/{}", playlist_id, state.uploads);
        state.playlist_mut(playlist_id)?.cover = Some(CoverImage {
            url: url.clone(),
            width: None,
            height: None,
        });
        state.images.insert(url, jpeg.to_vec());
        Ok(())
    }

    async fn fetch_cover_image(&self, playlist_id: &str) -> Result<Option<CoverImage>, ApiError> {
        let mut state = self.state.lock().unwrap();
        let cover = state.playlist_mut(playlist_id)?.cover.clone();
        let polls_until_ready = state.polls_until_ready;
        let polls = state
            .cover_polls
            .entry(playlist_id.to_string())
            .or_default();
        *polls += 1;

        if *polls > polls_until_ready {
            return Ok(cover);
        }
        Ok(cover.map(|cover| CoverImage {
            url: format!("{}/thumbnail", cover.url),
            width: Some(60),
            height: Some(60),
        }))
    }

    async fn fetch_image_bytes(&self, url: &str) -> Result<Vec<u8>, ApiError> {
        self.state
            .lock()
            .unwrap()
            .images
            .get(url)
            .cloned()
            .ok_or_else(|| ApiError::UnexpectedStatus {
                status: 404,
                body: format!("no image at {}", url),
            })
    }
}

use serde::{Deserialize, Serialize};

use crate::ports::spotify::{CoverImage, Playlist, SpotifyUser, Track};

/// Spotify OAuth token response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyTokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Spotify user profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyUserResponse {
    pub id: String,
    pub display_name: Option<String>,
}

impl From<SpotifyUserResponse> for SpotifyUser {
    fn from(user: SpotifyUserResponse) -> Self {
        Self {
            id: user.id,
            display_name: user.display_name,
        }
    }
}

/// Image object, width and height are null for images that were not resized
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyImage {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl From<SpotifyImage> for CoverImage {
    fn from(image: SpotifyImage) -> Self {
        Self {
            url: image.url,
            width: image.width,
            height: image.height,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyExternalUrls {
    pub spotify: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyOwner {
    pub id: String,
}

/// Spotify playlist from API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyPlaylistResponse {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub images: Option<Vec<SpotifyImage>>,
    pub external_urls: Option<SpotifyExternalUrls>,
    pub owner: SpotifyOwner,
}

impl From<SpotifyPlaylistResponse> for Playlist {
    fn from(playlist: SpotifyPlaylistResponse) -> Self {
        // The platform lists its generated sizes first; the cover we care about is last.
        let cover = playlist
            .images
            .and_then(|images| images.into_iter().last())
            .map(CoverImage::from);
        Self {
            id: playlist.id,
            name: playlist.name,
            description: playlist.description.unwrap_or_default(),
            cover,
            spotify_url: playlist.external_urls.and_then(|urls| urls.spotify),
        }
    }
}

/// A page of a paginated listing, `next` is an absolute url
#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyPage<T> {
    pub items: Vec<T>,
    pub next: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyPlaylistItem {
    pub track: Option<SpotifyTrackResponse>,
}

/// Spotify track (or episode) from a playlist listing
#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyTrackResponse {
    #[serde(default)]
    pub uri: Option<String>,
    pub name: String,
}

impl SpotifyTrackResponse {
    pub fn into_track(self) -> Option<Track> {
        let uri = self.uri.filter(|uri| !uri.is_empty())?;
        Some(Track {
            uri,
            name: self.name,
        })
    }
}

/// PKCE OAuth session data
#[derive(Debug, Clone)]
pub struct OAuthSession {
    pub code_verifier: String,
    pub state: String,
}

/// Response for authentication initiation
#[derive(Debug, Clone)]
pub struct SpotifyAuthResponse {
    pub auth_url: String,
    pub state: String,
}

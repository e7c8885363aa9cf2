use std::fmt;

/// Cover image of a playlist as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverImage {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Decoupled representation of a Spotify playlist from the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Playlist {
    pub id: String,
    pub name: String,
    pub description: String,
    pub cover: Option<CoverImage>,
    pub spotify_url: Option<String>,
}

impl Playlist {
    pub fn cover_url(&self) -> Option<&str> {
        self.cover.as_ref().map(|cover| cover.url.as_str())
    }
}

/// Decoupled representation of a Spotify track. Identity is the URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub uri: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpotifyUser {
    pub id: String,
    pub display_name: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("No valid Spotify credentials, run `synced-playlists auth login`")]
    AuthRequired,
    #[error("Spotify denied access to this resource")]
    AccessDenied,
    #[error("Playlist {playlist_id} is unavailable (deleted or inaccessible)")]
    PlaylistUnavailable { playlist_id: String },
    #[error("Failed to send http request: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Invalid request url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Spotify responded with {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },
    #[error("Failed to parse Spotify response: {0}")]
    InvalidResponse(String),
}

impl ApiError {
    /// Failures worth retrying at the few places the engine retries at all.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Network(_) => true,
            ApiError::UnexpectedStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Port trait wrapping the Spotify API capabilities used by the synchronization engine.
///
/// Implementations live in `services::spotify::client` (production) or test fakes.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait SpotifyClient: Send + Sync {
    async fn current_user(&self) -> Result<SpotifyUser, ApiError>;

    /// Every playlist owned by the current user, all pages.
    async fn list_owned_playlists(&self) -> Result<Vec<Playlist>, ApiError>;

    async fn get_playlist(&self, playlist_id: &str) -> Result<Playlist, ApiError>;

    async fn create_playlist(&self, name: &str, description: &str) -> Result<Playlist, ApiError>;

    async fn unfollow_playlist(&self, playlist_id: &str) -> Result<(), ApiError>;

    /// Every track of a playlist in platform order, all pages.
    async fn get_tracks(&self, playlist_id: &str) -> Result<Vec<Track>, ApiError>;

    /// Appends tracks, chunked to the platform's per-call limit.
    async fn add_tracks(&self, playlist_id: &str, uris: &[String]) -> Result<(), ApiError>;

    /// Clears the playlist and then adds `uris` in order.
    async fn replace_tracks(&self, playlist_id: &str, uris: &[String]) -> Result<(), ApiError>;

    /// Uploads raw JPEG bytes as the playlist cover.
    async fn upload_cover_image(&self, playlist_id: &str, jpeg: &[u8]) -> Result<(), ApiError>;

    async fn fetch_cover_image(&self, playlist_id: &str) -> Result<Option<CoverImage>, ApiError>;

    async fn fetch_image_bytes(&self, url: &str) -> Result<Vec<u8>, ApiError>;
}

/// Supplies a currently valid access token for each API call.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String, ApiError>;
}

impl fmt::Display for Playlist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

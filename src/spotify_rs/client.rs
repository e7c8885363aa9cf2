use std::time::Duration;

use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use crate::ports::spotify::{ApiError, Track};
use crate::spotify_rs::types::{
    SpotifyImage, SpotifyPage, SpotifyPlaylistItem, SpotifyPlaylistResponse, SpotifyUserResponse,
};

pub const SPOTIFY_API_BASE: &str = "https://api.spotify.com/v1/";

/// The platform rejects more than this many URIs in a single add request.
pub const MAX_URIS_PER_REQUEST: usize = 100;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Spotify Web API client. Every call takes the bearer token to use.
#[derive(Debug, Clone)]
pub struct SpotifyWebApi {
    client: reqwest::Client,
    api_base: Url,
}

/// Maps a non-success response to an [`ApiError`]. A 404 on a playlist resource
/// means the playlist was deleted or is not visible to this user.
async fn check_status(response: Response, playlist_id: Option<&str>) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match (status, playlist_id) {
        (StatusCode::UNAUTHORIZED, _) => Err(ApiError::AuthRequired),
        (StatusCode::FORBIDDEN, _) => Err(ApiError::AccessDenied),
        (StatusCode::NOT_FOUND, Some(playlist_id)) => Err(ApiError::PlaylistUnavailable {
            playlist_id: playlist_id.to_string(),
        }),
        _ => Err(ApiError::UnexpectedStatus {
            status: status.as_u16(),
            body: response
                .text()
                .await
                .unwrap_or("Failed to get error text".to_string()),
        }),
    }
}

async fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    response
        .json()
        .await
        .map_err(|error| ApiError::InvalidResponse(error.to_string()))
}

fn playlist_path(playlist_id: &str, rest: &str) -> String {
    format!("playlists/{}{}", urlencoding::encode(playlist_id), rest)
}

impl SpotifyWebApi {
    pub fn new(api_base: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base,
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.api_base.join(path)?)
    }

    /// Get the current user's profile
    pub async fn get_current_user(&self, access_token: &str) -> Result<SpotifyUserResponse, ApiError> {
        let response = self
            .client
            .get(self.endpoint("me")?)
            .bearer_auth(access_token)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        parse_json(check_status(response, None).await?).await
    }

    /// Follows `next` links until the listing is exhausted.
    async fn get_all_pages<T: DeserializeOwned>(
        &self,
        access_token: &str,
        first: Url,
        playlist_id: Option<&str>,
    ) -> Result<Vec<T>, ApiError> {
        let mut items = Vec::new();
        let mut next_url = Some(first.to_string());

        while let Some(url) = next_url {
            let response = self
                .client
                .get(&url)
                .bearer_auth(access_token)
                .timeout(REQUEST_TIMEOUT)
                .send()
                .await?;

            let page: SpotifyPage<T> = parse_json(check_status(response, playlist_id).await?).await?;
            items.extend(page.items);
            next_url = page.next;
        }

        Ok(items)
    }

    /// Get all playlists in the current user's library, owned or followed
    pub async fn get_user_playlists(
        &self,
        access_token: &str,
    ) -> Result<Vec<SpotifyPlaylistResponse>, ApiError> {
        let mut first = self.endpoint("me/playlists")?;
        first.query_pairs_mut().append_pair("limit", "50");
        self.get_all_pages(access_token, first, None).await
    }

    pub async fn get_playlist(
        &self,
        access_token: &str,
        playlist_id: &str,
    ) -> Result<SpotifyPlaylistResponse, ApiError> {
        let response = self
            .client
            .get(self.endpoint(&playlist_path(playlist_id, ""))?)
            .bearer_auth(access_token)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        parse_json(check_status(response, Some(playlist_id)).await?).await
    }

    /// Creates a private playlist owned by `user_id`
    pub async fn create_playlist(
        &self,
        access_token: &str,
        user_id: &str,
        name: &str,
        description: &str,
    ) -> Result<SpotifyPlaylistResponse, ApiError> {
        let url = self.endpoint(&format!("users/{}/playlists", urlencoding::encode(user_id)))?;
        let response = self
            .client
            .post(url)
            .bearer_auth(access_token)
            .timeout(REQUEST_TIMEOUT)
            .json(&serde_json::json!({
                "name": name,
                "public": false,
                "description": description,
            }))
            .send()
            .await?;

        parse_json(check_status(response, None).await?).await
    }

    /// Removes the playlist from the user's library, which is how the platform deletes it
    pub async fn unfollow_playlist(&self, access_token: &str, playlist_id: &str) -> Result<(), ApiError> {
        let response = self
            .client
            .delete(self.endpoint(&playlist_path(playlist_id, "/followers"))?)
            .bearer_auth(access_token)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        check_status(response, Some(playlist_id)).await?;
        Ok(())
    }

    /// Get all tracks in a playlist. Items without a URI (removed or local files) are skipped.
    pub async fn get_playlist_tracks(
        &self,
        access_token: &str,
        playlist_id: &str,
    ) -> Result<Vec<Track>, ApiError> {
        let mut first = self.endpoint(&playlist_path(playlist_id, "/tracks"))?;
        first.query_pairs_mut().append_pair("limit", "100");

        let items: Vec<SpotifyPlaylistItem> = self
            .get_all_pages(access_token, first, Some(playlist_id))
            .await?;

        Ok(items
            .into_iter()
            .filter_map(|item| item.track)
            .filter_map(|track| track.into_track())
            .collect())
    }

    /// Appends tracks in order, one request per chunk of [`MAX_URIS_PER_REQUEST`]
    pub async fn add_tracks(
        &self,
        access_token: &str,
        playlist_id: &str,
        uris: &[String],
    ) -> Result<(), ApiError> {
        let url = self.endpoint(&playlist_path(playlist_id, "/tracks"))?;
        for chunk in uris.chunks(MAX_URIS_PER_REQUEST) {
            let response = self
                .client
                .post(url.clone())
                .bearer_auth(access_token)
                .timeout(REQUEST_TIMEOUT)
                .json(&serde_json::json!({ "uris": chunk }))
                .send()
                .await?;

            check_status(response, Some(playlist_id)).await?;
        }
        Ok(())
    }

    /// Removes every track from the playlist
    pub async fn clear_tracks(&self, access_token: &str, playlist_id: &str) -> Result<(), ApiError> {
        let response = self
            .client
            .put(self.endpoint(&playlist_path(playlist_id, "/tracks"))?)
            .bearer_auth(access_token)
            .timeout(REQUEST_TIMEOUT)
            .json(&serde_json::json!({ "uris": [] }))
            .send()
            .await?;

        check_status(response, Some(playlist_id)).await?;
        Ok(())
    }

    /// Uploads a base64 encoded JPEG as the playlist cover. The platform answers
    /// 202 and processes the image asynchronously.
    pub async fn upload_cover_image(
        &self,
        access_token: &str,
        playlist_id: &str,
        jpeg_base64: String,
    ) -> Result<(), ApiError> {
        let response = self
            .client
            .put(self.endpoint(&playlist_path(playlist_id, "/images"))?)
            .bearer_auth(access_token)
            .timeout(REQUEST_TIMEOUT)
            .header(reqwest::header::CONTENT_TYPE, "image/jpeg")
            .body(jpeg_base64)
            .send()
            .await?;

        check_status(response, Some(playlist_id)).await?;
        Ok(())
    }

    pub async fn get_cover_images(
        &self,
        access_token: &str,
        playlist_id: &str,
    ) -> Result<Vec<SpotifyImage>, ApiError> {
        let response = self
            .client
            .get(self.endpoint(&playlist_path(playlist_id, "/images"))?)
            .bearer_auth(access_token)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        // A playlist without a cover may answer with a null body
        let images: Option<Vec<SpotifyImage>> =
            parse_json(check_status(response, Some(playlist_id)).await?).await?;
        Ok(images.unwrap_or_default())
    }

    /// Downloads an image from the CDN, no credentials are sent
    pub async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, ApiError> {
        let response = self
            .client
            .get(url)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        let bytes = check_status(response, None).await?.bytes().await?;
        Ok(bytes.to_vec())
    }
}

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::ports::spotify::{
    ApiError, CoverImage, Playlist, SpotifyClient, SpotifyUser, TokenProvider, Track,
};
use crate::spotify_rs::client::SpotifyWebApi;

/// Production [`SpotifyClient`]: the raw Web API plus a token provider consulted on every call.
pub struct SpotifyHttpAdapter<T: TokenProvider> {
    api: SpotifyWebApi,
    tokens: T,
}

impl<T: TokenProvider> SpotifyHttpAdapter<T> {
    pub fn new(api: SpotifyWebApi, tokens: T) -> Self {
        Self { api, tokens }
    }
}

#[async_trait::async_trait]
impl<T: TokenProvider> SpotifyClient for SpotifyHttpAdapter<T> {
    async fn current_user(&self) -> Result<SpotifyUser, ApiError> {
        let token = self.tokens.access_token().await?;
        Ok(self.api.get_current_user(&token).await?.into())
    }

    async fn list_owned_playlists(&self) -> Result<Vec<Playlist>, ApiError> {
        let token = self.tokens.access_token().await?;
        let user = self.api.get_current_user(&token).await?;
        let playlists = self.api.get_user_playlists(&token).await?;

        Ok(playlists
            .into_iter()
            .filter(|playlist| playlist.owner.id == user.id)
            .map(Playlist::from)
            .collect())
    }

    async fn get_playlist(&self, playlist_id: &str) -> Result<Playlist, ApiError> {
        let token = self.tokens.access_token().await?;
        Ok(self.api.get_playlist(&token, playlist_id).await?.into())
    }

    async fn create_playlist(&self, name: &str, description: &str) -> Result<Playlist, ApiError> {
        let token = self.tokens.access_token().await?;
        let user = self.api.get_current_user(&token).await?;
        Ok(self
            .api
            .create_playlist(&token, &user.id, name, description)
            .await?
            .into())
    }

    async fn unfollow_playlist(&self, playlist_id: &str) -> Result<(), ApiError> {
        let token = self.tokens.access_token().await?;
        self.api.unfollow_playlist(&token, playlist_id).await
    }

    async fn get_tracks(&self, playlist_id: &str) -> Result<Vec<Track>, ApiError> {
        let token = self.tokens.access_token().await?;
        self.api.get_playlist_tracks(&token, playlist_id).await
    }

    async fn add_tracks(&self, playlist_id: &str, uris: &[String]) -> Result<(), ApiError> {
        let token = self.tokens.access_token().await?;
        self.api.add_tracks(&token, playlist_id, uris).await
    }

    async fn replace_tracks(&self, playlist_id: &str, uris: &[String]) -> Result<(), ApiError> {
        let token = self.tokens.access_token().await?;
        self.api.clear_tracks(&token, playlist_id).await?;
        self.api.add_tracks(&token, playlist_id, uris).await
    }

    async fn upload_cover_image(&self, playlist_id: &str, jpeg: &[u8]) -> Result<(), ApiError> {
        let token = self.tokens.access_token().await?;
        self.api
            .upload_cover_image(&token, playlist_id, STANDARD.encode(jpeg))
            .await
    }

    async fn fetch_cover_image(&self, playlist_id: &str) -> Result<Option<CoverImage>, ApiError> {
        let token = self.tokens.access_token().await?;
        let images = self.api.get_cover_images(&token, playlist_id).await?;
        Ok(images.into_iter().last().map(CoverImage::from))
    }

    async fn fetch_image_bytes(&self, url: &str) -> Result<Vec<u8>, ApiError> {
        self.api.fetch_image(url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::spotify::MockTokenProvider;
    use url::Url;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter_for(server: &MockServer) -> SpotifyHttpAdapter<MockTokenProvider> {
        let mut tokens = MockTokenProvider::new();
        tokens
            .expect_access_token()
            .returning(|| Ok("token".to_string()));
        let base = Url::parse(&format!("{}/v1/", server.uri())).unwrap();
        SpotifyHttpAdapter::new(SpotifyWebApi::new(base), tokens)
    }

    #[tokio::test]
    async fn test_list_owned_playlists_filters_followed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/me"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "id": "me", "display_name": "Me" })),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/me/playlists"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [
                    { "id": "mine", "name": "Mine", "description": "", "owner": { "id": "me" } },
                    { "id": "theirs", "name": "Theirs", "description": "", "owner": { "id": "other" } }
                ],
                "next": null
            })))
            .mount(&server)
            .await;

        let playlists = adapter_for(&server).list_owned_playlists().await.unwrap();
        assert_eq!(playlists.len(), 1);
        assert_eq!(playlists[0].id, "mine");
    }

    #[tokio::test]
    async fn test_upload_cover_image_is_base64_encoded() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v1/playlists/p1/images"))
            .and(header("authorization", "Bearer token"))
            .and(body_string(STANDARD.encode([0xFF, 0xD8, 0xFF, 0xD9])))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        adapter_for(&server)
            .upload_cover_image("p1", &[0xFF, 0xD8, 0xFF, 0xD9])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_fetch_cover_image_takes_last_image() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/playlists/p1/images"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "url": "https://img/640", "width": 640, "height": 640 },
                { "url": "https://img/custom", "width": null, "height": null }
            ])))
            .mount(&server)
            .await;

        let cover = adapter_for(&server)
            .fetch_cover_image("p1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cover.url, "https://img/custom");
        assert_eq!(cover.height, None);
    }

    #[tokio::test]
    async fn test_replace_tracks_clears_then_adds() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v1/playlists/p1/tracks"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/playlists/p1/tracks"))
            .respond_with(ResponseTemplate::new(201))
            .expect(2)
            .mount(&server)
            .await;

        let uris: Vec<String> = (0..150).map(|i| format!("spotify:track:{}", i)).collect();
        adapter_for(&server).replace_tracks("p1", &uris).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests[0].method.to_string(), "PUT");
    }

    #[tokio::test]
    async fn test_missing_credentials_short_circuit() {
        let mut tokens = MockTokenProvider::new();
        tokens
            .expect_access_token()
            .returning(|| Err(ApiError::AuthRequired));
        let adapter = SpotifyHttpAdapter::new(
            SpotifyWebApi::new(Url::parse("http://127.0.0.1:9/v1/").unwrap()),
            tokens,
        );

        let result = adapter.get_tracks("p1").await;
        assert!(matches!(result, Err(ApiError::AuthRequired)));
    }
}

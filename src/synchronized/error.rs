use crate::ports::carrier::CarrierError;
use crate::ports::spotify::ApiError;
use crate::synchronized::definition::DefinitionError;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Carrier(#[from] CarrierError),
    #[error("Playlist {playlist_id}: {source}")]
    Definition {
        playlist_id: String,
        #[source]
        source: DefinitionError,
    },
    #[error("Gave up uploading the cover of playlist {playlist_id} after {attempts} attempts: {source}")]
    CoverUploadFailed {
        playlist_id: String,
        attempts: usize,
        #[source]
        source: ApiError,
    },
    #[error("Playlist {playlist_id} is not a synchronized playlist")]
    NotSynchronized { playlist_id: String },
    #[error("Operation was cancelled")]
    Cancelled,
}

impl SyncError {
    pub(crate) fn definition(playlist_id: &str, source: DefinitionError) -> Self {
        SyncError::Definition {
            playlist_id: playlist_id.to_string(),
            source,
        }
    }
}

//! Synchronized playlists: playlists whose tracks are derived from other playlists
//! by include/exclude/require rules, with the rule stored in their own cover image.

pub mod cover;
pub mod definition;
pub mod error;
pub mod reconcile;
pub mod service;

pub use cover::{CoverPolicy, CoverProvisioner, ReadinessProbe, UnsizedCoverProbe};
pub use definition::{DefinitionError, SynchronizationDefinition};
pub use error::SyncError;
pub use service::{Discovery, DiscoveryFailure, SyncOutcome, SyncReport, SynchronizationService};

use crate::ports::spotify::Playlist;

/// Description that flags a playlist as managed by this tool.
pub const SYNCHRONIZED_MARKER: &str = "@synchronized";

/// Resolved playlists for each group of a definition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaylistGroups {
    pub included: Vec<Playlist>,
    pub excluded: Vec<Playlist>,
    pub required: Vec<Playlist>,
}

impl PlaylistGroups {
    pub fn definition(&self) -> SynchronizationDefinition {
        let ids = |playlists: &[Playlist]| -> Vec<String> {
            playlists.iter().map(|p| p.id.clone()).collect()
        };
        SynchronizationDefinition::new(
            ids(&self.included),
            ids(&self.excluded),
            ids(&self.required),
        )
    }
}

/// A synchronized playlist together with the resolved playlists its definition names.
/// Materialized on demand, never persisted as such.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynchronizedPlaylist {
    pub playlist: Playlist,
    pub groups: PlaylistGroups,
}

impl SynchronizedPlaylist {
    pub fn definition(&self) -> SynchronizationDefinition {
        self.groups.definition()
    }
}

/// Whether a playlist looks synchronized: the marker description and a cover to read
/// the definition from. A marker without a cover cannot be synchronized.
pub fn is_synchronized(playlist: &Playlist) -> bool {
    playlist.description == SYNCHRONIZED_MARKER && playlist.cover.is_some()
}

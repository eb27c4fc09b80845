// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::library::{FileBlob, Track, TrackId, TrackSource};

/// Prefix of every object URL handed out by a registry.
pub const OBJECT_URL_PREFIX: &str = "blob:retrospin/";

/// Counters describing object URL usage over the life of a registry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BlobStats {
    /// Object URLs created.
    pub created: u64,
    /// Object URLs revoked.
    pub revoked: u64,
}

impl BlobStats {
    /// Object URLs that are currently live.
    pub fn live(&self) -> u64 {
        self.created - self.revoked
    }
}

struct Entry {
    owner: TrackId,
    bytes: Arc<[u8]>,
}

#[derive(Default)]
struct Registry {
    blobs: HashMap<String, Entry>,
    next_id: u64,
    stats: BlobStats,
}

/// Holds in-memory file contents behind temporary object URLs. Clones share the same registry.
#[derive(Clone, Default)]
pub struct BlobRegistry {
    inner: Arc<Mutex<Registry>>,
}

impl BlobRegistry {
    pub fn new() -> BlobRegistry {
        BlobRegistry::default()
    }

    /// Registers the blob and returns the handle that owns its URL.
    fn create(&self, owner: &TrackId, blob: &FileBlob) -> ObjectUrl {
        let mut registry = self.inner.lock();
        registry.next_id += 1;
        let url = format!("{}{}", OBJECT_URL_PREFIX, registry.next_id);
        registry.blobs.insert(
            url.clone(),
            Entry {
                owner: owner.clone(),
                bytes: blob.bytes(),
            },
        );
        registry.stats.created += 1;

        debug!(
            url,
            track = owner.as_str(),
            file = blob.name(),
            "Created object URL."
        );
        ObjectUrl {
            url,
            registry: self.clone(),
        }
    }

    /// Fetches the bytes behind an object URL. Revoked or unknown URLs return None.
    pub fn fetch(&self, url: &str) -> Option<Arc<[u8]>> {
        self.inner
            .lock()
            .blobs
            .get(url)
            .map(|entry| Arc::clone(&entry.bytes))
    }

    /// Returns the track an object URL was created for.
    #[cfg(test)]
    pub fn owner(&self, url: &str) -> Option<TrackId> {
        self.inner
            .lock()
            .blobs
            .get(url)
            .map(|entry| entry.owner.clone())
    }

    fn revoke(&self, url: &str) {
        let mut registry = self.inner.lock();
        match registry.blobs.remove(url) {
            Some(entry) => {
                registry.stats.revoked += 1;
                debug!(url, track = entry.owner.as_str(), "Revoked object URL.");
            }
            None => warn!(url, "Object URL was already gone."),
        }
    }

    pub fn stats(&self) -> BlobStats {
        self.inner.lock().stats
    }
}

/// A live object URL. Dropping it revokes the URL, so each one is released exactly once.
pub struct ObjectUrl {
    url: String,
    registry: BlobRegistry,
}

impl ObjectUrl {
    pub fn as_str(&self) -> &str {
        &self.url
    }
}

impl fmt::Debug for ObjectUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ObjectUrl").field(&self.url).finish()
    }
}

impl Drop for ObjectUrl {
    fn drop(&mut self) {
        self.registry.revoke(&self.url);
    }
}

/// The one source a track resolved to.
#[derive(Debug)]
pub enum ResolvedSource {
    /// A path or URL that outlives the binding.
    Stable(String),
    /// An object URL that is revoked when this value is dropped.
    Ephemeral(ObjectUrl),
}

impl ResolvedSource {
    /// The source string to hand to the output.
    pub fn url(&self) -> &str {
        match self {
            ResolvedSource::Stable(path) => path,
            ResolvedSource::Ephemeral(object_url) => object_url.as_str(),
        }
    }

    #[cfg(test)]
    pub fn is_ephemeral(&self) -> bool {
        matches!(self, ResolvedSource::Ephemeral(_))
    }
}

/// Picks the playable source for a track.
#[derive(Clone, Default)]
pub struct SourceResolver {
    registry: BlobRegistry,
}

impl SourceResolver {
    pub fn new(registry: BlobRegistry) -> SourceResolver {
        SourceResolver { registry }
    }

    pub fn registry(&self) -> &BlobRegistry {
        &self.registry
    }

    /// Resolves the track's source. File-backed tracks get a fresh object URL that the caller
    /// owns. Tracks without a source resolve to None and must not be loaded.
    pub fn resolve(&self, track: &Track) -> Option<ResolvedSource> {
        match track.source()? {
            TrackSource::File(blob) => Some(ResolvedSource::Ephemeral(
                self.registry.create(track.id(), blob),
            )),
            TrackSource::Path(path) => Some(ResolvedSource::Stable(path.clone())),
        }
    }
}

//! Seams to the network-facing collaborators.
//!
//! The runner only talks to these traits, so tests drive it with in-memory
//! fakes instead of a live service.

use crate::{CoreError, FetchOutcome, MediaTask};
use std::path::{Path, PathBuf};

// The runner awaits these futures on its own task, one hashtag at a time, so
// they carry no `Send` bound.
#[allow(async_fn_in_trait)]
pub trait PostFetcher {
    /// Search posts carrying `hashtag`, returning at most `limit` raw records.
    ///
    /// Recoverable failures are reported as [`FetchOutcome::Transient`];
    /// `Err` is reserved for failures that retrying cannot fix.
    async fn fetch(&self, hashtag: &str, limit: usize) -> Result<FetchOutcome, CoreError>;
}

#[allow(async_fn_in_trait)]
pub trait MediaDownloader {
    /// Download the media of one post into `destination`, returning the
    /// files written.
    async fn download(&self, task: &MediaTask, destination: &Path)
        -> Result<Vec<PathBuf>, CoreError>;
}

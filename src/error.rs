use std::path::PathBuf;
use thiserror::Error;

use crate::feed::FeedId;

/// User-facing failures of feed operations.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("unknown feed '{0}'")]
    UnknownFeed(FeedId),
    #[error("feed '{0}' already exists")]
    DuplicateFeed(FeedId),
    #[error("feed '{0}' is already streaming")]
    AlreadyStreaming(FeedId),
    #[error("feed '{0}' has no video loaded")]
    NoVideoSource(FeedId),
    #[error("camera unavailable for {feed}: {reason}")]
    CameraUnavailable { feed: FeedId, reason: String },
    #[error("{} is not a video file (detected {mime})", path.display())]
    UnsupportedFile { path: PathBuf, mime: String },
    #[error("streaming channel unavailable for {feed}: {reason}")]
    ChannelUnavailable { feed: FeedId, reason: String },
}

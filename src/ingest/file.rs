//! Video file validation.
//!
//! A file is accepted for a feed only when its guessed MIME type is
//! `video/*`. Rejection happens before any state change or network request.

use std::path::Path;

use crate::error::FeedError;
use crate::feed::VideoSource;

pub fn validate_video_file(path: &Path) -> Result<VideoSource, FeedError> {
    let mime = mime_guess::from_path(path).first();
    match mime {
        Some(mime) if mime.type_() == mime_guess::mime::VIDEO => Ok(VideoSource {
            path: path.to_path_buf(),
            mime: mime.essence_str().to_string(),
            size: None,
        }),
        other => Err(FeedError::UnsupportedFile {
            path: path.to_path_buf(),
            mime: other
                .map(|m| m.essence_str().to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_video_types() {
        for name in ["clip.mp4", "clip.webm", "CLIP.MOV", "a/b/c.mkv"] {
            let source = validate_video_file(Path::new(name)).unwrap();
            assert!(source.mime.starts_with("video/"), "{name}: {}", source.mime);
        }
    }

    #[test]
    fn rejects_non_video_types() {
        for name in ["photo.jpg", "notes.txt", "noextension"] {
            assert!(matches!(
                validate_video_file(Path::new(name)),
                Err(FeedError::UnsupportedFile { .. })
            ));
        }
    }
}

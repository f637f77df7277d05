//! Reading attachments to send and storing received ones

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use offgrid_core::{DecodedMessage, FrameKind, OutboundFrame};
use tracing::info;

use crate::error::{CliError, Result};

/// Build a photo or audio frame from a file on disk
pub fn frame_from_file(kind: FrameKind, path: &Path) -> Result<OutboundFrame> {
    if kind == FrameKind::Text {
        return Err(CliError::InvalidInput(
            "text is not an attachment kind".to_string(),
        ));
    }

    let bytes = std::fs::read(path)?;
    if bytes.is_empty() {
        return Err(CliError::InvalidInput(format!(
            "{} is empty",
            path.display()
        )));
    }
    Ok(OutboundFrame::new(kind, bytes))
}

fn extension(kind: FrameKind) -> &'static str {
    match kind {
        FrameKind::Photo => "jpg",
        FrameKind::Audio => "3gp",
        FrameKind::Text => "txt",
    }
}

/// Writes received attachments into one directory
#[derive(Debug)]
pub struct AttachmentStore {
    dir: PathBuf,
    saved: u64,
}

impl AttachmentStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            saved: 0,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Store the payload of a photo or audio message, returning its path
    pub fn save(&mut self, message: &DecodedMessage) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;

        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let name = format!(
            "{}_{}_{}.{}",
            message.kind(),
            stamp,
            self.saved,
            extension(message.kind())
        );
        self.saved += 1;

        let path = self.dir.join(name);
        std::fs::write(&path, message.payload())?;
        info!(path = %path.display(), bytes = message.payload().len(), "Attachment saved");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use offgrid_core::FrameCodec;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("offgrid-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn decode(frame: &OutboundFrame) -> DecodedMessage {
        let codec = FrameCodec::default();
        let wire = codec.encode(frame).unwrap();
        codec.decoder().push(&wire).remove(0).unwrap()
    }

    #[test]
    fn test_frame_from_file() {
        let dir = scratch_dir("read");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("pic.jpg");
        std::fs::write(&path, [0xFF, 0xD8, 0xFF]).unwrap();

        let frame = frame_from_file(FrameKind::Photo, &path).unwrap();
        assert_eq!(frame.kind(), FrameKind::Photo);
        assert_eq!(frame.payload(), &[0xFF, 0xD8, 0xFF]);

        assert!(frame_from_file(FrameKind::Text, &path).is_err());
        assert!(matches!(
            frame_from_file(FrameKind::Audio, &dir.join("missing.3gp")),
            Err(CliError::Io(_))
        ));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_saved_attachments_get_distinct_names() {
        let dir = scratch_dir("save");
        let mut store = AttachmentStore::new(&dir);

        let photo = decode(&OutboundFrame::photo(vec![1, 2, 3]));
        let audio = decode(&OutboundFrame::audio(vec![4, 5]));
        let first = store.save(&photo).unwrap();
        let second = store.save(&photo).unwrap();
        let third = store.save(&audio).unwrap();

        assert_ne!(first, second);
        assert_eq!(first.extension().unwrap(), "jpg");
        assert_eq!(third.extension().unwrap(), "3gp");
        assert_eq!(std::fs::read(&third).unwrap(), vec![4, 5]);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}

use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::SceneError;

/// File-emission collaborator: receives one encoded file per capture.
pub trait FrameSink {
    /// Stores `bytes` under `filename` and reports where they ended up.
    fn emit(&mut self, filename: &str, bytes: &[u8]) -> Result<PathBuf, SceneError>;
}

/// Writes files into a directory, never overwriting: an existing
/// `scene-4k.jpg` makes the next one `scene-4k (1).jpg`, and so on.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, SceneError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| SceneError::Io {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl FrameSink for DirectorySink {
    fn emit(&mut self, filename: &str, bytes: &[u8]) -> Result<PathBuf, SceneError> {
        let mut attempt = 0u32;
        loop {
            let path = self.root.join(disambiguate(filename, attempt));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => {
                    write_or_discard(&path, file, bytes).map_err(|source| SceneError::Io {
                        path: path.clone(),
                        source,
                    })?;
                    debug!(path = %path.display(), bytes = bytes.len(), "wrote export file");
                    return Ok(path);
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => attempt += 1,
                Err(source) => return Err(SceneError::Io { path, source }),
            }
        }
    }
}

/// Writes the whole payload into the freshly created `path`; on failure the
/// truncated file is removed so no partial image is left behind.
fn write_or_discard<W: Write>(path: &Path, mut file: W, bytes: &[u8]) -> io::Result<()> {
    let written = file.write_all(bytes).and_then(|()| file.flush());
    if let Err(err) = written {
        drop(file);
        if let Err(cleanup) = fs::remove_file(path) {
            warn!(path = %path.display(), error = %cleanup, "failed to remove partial export file");
        }
        return Err(err);
    }
    Ok(())
}

/// `name.ext` for attempt 0, `name (n).ext` afterwards.
fn disambiguate(filename: &str, attempt: u32) -> String {
    if attempt == 0 {
        return filename.to_string();
    }
    match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem} ({attempt}).{ext}"),
        _ => format!("{filename} ({attempt})"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn writes_into_root() {
        let dir = TempDir::new().unwrap();
        let mut sink = DirectorySink::new(dir.path().join("exports")).unwrap();
        let path = sink.emit("video00_frame_000.png", b"frame").unwrap();
        assert_eq!(path, dir.path().join("exports/video00_frame_000.png"));
        assert_eq!(fs::read(&path).unwrap(), b"frame");
    }

    #[test]
    fn repeated_names_are_disambiguated() {
        let dir = TempDir::new().unwrap();
        let mut sink = DirectorySink::new(dir.path()).unwrap();
        let first = sink.emit("scene-4k.jpg", b"a").unwrap();
        let second = sink.emit("scene-4k.jpg", b"b").unwrap();
        let third = sink.emit("scene-4k.jpg", b"c").unwrap();
        assert_eq!(first.file_name().unwrap(), "scene-4k.jpg");
        assert_eq!(second.file_name().unwrap(), "scene-4k (1).jpg");
        assert_eq!(third.file_name().unwrap(), "scene-4k (2).jpg");
        assert_eq!(fs::read(&first).unwrap(), b"a");
        assert_eq!(fs::read(&third).unwrap(), b"c");
    }

    /// Accepts a few bytes, then fails like a full disk.
    struct FullDisk<W> {
        inner: W,
        room: usize,
    }

    impl<W: Write> Write for FullDisk<W> {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.room == 0 {
                return Err(io::Error::new(ErrorKind::Other, "no space left on device"));
            }
            let n = buf.len().min(self.room);
            self.room -= n;
            self.inner.write(&buf[..n])
        }

        fn flush(&mut self) -> io::Result<()> {
            self.inner.flush()
        }
    }

    #[test]
    fn failed_write_leaves_no_partial_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scene-4k.jpg");
        let file = OpenOptions::new().write(true).create_new(true).open(&path).unwrap();

        let err = write_or_discard(&path, FullDisk { inner: file, room: 4 }, b"jpeg payload").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Other);
        assert!(!path.exists());

        let mut sink = DirectorySink::new(dir.path()).unwrap();
        let next = sink.emit("scene-4k.jpg", b"whole").unwrap();
        assert_eq!(next, path);
        assert_eq!(fs::read(&path).unwrap(), b"whole");
    }

    #[test]
    fn successful_write_keeps_everything() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("frame.png");
        let file = OpenOptions::new().write(true).create_new(true).open(&path).unwrap();
        write_or_discard(&path, file, b"png bytes").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"png bytes");
    }

    #[test]
    fn names_without_extension() {
        assert_eq!(disambiguate("frame", 2), "frame (2)");
        assert_eq!(disambiguate(".hidden", 1), ".hidden (1)");
    }
}

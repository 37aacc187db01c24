use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScratchKind {
    File,
    Dir,
}

/// Local file or directory that is removed when the guard is dropped.
///
/// Removal also happens when the owning future is dropped mid-flight, so a
/// cancelled job leaves nothing behind in the work directory.
#[derive(Debug)]
pub struct ScratchPath {
    path: PathBuf,
    kind: ScratchKind,
    armed: bool,
}

impl ScratchPath {
    /// Guard a file that may or may not exist yet
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: ScratchKind::File,
            armed: true,
        }
    }

    /// Guard a directory and everything below it
    pub fn dir(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: ScratchKind::Dir,
            armed: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Disarm the guard and hand the path to the caller
    pub fn keep(mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.path)
    }
}

impl Drop for ScratchPath {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let result = match self.kind {
            ScratchKind::File => std::fs::remove_file(&self.path),
            ScratchKind::Dir => std::fs::remove_dir_all(&self.path),
        };

        match result {
            Ok(()) => debug!(path = %self.path.display(), "Removed scratch path"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to remove scratch path"
            ),
        }
    }
}

/// Encode an arbitrary string as a single safe path component.
///
/// ASCII letters, digits and `-` pass through; every other byte, `_`
/// included, becomes `_XX` (uppercase hex). Distinct inputs always give
/// distinct outputs, so scratch names keyed by an id never collide.
pub fn encode_path_component(component: &str) -> String {
    let mut encoded = String::with_capacity(component.len());
    for byte in component.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' => encoded.push(byte as char),
            _ => encoded.push_str(&format!("_{byte:02X}")),
        }
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("video_p1.mp4");
        std::fs::write(&path, b"data").unwrap();

        drop(ScratchPath::file(&path));

        assert!(!path.exists());
    }

    #[test]
    fn test_missing_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        drop(ScratchPath::file(dir.path().join("never-created")));
    }

    #[test]
    fn test_dir_removed_recursively() {
        let dir = tempfile::tempdir().unwrap();
        let frames = dir.path().join("frames");
        std::fs::create_dir_all(&frames).unwrap();
        std::fs::write(frames.join("frame_0001.png"), b"png").unwrap();

        drop(ScratchPath::dir(&frames));

        assert!(!frames.exists());
    }

    #[test]
    fn test_keep_disarms_guard() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frames.zip");
        std::fs::write(&path, b"zip").unwrap();

        let kept = ScratchPath::file(&path).keep();

        assert_eq!(kept, path);
        assert!(path.exists());
    }

    #[test]
    fn test_encode_path_component() {
        assert_eq!(encode_path_component("job-001"), "job-001");
        assert_eq!(encode_path_component("../etc/passwd"), "_2E_2E_2Fetc_2Fpasswd");
        assert_eq!(encode_path_component("hello world"), "hello_20world");
        assert_eq!(encode_path_component("café"), "caf_C3_A9");
        assert_eq!(encode_path_component(""), "");
    }

    #[test]
    fn test_encoded_components_do_not_collide() {
        let ids = ["job.1", "job_1", "job 1", "job_2E1", "job/1", "job-1"];
        let encoded: std::collections::HashSet<String> =
            ids.iter().map(|id| encode_path_component(id)).collect();

        assert_eq!(encoded.len(), ids.len());
    }
}

//! Frame extraction through the ffmpeg command-line tool.

use crate::config::ExtractorConfig;
use crate::error::ExtractionError;
use crate::ports::{ExtractedFrames, FrameExtractor};
use crate::scratch::ScratchPath;
use async_trait::async_trait;
use std::ffi::OsStr;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, instrument};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Samples frames with `ffmpeg -vf fps=N` and zips them.
#[derive(Debug, Clone)]
pub struct FfmpegExtractor {
    binary: String,
    work_dir: PathBuf,
    frames_per_second: u32,
    frame_format: String,
    log_level: String,
}

impl FfmpegExtractor {
    pub fn new(config: &ExtractorConfig) -> Self {
        Self {
            binary: config.ffmpeg_path.clone(),
            work_dir: config.work_dir.clone(),
            frames_per_second: config.frames_per_second,
            frame_format: config.frame_format.to_ascii_lowercase(),
            log_level: config.log_level.clone(),
        }
    }

    /// Build the ffmpeg arguments for one extraction.
    pub fn build_args(&self, video_path: &Path, frames_dir: &Path) -> Vec<String> {
        let pattern = frames_dir.join(format!("frame_%04d.{}", self.frame_format));

        vec![
            "-y".to_string(),
            "-loglevel".to_string(),
            self.log_level.clone(),
            "-i".to_string(),
            video_path.to_string_lossy().into_owned(),
            "-vf".to_string(),
            format!("fps={}", self.frames_per_second),
            pattern.to_string_lossy().into_owned(),
        ]
    }

    async fn run_ffmpeg(&self, video_path: &Path, frames_dir: &Path) -> Result<(), ExtractionError> {
        let args = self.build_args(video_path, frames_dir);
        debug!(binary = %self.binary, args = ?args, "Running ffmpeg");

        let output = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ExtractionError::Spawn {
                program: self.binary.clone(),
                source,
            })?;

        if !output.status.success() {
            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            return Err(ExtractionError::CommandFailed {
                status: output.status.to_string(),
                output: combined,
            });
        }

        Ok(())
    }

    /// Frame files in `dir`, in name (and therefore time) order.
    async fn collect_frames(&self, dir: &Path) -> Result<Vec<PathBuf>, ExtractionError> {
        let mut frames = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let matches_format = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.frame_format));
            if matches_format {
                frames.push(path);
            }
        }

        frames.sort();
        Ok(frames)
    }
}

#[async_trait]
impl FrameExtractor for FfmpegExtractor {
    #[instrument(skip(self), fields(video = %video_path.display()))]
    async fn extract(&self, video_path: &Path) -> Result<ExtractedFrames, ExtractionError> {
        // Scratch names extend the video stem, which is already unique per job
        let mut frames_name = video_path
            .file_stem()
            .unwrap_or_else(|| OsStr::new("video"))
            .to_os_string();
        frames_name.push("_frames");
        let mut archive_name = frames_name.clone();
        archive_name.push(".zip");

        let frames_dir = ScratchPath::dir(self.work_dir.join(&frames_name));
        tokio::fs::create_dir_all(frames_dir.path()).await?;

        self.run_ffmpeg(video_path, frames_dir.path()).await?;

        let frames = self.collect_frames(frames_dir.path()).await?;
        if frames.is_empty() {
            return Err(ExtractionError::NoFrames);
        }

        let frame_count = frames.len();
        let archive = ScratchPath::file(self.work_dir.join(&archive_name));
        let archive_path = archive.path().to_path_buf();

        tokio::task::spawn_blocking(move || write_archive(&archive_path, &frames))
            .await
            .map_err(|e| ExtractionError::Io(io::Error::new(io::ErrorKind::Other, e)))??;

        info!(frame_count, "Frames extracted and archived");

        Ok(ExtractedFrames {
            archive_path: archive.keep(),
            frame_count,
        })
    }
}

/// Write `frames` into a Deflate zip, one entry per frame named by file name.
fn write_archive(archive_path: &Path, frames: &[PathBuf]) -> Result<(), ExtractionError> {
    let file = std::fs::File::create(archive_path)?;
    let mut zip = ZipWriter::new(io::BufWriter::new(file));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for frame in frames {
        let name = frame
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "frame name is not UTF-8"))?;

        zip.start_file(name, options)?;
        let mut input = std::fs::File::open(frame)?;
        io::copy(&mut input, &mut zip)?;
    }

    zip.finish()?.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn extractor(work_dir: &Path, binary: &str) -> FfmpegExtractor {
        FfmpegExtractor::new(&ExtractorConfig {
            ffmpeg_path: binary.to_string(),
            work_dir: work_dir.to_path_buf(),
            frames_per_second: 1,
            frame_format: "png".to_string(),
            log_level: "error".to_string(),
        })
    }

    #[test]
    fn test_build_args() {
        let extractor = extractor(Path::new("/tmp/work"), "ffmpeg");

        let args = extractor.build_args(
            Path::new("/tmp/work/video_p1.mp4"),
            Path::new("/tmp/work/video_p1_frames"),
        );

        assert_eq!(
            args,
            vec![
                "-y",
                "-loglevel",
                "error",
                "-i",
                "/tmp/work/video_p1.mp4",
                "-vf",
                "fps=1",
                "/tmp/work/video_p1_frames/frame_%04d.png",
            ]
        );
    }

    #[test]
    fn test_write_archive_uses_bare_file_names() {
        let dir = tempfile::tempdir().unwrap();
        let frames: Vec<PathBuf> = (1..=3)
            .map(|i| {
                let path = dir.path().join(format!("frame_{i:04}.png"));
                std::fs::write(&path, format!("frame {i}")).unwrap();
                path
            })
            .collect();
        let archive_path = dir.path().join("frames.zip");

        write_archive(&archive_path, &frames).unwrap();

        let mut archive = zip::ZipArchive::new(std::fs::File::open(&archive_path).unwrap()).unwrap();
        assert_eq!(archive.len(), 3);

        let mut entry = archive.by_name("frame_0002.png").unwrap();
        let mut content = String::new();
        entry.read_to_string(&mut content).unwrap();
        assert_eq!(content, "frame 2");
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = extractor(dir.path(), "/nonexistent/ffmpeg");

        let err = extractor
            .extract(&dir.path().join("video_p1.mp4"))
            .await
            .unwrap_err();

        assert!(matches!(err, ExtractionError::Spawn { .. }));
        assert!(!dir.path().join("video_p1_frames").exists());
    }

    #[cfg(unix)]
    fn fake_ffmpeg(dir: &Path, script: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("fake-ffmpeg.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{script}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_extract_archives_frames() {
        let tools = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        // The output pattern is the last argument.
        let binary = fake_ffmpeg(
            tools.path(),
            r#"for last; do :; done
dir=$(dirname "$last")
printf one > "$dir/frame_0001.png"
printf two > "$dir/frame_0002.png"
printf skip > "$dir/notes.txt""#,
        );
        let extractor = extractor(work.path(), &binary);

        let extracted = extractor
            .extract(&work.path().join("video_p1.mp4"))
            .await
            .unwrap();

        assert_eq!(extracted.frame_count, 2);
        assert_eq!(extracted.archive_path, work.path().join("video_p1_frames.zip"));
        assert!(extracted.archive_path.exists());
        assert!(!work.path().join("video_p1_frames").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_command_surfaces_output() {
        let tools = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let binary = fake_ffmpeg(tools.path(), "echo 'Invalid data found when processing input' >&2\nexit 1");
        let extractor = extractor(work.path(), &binary);

        let err = extractor
            .extract(&work.path().join("video_p1.mp4"))
            .await
            .unwrap_err();

        match err {
            ExtractionError::CommandFailed { output, .. } => {
                assert!(output.contains("Invalid data found when processing input"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!work.path().join("video_p1_frames").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_no_frames_is_an_error() {
        let tools = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let binary = fake_ffmpeg(tools.path(), "exit 0");
        let extractor = extractor(work.path(), &binary);

        let err = extractor
            .extract(&work.path().join("video_p1.mp4"))
            .await
            .unwrap_err();

        assert!(matches!(err, ExtractionError::NoFrames));
        assert!(!work.path().join("video_p1_frames.zip").exists());
    }
}

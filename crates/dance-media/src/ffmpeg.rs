//! FFmpeg CLI video backend: raw RGB frames over stdin/stdout pipes.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use image::RgbImage;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use dance_models::EncodingConfig;

use crate::backend::{FrameReader, FrameWriter, VideoBackend, VideoSpec};
use crate::command::{collect_stderr, stderr_text, FfmpegCommand};
use crate::error::{MediaError, MediaResult};
use crate::probe::probe_video;

/// Production backend driving the `ffmpeg` and `ffprobe` executables.
#[derive(Debug, Clone, Default)]
pub struct FfmpegBackend;

impl FfmpegBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl VideoBackend for FfmpegBackend {
    async fn open(&self, path: &Path) -> MediaResult<Box<dyn FrameReader>> {
        let info = probe_video(path).await?;
        let spec = VideoSpec {
            width: info.width,
            height: info.height,
            fps: info.fps,
            frame_count: info.frame_count,
        };

        let mut child = FfmpegCommand::decode_rgb(path).spawn(Stdio::null(), Stdio::piped())?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::processing("ffmpeg decoder stdout not captured"))?;
        let stderr = collect_stderr(child.stderr.take());

        debug!(
            path = %path.display(),
            width = spec.width,
            height = spec.height,
            rotation = info.rotation,
            fps = spec.fps,
            "Opened video for decoding"
        );

        Ok(Box::new(FfmpegReader {
            spec,
            child,
            stdout,
            stderr: Some(stderr),
            finished: false,
        }))
    }

    async fn create(
        &self,
        path: &Path,
        spec: &VideoSpec,
        encoding: &EncodingConfig,
    ) -> MediaResult<Box<dyn FrameWriter>> {
        let mut child = FfmpegCommand::encode_rgb(path, spec.width, spec.height, spec.fps)
            .output_args(encoding.to_ffmpeg_args())
            .output_args(["-movflags", "+faststart"])
            .spawn(Stdio::piped(), Stdio::null())?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| MediaError::processing("ffmpeg encoder stdin not captured"))?;
        let stderr = collect_stderr(child.stderr.take());

        Ok(Box::new(FfmpegWriter {
            path: path.to_path_buf(),
            spec: *spec,
            child,
            stdin: Some(stdin),
            stderr,
        }))
    }
}

/// Decoder reading packed RGB24 frames from an `ffmpeg` child.
pub struct FfmpegReader {
    spec: VideoSpec,
    child: Child,
    stdout: ChildStdout,
    stderr: Option<JoinHandle<String>>,
    finished: bool,
}

impl FfmpegReader {
    async fn decoder_error(&mut self) -> String {
        match self.stderr.take() {
            Some(handle) => stderr_text(handle).await,
            None => String::new(),
        }
    }
}

#[async_trait]
impl FrameReader for FfmpegReader {
    fn spec(&self) -> VideoSpec {
        self.spec
    }

    async fn next_frame(&mut self) -> MediaResult<Option<RgbImage>> {
        if self.finished {
            return Ok(None);
        }

        let mut buf = vec![0u8; self.spec.frame_bytes()];
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.stdout.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        if filled < buf.len() {
            self.finished = true;
            let status = self.child.wait().await?;
            if !status.success() {
                let stderr = self.decoder_error().await;
                return Err(MediaError::processing(format!(
                    "decoder exited with {}: {}",
                    status,
                    stderr.trim()
                )));
            }
            if filled > 0 {
                return Err(MediaError::processing(format!(
                    "truncated frame: {} of {} bytes",
                    filled,
                    buf.len()
                )));
            }
            return Ok(None);
        }

        RgbImage::from_raw(self.spec.width, self.spec.height, buf)
            .map(Some)
            .ok_or_else(|| MediaError::processing("decoded frame has wrong size"))
    }

    async fn close(mut self: Box<Self>) {
        if !self.finished {
            let _ = self.child.kill().await;
        }
        let _ = self.child.wait().await;
        if let Some(handle) = self.stderr.take() {
            handle.abort();
        }
    }
}

/// Encoder feeding packed RGB24 frames into an `ffmpeg` child.
pub struct FfmpegWriter {
    path: PathBuf,
    spec: VideoSpec,
    child: Child,
    stdin: Option<ChildStdin>,
    stderr: JoinHandle<String>,
}

#[async_trait]
impl FrameWriter for FfmpegWriter {
    async fn write_frame(&mut self, frame: &RgbImage) -> MediaResult<()> {
        if frame.dimensions() != (self.spec.width, self.spec.height) {
            return Err(MediaError::processing(format!(
                "frame is {}x{}, encoder expects {}x{}",
                frame.width(),
                frame.height(),
                self.spec.width,
                self.spec.height
            )));
        }

        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| MediaError::processing("encoder already closed"))?;

        match stdin.write_all(frame.as_raw()).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::BrokenPipe => Err(MediaError::processing(format!(
                "encoder for {} exited early",
                self.path.display()
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn finish(mut self: Box<Self>) -> MediaResult<()> {
        if let Some(mut stdin) = self.stdin.take() {
            stdin.flush().await?;
            drop(stdin);
        }

        let status = self.child.wait().await?;
        let stderr = stderr_text(self.stderr).await;
        if !status.success() {
            return Err(MediaError::processing(format!(
                "encoder for {} exited with {}: {}",
                self.path.display(),
                status,
                stderr.trim()
            )));
        }
        Ok(())
    }

    async fn abort(mut self: Box<Self>) {
        drop(self.stdin.take());
        let _ = self.child.kill().await;
        let _ = self.child.wait().await;
        self.stderr.abort();

        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            if e.kind() != ErrorKind::NotFound {
                warn!(path = %self.path.display(), "Failed to remove partial output: {}", e);
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tokio::process::Command;

    const SPEC: VideoSpec = VideoSpec {
        width: 2,
        height: 2,
        fps: 25.0,
        frame_count: None,
    };

    /// A reader over whatever the shell script writes to stdout.
    fn scripted_reader(script: &str) -> FfmpegReader {
        let mut child = Command::new("sh")
            .args(["-c", script])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        let stdout = child.stdout.take().unwrap();
        let stderr = collect_stderr(child.stderr.take());
        FfmpegReader {
            spec: SPEC,
            child,
            stdout,
            stderr: Some(stderr),
            finished: false,
        }
    }

    #[tokio::test]
    async fn test_reads_exact_frames_then_end() {
        // Two 2x2 RGB frames, written in uneven chunks
        let mut reader = scripted_reader("head -c 5 /dev/zero; sleep 0.05; head -c 19 /dev/zero");

        for _ in 0..2 {
            let frame = reader.next_frame().await.unwrap().unwrap();
            assert_eq!(frame.dimensions(), (2, 2));
        }
        assert!(reader.next_frame().await.unwrap().is_none());
        assert!(reader.next_frame().await.unwrap().is_none());
        Box::new(reader).close().await;
    }

    #[tokio::test]
    async fn test_truncated_frame_is_processing_error() {
        let mut reader = scripted_reader("head -c 12 /dev/zero; head -c 5 /dev/zero");

        assert!(reader.next_frame().await.unwrap().is_some());
        let err = reader.next_frame().await.unwrap_err();
        assert!(matches!(err, MediaError::Processing(ref msg) if msg.contains("truncated frame: 5 of 12")));
    }

    #[tokio::test]
    async fn test_decoder_exit_reports_stderr() {
        let mut reader = scripted_reader("echo 'Invalid data found' >&2; exit 3");

        let err = reader.next_frame().await.unwrap_err();
        match err {
            MediaError::Processing(msg) => {
                assert!(msg.contains("decoder exited"));
                assert!(msg.contains("Invalid data found"));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(reader.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_close_stops_running_decoder() {
        let mut reader = scripted_reader("head -c 12 /dev/zero; sleep 30");

        assert!(reader.next_frame().await.unwrap().is_some());
        tokio::time::timeout(std::time::Duration::from_secs(5), Box::new(reader).close())
            .await
            .unwrap();
    }
}

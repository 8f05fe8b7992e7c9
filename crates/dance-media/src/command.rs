//! FFmpeg command builder for raw-frame pipes.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{MediaError, MediaResult};

/// Pipe endpoints understood by FFmpeg.
pub const STDIN_PIPE: &str = "pipe:0";
pub const STDOUT_PIPE: &str = "pipe:1";

/// Number of stderr lines kept for error reports.
const STDERR_TAIL_LINES: usize = 20;

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Input file path or pipe
    input: String,
    /// Output file path or pipe
    output: String,
    /// Input arguments (before -i)
    input_args: Vec<String>,
    /// Output arguments (after -i)
    output_args: Vec<String>,
    /// Whether to overwrite output
    overwrite: bool,
    /// Log level
    log_level: String,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_string_lossy().to_string(),
            output: output.as_ref().to_string_lossy().to_string(),
            input_args: Vec::new(),
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    /// Decode `input` into packed RGB24 frames on stdout.
    pub fn decode_rgb(input: impl AsRef<Path>) -> Self {
        Self::new(input, STDOUT_PIPE)
            .output_args(["-an", "-sn", "-f", "rawvideo", "-pix_fmt", "rgb24"])
    }

    /// Encode packed RGB24 frames read from stdin into `output`.
    pub fn encode_rgb(output: impl AsRef<Path>, width: u32, height: u32, fps: f64) -> Self {
        Self::new(STDIN_PIPE, output)
            .input_args(["-f", "rawvideo", "-pix_fmt", "rgb24"])
            .input_arg("-s")
            .input_arg(format!("{}x{}", width, height))
            .input_arg("-r")
            .input_arg(format!("{:.3}", fps))
            // yuv420p needs even dimensions
            .video_filter("pad=ceil(iw/2)*2:ceil(ih/2)*2")
            .output_arg("-an")
    }

    /// Add input arguments (before -i).
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    /// Add multiple input arguments.
    pub fn input_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.input_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add output arguments (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set video filter.
    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Set log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-hide_banner".to_string());
        args.push("-nostdin".to_string());
        args.push("-v".to_string());
        args.push(self.log_level.clone());

        args.extend(self.input_args.clone());

        args.push("-i".to_string());
        args.push(self.input.clone());

        args.extend(self.output_args.clone());

        args.push(self.output.clone());

        args
    }

    /// Spawn FFmpeg with the given stdin/stdout wiring. Stderr is always piped.
    pub fn spawn(&self, stdin: Stdio, stdout: Stdio) -> MediaResult<Child> {
        check_ffmpeg()?;

        let mut args = self.build_args();
        // `-nostdin` would stop FFmpeg reading frames from a stdin pipe
        if self.input == STDIN_PIPE {
            args.retain(|a| a != "-nostdin");
        }
        debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

        let child = Command::new("ffmpeg")
            .args(&args)
            .stdin(stdin)
            .stdout(stdout)
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;
        Ok(child)
    }
}

/// Drain a child's stderr in the background, keeping the last lines.
///
/// Without a reader FFmpeg can block once the stderr pipe buffer fills.
pub fn collect_stderr(stderr: Option<ChildStderr>) -> JoinHandle<String> {
    tokio::spawn(async move {
        let Some(stderr) = stderr else {
            return String::new();
        };
        let mut lines = BufReader::new(stderr).lines();
        let mut tail: Vec<String> = Vec::new();
        while let Ok(Some(line)) = lines.next_line().await {
            if tail.len() == STDERR_TAIL_LINES {
                tail.remove(0);
            }
            tail.push(line);
        }
        tail.join("\n")
    })
}

/// Await a stderr collector, tolerating a panicked task.
pub async fn stderr_text(handle: JoinHandle<String>) -> String {
    handle.await.unwrap_or_default()
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check if FFprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_args() {
        let args = FfmpegCommand::decode_rgb("input.mp4").build_args();
        let i = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[i + 1], "input.mp4");
        assert!(args.contains(&"rgb24".to_string()));
        assert_eq!(args.last().map(String::as_str), Some(STDOUT_PIPE));
    }

    #[test]
    fn test_encode_args() {
        let args = FfmpegCommand::encode_rgb("out.mp4", 640, 360, 29.97)
            .output_args(["-c:v", "libx264"])
            .build_args();
        let i = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[i + 1], STDIN_PIPE);

        let s = args.iter().position(|a| a == "-s").unwrap();
        assert!(s < i);
        assert_eq!(args[s + 1], "640x360");
        assert!(args.contains(&"29.970".to_string()));
        assert!(args.contains(&"libx264".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("out.mp4"));
    }

    #[test]
    fn test_overwrite_and_log_level() {
        let args = FfmpegCommand::new("a.mp4", "b.mp4").log_level("warning").build_args();
        assert_eq!(args[0], "-y");
        let v = args.iter().position(|a| a == "-v").unwrap();
        assert_eq!(args[v + 1], "warning");
    }
}

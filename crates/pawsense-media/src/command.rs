//! FFmpeg invocations that stream raw decoded data over stdout.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use tracing::debug;

use crate::error::{MediaError, MediaResult};

/// One FFmpeg run reading `input` and writing a raw stream to `-`.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    input: PathBuf,
    /// Everything between the input and the trailing `-`.
    encode: Vec<String>,
}

impl FfmpegCommand {
    pub fn new(input: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            encode: Vec::new(),
        }
    }

    /// Every video frame as packed RGB24 at exactly `width`x`height`, audio
    /// dropped. The frame reader sizes its buffers from the same numbers.
    pub fn rgb24_frames(input: impl AsRef<Path>, width: u32, height: u32) -> Self {
        let scale = format!("scale={width}:{height}");
        Self::new(input).with([
            "-an",
            "-vf",
            scale.as_str(),
            "-pix_fmt",
            "rgb24",
            "-f",
            "rawvideo",
        ])
    }

    /// First audio track downmixed to mono f32le at `sample_rate`.
    pub fn f32le_mono(input: impl AsRef<Path>, sample_rate: u32) -> Self {
        let rate = sample_rate.to_string();
        Self::new(input).with(["-vn", "-ac", "1", "-ar", rate.as_str(), "-f", "f32le"])
    }

    pub fn with<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.encode
            .extend(args.into_iter().map(|a| a.as_ref().to_owned()));
        self
    }

    pub fn args(&self) -> Vec<String> {
        let mut args: Vec<String> = ["-hide_banner", "-nostdin", "-v", "error", "-i"]
            .iter()
            .map(|a| a.to_string())
            .collect();
        args.push(self.input.display().to_string());
        args.extend(self.encode.iter().cloned());
        args.push("-".into());
        args
    }

    fn process(&self, stderr: Stdio) -> MediaResult<Command> {
        check_ffmpeg()?;
        let args = self.args();
        debug!(input = %self.input.display(), "ffmpeg {}", args.join(" "));

        let mut cmd = Command::new("ffmpeg");
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(stderr);
        Ok(cmd)
    }

    /// Start FFmpeg and hand back the child for incremental stdout reads.
    /// Stderr stays piped for the caller to drain.
    pub fn spawn(&self) -> MediaResult<Child> {
        self.process(Stdio::piped())?
            .spawn()
            .map_err(|e| MediaError::unreadable_at(&self.input, format!("cannot start ffmpeg: {e}")))
    }

    /// Wait for FFmpeg to exit and collect its whole stdout.
    pub fn output(&self) -> MediaResult<Vec<u8>> {
        let out = self.process(Stdio::piped())?.output()?;
        if out.status.success() {
            return Ok(out.stdout);
        }

        let detail = String::from_utf8_lossy(&out.stderr);
        let status = out
            .status
            .code()
            .map_or_else(|| "a signal".to_string(), |c| format!("status {c}"));
        Err(MediaError::unreadable_at(
            &self.input,
            format!("ffmpeg exited with {status}: {}", detail.trim()),
        ))
    }
}

/// Locate `ffmpeg` on `PATH`.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Locate `ffprobe` on `PATH`.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has(args: &[String], flag: &str) -> bool {
        args.iter().any(|a| a == flag)
    }

    #[test]
    fn test_rgb24_command() {
        let args = FfmpegCommand::rgb24_frames("cat.mp4", 1080, 1920).args();

        let input = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[input + 1], "cat.mp4");
        let filter = args.iter().position(|a| a == "-vf").unwrap();
        assert!(filter > input);
        assert_eq!(args[filter + 1], "scale=1080:1920");
        assert!(has(&args, "rgb24"));
        assert!(has(&args, "rawvideo"));
        assert!(has(&args, "-an"));
        assert_eq!(args.last().map(String::as_str), Some("-"));
    }

    #[test]
    fn test_audio_command() {
        let args = FfmpegCommand::f32le_mono("dog.mov", 44_100).args();

        let rate = args.iter().position(|a| a == "-ar").unwrap();
        assert_eq!(args[rate + 1], "44100");
        assert!(has(&args, "f32le"));
        assert!(has(&args, "-vn"));
    }

    #[test]
    fn test_extra_args_follow_input() {
        let args = FfmpegCommand::new("a.mp4").with(["-t", "2"]).args();

        let input = args.iter().position(|a| a == "-i").unwrap();
        let limit = args.iter().position(|a| a == "-t").unwrap();
        assert!(limit > input);
        assert_eq!(args[limit + 1], "2");
    }
}

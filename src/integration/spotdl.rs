//! Download-on-miss through the external `spotdl` command.

use std::path::PathBuf;
use std::process::Command;

use log::debug;

use crate::integration::TrackDownloader;

pub struct SpotdlDownloader {
    program: String,
    output_dir: PathBuf,
    extra_args: Vec<String>,
}

impl SpotdlDownloader {
    pub fn new(program: String, output_dir: PathBuf, extra_args: Vec<String>) -> Self {
        Self {
            program,
            output_dir,
            extra_args,
        }
    }

    fn command(&self, external_url: &str) -> Command {
        let mut command = Command::new(&self.program);
        command
            .arg("download")
            .arg(external_url)
            .arg("--output")
            .arg(&self.output_dir)
            .args(&self.extra_args);
        command
    }
}

impl TrackDownloader for SpotdlDownloader {
    fn download(&self, external_url: &str) -> Result<(), String> {
        let mut command = self.command(external_url);
        debug!("Running {command:?}");
        let output = command
            .output()
            .map_err(|err| format!("failed to start {}: {err}", self.program))?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(format!(
            "{} exited with {}: {}",
            self.program,
            output.status,
            stderr.trim()
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::SpotdlDownloader;
    use crate::integration::TrackDownloader;

    #[test]
    fn test_command_targets_output_directory() {
        let downloader = SpotdlDownloader::new(
            "spotdl".to_string(),
            PathBuf::from("/music"),
            vec!["--format".to_string(), "mp3".to_string()],
        );
        let command = downloader.command("https://open.spotify.com/track/t1");
        let args: Vec<String> = command
            .get_args()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();

        assert_eq!(command.get_program(), "spotdl");
        assert_eq!(
            args,
            vec![
                "download",
                "https://open.spotify.com/track/t1",
                "--output",
                "/music",
                "--format",
                "mp3"
            ]
        );
    }

    #[test]
    fn test_missing_program_is_an_error() {
        let downloader = SpotdlDownloader::new(
            "syncsonic-no-such-downloader".to_string(),
            PathBuf::from("/tmp"),
            Vec::new(),
        );
        assert!(downloader.download("https://example.invalid").is_err());
    }
}

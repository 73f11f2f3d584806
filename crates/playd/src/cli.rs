use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "playd", version)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// TOML config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Play through a sound device, chosen by substring match (default device if empty)
    #[arg(long, global = true, conflicts_with = "pipe")]
    pub device: Option<String>,

    /// Write raw PCM to this shell command's stdin instead of a sound device
    #[arg(long, global = true)]
    pub pipe: Option<String>,

    /// Root directory relative song paths are resolved against
    #[arg(long, global = true)]
    pub music_dir: Option<PathBuf>,

    /// Decoder used for remote streams no MIME type or suffix matched
    #[arg(long, global = true)]
    pub default_decoder: Option<String>,

    /// Decoded audio buffered ahead of the output, in seconds
    #[arg(long, global = true)]
    pub buffer_seconds: Option<f32>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Play songs (files or URLs) one after another, then exit
    Play {
        #[arg(required = true)]
        songs: Vec<String>,
    },

    /// Read control lines from stdin (play, add, stop, next, pause, seek, status, quit)
    Run,

    /// List decoder plugins
    Plugins,

    /// List output devices
    Devices,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_play_with_global_flags() {
        let args = Args::try_parse_from([
            "playd",
            "play",
            "a.flac",
            "http://radio.example/live",
            "--pipe",
            "aplay -f cd",
            "--music-dir",
            "/music",
        ])
        .unwrap();
        match args.cmd {
            Command::Play { songs } => assert_eq!(songs.len(), 2),
            other => panic!("unexpected command: {other:?}"),
        }
        assert_eq!(args.pipe.as_deref(), Some("aplay -f cd"));
        assert_eq!(args.music_dir, Some(PathBuf::from("/music")));
    }

    #[test]
    fn device_and_pipe_conflict() {
        let res = Args::try_parse_from(["playd", "run", "--device", "usb", "--pipe", "cat"]);
        assert!(res.is_err());
    }

    #[test]
    fn play_requires_songs() {
        assert!(Args::try_parse_from(["playd", "play"]).is_err());
    }
}

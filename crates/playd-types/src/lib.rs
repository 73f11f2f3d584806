use serde::{Deserialize, Serialize};

/// Lifecycle state of the decoder thread.
///
/// `Stop` is both the initial state and the state every decode attempt returns to.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DecoderState {
    /// Idle; the player may issue a new command.
    #[default]
    Stop,
    /// Input opened, backend not yet producing audio.
    Start,
    /// A backend reported its audio format and is producing audio.
    Decode,
}

/// Command issued by the player thread and cleared by the decoder thread.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DecoderCommand {
    #[default]
    None,
    Start,
    Stop,
    Seek,
}

/// Failure recorded by the decoder thread for the last decode attempt.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DecoderError {
    /// The input could not be opened or read, or a backend failed.
    File,
    /// No backend accepted the input.
    UnknownType,
}

impl std::fmt::Display for DecoderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecoderError::File => f.write_str("file error"),
            DecoderError::UnknownType => f.write_str("unknown file type"),
        }
    }
}

/// Reason why playback of a song ended.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackEndReason {
    /// Natural end of stream/file.
    Eof,
    /// Decoder, input, or output error interrupted playback.
    Error,
    /// Playback was explicitly stopped by a command.
    Stopped,
}

/// High-level state of the player thread.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlayerState {
    #[default]
    Stop,
    Play,
    Pause,
}

/// Status snapshot reported by the player thread.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct PlayerStatus {
    /// Player state.
    pub state: PlayerState,
    /// Decoder thread state at snapshot time.
    pub decoder_state: DecoderState,
    /// Locator of the song currently being decoded or played.
    pub now_playing: Option<String>,
    /// Name of the backend that is decoding the current song.
    pub decoder_plugin: Option<String>,
    /// Elapsed song time in seconds, from the last chunk handed to the output.
    pub elapsed_secs: Option<f64>,
    /// Total song time in seconds when the backend knows it.
    pub total_secs: Option<f64>,
    /// Source sample rate in Hz.
    pub sample_rate: Option<u32>,
    /// Source channel count.
    pub channels: Option<u16>,
    /// Whether the current input supports seeking.
    pub seekable: bool,
    /// Songs waiting after the current one.
    pub queued: usize,
    /// Last decoder error, if the previous attempt failed.
    pub error: Option<DecoderError>,
    /// How the previous song ended.
    pub end_reason: Option<PlaybackEndReason>,
}

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Audio stream a binary frame belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioSource {
    /// Advisor's microphone
    Mic,
    /// Room / system audio carrying the client's voice
    Room,
}

impl AudioSource {
    pub const ALL: [AudioSource; 2] = [AudioSource::Mic, AudioSource::Room];

    /// Leading byte used on the wire for this source
    pub const fn tag(self) -> u8 {
        match self {
            AudioSource::Mic => 0x01,
            AudioSource::Room => 0x02,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0x01 => Some(AudioSource::Mic),
            0x02 => Some(AudioSource::Room),
            _ => None,
        }
    }

    /// Source name as listed in a `config` message.
    ///
    /// Browsers call the room stream "speaker" (it is captured from the
    /// system speaker), so both spellings are accepted.
    pub fn from_config_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "mic" | "microphone" => Some(AudioSource::Mic),
            "room" | "speaker" | "system" => Some(AudioSource::Room),
            _ => None,
        }
    }

    /// Transcript label for speech on this source
    pub const fn speaker_label(self) -> &'static str {
        match self {
            AudioSource::Mic => "Advisor",
            AudioSource::Room => "Client",
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            AudioSource::Mic => "mic",
            AudioSource::Room => "room",
        }
    }
}

impl fmt::Display for AudioSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame too short ({0} bytes)")]
    TooShort(usize),

    #[error("unknown source tag 0x{0:02x}")]
    UnknownSource(u8),
}

/// A decoded binary frame: source tag plus little-endian i16 PCM bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioPacket<'a> {
    pub source: AudioSource,
    pub pcm: &'a [u8],
}

impl<'a> AudioPacket<'a> {
    /// Split `[tag][pcm...]` into its parts.
    ///
    /// A trailing odd byte cannot form a sample and is cut off.
    pub fn decode(frame: &'a [u8]) -> Result<Self, FrameError> {
        if frame.len() < 3 {
            return Err(FrameError::TooShort(frame.len()));
        }

        let source = AudioSource::from_tag(frame[0]).ok_or(FrameError::UnknownSource(frame[0]))?;
        let pcm = &frame[1..];
        let even = pcm.len() - pcm.len() % 2;

        Ok(Self {
            source,
            pcm: &pcm[..even],
        })
    }

    pub fn sample_count(&self) -> usize {
        self.pcm.len() / 2
    }
}

/// Build a wire frame from samples (used by clients and tests)
pub fn encode_frame(source: AudioSource, samples: &[i16]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(1 + samples.len() * 2);
    frame.push(source.tag());
    frame.extend(samples.iter().flat_map(|s| s.to_le_bytes()));
    frame
}

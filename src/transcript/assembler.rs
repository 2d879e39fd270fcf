use crate::protocol::AudioSource;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single transcript event from a transcription subscription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEvent {
    /// Speaker label ("Advisor", "Client")
    pub speaker: String,

    /// Transcribed text; partials carry the whole utterance so far
    pub text: String,

    /// Whether this commits the utterance
    pub is_final: bool,

    /// When the event arrived
    pub timestamp: DateTime<Utc>,
}

impl TranscriptEvent {
    pub fn partial(speaker: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            speaker: speaker.into(),
            text: text.into(),
            is_final: false,
            timestamp: Utc::now(),
        }
    }

    pub fn final_text(speaker: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            is_final: true,
            ..Self::partial(speaker, text)
        }
    }
}

/// A committed transcript line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptLine {
    pub speaker: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl TranscriptLine {
    fn render(&self) -> String {
        format!("{}: {}", self.speaker, self.text)
    }
}

/// Position in the committed transcript
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Checkpoint {
    /// Number of committed lines
    pub lines: usize,
    /// Rendered characters (Unicode scalar values) up to this point
    pub chars: usize,
}

/// What `observe` did with an event
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    /// Partial text replaced the speaker's pending slot
    Partial,
    /// A final line was appended; the checkpoint is the position after it
    Committed(Checkpoint),
    /// Empty final text; the pending slot was cleared, nothing was appended
    Discarded,
}

/// Append-only speaker-labeled transcript.
///
/// Lines render as `Speaker: text` joined by newlines. The rendered string and
/// its character count are maintained incrementally so reads never rescan.
#[derive(Debug, Default)]
pub struct TranscriptBuffer {
    lines: Vec<TranscriptLine>,
    rendered: String,
    char_count: usize,
    /// Byte offset in `rendered` where each line starts (including its separator)
    line_offsets: Vec<usize>,
    /// Character count before each line (including its separator)
    line_chars: Vec<usize>,
}

impl TranscriptBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, line: TranscriptLine) -> Checkpoint {
        self.line_offsets.push(self.rendered.len());
        self.line_chars.push(self.char_count);

        let rendered = line.render();
        if !self.lines.is_empty() {
            self.rendered.push('\n');
            self.char_count += 1;
        }
        self.char_count += rendered.chars().count();
        self.rendered.push_str(&rendered);
        self.lines.push(line);

        self.checkpoint()
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            lines: self.lines.len(),
            chars: self.char_count,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.rendered
    }

    pub fn lines(&self) -> &[TranscriptLine] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn char_count(&self) -> usize {
        self.char_count
    }

    /// Rendered text committed after `checkpoint`, without a leading separator.
    ///
    /// A checkpoint past the end yields an empty string.
    pub fn new_since(&self, checkpoint: Checkpoint) -> &str {
        let Some(&offset) = self.line_offsets.get(checkpoint.lines) else {
            return "";
        };
        let tail = &self.rendered[offset..];
        tail.strip_prefix('\n').unwrap_or(tail)
    }

    /// Characters committed after `checkpoint`
    pub fn chars_since(&self, checkpoint: Checkpoint) -> usize {
        self.char_count.saturating_sub(checkpoint.chars)
    }
}

/// Merges labeled events from all sources into one ordered transcript.
///
/// Order is commit (arrival) order. There is no re-sequencing by timestamp:
/// finals from two sources that arrive slightly out of order stay that way.
#[derive(Debug, Default)]
pub struct TranscriptAssembler {
    buffer: TranscriptBuffer,
    partials: HashMap<AudioSource, TranscriptEvent>,
}

impl TranscriptAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, source: AudioSource, event: TranscriptEvent) -> Observation {
        if !event.is_final {
            self.partials.insert(source, event);
            return Observation::Partial;
        }

        self.partials.remove(&source);

        let text = event.text.trim();
        if text.is_empty() {
            return Observation::Discarded;
        }

        let checkpoint = self.buffer.push(TranscriptLine {
            speaker: event.speaker,
            text: text.to_string(),
            timestamp: event.timestamp,
        });
        Observation::Committed(checkpoint)
    }

    /// Full rendered transcript (finals only)
    pub fn snapshot(&self) -> &str {
        self.buffer.as_str()
    }

    pub fn new_since(&self, checkpoint: Checkpoint) -> &str {
        self.buffer.new_since(checkpoint)
    }

    pub fn checkpoint(&self) -> Checkpoint {
        self.buffer.checkpoint()
    }

    pub fn total_chars(&self) -> usize {
        self.buffer.char_count()
    }

    /// Current uncommitted text for a source, if any
    pub fn partial(&self, source: AudioSource) -> Option<&TranscriptEvent> {
        self.partials.get(&source)
    }

    /// Drop the pending partial for a source (e.g. when it disconnects)
    pub fn clear_partial(&mut self, source: AudioSource) {
        self.partials.remove(&source);
    }

    pub fn buffer(&self) -> &TranscriptBuffer {
        &self.buffer
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

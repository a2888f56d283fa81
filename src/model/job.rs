use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

/// The parts of a `POST /synth` body the bridge interprets.
///
/// This is a read-only view for validation and routing. Workers receive the
/// request body exactly as the caller sent it, unknown fields and key order
/// included.
#[derive(Debug, Clone, Deserialize)]
pub struct SynthesisJob {
    /// Requested output format (`pcm`, `mp3`, `ogg`; anything else means WAV).
    pub format: String,

    /// Ordered segments to synthesize.
    pub data: Vec<Segment>,
}

/// One entry of [`SynthesisJob::data`].
#[derive(Debug, Clone, Deserialize)]
pub struct Segment {
    #[serde(rename = "type")]
    pub kind: String,

    /// For `text` segments: an array of fragments, each with a `text` string.
    #[serde(default)]
    pub data: Value,
}

// ── Error ──────────────────────────────────────────────────────────────────────

/// A `text` segment whose fragments cannot be measured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    /// The segment's `data` is not an array.
    NotAnArray { segment: usize },
    /// A fragment has no string `text` field.
    MissingText { segment: usize, fragment: usize },
}

impl std::fmt::Display for JobError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAnArray { segment } => {
                write!(f, "text segment #{segment}: `data` must be an array")
            }
            Self::MissingText { segment, fragment } => {
                write!(f, "text segment #{segment}, fragment #{fragment}: missing string `text`")
            }
        }
    }
}

impl std::error::Error for JobError {}

// ── Job ────────────────────────────────────────────────────────────────────────

impl SynthesisJob {
    /// Total characters across every fragment of every `text` segment.
    ///
    /// Counts Unicode scalar values, not bytes, so the quota means the same
    /// thing for Latin and non-Latin scripts.
    pub fn text_chars(&self) -> Result<usize, JobError> {
        let mut total = 0;

        for (segment, seg) in self.data.iter().enumerate() {
            if seg.kind != "text" {
                continue;
            }

            let fragments = seg
                .data
                .as_array()
                .ok_or(JobError::NotAnArray { segment })?;

            for (fragment, item) in fragments.iter().enumerate() {
                let text = item
                    .get("text")
                    .and_then(Value::as_str)
                    .ok_or(JobError::MissingText { segment, fragment })?;
                total += text.chars().count();
            }
        }

        Ok(total)
    }

    pub fn audio_format(&self) -> AudioFormat {
        AudioFormat::parse(&self.format)
    }

    pub fn mode(&self) -> JobMode {
        self.audio_format().mode()
    }
}

// ── Format & mode ──────────────────────────────────────────────────────────────

/// Output format, as far as the bridge cares about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Pcm,
    Mp3,
    Ogg,
    /// Any value not listed above.
    Wav,
}

impl AudioFormat {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "pcm" => Self::Pcm,
            "mp3" => Self::Mp3,
            "ogg" => Self::Ogg,
            _ => Self::Wav,
        }
    }

    /// `Content-Type` of the HTTP response.
    ///
    /// | format   | content type |
    /// |----------|--------------|
    /// | `mp3`    | `audio/mp3`  |
    /// | `ogg`    | `audio/ogg`  |
    /// | other    | `audio/wav`  |
    ///
    /// Raw PCM is announced as `audio/wav`; clients of the realtime endpoint
    /// already rely on that.
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Mp3 => "audio/mp3",
            Self::Ogg => "audio/ogg",
            Self::Pcm | Self::Wav => "audio/wav",
        }
    }

    pub fn mode(self) -> JobMode {
        match self {
            Self::Pcm => JobMode::Realtime,
            _ => JobMode::Batch,
        }
    }
}

/// How the worker answers and how the reply reaches the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobMode {
    /// One reply message carrying the whole payload.
    Batch,
    /// Chunk messages followed by one empty end-of-stream message.
    Realtime,
}

impl std::fmt::Display for JobMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Batch => f.write_str("batch"),
            Self::Realtime => f.write_str("realtime"),
        }
    }
}

// ── Correlation ────────────────────────────────────────────────────────────────

/// Opaque per-request identifier sent as the AMQP `correlation_id`.
///
/// 128 random bits rendered as 32 lowercase hex digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationToken(String);

impl CorrelationToken {
    pub fn mint() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CorrelationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

//! Validated description of one generation run.

use std::path::PathBuf;

use crate::LongplayError;

/// Prompt used when the caller does not supply one.
pub const DEFAULT_PROMPT: &str =
    "lo-fi music with a soothing melody, chill vibes, relaxed atmosphere, calm, gentle";

/// Default track length in seconds (3 minutes 45 seconds).
pub const DEFAULT_TOTAL_SECS: u32 = 225;

/// Default per-call segment length in seconds.
pub const DEFAULT_SEGMENT_SECS: u32 = 28;

/// Default output file name.
pub const DEFAULT_OUTPUT: &str = "lofi_music_3m45s.wav";

/// Parameters for one generation run, checked once up front.
///
/// [`GenerationRequest::new`] rejects zero durations and empty prompts.
/// A segment length above the engine ceiling is not an error here; planning
/// clamps it and the run proceeds (see [`crate::plan::plan_segments`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    /// Exact length of the final track in seconds.
    pub total_secs: u32,
    /// Length of each generated segment in seconds.
    pub segment_secs: u32,
    /// Text description the audio is conditioned on.
    pub prompt: String,
    /// Where the stitched WAV file is written.
    pub output_path: PathBuf,
}

impl GenerationRequest {
    pub fn new(
        total_secs: u32,
        segment_secs: u32,
        prompt: impl Into<String>,
        output_path: impl Into<PathBuf>,
    ) -> Result<Self, LongplayError> {
        let request = Self {
            total_secs,
            segment_secs,
            prompt: prompt.into(),
            output_path: output_path.into(),
        };
        request.validate()?;
        Ok(request)
    }

    /// Check the request parameters without running anything.
    pub fn validate(&self) -> Result<(), LongplayError> {
        if self.total_secs == 0 {
            return Err(LongplayError::ZeroTotalDuration);
        }
        if self.segment_secs == 0 {
            return Err(LongplayError::ZeroSegmentDuration);
        }
        if self.prompt.trim().is_empty() {
            return Err(LongplayError::EmptyPrompt);
        }
        Ok(())
    }
}

impl Default for GenerationRequest {
    fn default() -> Self {
        Self {
            total_secs: DEFAULT_TOTAL_SECS,
            segment_secs: DEFAULT_SEGMENT_SECS,
            prompt: DEFAULT_PROMPT.to_string(),
            output_path: PathBuf::from(DEFAULT_OUTPUT),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_defaults() {
        let request = GenerationRequest::default();
        assert!(request.validate().is_ok());
        assert_eq!(request.total_secs, 225);
        assert_eq!(request.segment_secs, 28);
    }

    #[test]
    fn rejects_zero_total_duration() {
        let result = GenerationRequest::new(0, 28, "lofi", "out.wav");
        assert!(matches!(result, Err(LongplayError::ZeroTotalDuration)));
    }

    #[test]
    fn rejects_zero_segment_duration() {
        let result = GenerationRequest::new(225, 0, "lofi", "out.wav");
        assert!(matches!(result, Err(LongplayError::ZeroSegmentDuration)));
    }

    #[test]
    fn rejects_empty_prompt() {
        let result = GenerationRequest::new(225, 28, "", "out.wav");
        assert!(matches!(result, Err(LongplayError::EmptyPrompt)));
    }

    #[test]
    fn rejects_whitespace_prompt() {
        let result = GenerationRequest::new(225, 28, "   \t", "out.wav");
        assert!(matches!(result, Err(LongplayError::EmptyPrompt)));
    }

    #[test]
    fn oversized_segment_is_not_rejected_here() {
        // Clamping is the planner's job, not validation's.
        let result = GenerationRequest::new(60, 300, "lofi", "out.wav");
        assert!(result.is_ok());
    }
}

//! Long-form music generation by segmented inference.
//!
//! The MusicGen decoder can only produce clips of under 30 seconds per call,
//! so a longer track is planned as a sequence of fixed-length segments, each
//! generated independently from the same encoded prompt, then stitched in
//! order and trimmed to the exact requested length.

pub mod config;
pub mod engine;
pub mod musicgen;
pub mod pipeline;
pub mod plan;
pub mod request;
pub mod stitch;
pub mod wav;

use std::path::PathBuf;

use thiserror::Error;

pub use engine::{Device, EngineLimits, TextToAudioEngine};
pub use musicgen::{MusicGenEngine, SamplingOptions};
pub use pipeline::{run, run_with_progress, Phase, ProgressEvent, RunSummary};
pub use plan::{plan_segments, SegmentPlan};
pub use request::GenerationRequest;
pub use stitch::{stitch, Segment, StitchedTrack};

/// Errors that can abort a generation run.
#[derive(Debug, Error)]
pub enum LongplayError {
    /// The requested track length is zero.
    #[error("total duration must be greater than zero seconds")]
    ZeroTotalDuration,

    /// The requested per-call segment length is zero.
    #[error("segment duration must be greater than zero seconds")]
    ZeroSegmentDuration,

    /// The prompt contains no text to condition on.
    #[error("prompt must not be empty")]
    EmptyPrompt,

    /// The model directory lacks one of the required artifacts.
    #[error("model directory '{}' is missing '{file}'", dir.display())]
    MissingModelFile { dir: PathBuf, file: &'static str },

    /// A token budget the decoder cannot represent. Segment planning clamps
    /// segment lengths, so runs driven through the pipeline never reach this.
    #[error("token budget {budget} is outside the decoder's supported range {min}..={max}")]
    TokenBudgetOutOfRange {
        budget: usize,
        min: usize,
        max: usize,
    },

    /// Wrapper around ONNX Runtime session errors.
    #[error(transparent)]
    Session(#[from] ort::Error),

    /// Error reported by the prompt tokenizer.
    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    /// Tensor shape bookkeeping failed while preparing model inputs.
    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),

    /// Wrapper around WAV writing errors.
    #[error(transparent)]
    Wav(#[from] hound::Error),

    /// Wrapper around IO errors encountered while persisting output.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

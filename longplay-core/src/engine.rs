//! The seam between the pipeline and a concrete inference engine.

use crate::LongplayError;

/// Fixed properties of an engine that segment planning must respect.
///
/// These come from the engine rather than being hardcoded in the planner, so
/// the plan stays correct if the model (and with it the per-call ceiling)
/// changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineLimits {
    /// Autoregressive steps per second of generated audio.
    pub tokens_per_second: u32,
    /// Longest segment a single inference call can produce.
    pub max_segment_secs: u32,
    /// Replacement segment length used when a request exceeds the ceiling.
    pub fallback_segment_secs: u32,
}

/// Compute device the engine runs its sessions on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Cuda,
}

impl Device {
    /// Probe for an accelerator, falling back to the CPU.
    ///
    /// Builds without the `cuda` feature always select the CPU.
    pub fn detect() -> Self {
        #[cfg(feature = "cuda")]
        {
            use ort::execution_providers::{CUDAExecutionProvider, ExecutionProvider};

            if CUDAExecutionProvider::default()
                .is_available()
                .unwrap_or(false)
            {
                return Device::Cuda;
            }
        }
        Device::Cpu
    }

    pub fn is_accelerated(self) -> bool {
        matches!(self, Device::Cuda)
    }

    pub fn label(self) -> &'static str {
        match self {
            Device::Cpu => "CPU",
            Device::Cuda => "CUDA",
        }
    }
}

/// A text-conditioned audio generator that produces bounded-length segments.
///
/// Planning and stitching rely only on this contract, never on a concrete
/// model. Generation is sampling based, so two segments from the same prompt
/// encoding are expected to differ; that is what keeps a stitched track from
/// sounding like a loop.
pub trait TextToAudioEngine {
    /// Encoded prompt, computed once and reused read-only across segments.
    type Prompt;

    fn limits(&self) -> EngineLimits;

    /// Samples per second of produced audio, a property of the model.
    fn sample_rate(&self) -> u32;

    fn device(&self) -> Device;

    fn encode_prompt(&mut self, text: &str) -> Result<Self::Prompt, LongplayError>;

    /// Generate one segment of `token_budget` autoregressive steps.
    ///
    /// `on_step` receives fractional progress in `0.0..=1.0`. A failure
    /// aborts the whole run; segments are never retried.
    fn generate_segment(
        &mut self,
        prompt: &Self::Prompt,
        token_budget: usize,
        on_step: &mut dyn FnMut(f32),
    ) -> Result<Vec<f32>, LongplayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(not(feature = "cuda"))]
    fn detect_without_cuda_feature_selects_cpu() {
        let device = Device::detect();
        assert_eq!(device, Device::Cpu);
        assert!(!device.is_accelerated());
    }

    #[test]
    fn labels_are_stable() {
        assert_eq!(Device::Cpu.label(), "CPU");
        assert_eq!(Device::Cuda.label(), "CUDA");
    }
}

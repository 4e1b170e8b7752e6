//! Segmentation planning: how many segments, at what token budget.

use log::warn;

use crate::engine::EngineLimits;
use crate::LongplayError;

/// The derived shape of a run: segment count and per-segment token budget.
///
/// Every segment is generated at the full effective length, including the
/// last one, so the plan covers at least the requested total and the
/// stitcher trims the surplus afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentPlan {
    /// Requested track length in seconds.
    pub total_secs: u32,
    /// Effective per-segment length after any clamping.
    pub segment_secs: u32,
    /// Number of segments, `ceil(total_secs / segment_secs)`.
    pub num_segments: u32,
    /// Autoregressive steps per segment.
    pub tokens_per_segment: usize,
    /// The originally requested segment length, when it exceeded the engine
    /// ceiling and was replaced by the fallback.
    pub clamped_from: Option<u32>,
}

impl SegmentPlan {
    /// Sample count the stitched track is trimmed to.
    pub fn desired_samples(&self, sample_rate: u32) -> usize {
        self.total_secs as usize * sample_rate as usize
    }

    /// Seconds of audio the plan produces before trimming. Computed in
    /// `u64`: near-maximum durations round up to one segment too many for
    /// the product to fit in `u32`.
    pub fn covered_secs(&self) -> u64 {
        u64::from(self.num_segments) * u64::from(self.segment_secs)
    }
}

/// Derive the segmentation plan for a track of `total_secs`.
///
/// A segment length above [`EngineLimits::max_segment_secs`] is not an
/// error: it is replaced by the engine's fallback value, logged, and
/// reported through [`SegmentPlan::clamped_from`] so callers can surface it.
pub fn plan_segments(
    total_secs: u32,
    segment_secs: u32,
    limits: EngineLimits,
) -> Result<SegmentPlan, LongplayError> {
    if total_secs == 0 {
        return Err(LongplayError::ZeroTotalDuration);
    }
    if segment_secs == 0 {
        return Err(LongplayError::ZeroSegmentDuration);
    }

    let (effective, clamped_from) = if segment_secs > limits.max_segment_secs {
        warn!(
            "segment length {segment_secs}s exceeds the {}s ceiling, using {}s instead",
            limits.max_segment_secs, limits.fallback_segment_secs
        );
        (limits.fallback_segment_secs, Some(segment_secs))
    } else {
        (segment_secs, None)
    };

    Ok(SegmentPlan {
        total_secs,
        segment_secs: effective,
        num_segments: total_secs.div_ceil(effective),
        tokens_per_segment: effective as usize * limits.tokens_per_second as usize,
        clamped_from,
    })
}

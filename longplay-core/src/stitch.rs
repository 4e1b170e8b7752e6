//! Assembling generated segments into one track of the requested length.

use log::warn;

/// One generated segment and its position in the final track.
///
/// Position travels with the samples instead of being implied by hand-over
/// order, so the stitched result cannot depend on the order segments happen
/// to arrive in.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub index: usize,
    pub samples: Vec<f32>,
}

impl Segment {
    pub fn new(index: usize, samples: Vec<f32>) -> Self {
        Self { index, samples }
    }

    /// Duration in seconds at the given sample rate.
    pub fn duration_secs(&self, sample_rate: u32) -> f64 {
        self.samples.len() as f64 / f64::from(sample_rate)
    }
}

/// The assembled track, trimmed to the requested length where possible.
#[derive(Debug, Clone, PartialEq)]
pub struct StitchedTrack {
    pub samples: Vec<f32>,
    /// Samples missing from the requested length, zero when the request was
    /// fully covered. Under-length audio is kept rather than discarded; the
    /// caller decides how loudly to report it.
    pub shortfall: usize,
}

/// Concatenate segments in index order and trim to `desired_samples`.
///
/// Surplus audio is dropped from the tail. This is the normal case: every
/// segment is generated at full length, so the last one usually overshoots
/// the requested total. A concatenation shorter than requested is kept
/// as-is, with a warning and a non-zero [`StitchedTrack::shortfall`].
pub fn stitch(mut segments: Vec<Segment>, desired_samples: usize) -> StitchedTrack {
    segments.sort_by_key(|segment| segment.index);

    let generated: usize = segments.iter().map(|segment| segment.samples.len()).sum();
    let mut samples = Vec::with_capacity(generated.min(desired_samples));
    // Copy no further than the trim point, so the allocation above is final.
    for segment in &segments {
        let room = desired_samples - samples.len();
        if room == 0 {
            break;
        }
        let take = segment.samples.len().min(room);
        samples.extend_from_slice(&segment.samples[..take]);
    }

    let shortfall = desired_samples - samples.len();
    if shortfall > 0 {
        warn!(
            "stitched audio is shorter than requested: expected {desired_samples} samples, got {}",
            samples.len()
        );
    }

    StitchedTrack { samples, shortfall }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(index: usize, len: usize) -> Segment {
        Segment::new(index, vec![index as f32; len])
    }

    #[test]
    fn truncates_surplus_to_exact_length() {
        let segments = vec![segment(0, 100), segment(1, 100), segment(2, 100)];
        let track = stitch(segments, 250);
        assert_eq!(track.samples.len(), 250);
        assert_eq!(track.shortfall, 0);
        // The trimmed tail comes out of the last segment only.
        assert_eq!(track.samples[199], 1.0);
        assert_eq!(track.samples[200], 2.0);
        assert_eq!(track.samples[249], 2.0);
    }

    #[test]
    fn surplus_copy_stops_at_the_trim_point() {
        let segments = vec![segment(0, 100), segment(1, 100), segment(2, 100)];
        let track = stitch(segments, 150);
        assert_eq!(track.samples.len(), 150);
        assert_eq!(track.shortfall, 0);
        // The cut falls inside segment 1; segment 2 is never copied.
        assert_eq!(track.samples[149], 1.0);
        // The up-front allocation was never outgrown.
        assert_eq!(track.samples.capacity(), 150);
    }

    #[test]
    fn exact_fit_is_left_untouched() {
        let samples: Vec<f32> = (0..400).map(|i| i as f32).collect();
        let track = stitch(vec![Segment::new(0, samples.clone())], 400);
        assert_eq!(track.samples, samples);
        assert_eq!(track.shortfall, 0);
    }

    #[test]
    fn segments_are_ordered_by_index_not_arrival() {
        let segments = vec![segment(2, 10), segment(0, 10), segment(1, 10)];
        let track = stitch(segments, 30);
        assert_eq!(track.samples[0], 0.0);
        assert_eq!(track.samples[10], 1.0);
        assert_eq!(track.samples[20], 2.0);
    }

    #[test]
    fn underlength_output_is_kept_with_shortfall() {
        let segments = vec![segment(0, 100), segment(1, 100)];
        let track = stitch(segments, 300);
        assert_eq!(track.samples.len(), 200);
        assert_eq!(track.shortfall, 100);
    }

    #[test]
    fn no_segments_is_all_shortfall() {
        let track = stitch(Vec::new(), 128);
        assert!(track.samples.is_empty());
        assert_eq!(track.shortfall, 128);
    }

    #[test]
    fn duration_reflects_sample_rate() {
        let seg = segment(0, 32_000);
        assert!((seg.duration_secs(32_000) - 1.0).abs() < f64::EPSILON);
    }
}

//! The five-phase generation run.
//!
//! `Load Model → Select Device → Encode Prompt → Generate Segments →
//! Stitch & Persist`, strictly in that order. Any failure aborts the run;
//! there is no checkpointing and no retry. Progress is reported through a
//! caller-supplied event callback so the library stays silent on its own.

use log::info;

use crate::engine::{Device, TextToAudioEngine};
use crate::plan::{plan_segments, SegmentPlan};
use crate::request::GenerationRequest;
use crate::stitch::{stitch, Segment};
use crate::wav::write_wav;
use crate::LongplayError;

/// One of the five sequential phases of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    LoadModel,
    SelectDevice,
    EncodePrompt,
    GenerateSegments,
    StitchAndPersist,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Phase::LoadModel,
        Phase::SelectDevice,
        Phase::EncodePrompt,
        Phase::GenerateSegments,
        Phase::StitchAndPersist,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Phase::LoadModel => "Loading model",
            Phase::SelectDevice => "Selecting device",
            Phase::EncodePrompt => "Encoding prompt",
            Phase::GenerateSegments => "Generating segments",
            Phase::StitchAndPersist => "Stitching and saving",
        }
    }
}

/// Progress notifications emitted during a run.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// A phase begins. `number` is 1-based out of `total`.
    PhaseStarted {
        phase: Phase,
        number: usize,
        total: usize,
    },
    /// The engine reported which device it runs on.
    DeviceSelected { device: Device },
    /// The segmentation plan is fixed; segment counts are known from here.
    PlanReady { plan: SegmentPlan },
    /// Generation of one segment begins. `index` is 0-based.
    SegmentStarted { index: u32, total: u32 },
    /// Fractional progress within a segment, in `0.0..=1.0`.
    SegmentProgress { index: u32, fraction: f32 },
    /// One segment finished, with the raw sample count it produced.
    SegmentFinished {
        index: u32,
        total: u32,
        generated_samples: usize,
    },
}

/// What a completed run produced, so callers can detect degraded output
/// without parsing logs.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub plan: SegmentPlan,
    pub device: Device,
    pub sample_rate: u32,
    /// Samples actually written to the output file.
    pub samples_written: usize,
    /// Samples missing from the requested length; zero for a conforming run.
    pub shortfall: usize,
}

impl RunSummary {
    /// Whether the output file is shorter than requested.
    pub fn is_underlength(&self) -> bool {
        self.shortfall > 0
    }
}

/// Run the full pipeline, reporting progress through `on_event`.
///
/// The engine is constructed inside the run (by `load_engine`) so that model
/// loading is part of the observable phase sequence.
pub fn run_with_progress<E, L, F>(
    request: &GenerationRequest,
    load_engine: L,
    mut on_event: F,
) -> Result<RunSummary, LongplayError>
where
    E: TextToAudioEngine,
    L: FnOnce() -> Result<E, LongplayError>,
    F: FnMut(ProgressEvent),
{
    request.validate()?;

    let total_phases = Phase::ALL.len();
    let phase = |phase: Phase, number: usize, on_event: &mut F| {
        info!("phase {number}/{total_phases}: {}", phase.label());
        on_event(ProgressEvent::PhaseStarted {
            phase,
            number,
            total: total_phases,
        });
    };

    phase(Phase::LoadModel, 1, &mut on_event);
    let mut engine = load_engine()?;

    phase(Phase::SelectDevice, 2, &mut on_event);
    let device = engine.device();
    info!("running on {}", device.label());
    on_event(ProgressEvent::DeviceSelected { device });

    let plan = plan_segments(request.total_secs, request.segment_secs, engine.limits())?;
    let sample_rate = engine.sample_rate();
    on_event(ProgressEvent::PlanReady { plan });

    phase(Phase::EncodePrompt, 3, &mut on_event);
    let prompt = engine.encode_prompt(&request.prompt)?;

    phase(Phase::GenerateSegments, 4, &mut on_event);
    let mut segments = Vec::with_capacity(plan.num_segments as usize);
    for index in 0..plan.num_segments {
        on_event(ProgressEvent::SegmentStarted {
            index,
            total: plan.num_segments,
        });

        let samples = {
            let mut on_step = |fraction: f32| {
                on_event(ProgressEvent::SegmentProgress { index, fraction });
            };
            engine.generate_segment(&prompt, plan.tokens_per_segment, &mut on_step)?
        };

        on_event(ProgressEvent::SegmentFinished {
            index,
            total: plan.num_segments,
            generated_samples: samples.len(),
        });
        segments.push(Segment::new(index as usize, samples));
    }

    phase(Phase::StitchAndPersist, 5, &mut on_event);
    let track = stitch(segments, plan.desired_samples(sample_rate));
    write_wav(&track.samples, sample_rate, &request.output_path)?;
    info!(
        "wrote {} samples at {sample_rate} Hz to {}",
        track.samples.len(),
        request.output_path.display()
    );

    Ok(RunSummary {
        plan,
        device,
        sample_rate,
        samples_written: track.samples.len(),
        shortfall: track.shortfall,
    })
}

/// Run the full pipeline without progress reporting.
pub fn run<E, L>(request: &GenerationRequest, load_engine: L) -> Result<RunSummary, LongplayError>
where
    E: TextToAudioEngine,
    L: FnOnce() -> Result<E, LongplayError>,
{
    run_with_progress(request, load_engine, |_| {})
}

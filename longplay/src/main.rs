mod cli;

use std::cell::RefCell;
use std::path::PathBuf;

use anyhow::Context;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use longplay_core::musicgen::describe_models;
use longplay_core::{
    config, plan_segments, run_with_progress, GenerationRequest, MusicGenEngine, Phase,
    ProgressEvent, SamplingOptions,
};

use crate::cli::build_cli;

/// Sub-steps shown per segment, so the bar moves during a long decoder loop.
const TICKS_PER_SEGMENT: u64 = 100;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let matches = build_cli().get_matches();

    let total_secs = *matches.get_one::<u32>("duration").expect("defaulted");
    let segment_secs = *matches.get_one::<u32>("segment").expect("defaulted");
    let prompt = matches
        .get_one::<String>("prompt")
        .cloned()
        .expect("defaulted");
    let output = matches
        .get_one::<PathBuf>("output")
        .cloned()
        .expect("defaulted");
    let seed = matches.get_one::<u64>("seed").copied();
    let dry_run = matches.get_flag("dry-run");
    let inspect = matches.get_flag("inspect");

    // Planned against the engine's static limits, so the clamp note is
    // printed whether or not a model ever gets loaded.
    let plan = plan_segments(total_secs, segment_secs, MusicGenEngine::LIMITS)
        .context("failed to plan segments")?;
    if let Some(requested) = plan.clamped_from {
        println!(
            "Note: {requested}s segments exceed the {}s ceiling; using {}s instead.",
            MusicGenEngine::LIMITS.max_segment_secs,
            plan.segment_secs
        );
    }

    if dry_run {
        println!(
            "Dry run: would generate {} segment(s) of {}s ({} tokens each), \
             covering {}s and trimmed to {}s.",
            plan.num_segments,
            plan.segment_secs,
            plan.tokens_per_segment,
            plan.covered_secs(),
            plan.total_secs
        );
        return Ok(());
    }

    let named_model_dir = matches.get_one::<PathBuf>("model-dir").cloned();
    let model_dir = named_model_dir
        .clone()
        .unwrap_or_else(config::default_model_dir);
    config::validate_model_dir(&model_dir)
        .with_context(|| format!("cannot use model directory '{}'", model_dir.display()))?;
    if named_model_dir.is_some() {
        config::remember_model_dir(&model_dir);
    }

    if inspect {
        let descriptions = describe_models(&model_dir)
            .with_context(|| format!("failed to inspect '{}'", model_dir.display()))?;
        for model in descriptions {
            println!("{}", model.file.display());
            println!("  inputs:  {}", model.inputs.join(", "));
            println!("  outputs: {}", model.outputs.join(", "));
        }
        return Ok(());
    }

    let request = GenerationRequest::new(total_secs, segment_secs, prompt, output)
        .context("invalid generation request")?;

    let multi = MultiProgress::with_draw_target(ProgressDrawTarget::stderr());
    let phase_style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] phase {pos}/{len}: {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    let segment_style = ProgressStyle::with_template(
        "  [{elapsed_precise}] {bar:40.cyan/blue} {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar());

    let phase_bar = multi.add(ProgressBar::new(Phase::ALL.len() as u64));
    phase_bar.set_style(phase_style);
    phase_bar.enable_steady_tick(std::time::Duration::from_millis(100));

    let segment_bar: RefCell<Option<ProgressBar>> = RefCell::new(None);

    let sampling = SamplingOptions {
        seed,
        ..SamplingOptions::default()
    };
    let phase_handle = phase_bar.clone();
    let multi_handle = multi.clone();
    let result = run_with_progress(
        &request,
        || MusicGenEngine::load(&model_dir, sampling),
        move |event| match event {
            ProgressEvent::PhaseStarted { phase, number, .. } => {
                phase_handle.set_position(number as u64);
                phase_handle.set_message(phase.label());
            }
            ProgressEvent::DeviceSelected { device } => {
                phase_handle.println(format!("Running on {}", device.label()));
            }
            ProgressEvent::PlanReady { plan } => {
                let bar = multi_handle.add(ProgressBar::new(
                    u64::from(plan.num_segments) * TICKS_PER_SEGMENT,
                ));
                bar.set_style(segment_style.clone());
                *segment_bar.borrow_mut() = Some(bar);
            }
            ProgressEvent::SegmentStarted { index, total } => {
                if let Some(bar) = segment_bar.borrow().as_ref() {
                    bar.set_message(format!("segment {}/{total}", index + 1));
                    bar.set_position(u64::from(index) * TICKS_PER_SEGMENT);
                }
            }
            ProgressEvent::SegmentProgress { index, fraction } => {
                if let Some(bar) = segment_bar.borrow().as_ref() {
                    let ticks = (fraction.clamp(0.0, 1.0) * TICKS_PER_SEGMENT as f32) as u64;
                    bar.set_position(u64::from(index) * TICKS_PER_SEGMENT + ticks);
                }
            }
            ProgressEvent::SegmentFinished { index, .. } => {
                if let Some(bar) = segment_bar.borrow().as_ref() {
                    bar.set_position(u64::from(index + 1) * TICKS_PER_SEGMENT);
                }
            }
        },
    )
    .with_context(|| format!("failed to generate '{}'", request.output_path.display()));

    phase_bar.finish_and_clear();
    let summary = result?;

    let written_secs = summary.samples_written as f64 / f64::from(summary.sample_rate);
    println!(
        "Wrote {} ({:.2}s at {} Hz, {} segment(s)).",
        request.output_path.display(),
        written_secs,
        summary.sample_rate,
        summary.plan.num_segments
    );
    if summary.is_underlength() {
        let missing_secs = summary.shortfall as f64 / f64::from(summary.sample_rate);
        eprintln!(
            "Warning: output is {} samples ({:.2}s) shorter than the requested {}s.",
            summary.shortfall, missing_secs, summary.plan.total_secs
        );
    }

    Ok(())
}

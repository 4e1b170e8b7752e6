use assert_cmd::Command;
use predicates::str::contains;
use tempfile::tempdir;

#[test]
fn dry_run_prints_the_default_plan() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("longplay")?;
    cmd.arg("--dry-run")
        .assert()
        .success()
        .stdout(contains(
            "would generate 9 segment(s) of 28s (1400 tokens each)",
        ))
        .stdout(contains("covering 252s and trimmed to 225s"));
    Ok(())
}

#[test]
fn dry_run_reports_clamped_segment_length() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("longplay")?;
    cmd.args(["--dry-run", "--duration", "60s", "--segment", "30s"])
        .assert()
        .success()
        .stdout(contains("30s segments exceed the 29s ceiling"))
        .stdout(contains("would generate 3 segment(s) of 28s"));
    Ok(())
}

#[test]
fn dry_run_accepts_bare_second_counts() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("longplay")?;
    cmd.args(["--dry-run", "--duration", "56", "--segment", "28"])
        .assert()
        .success()
        .stdout(contains("would generate 2 segment(s) of 28s"));
    Ok(())
}

#[test]
fn clamp_note_is_printed_outside_dry_run() -> Result<(), Box<dyn std::error::Error>> {
    let model_dir = tempdir()?;
    let model_arg = model_dir.path().to_string_lossy().to_string();

    // The run aborts on the incomplete model directory, but the clamp note
    // must already be on stdout by then.
    let mut cmd = Command::cargo_bin("longplay")?;
    cmd.args([
        "--duration",
        "60s",
        "--segment",
        "30s",
        "--model-dir",
        &model_arg,
    ])
    .assert()
    .failure()
    .stdout(contains("30s segments exceed the 29s ceiling"));

    model_dir.close()?;
    Ok(())
}

#[test]
fn invalid_duration_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("longplay")?;
    cmd.args(["--dry-run", "--duration", "5x"])
        .assert()
        .failure()
        .stderr(contains("invalid duration '5x'"));
    Ok(())
}

#[test]
fn zero_duration_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("longplay")?;
    cmd.args(["--dry-run", "--duration", "0"])
        .assert()
        .failure()
        .stderr(contains("duration must be greater than zero"));
    Ok(())
}

#[test]
fn incomplete_model_directory_is_reported_by_name() -> Result<(), Box<dyn std::error::Error>> {
    let model_dir = tempdir()?;
    let model_arg = model_dir.path().to_string_lossy().to_string();

    let mut cmd = Command::cargo_bin("longplay")?;
    cmd.args(["--model-dir", &model_arg])
        .assert()
        .failure()
        .stderr(contains("cannot use model directory"))
        .stderr(contains("text_encoder.onnx"));

    model_dir.close()?;
    Ok(())
}

#[test]
fn inspect_requires_a_complete_model_directory() -> Result<(), Box<dyn std::error::Error>> {
    let model_dir = tempdir()?;
    let model_arg = model_dir.path().to_string_lossy().to_string();

    let mut cmd = Command::cargo_bin("longplay")?;
    cmd.args(["--inspect", "--model-dir", &model_arg])
        .assert()
        .failure()
        .stderr(contains("cannot use model directory"));

    model_dir.close()?;
    Ok(())
}

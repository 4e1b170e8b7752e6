//! Persisted settings: which model directories the user has pointed us at.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::LongplayError;

/// On-disk application settings. Model directories are kept most recently
/// used first.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LongplayConfig {
    pub model_dirs: Vec<PathBuf>,
}

/// Artifacts a MusicGen ONNX export must provide.
pub const REQUIRED_MODEL_FILES: &[&str] = &[
    "text_encoder.onnx",
    "decoder_model_merged.onnx",
    "encodec_decode.onnx",
    "tokenizer.json",
];

pub fn config_path() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("longplay");
    path.push("config.json");
    path
}

pub fn load_config() -> LongplayConfig {
    let path = config_path();
    match std::fs::read_to_string(&path) {
        Ok(contents) => serde_json::from_str(&contents).unwrap_or_default(),
        Err(_) => LongplayConfig::default(),
    }
}

/// Best-effort write; settings loss is never worth failing a run over.
pub fn save_config(config: &LongplayConfig) {
    let path = config_path();
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if let Ok(json) = serde_json::to_string_pretty(config) {
        let _ = std::fs::write(&path, json);
    }
}

/// Record `dir` as the most recently used model directory.
pub fn remember_model_dir(dir: &Path) {
    let mut config = load_config();
    config.model_dirs.retain(|known| known != dir);
    config.model_dirs.insert(0, dir.to_path_buf());
    save_config(&config);
}

/// Directory to load models from when the caller does not name one: the most
/// recently remembered directory, or `models/musicgen-small`.
pub fn default_model_dir() -> PathBuf {
    load_config()
        .model_dirs
        .first()
        .cloned()
        .unwrap_or_else(|| PathBuf::from("models/musicgen-small"))
}

/// Check that `dir` holds every artifact the engine needs, reporting the
/// first missing file.
pub fn validate_model_dir(dir: &Path) -> Result<(), LongplayError> {
    for file in REQUIRED_MODEL_FILES {
        if !dir.join(file).exists() {
            return Err(LongplayError::MissingModelFile {
                dir: dir.to_path_buf(),
                file,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn validate_reports_first_missing_file() {
        let dir = tempdir().expect("tempdir");
        let err = validate_model_dir(dir.path()).expect_err("empty dir must fail");
        match err {
            LongplayError::MissingModelFile { file, .. } => {
                assert_eq!(file, "text_encoder.onnx");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn validate_accepts_complete_directory() {
        let dir = tempdir().expect("tempdir");
        for file in REQUIRED_MODEL_FILES {
            std::fs::write(dir.path().join(file), b"stub").expect("write stub");
        }
        assert!(validate_model_dir(dir.path()).is_ok());
    }

    #[test]
    fn validate_names_the_gap_not_just_the_directory() {
        let dir = tempdir().expect("tempdir");
        for file in REQUIRED_MODEL_FILES {
            if *file != "tokenizer.json" {
                std::fs::write(dir.path().join(file), b"stub").expect("write stub");
            }
        }
        let err = validate_model_dir(dir.path()).expect_err("incomplete dir must fail");
        assert!(err.to_string().contains("tokenizer.json"));
    }
}

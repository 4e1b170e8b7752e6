//! MusicGen over ONNX Runtime: the concrete [`TextToAudioEngine`].
//!
//! The pipeline is the standard MusicGen export: T5 text encoder, merged
//! autoregressive decoder with KV caches, EnCodec decoder. The prompt is
//! encoded once and reused read-only for every segment; each segment runs
//! the delay-pattern decoder loop for the caller's token budget.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::info;
use ndarray::{s, Array1, Array2, Array3, ArrayD, Axis, IxDyn};
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::Session;
use ort::value::Tensor;
use rand::distributions::WeightedIndex;
use rand::prelude::*;
use rand::rngs::StdRng;

use crate::config::{validate_model_dir, REQUIRED_MODEL_FILES};
use crate::engine::{Device, EngineLimits, TextToAudioEngine};
use crate::LongplayError;

const NUM_CODEBOOKS: usize = 4;
const NUM_HEADS: usize = 16;
const HEAD_DIM: usize = 64;
const NUM_LAYERS: usize = 24;
const BOS_TOKEN: i64 = 2048;
const PAD_TOKEN: i64 = 2048;

/// Positions the exported decoder can address. One position holds the BOS
/// token, so the largest usable token budget is one less than this.
const DECODER_POSITIONS: usize = 1500;

/// Audio samples per second produced by the EnCodec decoder.
const SAMPLE_RATE: u32 = 32_000;

/// How sampling is done at each decoder step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingOptions {
    /// Number of highest-probability tokens to sample among.
    pub top_k: usize,
    /// Classifier-free guidance scale.
    pub guidance_scale: f32,
    /// Fixed RNG seed for reproducible output; `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for SamplingOptions {
    fn default() -> Self {
        Self {
            top_k: 50,
            guidance_scale: 3.0,
            seed: None,
        }
    }
}

/// Prompt state computed once per run: the CFG-stacked T5 hidden states and
/// attention mask, ready to feed the decoder for every segment.
pub struct EncodedPrompt {
    encoder_hidden_states: Array3<f32>,
    encoder_attention_mask: Array2<i64>,
}

/// MusicGen engine backed by three ONNX sessions and a tokenizer.
pub struct MusicGenEngine {
    text_encoder: Session,
    decoder: Session,
    encodec_decode: Session,
    tokenizer: tokenizers::Tokenizer,
    device: Device,
    sampling: SamplingOptions,
    rng: StdRng,
}

impl MusicGenEngine {
    /// Fixed properties of this export, available without loading it.
    pub const LIMITS: EngineLimits = EngineLimits {
        tokens_per_second: 50,
        max_segment_secs: 29,
        fallback_segment_secs: 28,
    };

    /// Load all sessions and the tokenizer from `model_dir`.
    ///
    /// The directory is validated up front so a missing artifact is reported
    /// by name instead of surfacing as a session error mid-load.
    pub fn load(model_dir: &Path, sampling: SamplingOptions) -> Result<Self, LongplayError> {
        validate_model_dir(model_dir)?;

        let device = Device::detect();
        let session = || -> Result<SessionBuilder, ort::Error> {
            let builder =
                Session::builder()?.with_optimization_level(GraphOptimizationLevel::Level1)?;
            #[cfg(feature = "cuda")]
            let builder = if device.is_accelerated() {
                use ort::execution_providers::CUDAExecutionProvider;
                builder
                    .with_execution_providers([CUDAExecutionProvider::default().build()])?
            } else {
                builder
            };
            Ok(builder)
        };

        info!("loading text_encoder.onnx");
        let text_encoder = session()?.commit_from_file(model_dir.join("text_encoder.onnx"))?;
        info!("loading decoder_model_merged.onnx");
        let decoder = session()?.commit_from_file(model_dir.join("decoder_model_merged.onnx"))?;
        info!("loading encodec_decode.onnx");
        let encodec_decode = session()?.commit_from_file(model_dir.join("encodec_decode.onnx"))?;
        info!("loading tokenizer");
        let tokenizer = tokenizers::Tokenizer::from_file(model_dir.join("tokenizer.json"))
            .map_err(|e| LongplayError::Tokenizer(e.to_string()))?;
        info!("all models loaded");

        let rng = match sampling.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            text_encoder,
            decoder,
            encodec_decode,
            tokenizer,
            device,
            sampling,
            rng,
        })
    }

    fn check_budget(token_budget: usize) -> Result<(), LongplayError> {
        // The budget must leave at least one aligned timestep after the
        // codebook delays and fit the decoder's position range with BOS.
        let min = NUM_CODEBOOKS;
        let max = DECODER_POSITIONS - 1;
        if token_budget < min || token_budget > max {
            return Err(LongplayError::TokenBudgetOutOfRange {
                budget: token_budget,
                min,
                max,
            });
        }
        Ok(())
    }
}

impl TextToAudioEngine for MusicGenEngine {
    type Prompt = EncodedPrompt;

    fn limits(&self) -> EngineLimits {
        Self::LIMITS
    }

    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn device(&self) -> Device {
        self.device
    }

    fn encode_prompt(&mut self, text: &str) -> Result<EncodedPrompt, LongplayError> {
        // add_special_tokens=true appends the T5 EOS token
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| LongplayError::Tokenizer(e.to_string()))?;
        let token_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
        let attention: Vec<i64> = encoding
            .get_attention_mask()
            .iter()
            .map(|&m| m as i64)
            .collect();
        let text_seq_len = token_ids.len();

        let input_ids = Array2::from_shape_vec((1, text_seq_len), token_ids)?;
        let attention_mask = Array2::from_shape_vec((1, text_seq_len), attention)?;

        let cond_hidden = {
            let input_ids_tensor = Tensor::from_array(input_ids)?;
            let attn_tensor = Tensor::from_array(attention_mask.clone())?;
            let outputs = self.text_encoder.run(ort::inputs! {
                "input_ids" => input_ids_tensor,
                "attention_mask" => attn_tensor,
            })?;
            outputs["last_hidden_state"]
                .try_extract_array::<f32>()?
                .to_owned()
        };

        // CFG batch: conditional hidden states stacked over an all-zeros
        // unconditional row, matching the reference MusicGen exports.
        let cond_hidden_3d = cond_hidden.into_dimensionality::<ndarray::Ix3>()?;
        let uncond_hidden = Array3::<f32>::zeros(cond_hidden_3d.raw_dim());
        let encoder_hidden_states = ndarray::concatenate(
            Axis(0),
            &[cond_hidden_3d.view(), uncond_hidden.view()],
        )?;

        let uncond_attn = Array2::<i64>::zeros(attention_mask.raw_dim());
        let encoder_attention_mask =
            ndarray::concatenate(Axis(0), &[attention_mask.view(), uncond_attn.view()])?;

        Ok(EncodedPrompt {
            encoder_hidden_states,
            encoder_attention_mask,
        })
    }

    fn generate_segment(
        &mut self,
        prompt: &EncodedPrompt,
        token_budget: usize,
        on_step: &mut dyn FnMut(f32),
    ) -> Result<Vec<f32>, LongplayError> {
        Self::check_budget(token_budget)?;

        // Delay pattern: codebook k trails k positions behind codebook 0.
        // Position 0 holds BOS for every codebook; codebook k starts
        // producing at position 1 + k.
        let total_seq_len = token_budget + 1;
        let total_codebook_rows = 2 * NUM_CODEBOOKS; // CFG batch

        let mut all_tokens = Array2::from_elem((total_codebook_rows, total_seq_len), PAD_TOKEN);
        for r in 0..total_codebook_rows {
            all_tokens[[r, 0]] = BOS_TOKEN;
        }

        let batch_size = 2usize;
        let mut decoder_cache: HashMap<String, ArrayD<f32>> = HashMap::new();
        let mut encoder_cache: HashMap<String, ArrayD<f32>> = HashMap::new();

        for layer in 0..NUM_LAYERS {
            decoder_cache.insert(
                format!("past_key_values.{layer}.decoder.key"),
                ArrayD::zeros(IxDyn(&[batch_size, NUM_HEADS, 0, HEAD_DIM])),
            );
            decoder_cache.insert(
                format!("past_key_values.{layer}.decoder.value"),
                ArrayD::zeros(IxDyn(&[batch_size, NUM_HEADS, 0, HEAD_DIM])),
            );
            encoder_cache.insert(
                format!("past_key_values.{layer}.encoder.key"),
                ArrayD::zeros(IxDyn(&[batch_size, NUM_HEADS, 0, HEAD_DIM])),
            );
            encoder_cache.insert(
                format!("past_key_values.{layer}.encoder.value"),
                ArrayD::zeros(IxDyn(&[batch_size, NUM_HEADS, 0, HEAD_DIM])),
            );
        }

        let mut next_tokens = Array2::from_elem((total_codebook_rows, 1), BOS_TOKEN);
        let num_gen_steps = token_budget;

        for step in 0..num_gen_steps {
            let use_cache = step > 0;

            let mut inputs: Vec<(
                std::borrow::Cow<'_, str>,
                ort::session::SessionInputValue<'_>,
            )> = Vec::new();

            inputs.push((
                "encoder_attention_mask".into(),
                Tensor::from_array(prompt.encoder_attention_mask.clone())?.into(),
            ));
            inputs.push((
                "input_ids".into(),
                Tensor::from_array(next_tokens.clone())?.into(),
            ));
            inputs.push((
                "encoder_hidden_states".into(),
                Tensor::from_array(prompt.encoder_hidden_states.clone())?.into(),
            ));

            for layer in 0..NUM_LAYERS {
                let dk = format!("past_key_values.{layer}.decoder.key");
                let dv = format!("past_key_values.{layer}.decoder.value");
                let ek = format!("past_key_values.{layer}.encoder.key");
                let ev = format!("past_key_values.{layer}.encoder.value");

                inputs.push((
                    dk.clone().into(),
                    Tensor::from_array(decoder_cache[&dk].clone())?.into(),
                ));
                inputs.push((
                    dv.clone().into(),
                    Tensor::from_array(decoder_cache[&dv].clone())?.into(),
                ));
                inputs.push((
                    ek.clone().into(),
                    Tensor::from_array(encoder_cache[&ek].clone())?.into(),
                ));
                inputs.push((
                    ev.clone().into(),
                    Tensor::from_array(encoder_cache[&ev].clone())?.into(),
                ));
            }

            let cache_flag = Array1::from_vec(vec![use_cache]);
            inputs.push((
                "use_cache_branch".into(),
                Tensor::from_array(cache_flag)?.into(),
            ));

            let outputs = self.decoder.run(inputs)?;

            let logits = outputs["logits"].try_extract_array::<f32>()?.to_owned();

            for layer in 0..NUM_LAYERS {
                let dk = format!("past_key_values.{layer}.decoder.key");
                let dv = format!("past_key_values.{layer}.decoder.value");
                let pdk = format!("present.{layer}.decoder.key");
                let pdv = format!("present.{layer}.decoder.value");
                decoder_cache.insert(
                    dk,
                    outputs[pdk.as_str()].try_extract_array::<f32>()?.to_owned(),
                );
                decoder_cache.insert(
                    dv,
                    outputs[pdv.as_str()].try_extract_array::<f32>()?.to_owned(),
                );
            }

            // Encoder KV caches only change on the first step.
            if !use_cache {
                for layer in 0..NUM_LAYERS {
                    let ek = format!("past_key_values.{layer}.encoder.key");
                    let ev = format!("past_key_values.{layer}.encoder.value");
                    let pek = format!("present.{layer}.encoder.key");
                    let pev = format!("present.{layer}.encoder.value");
                    encoder_cache.insert(
                        ek,
                        outputs[pek.as_str()].try_extract_array::<f32>()?.to_owned(),
                    );
                    encoder_cache.insert(
                        ev,
                        outputs[pev.as_str()].try_extract_array::<f32>()?.to_owned(),
                    );
                }
            }

            let logits_3d = logits.into_dimensionality::<ndarray::Ix3>()?;
            let cond_logits = logits_3d.slice(s![..NUM_CODEBOOKS, .., ..]).to_owned();
            let uncond_logits = logits_3d.slice(s![NUM_CODEBOOKS.., .., ..]).to_owned();

            // CFG: guided = uncond + scale * (cond - uncond)
            let cfg_logits =
                &uncond_logits + self.sampling.guidance_scale * (&cond_logits - &uncond_logits);

            let mut sampled = vec![PAD_TOKEN; total_codebook_rows];
            for cb in 0..NUM_CODEBOOKS {
                let logit_row: Vec<f32> = cfg_logits.slice(s![cb, 0, ..]).iter().copied().collect();
                let token = top_k_sample(&logit_row, self.sampling.top_k, &mut self.rng);
                sampled[cb] = token;
                sampled[cb + NUM_CODEBOOKS] = token;
            }

            // Step 0 produces position 1, and so on.
            let pos = step + 1;
            if pos < total_seq_len {
                for r in 0..total_codebook_rows {
                    let cb = r % NUM_CODEBOOKS;
                    let delay = cb;
                    if pos > delay {
                        all_tokens[[r, pos]] = sampled[r];
                    }
                    // else: before this codebook's active region, stays PAD
                }

                next_tokens = Array2::zeros((total_codebook_rows, 1));
                for r in 0..total_codebook_rows {
                    next_tokens[[r, 0]] = all_tokens[[r, pos]];
                }
            }

            on_step(step as f32 / num_gen_steps as f32);
        }

        on_step(1.0);

        // Un-delay: aligned timestep t of codebook k lives at position
        // 1 + k + t, so the delays cost (NUM_CODEBOOKS - 1) timesteps.
        let aligned_len = total_seq_len - 1 - (NUM_CODEBOOKS - 1);
        let mut audio_codes_flat = vec![0i64; NUM_CODEBOOKS * aligned_len];
        for cb in 0..NUM_CODEBOOKS {
            for t in 0..aligned_len {
                let src_col = 1 + cb + t;
                if src_col < total_seq_len {
                    let val = all_tokens[[cb, src_col]];
                    audio_codes_flat[cb * aligned_len + t] =
                        if val == PAD_TOKEN { 0 } else { val };
                }
            }
        }

        let codes_shape = [1usize, 1, NUM_CODEBOOKS, aligned_len];
        let codes_tensor = Tensor::from_array((codes_shape, audio_codes_flat))?;
        let decode_outputs = self.encodec_decode.run(ort::inputs! {
            "audio_codes" => codes_tensor,
        })?;

        let audio_values = decode_outputs["audio_values"]
            .try_extract_array::<f32>()?
            .to_owned();

        Ok(audio_values.iter().copied().collect())
    }
}

/// Sample one token from the top `k` logits via softmax weights.
///
/// Falls back to the argmax when the weights are degenerate (all zero after
/// exponentiation), which can only happen with extreme logit values.
fn top_k_sample(logits: &[f32], k: usize, rng: &mut impl Rng) -> i64 {
    let k = k.min(logits.len()).max(1);

    let mut indexed: Vec<(usize, f32)> = logits.iter().enumerate().map(|(i, &v)| (i, v)).collect();
    indexed.sort_unstable_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    indexed.truncate(k);

    let max_logit = indexed[0].1;
    let exps: Vec<f32> = indexed.iter().map(|(_, v)| (v - max_logit).exp()).collect();
    let sum: f32 = exps.iter().sum();
    let probs: Vec<f32> = exps.iter().map(|e| e / sum).collect();

    match WeightedIndex::new(&probs) {
        Ok(dist) => indexed[dist.sample(rng)].0 as i64,
        Err(_) => indexed[0].0 as i64,
    }
}

/// Input and output names of one ONNX graph, for diagnostics.
#[derive(Debug, Clone)]
pub struct ModelDescription {
    pub file: PathBuf,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

/// Describe every ONNX graph in `model_dir` without running anything.
pub fn describe_models(model_dir: &Path) -> Result<Vec<ModelDescription>, LongplayError> {
    let mut descriptions = Vec::new();
    for file in REQUIRED_MODEL_FILES {
        if !file.ends_with(".onnx") {
            continue;
        }
        let path = model_dir.join(file);
        let session = Session::builder()?.commit_from_file(&path)?;
        descriptions.push(ModelDescription {
            file: path,
            inputs: session
                .inputs()
                .iter()
                .map(|i| i.name().to_string())
                .collect(),
            outputs: session
                .outputs()
                .iter()
                .map(|o| o.name().to_string())
                .collect(),
        });
    }
    Ok(descriptions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn budget_bounds_match_decoder_capacity() {
        assert!(MusicGenEngine::check_budget(1400).is_ok());
        assert!(MusicGenEngine::check_budget(1499).is_ok());
        assert!(matches!(
            MusicGenEngine::check_budget(1500),
            Err(LongplayError::TokenBudgetOutOfRange { budget: 1500, .. })
        ));
        assert!(matches!(
            MusicGenEngine::check_budget(3),
            Err(LongplayError::TokenBudgetOutOfRange { budget: 3, .. })
        ));
    }

    #[test]
    fn ceiling_times_token_rate_fits_the_budget() {
        let limits = MusicGenEngine::LIMITS;
        let max_budget = limits.max_segment_secs as usize * limits.tokens_per_second as usize;
        assert!(MusicGenEngine::check_budget(max_budget).is_ok());
        // One more second would overrun the decoder's position range.
        let over = max_budget + limits.tokens_per_second as usize;
        assert!(MusicGenEngine::check_budget(over).is_err());
    }

    #[test]
    fn top_k_sample_with_k_one_is_greedy() {
        let logits = [0.1, 5.0, -2.0, 3.0];
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..10 {
            assert_eq!(top_k_sample(&logits, 1, &mut rng), 1);
        }
    }

    #[test]
    fn top_k_sample_never_leaves_the_top_k() {
        let logits = [10.0, 9.0, -100.0, -100.0, -100.0];
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..50 {
            let token = top_k_sample(&logits, 2, &mut rng);
            assert!(token == 0 || token == 1);
        }
    }

    #[test]
    fn top_k_sample_is_deterministic_under_a_fixed_seed() {
        let logits: Vec<f32> = (0..64).map(|i| (i % 7) as f32).collect();
        let a: Vec<i64> = {
            let mut rng = StdRng::seed_from_u64(123);
            (0..20).map(|_| top_k_sample(&logits, 50, &mut rng)).collect()
        };
        let b: Vec<i64> = {
            let mut rng = StdRng::seed_from_u64(123);
            (0..20).map(|_| top_k_sample(&logits, 50, &mut rng)).collect()
        };
        assert_eq!(a, b);
    }

    #[test]
    fn default_sampling_matches_model_constants() {
        let sampling = SamplingOptions::default();
        assert_eq!(sampling.top_k, 50);
        assert_eq!(sampling.guidance_scale, 3.0);
        assert_eq!(sampling.seed, None);
    }
}

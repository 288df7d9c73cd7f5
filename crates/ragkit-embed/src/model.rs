use anyhow::{anyhow, ensure, Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use ragkit_core::traits::Embedder;

use crate::device::select_device;
use crate::pool::masked_mean_l2;
use crate::tokenize::tokenize_on_device;

/// Sentence-transformer style BERT encoder (e.g. all-MiniLM-L6-v2) with
/// masked mean pooling and L2 normalization.
///
/// `model_dir` must hold `tokenizer.json`, `config.json` and either
/// `model.safetensors` or `pytorch_model.bin`.
pub struct BertEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    dim: usize,
    max_len: usize,
}

impl BertEmbedder {
    pub fn load(model_dir: &Path, max_len: usize) -> Result<Self> {
        ensure!(max_len > 0, "max_len must be > 0");
        let device = select_device();
        info!("loading embedding model from {}", model_dir.display());

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;

        let config_path = model_dir.join("config.json");
        let config: BertConfig = serde_json::from_str(
            &std::fs::read_to_string(&config_path).with_context(|| format!("reading {}", config_path.display()))?,
        )
        .with_context(|| format!("parsing {}", config_path.display()))?;

        let weights = load_weights(model_dir, &device)?;
        let vb = VarBuilder::from_tensors(weights, DType::F32, &device);
        let model = BertModel::load(vb, &config)?;
        let max_len = max_len.min(config.max_position_embeddings);
        info!(dim = config.hidden_size, max_len, "embedding model ready");
        Ok(Self { model, tokenizer, device, dim: config.hidden_size, max_len })
    }

    pub fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let start = Instant::now();
        let enc = tokenize_on_device(&self.tokenizer, text, self.max_len, &self.device)?;
        let hidden = self.model.forward(&enc.input_ids, &enc.token_type_ids, Some(&enc.attention_mask))?;
        let pooled = masked_mean_l2(&hidden, &enc.attention_mask)?;
        let emb = pooled.to_device(&Device::Cpu)?.squeeze(0)?.to_vec1::<f32>()?;
        ensure!(emb.len() == self.dim, "model produced {} dims, expected {}", emb.len(), self.dim);
        let elapsed = start.elapsed();
        if elapsed.as_millis() > 100 {
            warn!(elapsed_ms = elapsed.as_millis(), "slow embedding");
        } else {
            debug!(elapsed_us = elapsed.as_micros(), "embedded text");
        }
        Ok(emb)
    }
}

fn load_weights(model_dir: &Path, device: &Device) -> Result<HashMap<String, Tensor>> {
    let safetensors = model_dir.join("model.safetensors");
    if safetensors.exists() {
        return candle_core::safetensors::load(&safetensors, device)
            .with_context(|| format!("reading {}", safetensors.display()));
    }
    let pickle = model_dir.join("pytorch_model.bin");
    if pickle.exists() {
        let tensors = candle_core::pickle::read_all(&pickle).with_context(|| format!("reading {}", pickle.display()))?;
        return tensors
            .into_iter()
            .map(|(name, t)| -> Result<(String, Tensor)> { Ok((name, t.to_device(device)?)) })
            .collect();
    }
    Err(anyhow!("no model.safetensors or pytorch_model.bin under {}", model_dir.display()))
}

impl Embedder for BertEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn max_len(&self) -> usize {
        self.max_len
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed_text(t)).collect()
    }
}

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaModel};
use tokenizers::Tokenizer;

use scrivener_core::traits::Embedder;
use scrivener_core::Error;

use crate::device::select_device;
use crate::pool::masked_mean_l2;
use crate::tokenize::encode_padded;

const BGE_M3_DIM: usize = 1024;
const BGE_M3_MAX_LEN: usize = 256;

struct BgeM3Model {
    model: XLMRobertaModel,
    tokenizer: Tokenizer,
    device: Device,
}

impl BgeM3Model {
    fn load(model_dir: &Path) -> Result<Self> {
        let device = select_device();
        tracing::info!(dir = %model_dir.display(), "loading BGE-M3 model");
        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;
        let config_path = model_dir.join("config.json");
        let config: XLMRobertaConfig = serde_json::from_str(&std::fs::read_to_string(&config_path)?)?;
        let weights = candle_core::pickle::read_all(model_dir.join("pytorch_model.bin"))?;
        let weights_map: std::collections::HashMap<String, Tensor> = weights.into_iter().collect();
        let vb = VarBuilder::from_tensors(weights_map, DType::F32, &device);
        let model = XLMRobertaModel::new(&config, vb)?;
        tracing::info!("BGE-M3 model loaded");
        Ok(Self { model, tokenizer, device })
    }

    fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let start = Instant::now();
        let enc = encode_padded(&self.tokenizer, text, BGE_M3_MAX_LEN, &self.device)?;
        if enc.truncated { tracing::debug!(max_len = BGE_M3_MAX_LEN, "input truncated before embedding"); }
        let token_type_ids = Tensor::zeros((1, BGE_M3_MAX_LEN), DType::I64, &self.device)?;
        let hidden = self.model.forward(&enc.input_ids, &enc.attention_mask, &token_type_ids, None, None, None)?;
        let pooled = masked_mean_l2(&hidden, &enc.attention_mask)?;
        let v: Vec<f32> = pooled.to_device(&Device::Cpu)?.squeeze(0)?.to_vec1()?;
        if v.len() != BGE_M3_DIM { return Err(anyhow!("unexpected embedding dim {}", v.len())); }
        if start.elapsed().as_millis() > 100 { tracing::debug!(ms = start.elapsed().as_millis() as u64, "slow embedding"); }
        Ok(v)
    }
}

/// Local BGE-M3 (XLM-RoBERTa) embedder. Inference runs on the blocking pool.
pub struct BgeM3Embedder {
    inner: Arc<BgeM3Model>,
    id: String,
}

impl BgeM3Embedder {
    pub fn load(model_dir: &Path) -> scrivener_core::Result<Self> {
        let inner = BgeM3Model::load(model_dir).map_err(|e| Error::Configuration(format!("BGE-M3 load failed: {}", e)))?;
        Ok(Self { inner: Arc::new(inner), id: format!("bge-m3:d{}", BGE_M3_DIM) })
    }
}

#[async_trait]
impl Embedder for BgeM3Embedder {
    fn embedder_id(&self) -> &str { &self.id }
    fn dim(&self) -> usize { BGE_M3_DIM }
    fn max_len(&self) -> usize { BGE_M3_MAX_LEN }

    async fn embed_batch(&self, texts: &[String]) -> scrivener_core::Result<Vec<Vec<f32>>> {
        let inner = Arc::clone(&self.inner);
        let texts = texts.to_vec();
        tokio::task::spawn_blocking(move || texts.iter().map(|t| inner.embed_one(t)).collect::<Result<Vec<_>>>())
            .await
            .map_err(|e| Error::operation(format!("embedding task failed: {}", e)))?
            .map_err(|e| Error::operation(format!("embedding failed: {}", e)))
    }
}

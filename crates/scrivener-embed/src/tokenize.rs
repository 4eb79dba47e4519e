use anyhow::{anyhow, Result};
use candle_core::{Device, Tensor};
use tokenizers::Tokenizer;

/// XLM-RoBERTa's `<pad>` id, used when the tokenizer file does not name one.
const FALLBACK_PAD_ID: u32 = 1;

pub struct EncodedInput {
    /// `[1, max_len]`
    pub input_ids: Tensor,
    /// `[1, max_len]`, 1 for real tokens.
    pub attention_mask: Tensor,
    pub truncated: bool,
}

/// Cut or pad `ids` to exactly `max_len`. A cut input keeps its final
/// (end-of-sequence) token in the last slot.
pub fn fit_ids(mut ids: Vec<u32>, max_len: usize, pad_id: u32) -> (Vec<u32>, Vec<u32>, bool) {
    let truncated = ids.len() > max_len;
    if truncated {
        let eos = ids.last().copied();
        ids.truncate(max_len);
        if let (Some(slot), Some(eos)) = (ids.last_mut(), eos) { *slot = eos; }
    }
    let real = ids.len();
    let mut mask = vec![1u32; real];
    ids.resize(max_len, pad_id);
    mask.resize(max_len, 0);
    (ids, mask, truncated)
}

pub fn encode_padded(tokenizer: &Tokenizer, text: &str, max_len: usize, device: &Device) -> Result<EncodedInput> {
    let enc = tokenizer.encode(text, true).map_err(|e| anyhow!("tokenization failed: {}", e))?;
    let pad_id = tokenizer.token_to_id("<pad>").unwrap_or(FALLBACK_PAD_ID);
    let (ids, mask, truncated) = fit_ids(enc.get_ids().to_vec(), max_len, pad_id);
    Ok(EncodedInput {
        input_ids: Tensor::from_vec(ids, (1, max_len), device)?,
        attention_mask: Tensor::from_vec(mask, (1, max_len), device)?,
        truncated,
    })
}

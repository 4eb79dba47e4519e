use anyhow::{bail, ensure, Result};
use candle_core::{DType, Tensor};

/// Mean of `hidden` `[B,T,H]` over positions where `attention_mask` `[B,T]`
/// is 1, scaled to unit length. Fully masked rows pool to zeros, not NaN.
pub fn masked_mean_l2(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    let (batch, width) = match hidden.dims() {
        &[b, _, h] => (b, h),
        other => bail!("hidden shape must be [B,T,H], got {:?}", other),
    };
    let mask = attention_mask.to_device(hidden.device())?.to_dtype(DType::F32)?;
    let summed = hidden.to_dtype(DType::F32)?.broadcast_mul(&mask.unsqueeze(2)?)?.sum(1)?;
    let counts = (mask.sum_keepdim(1)? + 1e-9)?;
    let mean = summed.broadcast_div(&counts)?;
    let norm = (mean.sqr()?.sum_keepdim(1)?.sqrt()? + 1e-12)?;
    let pooled = mean.broadcast_div(&norm)?;
    ensure!(pooled.dims() == [batch, width], "pooled shape mismatch: {:?}", pooled.dims());
    Ok(pooled)
}

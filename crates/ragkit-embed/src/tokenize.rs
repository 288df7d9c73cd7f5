use anyhow::{anyhow, Result};
use candle_core::{Device, Tensor};
use tokenizers::Tokenizer;

/// Encoded single text as `[1,T]` tensors: `(input_ids, token_type_ids, attention_mask)`.
pub struct Encoded {
    pub input_ids: Tensor,
    pub token_type_ids: Tensor,
    pub attention_mask: Tensor,
}

/// Tokenize one text, truncating to `max_len` tokens. No padding: batches are size one.
pub fn tokenize_on_device(tokenizer: &Tokenizer, text: &str, max_len: usize, device: &Device) -> Result<Encoded> {
    let enc = tokenizer.encode(text, true).map_err(|e| anyhow!("Tokenization failed: {}", e))?;
    let take = enc.get_ids().len().min(max_len);
    let ids = &enc.get_ids()[..take];
    let types = &enc.get_type_ids()[..take];
    let mask = &enc.get_attention_mask()[..take];
    Ok(Encoded {
        input_ids: Tensor::new(ids, device)?.unsqueeze(0)?,
        token_type_ids: Tensor::new(types, device)?.unsqueeze(0)?,
        attention_mask: Tensor::new(mask, device)?.unsqueeze(0)?,
    })
}

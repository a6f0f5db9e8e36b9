//! Sentence-transformer embeddings over ONNX Runtime.
//!
//! Mean-pooled, L2-normalised vectors from a model directory holding
//! `model.onnx` and `tokenizer.json` (all-MiniLM-L6-v2 gives 384 dimensions).

use std::path::Path;
use std::sync::Mutex;

use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use crate::embedder::{TextEmbedder, normalize};

/// Passage and query embedder backed by an ONNX sentence-transformer.
///
/// The session needs exclusive access per run, so it sits behind a mutex and
/// the embedder can be shared across concurrent pipeline runs.
pub struct OnnxEmbedder {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    dim: usize,
}

impl OnnxEmbedder {
    /// Maximum tokens per input; MiniLM was trained on 256.
    const MAX_TOKENS: usize = 256;

    pub fn load(model_dir: &Path) -> anyhow::Result<Self> {
        let model_path = model_dir.join("model.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");
        for required in [&model_path, &tokenizer_path] {
            anyhow::ensure!(required.exists(), "{} not found", required.display());
        }

        let session = Session::builder()?.commit_from_file(&model_path)?;
        let dim = infer_dim(session.outputs()[0].dtype()).unwrap_or(384);

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("load tokenizer: {e}"))?;
        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: Self::MAX_TOKENS,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("set truncation: {e}"))?;
        tokenizer.with_padding(Some(tokenizers::PaddingParams::default()));

        info!(dim, model = %model_path.display(), "loaded embedding model");
        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            dim,
        })
    }
}

impl TextEmbedder for OnnxEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn embed_batch(&self, texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| anyhow::anyhow!("tokenize: {e}"))?;
        let batch = TokenBatch::pack(&encodings);
        let mask = batch.attention_mask.clone();
        let shape = [batch.rows as i64, batch.seq_len as i64];

        let mut session = self
            .session
            .lock()
            .map_err(|e| anyhow::anyhow!("embedding session poisoned: {e}"))?;
        let input_ids = Tensor::from_array((shape, batch.input_ids.into_boxed_slice()))?;
        let attention_mask = Tensor::from_array((shape, batch.attention_mask.into_boxed_slice()))?;
        let token_type_ids = Tensor::from_array((shape, batch.token_type_ids.into_boxed_slice()))?;
        let outputs = session.run(ort::inputs![
            "input_ids" => input_ids,
            "attention_mask" => attention_mask,
            "token_type_ids" => token_type_ids,
        ])?;

        // Token states: [rows, seq_len, dim].
        let (out_shape, hidden) = outputs[0].try_extract_tensor::<f32>()?;
        let dims: &[i64] = out_shape;
        anyhow::ensure!(
            dims.len() == 3 && dims[0] as usize == batch.rows && dims[2] as usize == self.dim,
            "unexpected output shape {dims:?} for {} inputs of dim {}",
            batch.rows,
            self.dim
        );
        let out_seq = dims[1] as usize;

        let vectors = (0..batch.rows)
            .map(|row| {
                let row_mask = &mask[row * batch.seq_len..(row + 1) * batch.seq_len];
                let row_hidden = &hidden[row * out_seq * self.dim..(row + 1) * out_seq * self.dim];
                mean_pool(row_hidden, row_mask, self.dim)
            })
            .collect();
        debug!(rows = batch.rows, seq_len = batch.seq_len, "embedded batch");
        Ok(vectors)
    }
}

/// Tokenizer output flattened to row-major `[rows, seq_len]` inputs.
struct TokenBatch {
    rows: usize,
    seq_len: usize,
    input_ids: Vec<i64>,
    attention_mask: Vec<i64>,
    token_type_ids: Vec<i64>,
}

impl TokenBatch {
    fn pack(encodings: &[tokenizers::Encoding]) -> Self {
        let rows = encodings.len();
        let seq_len = encodings.iter().map(|e| e.get_ids().len()).max().unwrap_or(0);
        let mut batch = Self {
            rows,
            seq_len,
            input_ids: vec![0; rows * seq_len],
            attention_mask: vec![0; rows * seq_len],
            token_type_ids: vec![0; rows * seq_len],
        };
        for (row, enc) in encodings.iter().enumerate() {
            let base = row * seq_len;
            let cols = enc.get_ids().len();
            for col in 0..cols {
                batch.input_ids[base + col] = enc.get_ids()[col] as i64;
                batch.attention_mask[base + col] = enc.get_attention_mask()[col] as i64;
                batch.token_type_ids[base + col] = enc.get_type_ids()[col] as i64;
            }
        }
        batch
    }
}

/// Attention-masked mean over token states, then L2-normalised.
fn mean_pool(hidden: &[f32], mask: &[i64], dim: usize) -> Vec<f32> {
    let mut pooled = vec![0.0f32; dim];
    let mut weight = 0.0f32;
    for (token, &m) in hidden.chunks_exact(dim).zip(mask) {
        if m == 0 {
            continue;
        }
        for (p, h) in pooled.iter_mut().zip(token) {
            *p += h;
        }
        weight += 1.0;
    }
    if weight > 0.0 {
        pooled.iter_mut().for_each(|p| *p /= weight);
    }
    normalize(&mut pooled);
    pooled
}

/// Embedding width from the model's declared output shape, if static.
fn infer_dim(output_type: &ort::value::ValueType) -> Option<usize> {
    match output_type {
        ort::value::ValueType::Tensor { shape, .. } => {
            shape.last().and_then(|&d| (d > 0).then_some(d as usize))
        }
        _ => None,
    }
}

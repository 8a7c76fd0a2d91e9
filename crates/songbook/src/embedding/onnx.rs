use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use hf_hub::api::tokio::Api;
use ndarray::{Array1, Array2, ArrayView2, ArrayView3, Axis};
use ort::{
  session::{builder::GraphOptimizationLevel, Session},
  value::Value,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};
use tokio::sync::OnceCell;

use super::{normalize, EmbeddingProvider};

const TOKENIZER_FILE: &str = "tokenizer.json";
const MODEL_FILE: &str = "onnx/model.onnx";

#[derive(Debug, Clone)]
pub struct OnnxSettings {
  pub model: String,
  pub model_dir: Option<PathBuf>,
  pub max_tokens: usize,
  pub batch_size: usize,
}

/// Sentence-transformers model run through ONNX Runtime.
///
/// The model is loaded on first use and shared by every later call on this
/// instance. A failed load is remembered: the instance keeps reporting the
/// same failure instead of retrying.
pub struct OnnxEmbeddingProvider {
  settings: OnnxSettings,
  model: OnceCell<std::result::Result<Arc<Mutex<LoadedModel>>, String>>,
}

struct LoadedModel {
  session: Session,
  tokenizer: Tokenizer,
}

struct ModelFiles {
  tokenizer_file: PathBuf,
  model_path: PathBuf,
}

impl OnnxEmbeddingProvider {
  pub fn new(settings: OnnxSettings) -> Self {
    Self { settings, model: OnceCell::new() }
  }

  async fn model(&self) -> Result<Arc<Mutex<LoadedModel>>> {
    let state = self
      .model
      .get_or_init(|| async {
        bentley::info!("loading model {}...", self.settings.model);
        match LoadedModel::load(&self.settings).await {
          Ok(model) => {
            bentley::success!("Embedding model {} ready", self.settings.model);
            Ok(Arc::new(Mutex::new(model)))
          }
          Err(e) => {
            bentley::error!("Failed to load embedding model: {e:#}");
            Err(format!("{e:#}"))
          }
        }
      })
      .await;

    match state {
      Ok(model) => Ok(Arc::clone(model)),
      Err(message) => Err(anyhow!("{message}")),
    }
  }
}

#[async_trait]
impl EmbeddingProvider for OnnxEmbeddingProvider {
  async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    if texts.is_empty() {
      return Ok(vec![]);
    }

    let model = self.model().await?;
    let texts = texts.to_vec();
    let batch_size = self.settings.batch_size.max(1);

    // Inference is CPU-bound; keep it off the async workers.
    tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f32>>> {
      let mut model = model.lock().map_err(|_| anyhow!("Failed to lock model mutex"))?;
      let mut vectors = Vec::with_capacity(texts.len());
      for chunk in texts.chunks(batch_size) {
        vectors.extend(model.embed_batch(chunk)?);
      }
      Ok(vectors)
    })
    .await
    .context("Embedding task did not complete")?
  }

  async fn warm(&self) -> Result<()> {
    self.model().await.map(|_| ())
  }

  fn label(&self) -> String {
    self.settings.model.clone()
  }
}

// Model initialization
#[cfg(not(tarpaulin_include))]
impl LoadedModel {
  async fn load(settings: &OnnxSettings) -> Result<Self> {
    let files = match &settings.model_dir {
      Some(dir) => Self::local_files(dir)?,
      None => Self::download_model(&settings.model).await?,
    };

    let tokenizer = Self::load_tokenizer(&files.tokenizer_file, settings.max_tokens)?;
    let model_path = files.model_path;
    let session = tokio::task::spawn_blocking(move || Self::load_session(model_path))
      .await
      .context("Model loading task did not complete")??;

    Ok(Self { session, tokenizer })
  }

  fn local_files(dir: &std::path::Path) -> Result<ModelFiles> {
    let tokenizer_file = dir.join(TOKENIZER_FILE);
    let model_path = [dir.join("model.onnx"), dir.join(MODEL_FILE)]
      .into_iter()
      .find(|path| path.exists())
      .ok_or_else(|| anyhow!("No model.onnx found in {}", dir.display()))?;

    if !tokenizer_file.exists() {
      return Err(anyhow!("No {} found in {}", TOKENIZER_FILE, dir.display()));
    }

    Ok(ModelFiles { tokenizer_file, model_path })
  }

  async fn download_model(model: &str) -> Result<ModelFiles> {
    let api = Api::new().map_err(|e| anyhow!("HF API initialization failed: {}", e))?;
    let repo = api.model(model.to_string());

    let tokenizer_file =
      repo.get(TOKENIZER_FILE).await.map_err(|e| anyhow!("Failed to download tokenizer: {}", e))?;

    let model_path =
      repo.get(MODEL_FILE).await.map_err(|e| anyhow!("Failed to download ONNX model: {}", e))?;

    Ok(ModelFiles { tokenizer_file, model_path })
  }

  fn load_tokenizer(path: &std::path::Path, max_tokens: usize) -> Result<Tokenizer> {
    let mut tokenizer =
      Tokenizer::from_file(path).map_err(|e| anyhow!("Failed to load tokenizer: {}", e))?;

    tokenizer.with_padding(Some(PaddingParams {
      strategy: PaddingStrategy::BatchLongest,
      ..Default::default()
    }));
    tokenizer
      .with_truncation(Some(TruncationParams { max_length: max_tokens, ..Default::default() }))
      .map_err(|e| anyhow!("Failed to configure truncation: {}", e))?;

    Ok(tokenizer)
  }

  fn load_session(model_path: PathBuf) -> Result<Session> {
    let session = Session::builder()?
      .with_optimization_level(GraphOptimizationLevel::Level1)?
      .commit_from_file(&model_path)
      .map_err(|e| anyhow!("Failed to load ONNX model {}: {}", model_path.display(), e))?;

    Ok(session)
  }
}

// Embedding processing
#[cfg(not(tarpaulin_include))]
impl LoadedModel {
  fn embed_batch(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    let encodings = self
      .tokenizer
      .encode_batch(texts.to_vec(), true)
      .map_err(|e| anyhow!("Failed to encode texts: {}", e))?;

    let tokens = batch_tokens(&encodings);
    let input_names: Vec<String> =
      self.session.inputs.iter().map(|input| input.name.to_string()).collect();
    let output_names: Vec<String> =
      self.session.outputs.iter().map(|output| output.name.to_string()).collect();
    let output_name = token_output_name(&output_names)
      .ok_or_else(|| anyhow!("Model declares no outputs"))?
      .to_string();
    let inputs = prepare_inputs(&tokens, &input_names)?;

    bentley::debug!("Running inference on {} texts ({} tokens each)", tokens.batch, tokens.length);
    let outputs = self.session.run(inputs)?;
    let output = outputs
      .get(output_name.as_str())
      .ok_or_else(|| anyhow!("Model produced no '{}' output", output_name))?;

    let (shape, data) = output.try_extract_tensor::<f32>()?;
    mean_pool(shape.as_ref(), data, &tokens.attention_mask)
  }
}

/// Per-token hidden states: `last_hidden_state` when declared, else the first output
fn token_output_name(output_names: &[String]) -> Option<&str> {
  output_names
    .iter()
    .find(|name| name.as_str() == "last_hidden_state")
    .or_else(|| output_names.first())
    .map(String::as_str)
}

/// Token ids of a batch, padded to one length
#[derive(Debug, Clone, PartialEq)]
struct BatchTokens {
  input_ids: Vec<i64>,
  attention_mask: Vec<i64>,
  token_type_ids: Vec<i64>,
  batch: usize,
  length: usize,
}

fn batch_tokens(encodings: &[tokenizers::Encoding]) -> BatchTokens {
  let rows: Vec<(&[u32], &[u32])> =
    encodings.iter().map(|e| (e.get_ids(), e.get_attention_mask())).collect();
  pad_rows(&rows)
}

/// Flatten per-text ids and masks into row-major `[batch, length]` buffers
fn pad_rows(rows: &[(&[u32], &[u32])]) -> BatchTokens {
  let batch = rows.len();
  let length = rows.iter().map(|(ids, _)| ids.len()).max().unwrap_or(0);

  let mut input_ids = Vec::with_capacity(batch * length);
  let mut attention_mask = Vec::with_capacity(batch * length);

  for (ids, mask) in rows {
    for i in 0..length {
      input_ids.push(ids.get(i).map_or(0, |&id| i64::from(id)));
      attention_mask.push(mask.get(i).map_or(0, |&m| i64::from(m)));
    }
  }

  // All zeros for sentence transformers
  let token_type_ids = vec![0; batch * length];

  BatchTokens { input_ids, attention_mask, token_type_ids, batch, length }
}

fn prepare_inputs(tokens: &BatchTokens, input_names: &[String]) -> Result<HashMap<String, Value>> {
  let mut inputs = HashMap::new();
  inputs.insert("input_ids".to_string(), to_tensor(tokens, &tokens.input_ids)?);
  inputs.insert("attention_mask".to_string(), to_tensor(tokens, &tokens.attention_mask)?);

  if input_names.iter().any(|name| name == "token_type_ids") {
    inputs.insert("token_type_ids".to_string(), to_tensor(tokens, &tokens.token_type_ids)?);
  }

  Ok(inputs)
}

fn to_tensor(tokens: &BatchTokens, values: &[i64]) -> Result<Value> {
  let array = Array2::from_shape_vec((tokens.batch, tokens.length), values.to_vec())?;
  Ok(Value::from_array(array)?.into())
}

/// Attention-masked mean pooling of `[batch, seq, hidden]` token states, then L2 normalisation
fn mean_pool(shape: &[i64], data: &[f32], attention_mask: &[i64]) -> Result<Vec<Vec<f32>>> {
  if shape.len() != 3 {
    return Err(anyhow!("Expected a [batch, seq, hidden] output, got shape {:?}", shape));
  }

  let dims = (shape[0] as usize, shape[1] as usize, shape[2] as usize);
  let states = ArrayView3::from_shape(dims, data)?;
  let mask = ArrayView2::from_shape((dims.0, dims.1), attention_mask)?;

  let mut pooled = Vec::with_capacity(dims.0);
  for (text_states, text_mask) in states.axis_iter(Axis(0)).zip(mask.rows()) {
    let mut sum = Array1::<f32>::zeros(dims.2);
    let mut count = 0.0f32;

    for (token, &attended) in text_states.rows().into_iter().zip(text_mask.iter()) {
      if attended == 0 {
        continue;
      }
      sum += &token;
      count += 1.0;
    }

    if count > 0.0 {
      sum /= count;
    }
    pooled.push(normalize(sum.to_vec()));
  }

  Ok(pooled)
}

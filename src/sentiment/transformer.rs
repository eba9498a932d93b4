//! Multilingual XLM-RoBERTa sequence classifier, compiled only with the
//! `transformers` feature. Without it `load` reports the backend as
//! unavailable and the scorer starts on the lexicon tier.

use std::sync::Arc;

use crate::error::{InferenceError, LoadError};

/// Produces raw class scores ordered `[negative, neutral, positive]`.
pub trait SequenceClassifier: Send + Sync {
    fn logits(&self, text: &str) -> Result<[f32; 3], InferenceError>;
}

#[cfg(not(feature = "transformers"))]
pub fn load(model_id: &str) -> Result<Arc<dyn SequenceClassifier>, LoadError> {
    Err(LoadError::Unavailable(format!(
        "{model_id} requires the `transformers` feature"
    )))
}

#[cfg(feature = "transformers")]
pub use candle_backend::load;

#[cfg(feature = "transformers")]
mod candle_backend {
    use std::path::PathBuf;
    use std::sync::Arc;

    use candle_core::{DType, Device, Tensor};
    use candle_nn::VarBuilder;
    use candle_transformers::models::xlm_roberta::{Config, XLMRobertaForSequenceClassification};
    use hf_hub::api::sync::Api;
    use tokenizers::{Tokenizer, TruncationParams};
    use tracing::debug;

    use super::SequenceClassifier;
    use crate::error::{InferenceError, LoadError};

    const NUM_LABELS: usize = 3;
    const MAX_TOKENS: usize = 512;

    pub struct XlmRobertaClassifier {
        model: XLMRobertaForSequenceClassification,
        tokenizer: Tokenizer,
        device: Device,
    }

    pub fn load(model_id: &str) -> Result<Arc<dyn SequenceClassifier>, LoadError> {
        let fetch_err = |reason: String| LoadError::Fetch {
            model: model_id.to_string(),
            reason,
        };
        let invalid = |reason: String| LoadError::Invalid {
            model: model_id.to_string(),
            reason,
        };

        let api = Api::new().map_err(|e| fetch_err(e.to_string()))?;
        let repo = api.model(model_id.to_string());
        let config_path = repo.get("config.json").map_err(|e| fetch_err(e.to_string()))?;
        let tokenizer_path = repo.get("tokenizer.json").map_err(|e| fetch_err(e.to_string()))?;

        let config_raw = std::fs::read_to_string(&config_path).map_err(|e| invalid(e.to_string()))?;
        let config: Config = serde_json::from_str(&config_raw).map_err(|e| invalid(e.to_string()))?;

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| invalid(e.to_string()))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_TOKENS,
                ..Default::default()
            }))
            .map_err(|e| invalid(e.to_string()))?;

        let device = Device::Cpu;
        let vb = match repo.get("model.safetensors") {
            Ok(path) => mmap_safetensors(path, &device).map_err(|e| invalid(e.to_string()))?,
            Err(err) => {
                debug!(model = model_id, error = %err, "No safetensors weights; trying pytorch_model.bin");
                let path = repo.get("pytorch_model.bin").map_err(|e| fetch_err(e.to_string()))?;
                VarBuilder::from_pth(path, DType::F32, &device).map_err(|e| invalid(e.to_string()))?
            }
        };
        let model =
            XLMRobertaForSequenceClassification::new(NUM_LABELS, &config, vb).map_err(|e| invalid(e.to_string()))?;

        Ok(Arc::new(XlmRobertaClassifier {
            model,
            tokenizer,
            device,
        }))
    }

    fn mmap_safetensors(path: PathBuf, device: &Device) -> candle_core::Result<VarBuilder<'static>> {
        // SAFETY: the weights file lives in the hf-hub cache and is not modified while mapped.
        unsafe { VarBuilder::from_mmaped_safetensors(&[path], DType::F32, device) }
    }

    impl SequenceClassifier for XlmRobertaClassifier {
        fn logits(&self, text: &str) -> Result<[f32; 3], InferenceError> {
            let encoding = self
                .tokenizer
                .encode(text, true)
                .map_err(|e| InferenceError(e.to_string()))?;
            let to_tensor = |values: &[u32]| {
                Tensor::new(values, &self.device)
                    .and_then(|t| t.unsqueeze(0))
                    .map_err(|e| InferenceError(e.to_string()))
            };
            let input_ids = to_tensor(encoding.get_ids())?;
            let attention_mask = to_tensor(encoding.get_attention_mask())?;
            let token_type_ids = to_tensor(encoding.get_type_ids())?;

            let scores = self
                .model
                .forward(&input_ids, &attention_mask, &token_type_ids)
                .and_then(|t| t.squeeze(0))
                .and_then(|t| t.to_dtype(DType::F32))
                .and_then(|t| t.to_vec1::<f32>())
                .map_err(|e| InferenceError(e.to_string()))?;

            match scores.as_slice() {
                [negative, neutral, positive] => Ok([*negative, *neutral, *positive]),
                other => Err(InferenceError(format!(
                    "expected {NUM_LABELS} class scores, got {}",
                    other.len()
                ))),
            }
        }
    }
}

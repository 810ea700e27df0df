use async_trait::async_trait;
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use crate::request::ModelSize;
use crate::Result;

/// What a speech model returns for one audio file
#[derive(Debug, Clone, PartialEq)]
pub struct RawTranscript {
    pub text: String,

    /// Language reported by the model, if any
    pub language: Option<String>,
}

/// A loaded speech-to-text model
#[async_trait]
pub trait SpeechModel: Send + Sync {
    fn size(&self) -> ModelSize;

    /// Transcribe `audio`, constrained to `language` when given
    async fn transcribe(
        &self,
        audio: &Path,
        language: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<RawTranscript>;
}

/// Loads speech models by size
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    async fn load(&self, size: ModelSize) -> Result<Arc<dyn SpeechModel>>;
}

type Slot = Option<Arc<dyn SpeechModel>>;

/// Single-slot model cache.
///
/// At most one model is resident. Asking for another size evicts the current
/// one before the new one is loaded. The slot stays locked while a caller holds
/// a [`LoadedModel`], so inference is serialized across concurrent requests.
pub struct ModelCache {
    backend: Arc<dyn SpeechBackend>,
    slot: Mutex<Slot>,
}

/// Exclusive access to the resident model
pub struct LoadedModel<'a> {
    _guard: MutexGuard<'a, Slot>,
    model: Arc<dyn SpeechModel>,
}

impl Deref for LoadedModel<'_> {
    type Target = dyn SpeechModel;

    fn deref(&self) -> &Self::Target {
        self.model.as_ref()
    }
}

impl ModelCache {
    pub fn new(backend: Arc<dyn SpeechBackend>) -> Self {
        Self {
            backend,
            slot: Mutex::new(None),
        }
    }

    /// Get the model of `size`, loading it if it is not the resident one
    pub async fn acquire(&self, size: ModelSize) -> Result<LoadedModel<'_>> {
        let mut slot = self.slot.lock().await;

        let model = match slot.as_ref() {
            Some(model) if model.size() == size => {
                tracing::debug!("Reusing loaded {} model", size);
                model.clone()
            }
            _ => {
                if let Some(previous) = slot.take() {
                    tracing::info!("Evicting {} model", previous.size());
                }

                tracing::info!("Loading {} model", size);
                let model = self.backend.load(size).await?;
                *slot = Some(model.clone());
                model
            }
        };

        Ok(LoadedModel { _guard: slot, model })
    }

    /// Size of the resident model, if any
    pub async fn resident(&self) -> Option<ModelSize> {
        self.slot.lock().await.as_ref().map(|model| model.size())
    }
}

//! AI noise suppression
//!
//! The denoiser is a strategy variant behind one enum: an RNNoise backend
//! running on the CPU, and a pass-through used when the selected backend is
//! unavailable. Both satisfy the same sample-in/sample-out contract, so
//! they are interchangeable at pipeline initialization.

pub mod rnnoise;

pub use rnnoise::{RnnDenoiser, DENOISE_FRAME_SIZE};

/// Noise suppression model types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoiseModel {
    /// RNNoise: CPU recurrent model, one-frame (10 ms) latency
    RnNoise,
    /// DeepFilter: accelerator-hosted model; requires an external backend
    DeepFilter,
}

impl NoiseModel {
    /// Short identifier used in configuration
    pub fn id(&self) -> &'static str {
        match self {
            NoiseModel::RnNoise => "rnnoise",
            NoiseModel::DeepFilter => "deepfilter",
        }
    }

    /// Parse model from a configuration identifier
    pub fn from_id(id: &str) -> Option<Self> {
        match id.to_ascii_lowercase().as_str() {
            "rnnoise" => Some(NoiseModel::RnNoise),
            "deepfilter" => Some(NoiseModel::DeepFilter),
            _ => None,
        }
    }
}

/// Common interface for denoiser backends
pub trait Denoiser: Send {
    /// Process samples in place; `buffer` may be any positive length
    fn process_block_inplace(&mut self, buffer: &mut [f32]);

    /// Clear inference and buffering state
    fn reset(&mut self);

    /// Disabled backends leave the buffer untouched
    fn set_enabled(&mut self, enabled: bool);

    fn is_enabled(&self) -> bool;

    /// Wet/dry blend: 0 dB fully dry, -60 dB fully processed
    fn set_attenuation_db(&mut self, attenuation_db: f32);

    /// Latency the backend adds to the pipeline, in samples
    fn latency_samples(&self) -> usize;
}

/// Pass-through stand-in used when the configured backend cannot run.
///
/// Keeps `process` a safe no-op so denoiser unavailability never takes the
/// pipeline down, and remembers which model it is standing in for so the
/// engine still reports the configured selection.
pub struct PassThroughDenoiser {
    enabled: bool,
    requested: NoiseModel,
}

impl PassThroughDenoiser {
    pub fn new(requested: NoiseModel) -> Self {
        Self {
            enabled: true,
            requested,
        }
    }

    /// Model the caller selected before the downgrade
    pub fn requested_model(&self) -> NoiseModel {
        self.requested
    }
}

impl Denoiser for PassThroughDenoiser {
    fn process_block_inplace(&mut self, _buffer: &mut [f32]) {}

    fn reset(&mut self) {}

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_attenuation_db(&mut self, _attenuation_db: f32) {}

    fn latency_samples(&self) -> usize {
        0
    }
}

/// Enum wrapper dispatching to the selected backend without heap
/// indirection on the realtime path.
pub enum DenoiseEngine {
    RnNoise(RnnDenoiser),
    PassThrough(PassThroughDenoiser),
}

impl DenoiseEngine {
    /// Construct the engine for the configured model. Never panics: a
    /// backend that is not available downgrades to pass-through with a
    /// single startup warning.
    pub fn new(model: NoiseModel, attenuation_db: f32) -> Self {
        match model {
            NoiseModel::RnNoise => {
                DenoiseEngine::RnNoise(RnnDenoiser::new(attenuation_db))
            }
            NoiseModel::DeepFilter => {
                tracing::warn!(
                    "deepfilter backend is not available in this build; \
                     noise suppression downgraded to pass-through"
                );
                DenoiseEngine::PassThrough(PassThroughDenoiser::new(NoiseModel::DeepFilter))
            }
        }
    }

    pub fn model(&self) -> NoiseModel {
        match self {
            DenoiseEngine::RnNoise(_) => NoiseModel::RnNoise,
            DenoiseEngine::PassThrough(d) => d.requested_model(),
        }
    }

    /// Whether a real inference backend is driving suppression
    pub fn is_active(&self) -> bool {
        matches!(self, DenoiseEngine::RnNoise(_))
    }
}

impl Denoiser for DenoiseEngine {
    fn process_block_inplace(&mut self, buffer: &mut [f32]) {
        match self {
            DenoiseEngine::RnNoise(d) => d.process_block_inplace(buffer),
            DenoiseEngine::PassThrough(d) => d.process_block_inplace(buffer),
        }
    }

    fn reset(&mut self) {
        match self {
            DenoiseEngine::RnNoise(d) => d.reset(),
            DenoiseEngine::PassThrough(d) => d.reset(),
        }
    }

    fn set_enabled(&mut self, enabled: bool) {
        match self {
            DenoiseEngine::RnNoise(d) => d.set_enabled(enabled),
            DenoiseEngine::PassThrough(d) => d.set_enabled(enabled),
        }
    }

    fn is_enabled(&self) -> bool {
        match self {
            DenoiseEngine::RnNoise(d) => d.is_enabled(),
            DenoiseEngine::PassThrough(d) => d.is_enabled(),
        }
    }

    fn set_attenuation_db(&mut self, attenuation_db: f32) {
        match self {
            DenoiseEngine::RnNoise(d) => d.set_attenuation_db(attenuation_db),
            DenoiseEngine::PassThrough(d) => d.set_attenuation_db(attenuation_db),
        }
    }

    fn latency_samples(&self) -> usize {
        match self {
            DenoiseEngine::RnNoise(d) => d.latency_samples(),
            DenoiseEngine::PassThrough(d) => d.latency_samples(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_id_round_trip() {
        assert_eq!(NoiseModel::from_id("rnnoise"), Some(NoiseModel::RnNoise));
        assert_eq!(
            NoiseModel::from_id("DeepFilter"),
            Some(NoiseModel::DeepFilter)
        );
        assert_eq!(NoiseModel::from_id("other"), None);
        assert_eq!(NoiseModel::RnNoise.id(), "rnnoise");
    }

    #[test]
    fn test_unavailable_backend_downgrades_to_passthrough() {
        let mut engine = DenoiseEngine::new(NoiseModel::DeepFilter, -60.0);
        assert!(!engine.is_active());
        assert_eq!(engine.latency_samples(), 0);
        // The downgrade keeps reporting the model that was selected
        assert_eq!(engine.model(), NoiseModel::DeepFilter);

        let mut buffer = vec![0.25f32; 480];
        let original = buffer.clone();
        engine.process_block_inplace(&mut buffer);
        assert_eq!(buffer, original);
    }

    #[test]
    fn test_rnnoise_backend_selected() {
        let engine = DenoiseEngine::new(NoiseModel::RnNoise, -60.0);
        assert!(engine.is_active());
        assert_eq!(engine.latency_samples(), DENOISE_FRAME_SIZE);
    }
}

//! Engine configuration
//!
//! Immutable value snapshot covering device selection, denoiser model and
//! parameters, and the four DSP parameter groups. The whole tree derives
//! serde so the `CONFIG` command and external settings storage exchange
//! JSON. Range validation happens in the DSP setters by clamping, not here.

use serde::{Deserialize, Serialize};

use crate::ai::NoiseModel;

/// High-pass band parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HighPassParams {
    pub freq: f32,
    pub q: f32,
}

impl Default for HighPassParams {
    fn default() -> Self {
        Self { freq: 80.0, q: 0.7 }
    }
}

/// Shelf band parameters (low or high shelf)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShelfParams {
    pub freq: f32,
    pub gain: f32,
}

impl Default for ShelfParams {
    fn default() -> Self {
        Self {
            freq: 200.0,
            gain: 0.0,
        }
    }
}

/// Presence peak parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceParams {
    pub freq: f32,
    pub gain: f32,
    pub q: f32,
}

impl Default for PresenceParams {
    fn default() -> Self {
        Self {
            freq: 3000.0,
            gain: 0.0,
            q: 1.0,
        }
    }
}

/// De-esser parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeEsserParams {
    pub enabled: bool,
    pub freq: f32,
    pub threshold: f32,
}

impl Default for DeEsserParams {
    fn default() -> Self {
        Self {
            enabled: false,
            freq: 6000.0,
            threshold: -20.0,
        }
    }
}

/// Downward expander parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpanderParams {
    pub enabled: bool,
    pub threshold: f32,
    pub ratio: f32,
    pub attack: f32,
    pub release: f32,
    pub hysteresis: f32,
}

impl Default for ExpanderParams {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: -40.0,
            ratio: 2.0,
            attack: 5.0,
            release: 100.0,
            hysteresis: 3.0,
        }
    }
}

/// Compressor parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressorParams {
    pub enabled: bool,
    pub threshold: f32,
    pub ratio: f32,
    pub knee: f32,
    pub attack: f32,
    pub release: f32,
    pub makeup_gain: f32,
}

impl Default for CompressorParams {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: -18.0,
            ratio: 4.0,
            knee: 6.0,
            attack: 10.0,
            release: 100.0,
            makeup_gain: 6.0,
        }
    }
}

/// Limiter parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimiterParams {
    pub enabled: bool,
    pub ceiling: f32,
    pub release: f32,
    pub lookahead: f32,
}

impl Default for LimiterParams {
    fn default() -> Self {
        Self {
            enabled: true,
            ceiling: -1.0,
            release: 50.0,
            lookahead: 5.0,
        }
    }
}

/// Equalizer parameter group
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EqualizerParams {
    pub enabled: bool,
    pub high_pass: HighPassParams,
    pub low_shelf: ShelfParams,
    pub presence: PresenceParams,
    pub high_shelf: ShelfParams,
    pub de_esser: DeEsserParams,
}

impl Default for EqualizerParams {
    fn default() -> Self {
        Self {
            enabled: true,
            high_pass: HighPassParams::default(),
            low_shelf: ShelfParams::default(),
            presence: PresenceParams::default(),
            high_shelf: ShelfParams::default(),
            de_esser: DeEsserParams::default(),
        }
    }
}

/// RNNoise backend settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RnnoiseParams {
    /// Wet/dry blend in dB: 0 fully dry, -60 fully processed
    pub attenuation: f32,
}

impl Default for RnnoiseParams {
    fn default() -> Self {
        Self { attenuation: -60.0 }
    }
}

/// DeepFilter backend settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeepFilterParams {
    pub model_path: String,
    pub strength: f32,
}

impl Default for DeepFilterParams {
    fn default() -> Self {
        Self {
            model_path: String::new(),
            strength: 0.8,
        }
    }
}

/// Denoiser settings for every backend
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AiParams {
    pub rnnoise: RnnoiseParams,
    pub deepfilter: DeepFilterParams,
}

/// Audio device selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSelection {
    /// Input device id; empty selects the system default microphone
    pub input_device: String,

    /// Output device id; empty auto-discovers the virtual device
    pub output_device: String,

    /// Ordered name substrings used to auto-discover the virtual output
    pub virtual_device_names: Vec<String>,
}

impl Default for DeviceSelection {
    fn default() -> Self {
        Self {
            input_device: String::new(),
            output_device: String::new(),
            virtual_device_names: vec![
                "CABLE Input".to_string(),
                "VB-Audio".to_string(),
                "Virtual Speaker".to_string(),
            ],
        }
    }
}

/// Complete engine configuration snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub version: u32,
    pub devices: DeviceSelection,

    /// Denoiser model identifier: "rnnoise" or "deepfilter"
    pub ai_model: String,
    pub ai: AiParams,

    pub expander: ExpanderParams,
    pub compressor: CompressorParams,
    pub limiter: LimiterParams,
    pub equalizer: EqualizerParams,

    pub active_preset: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: 1,
            devices: DeviceSelection::default(),
            ai_model: "rnnoise".to_string(),
            ai: AiParams::default(),
            expander: ExpanderParams::default(),
            compressor: CompressorParams::default(),
            limiter: LimiterParams::default(),
            equalizer: EqualizerParams::default(),
            active_preset: "podcast".to_string(),
        }
    }
}

impl Config {
    /// Resolve the configured denoiser model, falling back to RNNoise for
    /// unknown identifiers.
    pub fn noise_model(&self) -> NoiseModel {
        NoiseModel::from_id(&self.ai_model).unwrap_or(NoiseModel::RnNoise)
    }
}

/// Named processing presets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    /// Warm, present voice with controlled dynamics
    Podcast,
    /// Natural, less aggressive processing
    Meeting,
    /// Punchy, broadcast-style
    Streaming,
}

impl Preset {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "podcast" => Some(Preset::Podcast),
            "meeting" => Some(Preset::Meeting),
            "streaming" => Some(Preset::Streaming),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Preset::Podcast => "podcast",
            Preset::Meeting => "meeting",
            Preset::Streaming => "streaming",
        }
    }

    /// Overwrite the DSP parameter groups of `config` with this preset's
    /// literal values; device and denoiser selection are left untouched.
    pub fn apply_to(&self, config: &mut Config) {
        match self {
            Preset::Podcast => {
                config.expander = ExpanderParams {
                    enabled: true,
                    threshold: -45.0,
                    ratio: 2.5,
                    attack: 5.0,
                    release: 100.0,
                    hysteresis: 3.0,
                };
                config.compressor = CompressorParams {
                    enabled: true,
                    threshold: -16.0,
                    ratio: 3.5,
                    knee: 6.0,
                    attack: 10.0,
                    release: 100.0,
                    makeup_gain: 6.0,
                };
                config.limiter = LimiterParams {
                    enabled: true,
                    ceiling: -1.0,
                    release: 50.0,
                    lookahead: 5.0,
                };
                config.equalizer.high_pass = HighPassParams { freq: 80.0, q: 0.7 };
                config.equalizer.low_shelf = ShelfParams {
                    freq: 200.0,
                    gain: 1.0,
                };
                config.equalizer.presence = PresenceParams {
                    freq: 3000.0,
                    gain: 3.0,
                    q: 1.0,
                };
                config.equalizer.high_shelf = ShelfParams {
                    freq: 8000.0,
                    gain: 2.0,
                };
            }
            Preset::Meeting => {
                config.expander = ExpanderParams {
                    enabled: true,
                    threshold: -50.0,
                    ratio: 2.0,
                    attack: 10.0,
                    release: 150.0,
                    hysteresis: 4.0,
                };
                config.compressor = CompressorParams {
                    enabled: true,
                    threshold: -20.0,
                    ratio: 2.5,
                    knee: 8.0,
                    attack: 15.0,
                    release: 150.0,
                    makeup_gain: 4.0,
                };
                config.limiter = LimiterParams {
                    enabled: true,
                    ceiling: -3.0,
                    release: 100.0,
                    lookahead: 3.0,
                };
                config.equalizer.high_pass = HighPassParams {
                    freq: 100.0,
                    q: 0.7,
                };
                config.equalizer.low_shelf = ShelfParams {
                    freq: 200.0,
                    gain: 0.0,
                };
                config.equalizer.presence = PresenceParams {
                    freq: 3000.0,
                    gain: 1.5,
                    q: 1.0,
                };
                config.equalizer.high_shelf = ShelfParams {
                    freq: 10000.0,
                    gain: 1.0,
                };
            }
            Preset::Streaming => {
                config.expander = ExpanderParams {
                    enabled: true,
                    threshold: -40.0,
                    ratio: 3.0,
                    attack: 3.0,
                    release: 80.0,
                    hysteresis: 2.0,
                };
                config.compressor = CompressorParams {
                    enabled: true,
                    threshold: -14.0,
                    ratio: 4.5,
                    knee: 4.0,
                    attack: 5.0,
                    release: 80.0,
                    makeup_gain: 8.0,
                };
                config.limiter = LimiterParams {
                    enabled: true,
                    ceiling: -0.5,
                    release: 30.0,
                    lookahead: 5.0,
                };
                config.equalizer.high_pass = HighPassParams { freq: 80.0, q: 0.8 };
                config.equalizer.low_shelf = ShelfParams {
                    freq: 150.0,
                    gain: 2.0,
                };
                config.equalizer.presence = PresenceParams {
                    freq: 4000.0,
                    gain: 4.0,
                    q: 1.2,
                };
                config.equalizer.high_shelf = ShelfParams {
                    freq: 12000.0,
                    gain: 3.0,
                };
            }
        }
        config.active_preset = self.name().to_string();
    }
}

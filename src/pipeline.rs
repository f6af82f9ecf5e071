//! Real-time processing pipeline
//!
//! Owns the ring buffers, capture/render adapters, resamplers, DSP chain,
//! metering, and the single processing thread. The capture thread produces
//! into the input ring, the processing thread consumes it in 480-sample
//! blocks and produces into the output ring, and the render thread drains
//! that. After `start` the processing thread performs no allocation, file
//! I/O, logging, or blocking lock; its only suspension point is a bounded
//! condvar wait for input.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use thiserror::Error;
use thread_priority::{set_current_thread_priority, ThreadPriority};

use crate::ai::{DenoiseEngine, Denoiser, DENOISE_FRAME_SIZE};
use crate::audio::{
    find_virtual_output, AudioConsumer, AudioError, AudioProducer, AudioRingBuffer,
    CaptureStream, RenderStream, Resampler, ResamplerError, INTERNAL_SAMPLE_RATE,
};
use crate::audio::capture::CaptureCallback;
use crate::config::{Config, Preset};
use crate::dsp::{Compressor, Equalizer, Expander, Limiter, Metering, METER_FLOOR_DB};

/// Scheduling block size; equals the denoiser frame (10 ms at 48 kHz)
pub const PROCESSING_BLOCK_SIZE: usize = DENOISE_FRAME_SIZE;

/// Ring capacity in seconds of audio
const RING_SECONDS: u32 = 2;

/// Input queue depth above which the processing thread drops the oldest
/// backlog (~100 ms), and the depth it trims back to (~20 ms).
const INPUT_BACKLOG_MAX: usize = 4800;
const INPUT_BACKLOG_TARGET: usize = 960;

/// Bounded wait for input availability
const INPUT_WAIT: Duration = Duration::from_millis(10);

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("pipeline is not initialized")]
    NotInitialized,

    #[error("pipeline is already running")]
    AlreadyRunning,

    #[error("no virtual output device found (searched for {0:?})")]
    VirtualOutputNotFound(Vec<String>),

    #[error("unknown preset: {0}")]
    UnknownPreset(String),

    #[error("processing thread error: {0}")]
    Thread(String),

    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error(transparent)]
    Resampler(#[from] ResamplerError),
}

/// Callback receiving `(peak_db, rms_db, gain_reduction_db)` per block.
/// Must not block; it runs on the processing thread.
pub type MeterSink = Box<dyn FnMut(f32, f32, f32) + Send>;

/// Meter snapshot published by the processing thread as f32 bit patterns.
pub struct MeterSnapshot {
    peak_db: AtomicU32,
    rms_db: AtomicU32,
    gain_reduction_db: AtomicU32,
}

impl MeterSnapshot {
    fn new() -> Self {
        Self {
            peak_db: AtomicU32::new(METER_FLOOR_DB.to_bits()),
            rms_db: AtomicU32::new(METER_FLOOR_DB.to_bits()),
            gain_reduction_db: AtomicU32::new(0.0f32.to_bits()),
        }
    }

    fn store(&self, peak_db: f32, rms_db: f32, gain_reduction_db: f32) {
        self.peak_db.store(peak_db.to_bits(), Ordering::Relaxed);
        self.rms_db.store(rms_db.to_bits(), Ordering::Relaxed);
        self.gain_reduction_db
            .store(gain_reduction_db.to_bits(), Ordering::Relaxed);
    }

    /// Read `(peak_db, rms_db, gain_reduction_db)`
    pub fn load(&self) -> (f32, f32, f32) {
        (
            f32::from_bits(self.peak_db.load(Ordering::Relaxed)),
            f32::from_bits(self.rms_db.load(Ordering::Relaxed)),
            f32::from_bits(self.gain_reduction_db.load(Ordering::Relaxed)),
        )
    }
}

/// Overflow/underflow counters accumulated since initialization
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Samples dropped because a ring was full or backlog was trimmed
    pub overruns: u64,
    /// Render callbacks served with silence
    pub underruns: u64,
}

/// The full mono DSP chain driven by the processing thread.
///
/// Public so offline callers and tests can push blocks through the exact
/// realtime signal path without audio hardware.
pub struct ProcessorChain {
    denoiser: DenoiseEngine,
    expander: Expander,
    equalizer: Equalizer,
    compressor: Compressor,
    limiter: Limiter,
    input_meter: Metering,
    output_meter: Metering,
}

impl ProcessorChain {
    /// Build the chain at the internal rate and publish the configuration's
    /// initial parameters.
    pub fn new(config: &Config) -> Self {
        let rate = INTERNAL_SAMPLE_RATE as f64;
        let mut chain = Self {
            denoiser: DenoiseEngine::new(config.noise_model(), config.ai.rnnoise.attenuation),
            expander: Expander::default_voice(rate),
            equalizer: Equalizer::new(rate),
            compressor: Compressor::default_voice(rate),
            limiter: Limiter::default_settings(rate),
            input_meter: Metering::new(rate),
            output_meter: Metering::new(rate),
        };
        chain.apply_params(config);
        chain
    }

    /// Re-apply every DSP parameter group from a configuration snapshot.
    /// Runs at block boundaries on the processing thread; nothing here may
    /// allocate.
    pub fn apply_params(&mut self, config: &Config) {
        self.denoiser
            .set_attenuation_db(config.ai.rnnoise.attenuation);

        let exp = &config.expander;
        self.expander.set_enabled(exp.enabled);
        self.expander.set_threshold(exp.threshold as f64);
        self.expander.set_ratio(exp.ratio as f64);
        self.expander.set_attack_time(exp.attack as f64);
        self.expander.set_release_time(exp.release as f64);
        self.expander.set_hysteresis(exp.hysteresis as f64);

        let eq = &config.equalizer;
        self.equalizer.set_enabled(eq.enabled);
        self.equalizer
            .set_high_pass(eq.high_pass.freq as f64, eq.high_pass.q as f64);
        self.equalizer
            .set_low_shelf(eq.low_shelf.freq as f64, eq.low_shelf.gain as f64);
        self.equalizer.set_presence(
            eq.presence.freq as f64,
            eq.presence.gain as f64,
            eq.presence.q as f64,
        );
        self.equalizer
            .set_high_shelf(eq.high_shelf.freq as f64, eq.high_shelf.gain as f64);
        self.equalizer
            .set_deesser(eq.de_esser.freq as f64, eq.de_esser.threshold as f64);
        self.equalizer.set_deesser_enabled(eq.de_esser.enabled);

        let comp = &config.compressor;
        self.compressor.set_enabled(comp.enabled);
        self.compressor.set_threshold(comp.threshold as f64);
        self.compressor.set_ratio(comp.ratio as f64);
        self.compressor.set_knee(comp.knee as f64);
        self.compressor.set_attack_time(comp.attack as f64);
        self.compressor.set_release_time(comp.release as f64);
        self.compressor.set_makeup_gain(comp.makeup_gain as f64);

        let lim = &config.limiter;
        self.limiter.set_enabled(lim.enabled);
        self.limiter.set_ceiling(lim.ceiling as f64);
        self.limiter.set_release_time(lim.release as f64);
        self.limiter.set_lookahead(lim.lookahead as f64);
    }

    /// Process one block in place. With `bypass` set, only the input and
    /// output meters run and the signal is untouched.
    pub fn process_block(&mut self, block: &mut [f32], bypass: bool) {
        self.input_meter.process(block);

        if !bypass {
            self.denoiser.process_block_inplace(block);
            self.expander.process_block_inplace(block);
            self.equalizer.process_block_inplace(block);
            self.compressor.process_block_inplace(block);
            self.limiter.process_block_inplace(block);
        }

        self.output_meter.process(block);
    }

    /// Output peak in dBFS
    pub fn output_peak_db(&self) -> f32 {
        self.output_meter.peak_db()
    }

    /// Output RMS in dBFS
    pub fn output_rms_db(&self) -> f32 {
        self.output_meter.rms_db()
    }

    /// Compressor gain reduction in dB (non-negative)
    pub fn gain_reduction_db(&self) -> f32 {
        self.compressor.current_gain_reduction() as f32
    }

    pub fn denoiser(&self) -> &DenoiseEngine {
        &self.denoiser
    }

    pub fn expander(&self) -> &Expander {
        &self.expander
    }

    pub fn equalizer(&self) -> &Equalizer {
        &self.equalizer
    }

    pub fn compressor(&self) -> &Compressor {
        &self.compressor
    }

    pub fn limiter(&self) -> &Limiter {
        &self.limiter
    }

    pub fn input_meter(&self) -> &Metering {
        &self.input_meter
    }

    pub fn output_meter(&self) -> &Metering {
        &self.output_meter
    }

    /// Total latency the chain adds, in samples at the internal rate
    pub fn latency_samples(&self) -> usize {
        let lookahead = if self.limiter.is_enabled() {
            self.limiter.latency_samples()
        } else {
            0
        };
        self.denoiser.latency_samples() + lookahead
    }

    /// Clear all unit and meter state
    pub fn reset(&mut self) {
        self.denoiser.reset();
        self.expander.reset();
        self.equalizer.reset();
        self.compressor.reset();
        self.limiter.reset();
        self.input_meter.reset();
        self.output_meter.reset();
    }
}

/// State owned exclusively by the processing thread while running.
struct WorkerState {
    input_rx: AudioConsumer,
    output_tx: AudioProducer,
    chain: ProcessorChain,
    output_resampler: Option<Resampler>,
    block: Vec<f32>,
    resampled: Vec<f32>,
    input_dropped: Arc<AtomicU64>,
}

/// State shared between the pipeline facade, the capture callback, and the
/// processing thread.
struct Shared {
    running: AtomicBool,
    bypass: AtomicBool,
    /// Config snapshot awaiting pickup at the next block boundary
    pending: Mutex<Option<Config>>,
    meters: MeterSnapshot,
    meter_sink: Mutex<Option<MeterSink>>,
    /// Wakes the processing thread on data arrival or shutdown
    signal: (Mutex<()>, Condvar),
}

#[derive(Default)]
struct Counters {
    input_dropped: Option<Arc<AtomicU64>>,
    output_dropped: Option<Arc<AtomicU64>>,
    render_skipped: Option<Arc<AtomicU64>>,
    underruns: Option<Arc<AtomicU64>>,
}

/// Cloneable control surface for the pipeline.
///
/// The pipeline itself owns the cpal streams and must stay on its creating
/// thread; a handle carries only shared state and is `Send + Sync`, so the
/// UI/IPC collaborator can reconfigure and observe the engine from any
/// non-audio thread.
#[derive(Clone)]
pub struct PipelineHandle {
    shared: Arc<Shared>,
    config: Arc<Mutex<Config>>,
}

impl PipelineHandle {
    /// Replace every DSP parameter atomically; the snapshot becomes visible
    /// to the processing thread at the start of the next block.
    pub fn apply_config(&self, config: Config) {
        *lock(&self.config) = config.clone();
        *lock(&self.shared.pending) = Some(config);
    }

    /// Apply one of the named parameter bundles.
    pub fn apply_preset(&self, name: &str) -> Result<(), PipelineError> {
        let preset =
            Preset::from_name(name).ok_or_else(|| PipelineError::UnknownPreset(name.to_string()))?;

        let mut config = self.current_config();
        preset.apply_to(&mut config);
        self.apply_config(config);
        Ok(())
    }

    /// Skip the denoiser and all DSP except metering.
    pub fn set_bypass(&self, bypass: bool) {
        self.shared.bypass.store(bypass, Ordering::Relaxed);
    }

    pub fn is_bypassed(&self) -> bool {
        self.shared.bypass.load(Ordering::Relaxed)
    }

    /// Register a callback invoked with `(peak_db, rms_db,
    /// gain_reduction_db)` at the end of each processed block. It runs on
    /// the processing thread and must not block.
    pub fn set_meter_sink(&self, sink: MeterSink) {
        *lock(&self.shared.meter_sink) = Some(sink);
    }

    /// Latest published meter snapshot
    pub fn meters(&self) -> (f32, f32, f32) {
        self.shared.meters.load()
    }

    /// Clone of the currently applied configuration
    pub fn current_config(&self) -> Config {
        lock(&self.config).clone()
    }
}

/// Real-time microphone enhancement pipeline
pub struct Pipeline {
    shared: Arc<Shared>,
    config: Arc<Mutex<Config>>,
    capture: Option<CaptureStream>,
    render: Option<RenderStream>,
    worker: Option<JoinHandle<WorkerState>>,
    /// Processing-thread state parked between runs
    idle: Option<WorkerState>,
    counters: Counters,
    initialized: bool,
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                running: AtomicBool::new(false),
                bypass: AtomicBool::new(false),
                pending: Mutex::new(None),
                meters: MeterSnapshot::new(),
                meter_sink: Mutex::new(None),
                signal: (Mutex::new(()), Condvar::new()),
            }),
            config: Arc::new(Mutex::new(Config::default())),
            capture: None,
            render: None,
            worker: None,
            idle: None,
            counters: Counters::default(),
            initialized: false,
        }
    }

    /// Construct and wire every unit: select devices, build adapters and
    /// rings, create resamplers where rates differ, and publish the initial
    /// DSP parameters. All-or-nothing: on error nothing is left started.
    pub fn initialize(&mut self, config: Config) -> Result<(), PipelineError> {
        if self.worker.is_some() {
            return Err(PipelineError::AlreadyRunning);
        }

        // Device selection
        let input_id = config.devices.input_device.as_str();
        let (in_device, in_info) = CaptureStream::find_device(if input_id.is_empty() {
            None
        } else {
            Some(input_id)
        })?;

        let output_id = if config.devices.output_device.is_empty() {
            find_virtual_output(&config.devices.virtual_device_names)?
                .ok_or_else(|| {
                    PipelineError::VirtualOutputNotFound(
                        config.devices.virtual_device_names.clone(),
                    )
                })?
                .id
        } else {
            config.devices.output_device.clone()
        };
        let (out_device, out_info) = RenderStream::find_device(&output_id)?;

        // Rings: input at the internal rate, output at the render rate
        let (in_tx, in_rx) =
            AudioRingBuffer::new((INTERNAL_SAMPLE_RATE * RING_SECONDS) as usize).split();
        let (out_tx, out_rx) =
            AudioRingBuffer::new((out_info.sample_rate * RING_SECONDS) as usize).split();

        let input_dropped = in_tx.dropped_counter();
        let output_dropped = out_tx.dropped_counter();
        let underruns = Arc::new(AtomicU64::new(0));
        let render_skipped = Arc::new(AtomicU64::new(0));

        // Capture path: downmix, resample to the internal rate, enqueue
        let input_resampler = if in_info.sample_rate != INTERNAL_SAMPLE_RATE {
            tracing::info!(
                device_rate = in_info.sample_rate,
                internal_rate = INTERNAL_SAMPLE_RATE,
                "input resampler enabled"
            );
            Some(Resampler::new(in_info.sample_rate, INTERNAL_SAMPLE_RATE, 1)?)
        } else {
            None
        };

        let callback = Self::make_capture_callback(
            in_tx,
            input_resampler,
            Arc::clone(&self.shared),
        );
        let capture = CaptureStream::from_device(in_device, in_info.clone(), callback)?;

        // Render path: resample from the internal rate where needed
        let output_resampler = if out_info.sample_rate != INTERNAL_SAMPLE_RATE {
            tracing::info!(
                internal_rate = INTERNAL_SAMPLE_RATE,
                device_rate = out_info.sample_rate,
                "output resampler enabled"
            );
            Some(Resampler::new(INTERNAL_SAMPLE_RATE, out_info.sample_rate, 1)?)
        } else {
            None
        };

        let render = RenderStream::from_device(
            out_device,
            out_info.clone(),
            out_rx,
            Arc::clone(&underruns),
            Arc::clone(&render_skipped),
        )?;

        // Some hosts begin delivering callbacks as soon as a stream is
        // built; hold both adapters paused until start()
        let _ = capture.stop();
        let _ = render.stop();

        let resampled_capacity = output_resampler
            .as_ref()
            .map(|r| r.max_output_len(PROCESSING_BLOCK_SIZE))
            .unwrap_or(0);

        self.idle = Some(WorkerState {
            input_rx: in_rx,
            output_tx: out_tx,
            chain: ProcessorChain::new(&config),
            output_resampler,
            block: vec![0.0; PROCESSING_BLOCK_SIZE],
            resampled: Vec::with_capacity(resampled_capacity),
            input_dropped: Arc::clone(&input_dropped),
        });
        self.capture = Some(capture);
        self.render = Some(render);
        self.counters = Counters {
            input_dropped: Some(input_dropped),
            output_dropped: Some(output_dropped),
            render_skipped: Some(render_skipped),
            underruns: Some(underruns),
        };

        *lock(&self.config) = config;
        *lock(&self.shared.pending) = None;
        self.initialized = true;

        tracing::info!(
            input = %in_info.name,
            output = %out_info.name,
            "pipeline initialized"
        );
        Ok(())
    }

    fn make_capture_callback(
        mut producer: AudioProducer,
        mut resampler: Option<Resampler>,
        shared: Arc<Shared>,
    ) -> CaptureCallback {
        let mut mono: Vec<f32> = Vec::with_capacity(8192);
        let mut resampled: Vec<f32> = Vec::with_capacity(16384);

        Box::new(move |data, frames, _rate, channels| {
            let channels = channels.max(1) as usize;

            mono.clear();
            if channels == 1 {
                mono.extend_from_slice(&data[..frames]);
            } else {
                // Average all channels down to mono
                for frame in data.chunks_exact(channels) {
                    mono.push(frame.iter().sum::<f32>() / channels as f32);
                }
            }

            // Full ring: write() drops what does not fit and counts it
            match resampler.as_mut() {
                Some(rs) => {
                    rs.process_into(&mono, &mut resampled);
                    producer.write(&resampled);
                }
                None => {
                    producer.write(&mono);
                }
            }

            shared.signal.1.notify_one();
        })
    }

    /// Start the processing thread and both adapters. Idempotent.
    pub fn start(&mut self) -> Result<(), PipelineError> {
        if self.worker.is_some() {
            return Ok(());
        }
        if !self.initialized {
            return Err(PipelineError::NotInitialized);
        }

        let mut state = self.idle.take().ok_or(PipelineError::NotInitialized)?;

        // Drop anything left over from a previous run; both adapters are
        // stopped here so the rings have no concurrent users.
        state.input_rx.clear();
        state.output_tx.clear();
        if let Some(rs) = state.output_resampler.as_mut() {
            rs.reset();
        }
        state.chain.reset();

        self.shared.running.store(true, Ordering::Release);
        let shared = Arc::clone(&self.shared);
        let handle = std::thread::Builder::new()
            .name("clearmic-dsp".to_string())
            .spawn(move || run_worker(state, shared))
            .map_err(|e| {
                self.shared.running.store(false, Ordering::Release);
                PipelineError::Thread(e.to_string())
            })?;
        self.worker = Some(handle);

        let started = self
            .capture
            .as_ref()
            .map(|c| c.start())
            .unwrap_or(Ok(()))
            .and_then(|_| self.render.as_ref().map(|r| r.start()).unwrap_or(Ok(())));

        if let Err(e) = started {
            self.halt_worker();
            if let Some(capture) = &self.capture {
                let _ = capture.stop();
            }
            return Err(e.into());
        }

        tracing::info!("pipeline started");
        Ok(())
    }

    /// Stop adapters and join the processing thread. Idempotent; adapter
    /// errors are surfaced but every pipeline-owned resource is released.
    pub fn stop(&mut self) -> Result<(), PipelineError> {
        if self.worker.is_none() {
            return Ok(());
        }

        let mut result = Ok(());
        if let Some(capture) = &self.capture {
            if let Err(e) = capture.stop() {
                result = Err(e.into());
            }
        }
        if let Some(render) = &self.render {
            if let Err(e) = render.stop() {
                result = Err(e.into());
            }
        }

        self.halt_worker();
        tracing::info!("pipeline stopped");
        result
    }

    fn halt_worker(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        self.shared.signal.1.notify_all();

        if let Some(handle) = self.worker.take() {
            match handle.join() {
                Ok(state) => self.idle = Some(state),
                Err(_) => {
                    tracing::error!("processing thread panicked");
                    self.initialized = false;
                }
            }
        }
    }

    /// Control surface usable from any non-audio thread
    pub fn handle(&self) -> PipelineHandle {
        PipelineHandle {
            shared: Arc::clone(&self.shared),
            config: Arc::clone(&self.config),
        }
    }

    /// Replace every DSP parameter atomically; the snapshot becomes visible
    /// to the processing thread at the start of the next block. Safe to
    /// call from any non-audio thread (see [`Pipeline::handle`]).
    pub fn apply_config(&self, config: Config) {
        self.handle().apply_config(config);
    }

    /// Apply one of the named parameter bundles.
    pub fn apply_preset(&self, name: &str) -> Result<(), PipelineError> {
        self.handle().apply_preset(name)
    }

    /// Skip the denoiser and all DSP except metering.
    pub fn set_bypass(&self, bypass: bool) {
        self.handle().set_bypass(bypass);
    }

    pub fn is_bypassed(&self) -> bool {
        self.handle().is_bypassed()
    }

    /// Register a callback invoked with `(peak_db, rms_db,
    /// gain_reduction_db)` at the end of each processed block. It runs on
    /// the processing thread and must not block.
    pub fn set_meter_sink(&self, sink: MeterSink) {
        self.handle().set_meter_sink(sink);
    }

    /// Latest published meter snapshot
    pub fn meters(&self) -> (f32, f32, f32) {
        self.shared.meters.load()
    }

    /// Overflow/underflow counters since initialization
    pub fn stats(&self) -> PipelineStats {
        let sum = |counter: &Option<Arc<AtomicU64>>| {
            counter
                .as_ref()
                .map(|c| c.load(Ordering::Relaxed))
                .unwrap_or(0)
        };
        PipelineStats {
            overruns: sum(&self.counters.input_dropped)
                + sum(&self.counters.output_dropped)
                + sum(&self.counters.render_skipped),
            underruns: sum(&self.counters.underruns),
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Clone of the currently applied configuration
    pub fn current_config(&self) -> Config {
        lock(&self.config).clone()
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Lock a mutex, recovering the guard if a panicking thread poisoned it.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Processing thread body. Returns its state so the pipeline can park it
/// for the next run.
fn run_worker(mut state: WorkerState, shared: Arc<Shared>) -> WorkerState {
    if set_current_thread_priority(ThreadPriority::Max).is_err() {
        tracing::debug!("could not raise processing thread priority");
    }

    // SAFETY: only alters this thread's floating-point control flags for
    // the duration of the closure.
    unsafe {
        no_denormals::no_denormals(|| {
            process_loop(&mut state, &shared);
        });
    }

    state
}

fn process_loop(state: &mut WorkerState, shared: &Shared) {
    let (wait_lock, wait_cvar) = &shared.signal;

    while shared.running.load(Ordering::Acquire) {
        if state.input_rx.len() < PROCESSING_BLOCK_SIZE {
            // Bounded wait, woken by the capture callback or by stop().
            // The guard is dropped before any processing below.
            if let Ok(guard) = wait_lock.lock() {
                let _ = wait_cvar.wait_timeout(guard, INPUT_WAIT);
            }
            continue;
        }

        while state.input_rx.len() >= PROCESSING_BLOCK_SIZE {
            // Parameter snapshots become visible at block boundaries only
            if let Ok(mut pending) = shared.pending.try_lock() {
                if let Some(config) = pending.take() {
                    state.chain.apply_params(&config);
                }
            }

            state.input_rx.read(&mut state.block);

            let bypass = shared.bypass.load(Ordering::Relaxed);
            state.chain.process_block(&mut state.block, bypass);

            // Hand the block to the render side, converting the rate first
            // when the device does not run at 48 kHz
            match state.output_resampler.as_mut() {
                Some(resampler) => {
                    resampler.process_into(&state.block, &mut state.resampled);
                    state.output_tx.write(&state.resampled);
                }
                None => {
                    state.output_tx.write(&state.block);
                }
            }

            let peak = state.chain.output_peak_db();
            let rms = state.chain.output_rms_db();
            let gain_reduction = if bypass {
                0.0
            } else {
                state.chain.gain_reduction_db()
            };

            shared.meters.store(peak, rms, gain_reduction);
            if let Ok(mut sink) = shared.meter_sink.try_lock() {
                if let Some(sink) = sink.as_mut() {
                    sink(peak, rms, gain_reduction);
                }
            }
        }

        // Overflow policy: the oldest input yields to the newest. The
        // reader advances past backlog beyond the watermark; drops count
        // into the same counter as capture-side rejects.
        let backlog = state.input_rx.len();
        if backlog > INPUT_BACKLOG_MAX {
            let dropped = state.input_rx.skip(backlog - INPUT_BACKLOG_TARGET);
            state
                .input_dropped
                .fetch_add(dropped as u64, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Preset;

    fn tone(freq: f64, amplitude: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| {
                amplitude
                    * (2.0 * std::f64::consts::PI * freq * i as f64
                        / INTERNAL_SAMPLE_RATE as f64)
                        .sin() as f32
            })
            .collect()
    }

    fn run_blocks(chain: &mut ProcessorChain, samples: &[f32], bypass: bool) -> Vec<f32> {
        let mut output = Vec::with_capacity(samples.len());
        for block in samples.chunks(PROCESSING_BLOCK_SIZE) {
            let mut buf = block.to_vec();
            chain.process_block(&mut buf, bypass);
            output.extend_from_slice(&buf);
        }
        output
    }

    #[test]
    fn test_silence_in_silence_out() {
        let config = Config::default();
        let mut chain = ProcessorChain::new(&config);

        let silence = vec![0.0f32; 48000];
        run_blocks(&mut chain, &silence, false);

        assert!(
            chain.output_peak_db() <= -90.0,
            "peak: {}",
            chain.output_peak_db()
        );
        assert_eq!(chain.gain_reduction_db(), 0.0);
    }

    #[test]
    fn test_bypass_is_identity() {
        let config = Config::default();
        let mut chain = ProcessorChain::new(&config);

        let input = tone(1000.0, 0.5, 4800);
        let output = run_blocks(&mut chain, &input, true);

        assert_eq!(output, input);
        // Metering still advances in bypass
        assert!(chain.output_peak_db() > -7.0);
    }

    #[test]
    fn test_preset_switch_applies_to_units() {
        let mut config = Config::default();
        Preset::Podcast.apply_to(&mut config);
        let mut chain = ProcessorChain::new(&config);
        assert!((chain.compressor().threshold_db() - (-16.0)).abs() < 1e-6);

        Preset::Streaming.apply_to(&mut config);
        chain.apply_params(&config);
        assert!((chain.compressor().threshold_db() - (-14.0)).abs() < 1e-6);
        assert!((chain.limiter().ceiling_db() - (-0.5)).abs() < 1e-6);
    }

    #[test]
    fn test_pipeline_config_surface_without_devices() {
        let pipeline = Pipeline::new();

        pipeline.apply_preset("streaming").unwrap();
        let config = pipeline.current_config();
        assert_eq!(config.compressor.threshold, -14.0);
        assert_eq!(config.active_preset, "streaming");

        assert!(pipeline.apply_preset("arena-rock").is_err());

        pipeline.set_bypass(true);
        assert!(pipeline.is_bypassed());
    }

    #[test]
    fn test_start_requires_initialize() {
        let mut pipeline = Pipeline::new();
        assert!(matches!(
            pipeline.start(),
            Err(PipelineError::NotInitialized)
        ));
        // stop() before start is a no-op
        assert!(pipeline.stop().is_ok());
    }

    #[test]
    fn test_chain_latency_reports_denoiser_and_lookahead() {
        let config = Config::default();
        let chain = ProcessorChain::new(&config);
        // One denoiser frame plus the default 5 ms limiter lookahead
        assert_eq!(chain.latency_samples(), 480 + 240);
    }

    #[test]
    fn test_meter_snapshot_round_trip() {
        let snapshot = MeterSnapshot::new();
        snapshot.store(-12.5, -18.25, 3.75);
        assert_eq!(snapshot.load(), (-12.5, -18.25, 3.75));
    }
}

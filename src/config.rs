//! Static engine configuration: buffer sizes, pool sizes and mixing policies.

use crate::{spectral::BinMapping, voice::GrainMixPolicy, Error};

// -------------------------------------------------------------------------------------------------

/// Configuration of a [`GranularEngine`](crate::GranularEngine) and its spectral worker.
///
/// All buffers in the engine are allocated once from these upper bounds. Nothing is resized
/// while the engine is running, so choose the limits generously.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Output sample rate in Hz. By default 44100.
    pub sample_rate: u32,
    /// Size of the analysis and resynthesis FFT. Must be a power of two. By default 2048.
    pub fft_size: usize,
    /// Stride between two analysis windows in samples. By default 512.
    pub hop_size: usize,
    /// Capacity of a spectral slice bank in hops. By default 100.
    pub max_hop_count: usize,
    /// Initial number of analysed hops. By default 40.
    pub hop_count: usize,
    /// Capacity of a voice's pitched buffer and of the grain window. By default 32768.
    pub max_grain_samples: usize,
    /// Number of polyphonic voices. By default 4.
    pub voice_count: usize,
    /// Number of grain slots per voice. By default 20.
    pub grain_count: usize,
    /// Number of harmonics (including the fundamental) kept by the harmonic mask. By default 20.
    pub overtone_count: usize,
    /// Amplitude factor applied to bins selected by the harmonic mask. By default 1.0.
    pub overtone_gain: f32,
    /// How a fundamental frequency gets mapped to an FFT bin.
    pub bin_mapping: BinMapping,
    /// How concurrently playing grains of a voice get mixed.
    pub mix_policy: GrainMixPolicy,
    /// Length of the circular output accumulator. By default 16384.
    pub output_buffer_len: usize,
    /// Distance between the accumulator's write and read position. By default one hop.
    pub output_latency: usize,
    /// Capacity of the control to audio thread message queue. By default 256.
    pub message_queue_size: usize,
    /// Seed for grain scatter randomization. When `None`, the OS rng seeds it.
    pub random_seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            fft_size: 2048,
            hop_size: 512,
            max_hop_count: 100,
            hop_count: 40,
            max_grain_samples: 32768,
            voice_count: 4,
            grain_count: 20,
            overtone_count: 20,
            overtone_gain: 1.0,
            bin_mapping: BinMapping::default(),
            mix_policy: GrainMixPolicy::default(),
            output_buffer_len: 16384,
            output_latency: 512,
            message_queue_size: 256,
            random_seed: None,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn fft_size(mut self, fft_size: usize, hop_size: usize) -> Self {
        self.fft_size = fft_size;
        self.hop_size = hop_size;
        self
    }

    pub fn hop_count(mut self, hop_count: usize, max_hop_count: usize) -> Self {
        self.hop_count = hop_count;
        self.max_hop_count = max_hop_count;
        self
    }

    pub fn max_grain_samples(mut self, max_grain_samples: usize) -> Self {
        self.max_grain_samples = max_grain_samples;
        self
    }

    pub fn voice_count(mut self, voice_count: usize) -> Self {
        self.voice_count = voice_count;
        self
    }

    pub fn grain_count(mut self, grain_count: usize) -> Self {
        self.grain_count = grain_count;
        self
    }

    pub fn overtones(mut self, overtone_count: usize, overtone_gain: f32) -> Self {
        self.overtone_count = overtone_count;
        self.overtone_gain = overtone_gain;
        self
    }

    pub fn bin_mapping(mut self, bin_mapping: BinMapping) -> Self {
        self.bin_mapping = bin_mapping;
        self
    }

    pub fn mix_policy(mut self, mix_policy: GrainMixPolicy) -> Self {
        self.mix_policy = mix_policy;
        self
    }

    pub fn output_buffer(mut self, output_buffer_len: usize, output_latency: usize) -> Self {
        self.output_buffer_len = output_buffer_len;
        self.output_latency = output_latency;
        self
    }

    pub fn message_queue_size(mut self, message_queue_size: usize) -> Self {
        self.message_queue_size = message_queue_size;
        self
    }

    pub fn random_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }

    /// Convert a duration in milliseconds to a sample count at the configured sample rate.
    pub fn ms_to_samples(&self, milliseconds: f32) -> usize {
        (milliseconds * self.sample_rate as f32 / 1000.0).round() as usize
    }

    /// Number of samples a slice bank with the given hop count spans in the source.
    pub fn analysis_span(&self, hop_count: usize) -> usize {
        hop_count.saturating_sub(1) * self.hop_size + self.fft_size
    }

    /// Validate all parameters. Returns Error::ParameterError on errors.
    pub fn validate(&self) -> Result<(), Error> {
        if self.sample_rate == 0 {
            return Err(Error::ParameterError(
                "engine config 'sample_rate' must be > 0".to_string(),
            ));
        }
        if self.fft_size < 16 || !self.fft_size.is_power_of_two() {
            return Err(Error::ParameterError(format!(
                "engine config 'fft_size' must be a power of two >= 16, but is '{}'",
                self.fft_size
            )));
        }
        if self.hop_size == 0 || self.hop_size > self.fft_size {
            return Err(Error::ParameterError(format!(
                "engine config 'hop_size' must be in range 1..={}, but is '{}'",
                self.fft_size, self.hop_size
            )));
        }
        if self.max_hop_count == 0 || !(1..=self.max_hop_count).contains(&self.hop_count) {
            return Err(Error::ParameterError(format!(
                "engine config 'hop_count' must be in range 1..={}, but is '{}'",
                self.max_hop_count, self.hop_count
            )));
        }
        if self.max_grain_samples < 2 {
            return Err(Error::ParameterError(format!(
                "engine config 'max_grain_samples' must be >= 2, but is '{}'",
                self.max_grain_samples
            )));
        }
        if self.voice_count == 0 || self.grain_count == 0 {
            return Err(Error::ParameterError(
                "engine config 'voice_count' and 'grain_count' must be > 0".to_string(),
            ));
        }
        if self.overtone_count == 0 {
            return Err(Error::ParameterError(
                "engine config 'overtone_count' must be > 0".to_string(),
            ));
        }
        if !self.overtone_gain.is_finite() || self.overtone_gain < 0.0 {
            return Err(Error::ParameterError(format!(
                "engine config 'overtone_gain' must be >= 0, but is '{}'",
                self.overtone_gain
            )));
        }
        if self.output_buffer_len == 0 || self.output_latency >= self.output_buffer_len {
            return Err(Error::ParameterError(format!(
                "engine config 'output_latency' must be < 'output_buffer_len' ({}), but is '{}'",
                self.output_buffer_len, self.output_latency
            )));
        }
        if self.message_queue_size == 0 {
            return Err(Error::ParameterError(
                "engine config 'message_queue_size' must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

// -------------------------------------------------------------------------------------------------

//! Real-time granular engine: voice allocation, grain mixing and output accumulation.

use std::sync::Arc;

use crossbeam_queue::ArrayQueue;
use rand::{rngs::SmallRng, SeedableRng};

use crate::{
    config::EngineConfig,
    spectral::PitchedBuffer,
    utils::{
        accumulator::OutputAccumulator,
        double_buffer::{double_buffer, FrontBuffer},
        filter::{PostFilter, PostFilterType},
    },
    voice::{GrainMixPolicy, GrainVoice},
    window::{GrainWindow, GrainWindowType},
    worker::{NoteRequest, SourceRange, SpectralTasks, WorkerRequests},
    Error,
};

// -------------------------------------------------------------------------------------------------

pub mod control;

mod handle;
pub use handle::EngineHandle;

// -------------------------------------------------------------------------------------------------

/// Messages sent from an [`EngineHandle`] to the [`GranularEngine`] in the audio thread.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum EngineMessage {
    NoteOn {
        frequency: f32,
    },
    NoteOff {
        frequency: f32,
    },
    AllNotesOff,
    SetGrainLength(usize),
    SetTriggerPeriod(usize),
    SetScatter(f32),
    SetOutputGain(f32),
    SetFilter {
        filter_type: PostFilterType,
        cutoff: f32,
        q: f32,
    },
    SetMixPolicy(GrainMixPolicy),
}

// -------------------------------------------------------------------------------------------------

/// Audio thread side of the spectral granular synthesizer.
///
/// Mixes all voices' grains into an output accumulator and hands the accumulated output to the
/// audio driver in [`process_block`](Self::process_block). All state is preallocated in
/// [`new`](Self::new): processing never allocates, locks or blocks.
pub struct GranularEngine {
    config: EngineConfig,
    messages: Arc<ArrayQueue<EngineMessage>>,
    requests: Arc<WorkerRequests>,
    voices: Box<[GrainVoice]>,
    window: FrontBuffer<GrainWindow>,
    mix_policy: GrainMixPolicy,
    output_gain: f32,
    filter: PostFilter,
    accumulator: OutputAccumulator,
    rng: SmallRng,
}

impl GranularEngine {
    /// Create a new engine for the given source material.
    ///
    /// Returns the engine, which should be moved into the audio thread, a handle to control it
    /// and the spectral tasks, which should either be [spawned](SpectralTasks::spawn) or
    /// [run manually](SpectralTasks::run_pending). The initial slice bank gets built as soon as
    /// the tasks run.
    pub fn new(
        config: EngineConfig,
        source: Arc<[f32]>,
    ) -> Result<(Self, EngineHandle, SpectralTasks), Error> {
        config.validate()?;
        let required = config.analysis_span(config.hop_count);
        if required > source.len() {
            return Err(Error::SourceRangeError {
                offset: 0,
                required,
                available: source.len(),
            });
        }

        let grain_length = config
            .ms_to_samples(control::GRAIN_LENGTH.default_value())
            .clamp(1, config.max_grain_samples);
        let trigger_period = Self::trigger_period(
            config.sample_rate,
            control::GRAIN_FREQUENCY.default_value(),
        );

        let initial_window = GrainWindow::with_shape(
            config.max_grain_samples,
            grain_length,
            GrainWindowType::default(),
            control::WINDOW_MODIFIER.default_value(),
        )?;
        let (window, window_writer) = double_buffer(initial_window.clone(), initial_window);

        let (requests, wake_receiver) = WorkerRequests::new(config.voice_count);
        let requests = Arc::new(requests);

        let mut voices = Vec::with_capacity(config.voice_count);
        let mut pitched_writers = Vec::with_capacity(config.voice_count);
        for _ in 0..config.voice_count {
            let (pitched, pitched_writer) = double_buffer(
                PitchedBuffer::new(config.max_grain_samples),
                PitchedBuffer::new(config.max_grain_samples),
            );
            voices.push(GrainVoice::new(
                pitched,
                config.grain_count,
                grain_length,
                trigger_period,
            ));
            pitched_writers.push(pitched_writer);
        }

        let messages = Arc::new(ArrayQueue::new(config.message_queue_size));

        let handle = EngineHandle::new(&config, source.len(), &messages, &requests);
        let tasks = SpectralTasks::new(
            config.clone(),
            source,
            Arc::clone(&requests),
            wake_receiver,
            pitched_writers.into_boxed_slice(),
            window_writer,
        );
        requests.request_source_range(SourceRange {
            start_offset: 0,
            hop_count: config.hop_count,
        });

        let rng = match config.random_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_os_rng(),
        };
        let filter = PostFilter::new(config.sample_rate);
        let accumulator = OutputAccumulator::new(config.output_buffer_len, config.output_latency);
        let output_gain = control::OUTPUT_GAIN.default_value();
        let mix_policy = config.mix_policy;

        let engine = Self {
            config,
            messages,
            requests,
            voices: voices.into_boxed_slice(),
            window,
            mix_policy,
            output_gain,
            filter,
            accumulator,
            rng,
        };
        Ok((engine, handle, tasks))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Access to all voices, e.g. to visualize grains.
    pub fn voices(&self) -> &[GrainVoice] {
        &self.voices
    }

    /// The grain window which is currently used by all voices.
    pub fn window(&self) -> &GrainWindow {
        &self.window
    }

    pub fn output_gain(&self) -> f32 {
        self.output_gain
    }

    pub fn mix_policy(&self) -> GrainMixPolicy {
        self.mix_policy
    }

    pub fn filter(&self) -> &PostFilter {
        &self.filter
    }

    /// Render the next block of interleaved output frames.
    ///
    /// Applies pending control messages and worker results, then mixes all voices sample by
    /// sample. Every channel of a frame receives the same value.
    pub fn process_block(&mut self, output: &mut [f32], channel_count: usize) {
        debug_assert!(channel_count > 0, "Invalid channel count");
        debug_assert!(
            output.len() % channel_count == 0,
            "Output buffer should contain whole frames"
        );
        Self::assert_no_alloc(|| {
            self.process_messages();

            self.window.update();
            for voice in self.voices.iter_mut() {
                voice.update_pitched_buffer(&mut self.rng);
            }

            for frame in output.chunks_exact_mut(channel_count) {
                let mut value = 0.0;
                for voice in self.voices.iter_mut() {
                    value += voice.tick(&self.window, self.mix_policy, &mut self.rng);
                }
                let value = self.filter.process_sample(value * self.output_gain);
                self.accumulator.add(value);
                frame.fill(self.accumulator.pop());
            }
        });
    }

    /// Reset the post filter and clear all pending output, e.g. when the audio stream restarts.
    pub fn reset(&mut self) {
        self.filter.reset();
        self.accumulator.clear();
    }

    fn process_messages(&mut self) {
        while let Some(message) = self.messages.pop() {
            match message {
                EngineMessage::NoteOn { frequency } => {
                    // notes are dropped when all voices are busy
                    if let Some(index) = self.voices.iter().position(|v| v.is_free()) {
                        let voice = &mut self.voices[index];
                        voice.note_on(frequency);
                        let note = NoteRequest {
                            frequency,
                            generation: voice.generation(),
                        };
                        self.request_voice(index, Some(note));
                    }
                }
                EngineMessage::NoteOff { frequency } => {
                    if let Some(index) = self
                        .voices
                        .iter()
                        .position(|v| v.frequency() == Some(frequency))
                    {
                        self.voices[index].note_off();
                        self.request_voice(index, None);
                    }
                }
                EngineMessage::AllNotesOff => {
                    for index in 0..self.voices.len() {
                        if !self.voices[index].is_free() {
                            self.voices[index].note_off();
                            self.request_voice(index, None);
                        }
                    }
                }
                EngineMessage::SetGrainLength(length) => {
                    for voice in self.voices.iter_mut() {
                        voice.set_grain_length(length, &mut self.rng);
                    }
                }
                EngineMessage::SetTriggerPeriod(period) => {
                    for voice in self.voices.iter_mut() {
                        voice.set_trigger_period(period);
                    }
                }
                EngineMessage::SetScatter(scatter) => {
                    for voice in self.voices.iter_mut() {
                        voice.set_scatter(scatter, &mut self.rng);
                    }
                }
                EngineMessage::SetOutputGain(gain) => {
                    self.output_gain = gain;
                }
                EngineMessage::SetFilter {
                    filter_type,
                    cutoff,
                    q,
                } => {
                    let result = self.filter.set(filter_type, cutoff, q);
                    debug_assert!(
                        result.is_ok(),
                        "Filter parameters should have been validated by the handle"
                    );
                }
                EngineMessage::SetMixPolicy(policy) => {
                    self.mix_policy = policy;
                }
            }
        }
    }

    fn request_voice(&self, index: usize, note: Option<NoteRequest>) {
        // NB: Crossbeam allocs thread local variables once when waking up the worker.
        Self::permit_alloc(|| self.requests.request_voice(index, note));
    }

    pub(crate) fn trigger_period(sample_rate: u32, grain_frequency: f32) -> usize {
        ((sample_rate as f32 / grain_frequency).round() as usize).max(1)
    }

    fn assert_no_alloc<T, F: FnOnce() -> T>(func: F) -> T {
        #[cfg(feature = "assert-allocs")]
        return assert_no_alloc::assert_no_alloc::<T, F>(func);

        #[cfg(not(feature = "assert-allocs"))]
        return func();
    }

    #[inline]
    fn permit_alloc<T, F: FnOnce() -> T>(func: F) -> T {
        #[cfg(feature = "assert-allocs")]
        return assert_no_alloc::permit_alloc::<T, F>(func);

        #[cfg(not(feature = "assert-allocs"))]
        return func();
    }
}

// -------------------------------------------------------------------------------------------------

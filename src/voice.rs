//! Polyphonic voice with a fixed pool of grains reading from its pitched buffer.

use rand::{rngs::SmallRng, Rng};

use assume::assume;

use crate::{spectral::PitchedBuffer, utils::double_buffer::FrontBuffer, window::GrainWindow};

// -------------------------------------------------------------------------------------------------

/// How concurrently playing grains of a voice get mixed.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    strum::EnumString,
    strum::Display,
    strum::EnumIter,
    strum::VariantNames,
)]
pub enum GrainMixPolicy {
    /// Straight sum of all active grains.
    #[default]
    Sum,
    /// Sum of all active grains, divided by the number of active grains.
    GainCompensated,
}

// -------------------------------------------------------------------------------------------------

/// Move a grain's start back into the buffer when `start + length` exceeds the capacity.
///
/// The excess gets wrapped around once. When the wrapped grain still does not fit, the grain
/// gets aligned to the end of the buffer. `length` is clamped to `1..=capacity`.
pub fn wrap_grain_start(start: usize, length: usize, capacity: usize) -> usize {
    debug_assert!(capacity > 0, "Need a non empty buffer");
    let length = length.clamp(1, capacity);
    let end = start.saturating_add(length);
    if end <= capacity {
        return start;
    }
    let wrapped = end - capacity;
    if wrapped + length <= capacity {
        wrapped
    } else {
        capacity - length
    }
}

// -------------------------------------------------------------------------------------------------

/// A window into a voice's pitched buffer.
///
/// Grains never own sample data: they only hold a start offset, a length and a playback cursor.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Grain {
    start: usize,
    length: usize,
    cursor: Option<usize>,
}

impl Grain {
    /// Start offset into the pitched buffer.
    pub fn start(&self) -> usize {
        self.start
    }

    /// Length in samples.
    pub fn length(&self) -> usize {
        self.length
    }

    /// Playback cursor, `None` when the grain is inactive.
    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.cursor.is_some()
    }

    fn place(&mut self, start: usize, length: usize, capacity: usize) {
        self.length = length.clamp(1, capacity);
        self.start = wrap_grain_start(start, self.length, capacity);
    }
}

// -------------------------------------------------------------------------------------------------

/// One polyphonic note slot.
///
/// A voice is free when it has no frequency assigned. On note-on it waits until the pitched
/// buffer for its note request got published, then lays out its grains and starts triggering
/// them in its trigger period.
pub struct GrainVoice {
    frequency: Option<f32>,
    generation: u64,
    pitched: FrontBuffer<PitchedBuffer>,
    awaiting_buffer: bool,
    grains: Box<[Grain]>,
    sample_counter: usize,
    grain_length: usize,
    trigger_period: usize,
    scatter: f32,
}

impl GrainVoice {
    /// Create a new, free voice with `grain_count` inactive grains.
    pub fn new(
        pitched: FrontBuffer<PitchedBuffer>,
        grain_count: usize,
        grain_length: usize,
        trigger_period: usize,
    ) -> Self {
        assert!(grain_count > 0, "Need at least one grain");
        let capacity = pitched.capacity();
        let mut voice = Self {
            frequency: None,
            generation: 0,
            pitched,
            awaiting_buffer: false,
            grains: vec![Grain::default(); grain_count].into_boxed_slice(),
            sample_counter: 0,
            grain_length: grain_length.clamp(1, capacity),
            trigger_period: trigger_period.max(1),
            scatter: 0.0,
        };
        voice.layout_sequential(true);
        voice
    }

    /// The assigned note frequency, `None` when the voice is free.
    pub fn frequency(&self) -> Option<f32> {
        self.frequency
    }

    /// Counter of note-on calls. Pitched buffers get tagged with the generation they were
    /// requested for, so a replayed note never starts on a buffer of a previous request.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_free(&self) -> bool {
        self.frequency.is_none()
    }

    /// True while a note is assigned, but its pitched buffer did not arrive yet.
    pub fn is_awaiting_buffer(&self) -> bool {
        self.awaiting_buffer
    }

    /// The currently visible pitched buffer.
    pub fn pitched_buffer(&self) -> &PitchedBuffer {
        &self.pitched
    }

    pub fn grains(&self) -> &[Grain] {
        &self.grains
    }

    pub fn active_grain_count(&self) -> usize {
        self.grains.iter().filter(|g| g.is_active()).count()
    }

    pub fn grain_length(&self) -> usize {
        self.grain_length
    }

    pub fn trigger_period(&self) -> usize {
        self.trigger_period
    }

    pub fn scatter(&self) -> f32 {
        self.scatter
    }

    /// Assign a new note. Grains start once the matching pitched buffer is visible.
    pub fn note_on(&mut self, frequency: f32) {
        self.frequency = Some(frequency);
        self.generation = self.generation.wrapping_add(1);
        self.awaiting_buffer = true;
        self.sample_counter = 0;
        for grain in self.grains.iter_mut() {
            grain.cursor = None;
        }
    }

    /// Release the voice. The pitched buffer is kept as it is.
    pub fn note_off(&mut self) {
        self.frequency = None;
        self.awaiting_buffer = false;
        for grain in self.grains.iter_mut() {
            grain.cursor = None;
        }
    }

    /// Pick up a newly published pitched buffer and start the grains when the buffer
    /// got resynthesized for the current note request.
    pub fn update_pitched_buffer(&mut self, rng: &mut SmallRng) {
        self.pitched.update();
        if self.awaiting_buffer
            && self.frequency.is_some()
            && self.pitched.generation() == self.generation
            && self.pitched.frequency() == self.frequency
        {
            self.awaiting_buffer = false;
            self.start_grains(rng);
        }
    }

    /// Set a new grain length in samples and relayout all inactive grains.
    pub fn set_grain_length(&mut self, length: usize, rng: &mut SmallRng) {
        self.grain_length = length.clamp(1, self.pitched.capacity());
        self.layout_grains(rng, false);
    }

    /// Set a new grain trigger period in samples.
    pub fn set_trigger_period(&mut self, period: usize) {
        self.trigger_period = period.max(1);
    }

    /// Set a new scatter amount in percent and relayout all inactive grains.
    pub fn set_scatter(&mut self, scatter: f32, rng: &mut SmallRng) {
        self.scatter = scatter.clamp(0.0, 100.0);
        self.layout_grains(rng, false);
    }

    /// Run all active grains for a single sample and trigger new grains.
    #[inline]
    pub fn tick(
        &mut self,
        window: &GrainWindow,
        policy: GrainMixPolicy,
        rng: &mut SmallRng,
    ) -> f32 {
        if self.frequency.is_none() || self.awaiting_buffer {
            return 0.0;
        }

        let samples = self.pitched.samples();
        let mut output = 0.0;
        let mut active_count = 0;
        for grain in self.grains.iter_mut() {
            if let Some(cursor) = grain.cursor {
                let index = grain.start + cursor;
                assume!(unsafe: index < samples.len(), "Grains are kept within the buffer");
                output += samples[index] * window.sample_at(cursor);
                active_count += 1;
                let cursor = cursor + 1;
                grain.cursor = if cursor < grain.length {
                    Some(cursor)
                } else {
                    None
                };
            }
        }

        self.sample_counter += 1;
        if self.sample_counter >= self.trigger_period {
            self.sample_counter = 0;
            self.trigger_next_grain(rng);
        }

        match policy {
            GrainMixPolicy::GainCompensated if active_count > 1 => output / active_count as f32,
            _ => output,
        }
    }

    fn start_grains(&mut self, rng: &mut SmallRng) {
        self.layout_grains(rng, true);
        self.sample_counter = 0;
        self.grains[0].cursor = Some(0);
    }

    fn trigger_next_grain(&mut self, rng: &mut SmallRng) {
        let capacity = self.pitched.capacity();
        let length = self.grain_length;
        let scatter = self.scatter;
        if let Some(grain) = self.grains.iter_mut().find(|g| !g.is_active()) {
            if scatter > 0.0 {
                grain.place(Self::scattered_start(scatter, capacity, rng), length, capacity);
            } else {
                grain.place(grain.start, length, capacity);
            }
            grain.cursor = Some(0);
        }
    }

    fn layout_grains(&mut self, rng: &mut SmallRng, include_active: bool) {
        if self.scatter > 0.0 {
            let capacity = self.pitched.capacity();
            for grain in self.grains.iter_mut() {
                if include_active || !grain.is_active() {
                    let start = Self::scattered_start(self.scatter, capacity, rng);
                    grain.place(start, self.grain_length, capacity);
                }
            }
        } else {
            self.layout_sequential(include_active);
        }
    }

    /// Place grains back to back, wrapping around at the end of the pitched buffer.
    fn layout_sequential(&mut self, include_active: bool) {
        let capacity = self.pitched.capacity();
        let length = self.grain_length.clamp(1, capacity);
        let mut position = 0;
        for grain in self.grains.iter_mut() {
            let start = wrap_grain_start(position, length, capacity);
            if include_active || !grain.is_active() {
                grain.place(start, length, capacity);
            }
            position = start + length;
        }
    }

    fn scattered_start(scatter: f32, capacity: usize, rng: &mut SmallRng) -> usize {
        (0.01 * scatter * rng.random_range(0..capacity) as f32) as usize
    }
}

// -------------------------------------------------------------------------------------------------

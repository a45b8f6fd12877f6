use std::sync::Arc;

use crossbeam_queue::ArrayQueue;

use super::{control::ControlState, EngineMessage, GranularEngine};
use crate::{
    config::EngineConfig,
    utils::{
        filter::{PostFilter, PostFilterType},
        midi_note_to_frequency,
    },
    voice::GrainMixPolicy,
    window::{GrainWindow, GrainWindowType},
    worker::{SourceRange, WindowShape, WorkerRequests},
    Error,
};

// -------------------------------------------------------------------------------------------------

/// Control thread side of a [`GranularEngine`].
///
/// Validates all values before they get sent to the engine or spectral worker. Setters return
/// `Ok(true)` when a changed value got sent, `Ok(false)` when the value did not change.
pub struct EngineHandle {
    config: EngineConfig,
    state: ControlState,
    messages: Arc<ArrayQueue<EngineMessage>>,
    requests: Arc<WorkerRequests>,
}

impl EngineHandle {
    pub(crate) fn new(
        config: &EngineConfig,
        source_len: usize,
        messages: &Arc<ArrayQueue<EngineMessage>>,
        requests: &Arc<WorkerRequests>,
    ) -> Self {
        Self {
            config: config.clone(),
            state: ControlState::new(source_len, config.hop_count, config.mix_policy),
            messages: Arc::clone(messages),
            requests: Arc::clone(requests),
        }
    }

    /// Start a new note with the given frequency on the lowest free voice.
    /// The note gets dropped when all voices are busy.
    pub fn note_on(&mut self, frequency: f32) -> Result<(), Error> {
        if !(frequency > 0.0 && frequency.is_finite()) {
            return Err(Error::ParameterError(format!(
                "note frequency must be > 0, but is '{frequency}'"
            )));
        }
        self.send(EngineMessage::NoteOn { frequency })
    }

    /// Start a new note with the given MIDI note number.
    pub fn note_on_midi(&mut self, note: u8) -> Result<(), Error> {
        self.note_on(midi_note_to_frequency(note))
    }

    /// Stop the first voice which plays the given frequency.
    pub fn note_off(&mut self, frequency: f32) -> Result<(), Error> {
        self.send(EngineMessage::NoteOff { frequency })
    }

    /// Stop the voice which plays the given MIDI note number.
    pub fn note_off_midi(&mut self, note: u8) -> Result<(), Error> {
        self.note_off(midi_note_to_frequency(note))
    }

    /// Stop all playing voices.
    pub fn all_notes_off(&mut self) -> Result<(), Error> {
        self.send(EngineMessage::AllNotesOff)
    }

    /// Set the source sample offset of the analysed span.
    pub fn set_source_position(&mut self, position: usize) -> Result<bool, Error> {
        self.validate_source_range(position, self.state.hop_count, self.state.source_len)?;
        if self.state.source_position == position {
            return Ok(false);
        }
        self.requests.request_source_range(SourceRange {
            start_offset: position,
            hop_count: self.state.hop_count,
        });
        self.state.source_position = position;
        Ok(true)
    }

    /// Set the number of analysed hops.
    pub fn set_hop_count(&mut self, hop_count: usize) -> Result<bool, Error> {
        if !(1..=self.config.max_hop_count).contains(&hop_count) {
            return Err(Error::ParameterError(format!(
                "hop count must be in range 1..={}, but is '{}'",
                self.config.max_hop_count, hop_count
            )));
        }
        self.validate_source_range(self.state.source_position, hop_count, self.state.source_len)?;
        if self.state.hop_count == hop_count {
            return Ok(false);
        }
        self.requests.request_source_range(SourceRange {
            start_offset: self.state.source_position,
            hop_count,
        });
        self.state.hop_count = hop_count;
        Ok(true)
    }

    /// Replace the analysed source material. The current source position and hop count must
    /// fit into the new material.
    pub fn set_source_material(&mut self, source: Arc<[f32]>) -> Result<(), Error> {
        self.validate_source_range(self.state.source_position, self.state.hop_count, source.len())?;
        self.state.source_len = source.len();
        self.requests.request_source(source);
        Ok(())
    }

    /// Set the grain length in milliseconds. Also resizes the grain window.
    pub fn set_grain_length_ms(&mut self, milliseconds: f32) -> Result<bool, Error> {
        let milliseconds = self
            .state
            .grain_length
            .description()
            .validate_value(milliseconds)?;
        if self.state.grain_length.value() == milliseconds {
            return Ok(false);
        }
        let length = self.grain_length_in_samples(milliseconds);
        let shape = self.window_shape(
            length,
            self.state.window_type,
            self.state.window_modifier.value(),
        )?;
        if self.config.grain_count * length > self.config.max_grain_samples {
            log::debug!(
                "Sequential layout of {} grains with {} samples exceeds the pitched buffer: grain starts get wrapped",
                self.config.grain_count,
                length
            );
        }
        self.send(EngineMessage::SetGrainLength(length))?;
        self.requests.request_window(shape);
        self.state.grain_length.set_value(milliseconds)?;
        Ok(true)
    }

    /// Set the number of grains triggered per second and voice.
    pub fn set_grain_frequency_hz(&mut self, frequency: f32) -> Result<bool, Error> {
        let frequency = self
            .state
            .grain_frequency
            .description()
            .validate_value(frequency)?;
        if self.state.grain_frequency.value() == frequency {
            return Ok(false);
        }
        let period = GranularEngine::trigger_period(self.config.sample_rate, frequency);
        self.send(EngineMessage::SetTriggerPeriod(period))?;
        self.state.grain_frequency.set_value(frequency)?;
        Ok(true)
    }

    /// Set the randomization of grain start offsets in percent.
    pub fn set_scatter(&mut self, scatter: f32) -> Result<bool, Error> {
        let scatter = self
            .state
            .grain_scatter
            .description()
            .validate_value(scatter)?;
        if self.state.grain_scatter.value() == scatter {
            return Ok(false);
        }
        self.send(EngineMessage::SetScatter(scatter))?;
        self.state.grain_scatter.set_value(scatter)?;
        Ok(true)
    }

    /// Set the grain window's type and shape modifier.
    pub fn set_window(
        &mut self,
        window_type: GrainWindowType,
        modifier: f32,
    ) -> Result<bool, Error> {
        let modifier = self
            .state
            .window_modifier
            .description()
            .validate_value(modifier)?;
        if self.state.window_type == window_type && self.state.window_modifier.value() == modifier
        {
            return Ok(false);
        }
        let length = self.grain_length_in_samples(self.state.grain_length.value());
        let shape = self.window_shape(length, window_type, modifier)?;
        self.requests.request_window(shape);
        self.state.window_type = window_type;
        self.state.window_modifier.set_value(modifier)?;
        Ok(true)
    }

    /// Set the grain window's type from a raw index, e.g. a UI select.
    pub fn set_window_type_index(&mut self, index: usize, modifier: f32) -> Result<bool, Error> {
        self.set_window(GrainWindowType::from_index(index)?, modifier)
    }

    /// Set the main output volume.
    pub fn set_output_gain(&mut self, gain: f32) -> Result<bool, Error> {
        let gain = self.state.output_gain.description().validate_value(gain)?;
        if self.state.output_gain.value() == gain {
            return Ok(false);
        }
        self.send(EngineMessage::SetOutputGain(gain))?;
        self.state.output_gain.set_value(gain)?;
        Ok(true)
    }

    /// Set the post filter's type, cutoff and resonance.
    pub fn set_filter(
        &mut self,
        filter_type: PostFilterType,
        cutoff: f32,
        q: f32,
    ) -> Result<bool, Error> {
        let cutoff = self
            .state
            .filter_cutoff
            .description()
            .validate_value(cutoff)?;
        let q = self.state.filter_q.description().validate_value(q)?;
        PostFilter::validate(self.config.sample_rate, cutoff, q)?;
        if self.state.filter_type == filter_type
            && self.state.filter_cutoff.value() == cutoff
            && self.state.filter_q.value() == q
        {
            return Ok(false);
        }
        self.send(EngineMessage::SetFilter {
            filter_type,
            cutoff,
            q,
        })?;
        self.state.filter_type = filter_type;
        self.state.filter_cutoff.set_value(cutoff)?;
        self.state.filter_q.set_value(q)?;
        Ok(true)
    }

    /// Set how concurrently playing grains get mixed.
    pub fn set_mix_policy(&mut self, policy: GrainMixPolicy) -> Result<bool, Error> {
        if self.state.mix_policy == policy {
            return Ok(false);
        }
        self.send(EngineMessage::SetMixPolicy(policy))?;
        self.state.mix_policy = policy;
        Ok(true)
    }

    fn send(&self, message: EngineMessage) -> Result<(), Error> {
        self.messages.push(message).map_err(|message| {
            Error::SendError(format!("engine message queue is full, dropped {message:?}"))
        })
    }

    fn grain_length_in_samples(&self, milliseconds: f32) -> usize {
        self.config
            .ms_to_samples(milliseconds)
            .clamp(1, self.config.max_grain_samples)
    }

    fn window_shape(
        &self,
        length: usize,
        window_type: GrainWindowType,
        modifier: f32,
    ) -> Result<WindowShape, Error> {
        GrainWindow::validate(self.config.max_grain_samples, length, window_type, modifier)?;
        Ok(WindowShape {
            length,
            window_type,
            modifier,
        })
    }

    fn validate_source_range(
        &self,
        position: usize,
        hop_count: usize,
        source_len: usize,
    ) -> Result<(), Error> {
        let required = self.config.analysis_span(hop_count);
        if position
            .checked_add(required)
            .is_none_or(|end| end > source_len)
        {
            return Err(Error::SourceRangeError {
                offset: position,
                required,
                available: source_len,
            });
        }
        Ok(())
    }
}

// -------------------------------------------------------------------------------------------------

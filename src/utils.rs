//! Real-time safe building blocks of the engine.

pub mod accumulator;
pub mod double_buffer;
pub mod filter;

// -------------------------------------------------------------------------------------------------

/// Convert a MIDI note number to a frequency in Hz, with note 69 (A4) at 440 Hz.
pub fn midi_note_to_frequency(note: u8) -> f32 {
    440.0 * 2.0_f32.powf((note as f32 - 69.0) / 12.0)
}

// -------------------------------------------------------------------------------------------------

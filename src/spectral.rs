//! Short-time spectral analysis of source material and harmonic resynthesis of pitched buffers.

mod analysis;
mod resynthesis;

pub use analysis::{SliceBank, SpectralAnalyzer};
pub use resynthesis::{BinMapping, HarmonicMask, PitchedBuffer, Resynthesizer};

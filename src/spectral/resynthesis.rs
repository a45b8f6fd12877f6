use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use super::SliceBank;
use crate::window::hann;

// -------------------------------------------------------------------------------------------------

/// How a fundamental frequency in Hz gets mapped to an FFT bin.
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
pub enum BinMapping {
    /// `round(hz * fft_size / sample_rate)`: the bin which holds the frequency.
    #[default]
    SampleRate,
    /// `round(hz / (sample_rate / 2) * fft_size)`: maps to twice the frequency. Kept to
    /// reproduce the sound of older patches.
    Nyquist,
}

impl BinMapping {
    /// Fundamental bin for the given frequency. `None` for silent (non positive) frequencies
    /// or frequencies which round to the DC bin.
    pub fn fundamental_bin(
        &self,
        frequency: f32,
        sample_rate: u32,
        fft_size: usize,
    ) -> Option<usize> {
        if !(frequency > 0.0 && frequency.is_finite()) || sample_rate == 0 {
            return None;
        }
        let bin = match self {
            Self::SampleRate => frequency as f64 * fft_size as f64 / sample_rate as f64,
            Self::Nyquist => frequency as f64 / (sample_rate as f64 / 2.0) * fft_size as f64,
        }
        .round();
        if bin >= 1.0 {
            Some(bin as usize)
        } else {
            None
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Comb shaped bin mask which keeps a fundamental and its overtones.
#[derive(Debug, Clone)]
pub struct HarmonicMask {
    keep: Box<[bool]>,
    bins: Vec<usize>,
}

impl HarmonicMask {
    /// Create an empty mask for the given FFT size.
    pub fn new(fft_size: usize) -> Self {
        Self {
            keep: vec![false; fft_size].into_boxed_slice(),
            bins: Vec::with_capacity(fft_size),
        }
    }

    /// Rebuild the mask for `fundamental_bin * (k + 1)` with `0 <= k < overtone_count`,
    /// stopping at the FFT size. The conjugate mirror bin of each harmonic is kept as well.
    /// A `None` fundamental masks all bins.
    pub fn build(&mut self, fundamental_bin: Option<usize>, overtone_count: usize) {
        for bin in self.bins.drain(..) {
            self.keep[bin] = false;
        }
        let Some(fundamental_bin) = fundamental_bin.filter(|bin| *bin > 0) else {
            return;
        };
        let fft_size = self.keep.len();
        for harmonic in 1..=overtone_count {
            let Some(bin) = fundamental_bin
                .checked_mul(harmonic)
                .filter(|bin| *bin < fft_size)
            else {
                break;
            };
            for bin in [bin, fft_size - bin] {
                if !self.keep[bin] {
                    self.keep[bin] = true;
                    self.bins.push(bin);
                }
            }
        }
        self.bins.sort_unstable();
    }

    /// True when the mask keeps no bins at all.
    pub fn is_silent(&self) -> bool {
        self.bins.is_empty()
    }

    /// True when the given bin passes the mask.
    pub fn contains(&self, bin: usize) -> bool {
        self.keep.get(bin).copied().unwrap_or(false)
    }

    /// Sorted list of all bins which pass the mask.
    pub fn bins(&self) -> &[usize] {
        &self.bins
    }

    /// Copy the masked `input` spectrum to `output`, scaling kept bins by `gain`.
    pub fn apply(&self, input: &[Complex<f32>], output: &mut [Complex<f32>], gain: f32) {
        debug_assert!(input.len() == self.keep.len() && output.len() == self.keep.len());
        output.fill(Complex::default());
        for &bin in &self.bins {
            output[bin] = input[bin] * gain;
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// A voice's resynthesized, pitched time domain material.
#[derive(Debug, Clone)]
pub struct PitchedBuffer {
    samples: Box<[f32]>,
    frequency: Option<f32>,
    generation: u64,
}

impl PitchedBuffer {
    /// Create a silent buffer with the given capacity.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Need a non empty pitched buffer");
        Self {
            samples: vec![0.0; capacity].into_boxed_slice(),
            frequency: None,
            generation: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// The fundamental frequency the buffer got resynthesized for, if any.
    pub fn frequency(&self) -> Option<f32> {
        self.frequency
    }

    /// The note request generation the buffer got resynthesized for. 0 when it never was.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn set_generation(&mut self, generation: u64) {
        self.generation = generation;
    }

    #[cfg(test)]
    pub(crate) fn fill(&mut self, generation: u64, frequency: f32, value: f32) {
        self.samples.fill(value);
        self.frequency = Some(frequency);
        self.generation = generation;
    }
}

// -------------------------------------------------------------------------------------------------

/// Turns a [`SliceBank`] into pitched material by masking all frames with a [`HarmonicMask`],
/// inverse transforming and overlap-adding them.
pub struct Resynthesizer {
    ifft: Arc<dyn Fft<f32>>,
    mask: HarmonicMask,
    bin_mapping: BinMapping,
    overtone_gain: f32,
    overlap_add_gain: f32,
    spectrum: Vec<Complex<f32>>,
    output: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl Resynthesizer {
    /// Create a new resynthesizer, planning its inverse FFT with the given planner.
    pub fn new(
        planner: &mut FftPlanner<f32>,
        fft_size: usize,
        hop_size: usize,
        bin_mapping: BinMapping,
        overtone_gain: f32,
    ) -> Self {
        let ifft = planner.plan_fft_inverse(fft_size);
        let window_sum = (0..fft_size)
            .map(|index| hann(index, fft_size))
            .sum::<f32>();
        // analysis windows overlap-add to window_sum / hop_size
        let overlap_add_gain = hop_size as f32 / window_sum;
        let scratch = vec![Complex::default(); ifft.get_outofplace_scratch_len()];
        Self {
            ifft,
            mask: HarmonicMask::new(fft_size),
            bin_mapping,
            overtone_gain,
            overlap_add_gain,
            spectrum: vec![Complex::default(); fft_size],
            output: vec![Complex::default(); fft_size],
            scratch,
        }
    }

    pub fn fft_size(&self) -> usize {
        self.spectrum.len()
    }

    /// The mask which got applied in the last resynthesis.
    pub fn mask(&self) -> &HarmonicMask {
        &self.mask
    }

    /// Resynthesize `bank` for the given fundamental into `pitched`.
    ///
    /// Frames are overlap-added at their hop positions until the buffer's capacity is reached.
    /// Frames that would start past the end are skipped. A non positive fundamental results in
    /// a silent buffer.
    pub fn resynthesize(
        &mut self,
        bank: &SliceBank,
        fundamental: f32,
        sample_rate: u32,
        overtone_count: usize,
        pitched: &mut PitchedBuffer,
    ) {
        debug_assert!(bank.fft_size() == self.fft_size(), "FFT size mismatch");
        let fft_size = self.fft_size();
        let fundamental_bin = self
            .bin_mapping
            .fundamental_bin(fundamental, sample_rate, fft_size);
        self.mask.build(fundamental_bin, overtone_count);

        pitched.samples.fill(0.0);
        pitched.frequency = Some(fundamental);
        if self.mask.is_silent() {
            return;
        }

        let capacity = pitched.capacity();
        let scale = self.overlap_add_gain / fft_size as f32;
        for (hop, frame) in bank.frames().enumerate() {
            let offset = hop * bank.hop_size();
            if offset >= capacity {
                break;
            }
            self.mask
                .apply(frame, &mut self.spectrum, self.overtone_gain);
            self.ifft.process_outofplace_with_scratch(
                &mut self.spectrum,
                &mut self.output,
                &mut self.scratch,
            );
            for (sample, value) in pitched.samples[offset..]
                .iter_mut()
                .zip(&self.output)
            {
                *sample += value.re * scale;
            }
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spectral::SpectralAnalyzer;

    #[test]
    fn bin_mapping() {
        let mapping = BinMapping::SampleRate;
        assert_eq!(mapping.fundamental_bin(468.75, 48000, 2048), Some(20));
        assert_eq!(mapping.fundamental_bin(440.0, 44100, 2048), Some(20));
        assert_eq!(mapping.fundamental_bin(0.0, 44100, 2048), None);
        assert_eq!(mapping.fundamental_bin(-10.0, 44100, 2048), None);
        assert_eq!(mapping.fundamental_bin(f32::NAN, 44100, 2048), None);
        assert_eq!(mapping.fundamental_bin(5.0, 44100, 2048), None);
        assert_eq!(
            BinMapping::Nyquist.fundamental_bin(468.75, 48000, 2048),
            Some(40)
        );
    }

    #[test]
    fn harmonic_mask() {
        let mut mask = HarmonicMask::new(64);
        mask.build(Some(5), 3);
        assert_eq!(mask.bins(), &[5, 10, 15, 49, 54, 59]);
        assert!(mask.contains(10));
        assert!(mask.contains(54));
        assert!(!mask.contains(11));
        assert!(!mask.contains(100));

        // harmonics stop at the fft size
        mask.build(Some(20), 10);
        assert_eq!(mask.bins(), &[4, 20, 24, 40, 44, 60]);

        mask.build(None, 10);
        assert!(mask.is_silent());
        assert!(!mask.contains(5));

        let input = vec![Complex::new(1.0, 1.0); 64];
        let mut output = vec![Complex::new(9.0, 9.0); 64];
        mask.build(Some(8), 1);
        mask.apply(&input, &mut output, 0.5);
        for (bin, value) in output.iter().enumerate() {
            if bin == 8 || bin == 56 {
                assert_eq!(*value, Complex::new(0.5, 0.5));
            } else {
                assert_eq!(*value, Complex::default());
            }
        }
    }

    fn sine(frequency: f32, amplitude: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| {
                amplitude
                    * (2.0 * std::f32::consts::PI * frequency * i as f32 / sample_rate as f32)
                        .sin()
            })
            .collect()
    }

    #[test]
    fn bin_centered_sine_is_reproduced() {
        let sample_rate = 48000;
        let (fft_size, hop_size, hop_count) = (2048, 512, 10);
        let frequency = 468.75; // bin 20
        let source = sine(frequency, 0.5, sample_rate, 16384);

        let mut planner = FftPlanner::new();
        let mut analyzer = SpectralAnalyzer::new(&mut planner, fft_size, hop_size);
        let mut resynthesizer = Resynthesizer::new(
            &mut planner,
            fft_size,
            hop_size,
            BinMapping::SampleRate,
            1.0,
        );
        let mut bank = SliceBank::new(fft_size, hop_size, hop_count);
        analyzer
            .rebuild_slice_bank(&source, 0, hop_count, &mut bank)
            .unwrap();

        let mut pitched = PitchedBuffer::new(16384);
        resynthesizer.resynthesize(&bank, frequency, sample_rate, 1, &mut pitched);
        assert_eq!(pitched.frequency(), Some(frequency));

        // fully overlapped region: every sample is covered by fft_size / hop_size frames
        let overlapped = (fft_size - hop_size)..(hop_count * hop_size);
        for index in overlapped {
            assert!(
                (pitched.samples()[index] - source[index]).abs() < 0.01,
                "sample {index}: {} != {}",
                pitched.samples()[index],
                source[index]
            );
        }
        // nothing beyond the analysed span
        let span = (hop_count - 1) * hop_size + fft_size;
        assert!(pitched.samples()[span..].iter().all(|s| *s == 0.0));
    }

    #[test]
    fn silent_fundamentals() {
        let (fft_size, hop_size) = (256, 64);
        let source = sine(1000.0, 1.0, 44100, 2048);

        let mut planner = FftPlanner::new();
        let mut analyzer = SpectralAnalyzer::new(&mut planner, fft_size, hop_size);
        let mut resynthesizer =
            Resynthesizer::new(&mut planner, fft_size, hop_size, BinMapping::default(), 1.0);
        let mut bank = SliceBank::new(fft_size, hop_size, 8);
        analyzer.rebuild_slice_bank(&source, 0, 8, &mut bank).unwrap();

        let mut pitched = PitchedBuffer::new(1024);
        resynthesizer.resynthesize(&bank, 1000.0, 44100, 4, &mut pitched);
        assert!(pitched.samples().iter().any(|s| *s != 0.0));

        for fundamental in [0.0, -100.0] {
            resynthesizer.resynthesize(&bank, fundamental, 44100, 4, &mut pitched);
            assert!(resynthesizer.mask().is_silent());
            assert!(pitched.samples().iter().all(|s| *s == 0.0));
        }
    }

    #[test]
    fn writes_stop_at_capacity() {
        let (fft_size, hop_size) = (256, 64);
        let source = sine(1000.0, 1.0, 44100, 4096);

        let mut planner = FftPlanner::new();
        let mut analyzer = SpectralAnalyzer::new(&mut planner, fft_size, hop_size);
        let mut resynthesizer =
            Resynthesizer::new(&mut planner, fft_size, hop_size, BinMapping::default(), 1.0);
        let mut bank = SliceBank::new(fft_size, hop_size, 40);
        analyzer.rebuild_slice_bank(&source, 0, 40, &mut bank).unwrap();

        // the bank spans far more than the buffer's capacity
        let mut pitched = PitchedBuffer::new(300);
        resynthesizer.resynthesize(&bank, 1000.0, 44100, 2, &mut pitched);
        assert_eq!(pitched.samples().len(), 300);
        assert!(pitched.samples()[200..].iter().any(|s| *s != 0.0));
    }

    #[test]
    fn resynthesis_is_deterministic() {
        let (fft_size, hop_size) = (512, 128);
        let source = (0..8192)
            .map(|i| ((i * 7919) % 101) as f32 / 101.0 - 0.5)
            .collect::<Vec<_>>();

        let mut planner = FftPlanner::new();
        let mut analyzer = SpectralAnalyzer::new(&mut planner, fft_size, hop_size);
        let mut resynthesizer =
            Resynthesizer::new(&mut planner, fft_size, hop_size, BinMapping::default(), 0.8);
        let mut bank = SliceBank::new(fft_size, hop_size, 20);
        analyzer.rebuild_slice_bank(&source, 500, 20, &mut bank).unwrap();

        let mut first = PitchedBuffer::new(4096);
        let mut second = PitchedBuffer::new(4096);
        resynthesizer.resynthesize(&bank, 220.0, 44100, 8, &mut first);
        resynthesizer.resynthesize(&bank, 330.0, 44100, 8, &mut second);
        resynthesizer.resynthesize(&bank, 220.0, 44100, 8, &mut second);
        assert!(first
            .samples()
            .iter()
            .zip(second.samples())
            .all(|(a, b)| a.to_bits() == b.to_bits()));
    }
}

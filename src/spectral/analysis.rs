use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::{window::hann, Error};

// -------------------------------------------------------------------------------------------------

/// Ordered bank of spectral frames of consecutive, overlapping analysis windows.
///
/// Frames are stored in one preallocated, flat buffer. A bank is rebuilt in place and never
/// resized after creation.
#[derive(Debug, Clone)]
pub struct SliceBank {
    frames: Box<[Complex<f32>]>,
    fft_size: usize,
    hop_size: usize,
    hop_count: usize,
    start_offset: usize,
}

impl SliceBank {
    /// Create an empty bank which can hold up to `capacity` frames of the given FFT size.
    pub fn new(fft_size: usize, hop_size: usize, capacity: usize) -> Self {
        assert!(fft_size > 0 && hop_size > 0, "Invalid slice bank size");
        Self {
            frames: vec![Complex::default(); fft_size * capacity].into_boxed_slice(),
            fft_size,
            hop_size,
            hop_count: 0,
            start_offset: 0,
        }
    }

    /// Max number of frames.
    pub fn capacity(&self) -> usize {
        self.frames.len() / self.fft_size
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Distance of two frames' analysis windows in the source.
    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    /// Number of valid frames.
    pub fn hop_count(&self) -> usize {
        self.hop_count
    }

    /// Source sample offset of the first frame.
    pub fn start_offset(&self) -> usize {
        self.start_offset
    }

    /// Access the spectrum of the frame at the given hop index.
    pub fn frame(&self, hop: usize) -> &[Complex<f32>] {
        assert!(hop < self.hop_count, "Frame index out of bounds");
        &self.frames[hop * self.fft_size..(hop + 1) * self.fft_size]
    }

    /// Iterate over all valid frames.
    pub fn frames(&self) -> impl Iterator<Item = &[Complex<f32>]> {
        self.frames
            .chunks_exact(self.fft_size)
            .take(self.hop_count)
    }

    fn frame_mut(&mut self, hop: usize) -> &mut [Complex<f32>] {
        &mut self.frames[hop * self.fft_size..(hop + 1) * self.fft_size]
    }
}

// -------------------------------------------------------------------------------------------------

/// Builds [`SliceBank`]s from source material via Hann windowed forward FFTs.
pub struct SpectralAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    window: Box<[f32]>,
    hop_size: usize,
    input: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl SpectralAnalyzer {
    /// Create a new analyzer, planning its forward FFT with the given planner.
    pub fn new(planner: &mut FftPlanner<f32>, fft_size: usize, hop_size: usize) -> Self {
        let fft = planner.plan_fft_forward(fft_size);
        let window = (0..fft_size)
            .map(|index| hann(index, fft_size))
            .collect::<Box<[f32]>>();
        let input = vec![Complex::default(); fft_size];
        let scratch = vec![Complex::default(); fft.get_outofplace_scratch_len()];
        Self {
            fft,
            window,
            hop_size,
            input,
            scratch,
        }
    }

    pub fn fft_size(&self) -> usize {
        self.window.len()
    }

    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    /// The analysis window which gets applied before each forward transform.
    pub fn analysis_window(&self) -> &[f32] {
        &self.window
    }

    /// Number of source samples a bank with the given number of hops spans.
    pub fn analysis_span(&self, hop_count: usize) -> usize {
        hop_count.saturating_sub(1) * self.hop_size + self.fft_size()
    }

    /// Rebuild the given bank from `hop_count` consecutive windows of `source`, starting at
    /// `start_offset`.
    ///
    /// The source span and hop count are checked before anything is written: on errors the bank
    /// keeps its previous content.
    pub fn rebuild_slice_bank(
        &mut self,
        source: &[f32],
        start_offset: usize,
        hop_count: usize,
        bank: &mut SliceBank,
    ) -> Result<(), Error> {
        if hop_count == 0 || hop_count > bank.capacity() {
            return Err(Error::ParameterError(format!(
                "hop count must be in range 1..={}, but is '{}'",
                bank.capacity(),
                hop_count
            )));
        }
        debug_assert!(
            bank.fft_size() == self.fft_size() && bank.hop_size() == self.hop_size,
            "Slice bank and analyzer sizes mismatch"
        );
        let required = self.analysis_span(hop_count);
        if start_offset
            .checked_add(required)
            .is_none_or(|end| end > source.len())
        {
            return Err(Error::SourceRangeError {
                offset: start_offset,
                required,
                available: source.len(),
            });
        }

        let fft_size = self.fft_size();
        for hop in 0..hop_count {
            let start = start_offset + hop * self.hop_size;
            let samples = &source[start..start + fft_size];
            for ((input, sample), window) in self.input.iter_mut().zip(samples).zip(&self.window)
            {
                *input = Complex::new(sample * window, 0.0);
            }
            self.fft.process_outofplace_with_scratch(
                &mut self.input,
                bank.frame_mut(hop),
                &mut self.scratch,
            );
        }
        bank.hop_count = hop_count;
        bank.start_offset = start_offset;
        Ok(())
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sine_peaks_at_its_bin() {
        let fft_size = 256;
        let hop_size = 64;
        let source = (0..4096)
            .map(|i| (2.0 * std::f32::consts::PI * 8.0 * i as f32 / fft_size as f32).sin())
            .collect::<Vec<_>>();

        let mut planner = FftPlanner::new();
        let mut analyzer = SpectralAnalyzer::new(&mut planner, fft_size, hop_size);
        let mut bank = SliceBank::new(fft_size, hop_size, 8);
        analyzer
            .rebuild_slice_bank(&source, 100, 8, &mut bank)
            .unwrap();

        assert_eq!(bank.hop_count(), 8);
        assert_eq!(bank.start_offset(), 100);
        assert_eq!(bank.frames().count(), 8);
        for frame in bank.frames() {
            let peak = frame[..fft_size / 2]
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.norm().total_cmp(&b.1.norm()))
                .map(|(bin, _)| bin);
            assert_eq!(peak, Some(8));
        }
    }

    #[test]
    fn invalid_spans_keep_the_bank() {
        let fft_size = 64;
        let hop_size = 16;
        let source = vec![1.0; 256];

        let mut planner = FftPlanner::new();
        let mut analyzer = SpectralAnalyzer::new(&mut planner, fft_size, hop_size);
        let mut bank = SliceBank::new(fft_size, hop_size, 4);
        analyzer.rebuild_slice_bank(&source, 0, 4, &mut bank).unwrap();
        let frames = bank.frames().flatten().copied().collect::<Vec<_>>();

        // 3 * 16 + 64 = 112 samples from offset 200 exceed the source
        assert!(matches!(
            analyzer.rebuild_slice_bank(&source, 200, 4, &mut bank),
            Err(Error::SourceRangeError {
                offset: 200,
                required: 112,
                available: 256
            })
        ));
        assert!(analyzer.rebuild_slice_bank(&source, 0, 0, &mut bank).is_err());
        assert!(analyzer.rebuild_slice_bank(&source, 0, 5, &mut bank).is_err());
        assert!(analyzer
            .rebuild_slice_bank(&source, usize::MAX, 1, &mut bank)
            .is_err());

        assert_eq!(bank.hop_count(), 4);
        assert_eq!(bank.start_offset(), 0);
        assert!(bank.frames().flatten().copied().eq(frames));
    }

    #[test]
    fn analysis_is_deterministic() {
        let fft_size = 128;
        let hop_size = 32;
        let source = (0..1024)
            .map(|i| ((i * 7919) % 97) as f32 / 97.0 - 0.5)
            .collect::<Vec<_>>();

        let mut planner = FftPlanner::new();
        let mut analyzer = SpectralAnalyzer::new(&mut planner, fft_size, hop_size);
        let mut bank1 = SliceBank::new(fft_size, hop_size, 10);
        let mut bank2 = SliceBank::new(fft_size, hop_size, 10);
        analyzer.rebuild_slice_bank(&source, 10, 10, &mut bank1).unwrap();
        analyzer.rebuild_slice_bank(&source, 10, 10, &mut bank2).unwrap();
        assert!(bank1.frames().flatten().eq(bank2.frames().flatten()));
    }
}

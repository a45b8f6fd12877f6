use std::f64;

use crate::Error;

// -------------------------------------------------------------------------------------------------

/// Available types for the post-processing filter.
#[derive(
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Debug,
    strum::EnumString,
    strum::Display,
    strum::EnumIter,
    strum::VariantNames,
)]
pub enum PostFilterType {
    /// Signal passes unchanged.
    #[default]
    Bypass,
    Lowpass,
    Highpass,
}

// -------------------------------------------------------------------------------------------------

/// Coefficients of a single state variable filter stage.
#[derive(Default, Debug, Clone, Copy, PartialEq)]
struct SvfCoefficients {
    a1: f64,
    a2: f64,
    a3: f64,
    m0: f64,
    m1: f64,
    m2: f64,
}

impl SvfCoefficients {
    fn new(filter_type: PostFilterType, sample_rate: u32, cutoff: f32, q: f32) -> Self {
        let g = f64::tan(f64::consts::PI * cutoff as f64 / sample_rate as f64);
        let k = 1.0 / q as f64;
        let a1 = 1.0 / (1.0 + g * (g + k));
        let a2 = g * a1;
        let a3 = g * a2;
        let (m0, m1, m2) = match filter_type {
            PostFilterType::Bypass => (1.0, 0.0, 0.0),
            PostFilterType::Lowpass => (0.0, 0.0, 1.0),
            PostFilterType::Highpass => (1.0, -k, -1.0),
        };
        Self {
            a1,
            a2,
            a3,
            m0,
            m1,
            m2,
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// A single state variable filter (SVF) stage, designed by Andrew Simper of Cytomic.
/// See <http://cytomic.com/files/dsp/SvfLinearTrapOptimised2.pdf>
#[derive(Default, Debug, Clone)]
struct SvfStage {
    ic1eq: f64,
    ic2eq: f64,
}

impl SvfStage {
    #[inline]
    fn process_sample(&mut self, coefficients: &SvfCoefficients, input: f64) -> f64 {
        let v0 = input;
        let v3 = v0 - self.ic2eq;
        let v1 = coefficients.a1 * self.ic1eq + coefficients.a2 * v3;
        let v2 = self.ic2eq + coefficients.a2 * self.ic1eq + coefficients.a3 * v3;
        self.ic1eq = 2.0 * v1 - self.ic1eq;
        self.ic2eq = 2.0 * v2 - self.ic2eq;
        coefficients.m0 * v0 + coefficients.m1 * v1 + coefficients.m2 * v2
    }

    #[inline]
    fn reset(&mut self) {
        self.ic1eq = 0.0;
        self.ic2eq = 0.0;
    }
}

// -------------------------------------------------------------------------------------------------

/// Lowpass or highpass filter applied to the engine's mixed output.
///
/// Two cascaded SVF stages, so the filter has a cutoff slope of 24 dB/octave.
/// Q = 0.707 means no resonant peaking.
#[derive(Debug, Clone)]
pub struct PostFilter {
    filter_type: PostFilterType,
    sample_rate: u32,
    cutoff: f32,
    q: f32,
    coefficients: SvfCoefficients,
    stages: [SvfStage; 2],
}

impl PostFilter {
    pub const DEFAULT_CUTOFF: f32 = 20000.0;
    pub const DEFAULT_Q: f32 = 0.707;

    /// Create a bypassed filter for the given sample rate.
    pub fn new(sample_rate: u32) -> Self {
        let filter_type = PostFilterType::Bypass;
        let cutoff = Self::DEFAULT_CUTOFF.min(sample_rate as f32 / 2.0 - 1.0);
        let q = Self::DEFAULT_Q;
        Self {
            filter_type,
            sample_rate,
            cutoff,
            q,
            coefficients: SvfCoefficients::new(filter_type, sample_rate, cutoff, q),
            stages: Default::default(),
        }
    }

    pub fn filter_type(&self) -> PostFilterType {
        self.filter_type
    }

    pub fn cutoff(&self) -> f32 {
        self.cutoff
    }

    pub fn q(&self) -> f32 {
        self.q
    }

    /// Check filter parameters without applying them.
    pub fn validate(sample_rate: u32, cutoff: f32, q: f32) -> Result<(), Error> {
        if sample_rate == 0 {
            return Err(Error::ParameterError(format!(
                "Invalid filter sample-rate: must be > 0, but is {sample_rate}"
            )));
        }
        if !(q > 0.0 && q.is_finite()) {
            return Err(Error::ParameterError(format!(
                "Invalid filter Q: must be > 0, but is {q}"
            )));
        }
        let nyquist = sample_rate as f32 / 2.0;
        if !(cutoff > 0.0 && cutoff < nyquist) {
            return Err(Error::ParameterError(format!(
                "Invalid filter frequency: must be in range (0, {nyquist}), but is {cutoff}"
            )));
        }
        Ok(())
    }

    /// Apply new filter parameters. Invalid parameters leave the current filter untouched.
    pub fn set(&mut self, filter_type: PostFilterType, cutoff: f32, q: f32) -> Result<(), Error> {
        if self.filter_type == filter_type && self.cutoff == cutoff && self.q == q {
            return Ok(());
        }
        Self::validate(self.sample_rate, cutoff, q)?;
        if self.filter_type != filter_type {
            self.reset();
        }
        self.filter_type = filter_type;
        self.cutoff = cutoff;
        self.q = q;
        self.coefficients = SvfCoefficients::new(filter_type, self.sample_rate, cutoff, q);
        Ok(())
    }

    /// Apply the filter on a single sample.
    #[inline]
    pub fn process_sample(&mut self, input: f32) -> f32 {
        if self.filter_type == PostFilterType::Bypass {
            return input;
        }
        let coefficients = &self.coefficients;
        let mut output = input as f64;
        for stage in &mut self.stages {
            output = stage.process_sample(coefficients, output);
        }
        output as f32
    }

    /// Reset the filter's state, e.g. when the audio stream restarts.
    pub fn reset(&mut self) {
        for stage in &mut self.stages {
            stage.reset();
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sine_rms(filter: &mut PostFilter, frequency: f32, sample_rate: u32) -> f32 {
        let len = sample_rate as usize / 2;
        let mut sum = 0.0;
        for i in 0..len {
            let t = i as f32 / sample_rate as f32;
            let output = filter.process_sample((2.0 * std::f32::consts::PI * frequency * t).sin());
            // skip settling
            if i >= len / 2 {
                sum += output * output;
            }
        }
        (sum / (len / 2) as f32).sqrt()
    }

    #[test]
    fn bypass() {
        let mut filter = PostFilter::new(44100);
        for value in [0.0, 0.5, -1.0, 0.25] {
            assert_eq!(filter.process_sample(value), value);
        }
    }

    #[test]
    fn lowpass_and_highpass() {
        let sample_rate = 44100;
        let sine_rms_level = std::f32::consts::FRAC_1_SQRT_2;

        let mut lowpass = PostFilter::new(sample_rate);
        lowpass.set(PostFilterType::Lowpass, 500.0, 0.707).unwrap();
        assert!((sine_rms(&mut lowpass, 50.0, sample_rate) - sine_rms_level).abs() < 0.05);
        lowpass.reset();
        assert!(sine_rms(&mut lowpass, 8000.0, sample_rate) < 0.01);

        let mut highpass = PostFilter::new(sample_rate);
        highpass.set(PostFilterType::Highpass, 2000.0, 0.707).unwrap();
        assert!(sine_rms(&mut highpass, 100.0, sample_rate) < 0.01);
        highpass.reset();
        assert!((sine_rms(&mut highpass, 15000.0, sample_rate) - sine_rms_level).abs() < 0.05);
    }

    #[test]
    fn invalid_parameters() {
        let mut filter = PostFilter::new(44100);
        assert!(filter.set(PostFilterType::Lowpass, 30000.0, 0.707).is_err());
        assert!(filter.set(PostFilterType::Lowpass, 1000.0, 0.0).is_err());
        assert!(filter.set(PostFilterType::Highpass, -10.0, 1.0).is_err());
        assert_eq!(filter.filter_type(), PostFilterType::Bypass);
        assert!(PostFilter::validate(0, 1000.0, 1.0).is_err());
    }
}

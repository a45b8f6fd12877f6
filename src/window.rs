//! Amplitude envelope shared by all grains.

use std::f32::consts::PI;

use strum::EnumCount;

use crate::Error;

// -------------------------------------------------------------------------------------------------

/// Envelope shape of a [`GrainWindow`].
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
    strum::EnumCount,
    strum::FromRepr,
)]
#[repr(u8)]
pub enum GrainWindowType {
    /// Raised cosine over the whole grain. Modifier is ignored.
    #[default]
    Hann = 0,
    /// Raised cosine truncated at the modifier height (0, 1], then clipped to 1.
    Tukey = 1,
    /// Gaussian bell with the modifier as normalized sigma (0, 1].
    Gaussian = 2,
    /// Linear ramps with a flat top. The modifier sets the ramp slope (> 0).
    Trapezoidal = 3,
}

impl GrainWindowType {
    /// Map a raw, e.g. UI select index, to a window type.
    pub fn from_index(index: usize) -> Result<Self, Error> {
        u8::try_from(index)
            .ok()
            .and_then(Self::from_repr)
            .ok_or(Error::InvalidWindowType(index))
    }

    /// Check if the given modifier is valid for this window type.
    pub fn validate_modifier(&self, modifier: f32) -> Result<(), Error> {
        let valid = match self {
            Self::Hann => true,
            Self::Tukey | Self::Gaussian => modifier > 0.0 && modifier <= 1.0,
            Self::Trapezoidal => modifier > 0.0 && modifier.is_finite(),
        };
        if valid {
            Ok(())
        } else {
            Err(Error::ParameterError(format!(
                "window modifier '{modifier}' is out of range for a {self} window"
            )))
        }
    }
}

const _VERIFY_WINDOW_TYPES: () = assert!(GrainWindowType::COUNT == 4);

// -------------------------------------------------------------------------------------------------

/// Symmetric Hann window value at `index` for a window of `length` samples.
#[inline]
pub fn hann(index: usize, length: usize) -> f32 {
    if length < 2 {
        return 1.0;
    }
    0.5 * (1.0 - (2.0 * PI * index as f32 / (length - 1) as f32).cos())
}

// -------------------------------------------------------------------------------------------------

/// Fixed capacity, precomputed grain envelope.
///
/// A window is recomputed as a whole via [`configure`](Self::configure) and read per sample via
/// [`sample_at`](Self::sample_at). Rejected configurations never touch the current data.
#[derive(Debug, Clone)]
pub struct GrainWindow {
    data: Box<[f32]>,
    length: usize,
    window_type: GrainWindowType,
    modifier: f32,
}

impl GrainWindow {
    pub const DEFAULT_MODIFIER: f32 = 0.5;

    /// Create a Hann window which spans the whole capacity.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Need a non empty window capacity");
        let mut window = Self {
            data: vec![0.0; capacity].into_boxed_slice(),
            length: capacity,
            window_type: GrainWindowType::Hann,
            modifier: Self::DEFAULT_MODIFIER,
        };
        window.compute();
        window
    }

    /// Create a new window with the given capacity and shape.
    pub fn with_shape(
        capacity: usize,
        length: usize,
        window_type: GrainWindowType,
        modifier: f32,
    ) -> Result<Self, Error> {
        let mut window = Self::new(capacity);
        window.configure(length, window_type, modifier)?;
        Ok(window)
    }

    /// Max window length.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Current window length in samples.
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn window_type(&self) -> GrainWindowType {
        self.window_type
    }

    pub fn modifier(&self) -> f32 {
        self.modifier
    }

    /// The currently valid part of the envelope, e.g. to draw it.
    pub fn as_slice(&self) -> &[f32] {
        &self.data[..self.length]
    }

    /// Check a window configuration without applying it.
    pub fn validate(
        capacity: usize,
        length: usize,
        window_type: GrainWindowType,
        modifier: f32,
    ) -> Result<(), Error> {
        if length == 0 || length > capacity {
            return Err(Error::InvalidWindowLength(length));
        }
        window_type.validate_modifier(modifier)
    }

    /// Recompute the whole envelope with a new length, type and modifier.
    pub fn configure(
        &mut self,
        length: usize,
        window_type: GrainWindowType,
        modifier: f32,
    ) -> Result<(), Error> {
        Self::validate(self.capacity(), length, window_type, modifier)?;
        self.length = length;
        self.window_type = window_type;
        self.modifier = modifier;
        self.compute();
        Ok(())
    }

    /// Recompute the envelope with a new length, keeping type and modifier.
    pub fn set_length(&mut self, length: usize) -> Result<(), Error> {
        self.configure(length, self.window_type, self.modifier)
    }

    /// Envelope value at the given index. Indices past the end read the last value.
    #[inline]
    pub fn sample_at(&self, index: usize) -> f32 {
        self.data[index.min(self.length - 1)]
    }

    fn compute(&mut self) {
        let length = self.length;
        let window = &mut self.data[..length];
        match self.window_type {
            GrainWindowType::Hann => {
                for (i, value) in window.iter_mut().enumerate() {
                    *value = hann(i, length);
                }
            }
            GrainWindowType::Tukey => {
                let truncation_height = self.modifier;
                for (i, value) in window.iter_mut().enumerate() {
                    let f = 1.0 / (2.0 * truncation_height)
                        * (1.0 - (2.0 * PI * i as f32 / length as f32).cos());
                    *value = f.min(1.0);
                }
            }
            GrainWindowType::Gaussian => {
                let sigma = self.modifier;
                let center = length as f32 / 2.0;
                for (i, value) in window.iter_mut().enumerate() {
                    let x = (i as f32 - center) / (sigma * center);
                    *value = (-0.5 * x * x).exp();
                }
            }
            GrainWindowType::Trapezoidal => {
                let slope = self.modifier;
                for (i, value) in window.iter_mut().enumerate() {
                    let x = i as f32 / length as f32;
                    let rising = slope * x;
                    let falling = -slope * (x - (slope - 1.0) / slope) + 1.0;
                    *value = if x < 0.5 { rising } else { falling }.min(1.0);
                }
            }
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hann_edges() {
        for length in [2, 3, 64, 441, 2048] {
            let window = GrainWindow::with_shape(4096, length, GrainWindowType::Hann, 0.0).unwrap();
            assert!(window.sample_at(0).abs() < 1e-6);
            assert!(window.sample_at(length - 1).abs() < 1e-5);
            assert!(window.as_slice().iter().all(|v| (0.0..=1.0).contains(v)));
        }
        let window = GrainWindow::with_shape(16, 1, GrainWindowType::Hann, 0.0).unwrap();
        assert_eq!(window.sample_at(0), 1.0);
    }

    #[test]
    fn window_shapes() {
        let length = 1000;

        let tukey = GrainWindow::with_shape(length, length, GrainWindowType::Tukey, 0.5).unwrap();
        assert_eq!(tukey.sample_at(0), 0.0);
        assert_eq!(tukey.sample_at(length / 2), 1.0);
        assert_eq!(tukey.sample_at(length / 4), 1.0);
        assert!(tukey.sample_at(length / 10) < 1.0);

        let gaussian =
            GrainWindow::with_shape(length, length, GrainWindowType::Gaussian, 0.4).unwrap();
        assert!((gaussian.sample_at(length / 2) - 1.0).abs() < 1e-6);
        assert!(gaussian.sample_at(0) < 0.05);
        assert!(gaussian.sample_at(length / 4) < gaussian.sample_at(length / 2));

        let trapezoid =
            GrainWindow::with_shape(length, length, GrainWindowType::Trapezoidal, 4.0).unwrap();
        assert_eq!(trapezoid.sample_at(0), 0.0);
        assert!((trapezoid.sample_at(100) - 0.4).abs() < 1e-5);
        assert_eq!(trapezoid.sample_at(length / 2), 1.0);
        assert!((trapezoid.sample_at(900) - 0.4).abs() < 1e-4);
    }

    #[test]
    fn out_of_range_indices_are_clamped() {
        let window = GrainWindow::with_shape(512, 100, GrainWindowType::Tukey, 0.2).unwrap();
        assert_eq!(window.sample_at(99), window.sample_at(100));
        assert_eq!(window.sample_at(99), window.sample_at(511));
        assert_eq!(window.as_slice().len(), 100);
    }

    #[test]
    fn invalid_configurations_are_rejected() {
        let mut window = GrainWindow::with_shape(512, 256, GrainWindowType::Hann, 0.0).unwrap();
        let before = window.as_slice().to_vec();

        assert!(matches!(
            window.configure(0, GrainWindowType::Hann, 0.5),
            Err(Error::InvalidWindowLength(0))
        ));
        assert!(matches!(
            window.configure(513, GrainWindowType::Hann, 0.5),
            Err(Error::InvalidWindowLength(513))
        ));
        assert!(window.configure(128, GrainWindowType::Tukey, 0.0).is_err());
        assert!(window.configure(128, GrainWindowType::Gaussian, 1.5).is_err());
        assert!(window.configure(128, GrainWindowType::Trapezoidal, -1.0).is_err());

        assert_eq!(window.len(), 256);
        assert_eq!(window.window_type(), GrainWindowType::Hann);
        assert_eq!(window.as_slice(), before.as_slice());
    }

    #[test]
    fn window_type_from_index() {
        assert_eq!(GrainWindowType::from_index(0).unwrap(), GrainWindowType::Hann);
        assert_eq!(
            GrainWindowType::from_index(3).unwrap(),
            GrainWindowType::Trapezoidal
        );
        assert!(matches!(
            GrainWindowType::from_index(4),
            Err(Error::InvalidWindowType(4))
        ));
        assert!(GrainWindowType::from_index(1000).is_err());
        assert_eq!(
            "Gaussian".parse::<GrainWindowType>().unwrap(),
            GrainWindowType::Gaussian
        );
    }
}

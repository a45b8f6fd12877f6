use four_cc::FourCC;

use crate::{
    parameter::{FloatParameter, FloatParameterValue},
    utils::filter::{PostFilter, PostFilterType},
    voice::GrainMixPolicy,
    window::{GrainWindow, GrainWindowType},
};

// -------------------------------------------------------------------------------------------------

pub const GRAIN_LENGTH_ID: FourCC = FourCC(*b"glen");
pub const GRAIN_FREQUENCY_ID: FourCC = FourCC(*b"gfrq");
pub const GRAIN_SCATTER_ID: FourCC = FourCC(*b"gsct");
pub const WINDOW_MODIFIER_ID: FourCC = FourCC(*b"wmod");
pub const OUTPUT_GAIN_ID: FourCC = FourCC(*b"gain");
pub const FILTER_CUTOFF_ID: FourCC = FourCC(*b"fltf");
pub const FILTER_Q_ID: FourCC = FourCC(*b"fltq");

/// Length of a single grain.
pub const GRAIN_LENGTH: FloatParameter =
    FloatParameter::new(GRAIN_LENGTH_ID, "Grain Length", 1.0..=1000.0, 100.0).with_unit("ms");
/// Number of grains triggered per second and voice.
pub const GRAIN_FREQUENCY: FloatParameter =
    FloatParameter::new(GRAIN_FREQUENCY_ID, "Grain Frequency", 0.1..=100.0, 1.0)
        .with_unit("Hz");
/// Randomization of grain start offsets.
pub const GRAIN_SCATTER: FloatParameter =
    FloatParameter::new(GRAIN_SCATTER_ID, "Grain Scatter", 0.0..=100.0, 0.0).with_unit("%");
/// Shape modifier of Tukey, Gaussian and Trapezoidal windows.
pub const WINDOW_MODIFIER: FloatParameter = FloatParameter::new(
    WINDOW_MODIFIER_ID,
    "Window Modifier",
    0.01..=16.0,
    GrainWindow::DEFAULT_MODIFIER,
);
/// Main output volume.
pub const OUTPUT_GAIN: FloatParameter =
    FloatParameter::new(OUTPUT_GAIN_ID, "Output Gain", 0.0..=1.0, 0.5);
/// Post filter cutoff frequency.
pub const FILTER_CUTOFF: FloatParameter = FloatParameter::new(
    FILTER_CUTOFF_ID,
    "Filter Cutoff",
    20.0..=20000.0,
    PostFilter::DEFAULT_CUTOFF,
)
.with_unit("Hz");
/// Post filter resonance.
pub const FILTER_Q: FloatParameter =
    FloatParameter::new(FILTER_Q_ID, "Filter Q", 0.1..=10.0, PostFilter::DEFAULT_Q);

/// All float parameters of the engine, e.g. to set up a UI.
pub const PARAMETERS: [FloatParameter; 7] = [
    GRAIN_LENGTH,
    GRAIN_FREQUENCY,
    GRAIN_SCATTER,
    WINDOW_MODIFIER,
    OUTPUT_GAIN,
    FILTER_CUTOFF,
    FILTER_Q,
];

// -------------------------------------------------------------------------------------------------

/// Last values sent by an [`EngineHandle`](super::EngineHandle).
///
/// Used to validate new values and to skip sending values which did not change.
#[derive(Debug, Clone)]
pub(crate) struct ControlState {
    pub source_len: usize,
    pub source_position: usize,
    pub hop_count: usize,
    pub grain_length: FloatParameterValue,
    pub grain_frequency: FloatParameterValue,
    pub grain_scatter: FloatParameterValue,
    pub window_type: GrainWindowType,
    pub window_modifier: FloatParameterValue,
    pub output_gain: FloatParameterValue,
    pub filter_type: PostFilterType,
    pub filter_cutoff: FloatParameterValue,
    pub filter_q: FloatParameterValue,
    pub mix_policy: GrainMixPolicy,
}

impl ControlState {
    pub fn new(source_len: usize, hop_count: usize, mix_policy: GrainMixPolicy) -> Self {
        Self {
            source_len,
            source_position: 0,
            hop_count,
            grain_length: FloatParameterValue::from_description(GRAIN_LENGTH),
            grain_frequency: FloatParameterValue::from_description(GRAIN_FREQUENCY),
            grain_scatter: FloatParameterValue::from_description(GRAIN_SCATTER),
            window_type: GrainWindowType::default(),
            window_modifier: FloatParameterValue::from_description(WINDOW_MODIFIER),
            output_gain: FloatParameterValue::from_description(OUTPUT_GAIN),
            filter_type: PostFilterType::default(),
            filter_cutoff: FloatParameterValue::from_description(FILTER_CUTOFF),
            filter_q: FloatParameterValue::from_description(FILTER_Q),
            mix_policy,
        }
    }
}

#![doc = include_str!("../README.md")]

// private mods (will be partly re-exported)
mod engine;
mod error;
mod spectral;
mod voice;
mod window;
mod worker;

// public, flat re-exports
pub use config::EngineConfig;
pub use error::Error;

pub use engine::{control as parameters, EngineHandle, GranularEngine};
pub use voice::{wrap_grain_start, Grain, GrainMixPolicy, GrainVoice};
pub use window::{GrainWindow, GrainWindowType};
pub use worker::{SpectralTasks, SpectralWorker, WorkerEvent};

pub use utils::filter::PostFilterType;

// public mods
pub mod config;
pub mod parameter;
pub mod utils;

pub mod spectrum {
    //! Spectral analysis and harmonic resynthesis building blocks of the engine.

    pub use super::spectral::{
        BinMapping, HarmonicMask, PitchedBuffer, Resynthesizer, SliceBank, SpectralAnalyzer,
    };
    pub use super::window::hann;
}

//! Renders a short phrase of spectral grains into a WAV file.
//!
//! Usage: `cargo run --example render-wav [OUTPUT_PATH]`

use std::{f32::consts::PI, sync::Arc};

use spectral_grains::{
    EngineConfig, GrainWindowType, GranularEngine, PostFilterType, SpectralTasks,
};

// -------------------------------------------------------------------------------------------------

#[cfg(all(debug_assertions, feature = "assert-allocs"))]
#[global_allocator]
static A: assert_no_alloc::AllocDisabler = assert_no_alloc::AllocDisabler;

// -------------------------------------------------------------------------------------------------

// Render parameters (tweak as needed!)

const OUTPUT_PATH: &str = "spectral-grains.wav";

const SAMPLE_RATE: u32 = 44100;
const CHANNEL_COUNT: usize = 2;
const BLOCK_SIZE: usize = 512;

const GRAIN_LENGTH_MS: f32 = 120.0; // 1ms - 1000ms
const GRAIN_FREQUENCY_HZ: f32 = 25.0; // 0.1hz - 100hz
const GRAIN_SCATTER: f32 = 40.0; // 0 = sequential, 100 = fully random
const WINDOW_TYPE: GrainWindowType = GrainWindowType::Tukey;
const WINDOW_MODIFIER: f32 = 0.4;

/// MIDI note and length in seconds of each chord.
const CHORDS: [(&[u8], f32); 4] = [
    (&[45, 52, 57, 60], 2.0),
    (&[41, 48, 57, 60], 2.0),
    (&[43, 50, 55, 59], 2.0),
    (&[40, 47, 55, 59], 3.0),
];
/// Release tail in seconds.
const TAIL: f32 = 1.5;

// -------------------------------------------------------------------------------------------------

/// Some broadband source material: a detuned saw pad with a slow noise sweep on top.
fn source_material(sample_rate: u32, len: usize) -> Arc<[f32]> {
    let mut noise = 0x1234_5678_u32;
    (0..len)
        .map(|i| {
            let time = i as f32 / sample_rate as f32;
            let saw = |frequency: f32| ((time * frequency) % 1.0) * 2.0 - 1.0;
            noise ^= noise << 13;
            noise ^= noise >> 17;
            noise ^= noise << 5;
            let white = noise as f32 / u32::MAX as f32 * 2.0 - 1.0;
            let sweep = 0.5 + 0.5 * (2.0 * PI * 0.25 * time).sin();
            0.3 * (saw(110.0) + saw(110.7) + saw(164.8)) + 0.2 * sweep * white
        })
        .collect()
}

// -------------------------------------------------------------------------------------------------

/// Render the given duration into the writer, running pending spectral tasks before each block.
fn render<W: std::io::Write + std::io::Seek>(
    engine: &mut GranularEngine,
    tasks: &mut SpectralTasks,
    writer: &mut hound::WavWriter<W>,
    seconds: f32,
) -> Result<(), hound::Error> {
    let block_count = (seconds * SAMPLE_RATE as f32 / BLOCK_SIZE as f32).ceil() as usize;
    let mut output = vec![0.0; BLOCK_SIZE * CHANNEL_COUNT];
    for _ in 0..block_count {
        // emulates the worker thread: results get picked up in the next block
        tasks.run_pending();
        engine.process_block(&mut output, CHANNEL_COUNT);
        for sample in &output {
            writer.write_sample(*sample)?;
        }
    }
    Ok(())
}

// -------------------------------------------------------------------------------------------------

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Init logger
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .init()?;

    let output_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| OUTPUT_PATH.to_string());

    // Create engine and run spectral tasks inline, so the rendering is deterministic
    let config = EngineConfig::new()
        .sample_rate(SAMPLE_RATE)
        .hop_count(40, 100)
        .random_seed(0x5eed);
    let source = source_material(SAMPLE_RATE, 4 * SAMPLE_RATE as usize);
    let source_len = source.len();
    let (mut engine, mut handle, mut tasks) = GranularEngine::new(config.clone(), source)?;

    handle.set_grain_length_ms(GRAIN_LENGTH_MS)?;
    handle.set_grain_frequency_hz(GRAIN_FREQUENCY_HZ)?;
    handle.set_scatter(GRAIN_SCATTER)?;
    handle.set_window(WINDOW_TYPE, WINDOW_MODIFIER)?;
    handle.set_filter(PostFilterType::Lowpass, 6000.0, 0.8)?;
    handle.set_output_gain(0.3)?;

    let mut writer = hound::WavWriter::create(
        &output_path,
        hound::WavSpec {
            channels: CHANNEL_COUNT as u16,
            sample_rate: SAMPLE_RATE,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        },
    )?;

    // Play chords, moving the analysed source span forward with each chord
    let max_position = source_len - config.analysis_span(config.hop_count);
    for (index, (notes, seconds)) in CHORDS.iter().enumerate() {
        let position = max_position * index / (CHORDS.len() - 1);
        handle.set_source_position(position)?;
        for note in notes.iter() {
            handle.note_on_midi(*note)?;
        }
        log::info!("Rendering chord #{index} {notes:?} at source position {position}...");
        render(&mut engine, &mut tasks, &mut writer, *seconds)?;
        handle.all_notes_off()?;
    }
    render(&mut engine, &mut tasks, &mut writer, TAIL)?;

    writer.finalize()?;
    log::info!("Wrote '{output_path}'");

    Ok(())
}

use std::{f32::consts::PI, sync::Arc, time::Duration};

use rustfft::FftPlanner;

use spectral_grains::{
    spectrum::{BinMapping, PitchedBuffer, Resynthesizer, SliceBank, SpectralAnalyzer},
    EngineConfig, Error, GrainWindowType, GranularEngine, WorkerEvent,
};

// -------------------------------------------------------------------------------------------------

const SAMPLE_RATE: u32 = 44100;

/// Silence with a 440 Hz sine burst in `burst`.
fn burst_source(len: usize, burst: std::ops::Range<usize>) -> Vec<f32> {
    (0..len)
        .map(|i| {
            if burst.contains(&i) {
                (2.0 * PI * 440.0 * i as f32 / SAMPLE_RATE as f32).sin()
            } else {
                0.0
            }
        })
        .collect()
}

fn init_logger() {
    // other tests may have installed the logger already
    let _ = simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Debug)
        .init();
}

fn mean_square(samples: &[f32]) -> f32 {
    samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32
}

fn wait_for_event<F: Fn(&WorkerEvent) -> bool>(
    receiver: &crossbeam_channel::Receiver<WorkerEvent>,
    predicate: F,
) -> WorkerEvent {
    loop {
        let event = receiver
            .recv_timeout(Duration::from_secs(10))
            .expect("Worker did not respond in time");
        if predicate(&event) {
            return event;
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[test]
fn analysis_and_resynthesis() {
    init_logger();
    let source = burst_source(51200, 10000..15000);

    let mut planner = FftPlanner::new();
    let mut analyzer = SpectralAnalyzer::new(&mut planner, 2048, 512);
    let mut resynthesizer =
        Resynthesizer::new(&mut planner, 2048, 512, BinMapping::SampleRate, 1.0);
    let mut bank = SliceBank::new(2048, 512, 10);
    let mut pitched = PitchedBuffer::new(8192);

    // span 9000..15656 contains the whole burst
    analyzer
        .rebuild_slice_bank(&source, 9000, 10, &mut bank)
        .unwrap();
    assert_eq!(bank.hop_count(), 10);
    assert_eq!(bank.start_offset(), 9000);

    resynthesizer.resynthesize(&bank, 440.0, SAMPLE_RATE, 3, &mut pitched);
    assert_eq!(pitched.frequency(), Some(440.0));
    assert!(resynthesizer.mask().contains(20));
    assert!(resynthesizer.mask().contains(2048 - 20));

    let head = mean_square(&pitched.samples()[0..512]);
    let body = mean_square(&pitched.samples()[2048..4608]);
    assert!(body > 0.01, "resynthesized burst is too quiet: {body}");
    assert!(body > 4.0 * head, "burst {body} vs. silence {head}");
    assert!(pitched.samples()[9 * 512 + 2048..].iter().all(|s| *s == 0.0));

    // silent source regions resynthesize to silence
    analyzer
        .rebuild_slice_bank(&source, 20000, 10, &mut bank)
        .unwrap();
    resynthesizer.resynthesize(&bank, 440.0, SAMPLE_RATE, 3, &mut pitched);
    assert!(pitched.samples().iter().all(|s| *s == 0.0));

    // spans which exceed the source are rejected and keep the bank
    assert!(matches!(
        analyzer.rebuild_slice_bank(&source, 50000, 10, &mut bank),
        Err(Error::SourceRangeError { .. })
    ));
    assert_eq!(bank.start_offset(), 20000);
}

#[test]
fn background_worker() {
    init_logger();
    let source: Arc<[f32]> = burst_source(51200, 0..51200).into();
    let config = EngineConfig::new()
        .hop_count(10, 20)
        .max_grain_samples(8192)
        .voice_count(2)
        .grain_count(4)
        .random_seed(42);
    let (mut engine, mut handle, mut tasks) = GranularEngine::new(config, source).unwrap();

    let (status_sender, status_receiver) = crossbeam_channel::bounded(32);
    tasks.set_status_sender(status_sender);
    let worker = tasks.spawn().unwrap();

    // initial slice bank
    assert_eq!(
        wait_for_event(&status_receiver, |e| matches!(
            e,
            WorkerEvent::SliceBankRebuilt { .. }
        )),
        WorkerEvent::SliceBankRebuilt {
            start_offset: 0,
            hop_count: 10
        }
    );

    handle.set_output_gain(1.0).unwrap();
    handle.set_grain_frequency_hz(100.0).unwrap();
    handle.note_on(440.0).unwrap();

    let mut output = vec![0.0; 1024];
    engine.process_block(&mut output, 2);
    assert_eq!(engine.voices()[0].frequency(), Some(440.0));
    assert_eq!(
        wait_for_event(&status_receiver, |e| matches!(
            e,
            WorkerEvent::VoiceResynthesized { .. }
        )),
        WorkerEvent::VoiceResynthesized {
            voice: 0,
            frequency: 440.0
        }
    );

    let mut rendered = Vec::new();
    for _ in 0..16 {
        engine.process_block(&mut output, 2);
        rendered.extend_from_slice(&output);
    }
    assert!(!engine.voices()[0].is_awaiting_buffer());
    assert!(rendered.iter().any(|s| s.abs() > 0.01));

    // moving the source span resynthesizes playing voices
    handle.set_source_position(4096).unwrap();
    wait_for_event(&status_receiver, |e| {
        *e == WorkerEvent::SliceBankRebuilt {
            start_offset: 4096,
            hop_count: 10,
        }
    });
    wait_for_event(&status_receiver, |e| {
        matches!(e, WorkerEvent::VoiceResynthesized { voice: 0, .. })
    });

    // window changes are published by the worker
    handle.set_window(GrainWindowType::Gaussian, 0.3).unwrap();
    wait_for_event(&status_receiver, |e| {
        matches!(
            e,
            WorkerEvent::WindowUpdated {
                window_type: GrainWindowType::Gaussian,
                ..
            }
        )
    });
    engine.process_block(&mut output, 2);
    assert_eq!(engine.window().window_type(), GrainWindowType::Gaussian);

    assert!(!worker.is_finished());
    drop(worker);
}

#[test]
fn grains_stay_in_bounds() {
    init_logger();
    let source: Arc<[f32]> = burst_source(44100, 0..44100).into();
    let config = EngineConfig::new()
        .fft_size(1024, 256)
        .hop_count(16, 32)
        .max_grain_samples(4096)
        .voice_count(3)
        .grain_count(8)
        .random_seed(1);
    let capacity = config.max_grain_samples;
    let (mut engine, mut handle, mut tasks) = GranularEngine::new(config, source).unwrap();

    handle.set_grain_frequency_hz(100.0).unwrap();
    for frequency in [220.0, 330.0, 440.0] {
        handle.note_on(frequency).unwrap();
    }

    let mut output = vec![0.0; 512];
    let settings = [(10.0, 0.0), (50.0, 100.0), (90.0, 30.0), (92.0, 100.0), (2.0, 75.0)];
    for (grain_length_ms, scatter) in settings {
        handle.set_grain_length_ms(grain_length_ms).unwrap();
        handle.set_scatter(scatter).unwrap();
        for _ in 0..20 {
            tasks.run_pending();
            engine.process_block(&mut output, 1);
            for voice in engine.voices() {
                for grain in voice.grains() {
                    assert!(grain.length() >= 1);
                    assert!(
                        grain.start() + grain.length() <= capacity,
                        "grain {grain:?} exceeds the pitched buffer"
                    );
                    if let Some(cursor) = grain.cursor() {
                        assert!(cursor < grain.length());
                    }
                }
            }
            assert!(output.iter().all(|s| s.is_finite()));
        }
    }
    assert!(engine.window().len() <= capacity);
}

//! Background computation of slice banks, pitched voice buffers and the grain window.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
};

use crossbeam_channel::{Receiver, Sender};
use crossbeam_queue::ArrayQueue;
use rustfft::FftPlanner;

use crate::{
    config::EngineConfig,
    spectral::{PitchedBuffer, Resynthesizer, SliceBank, SpectralAnalyzer},
    utils::double_buffer::{double_buffer, BackBuffer, FrontBuffer},
    window::{GrainWindow, GrainWindowType},
    Error,
};

// -------------------------------------------------------------------------------------------------

/// Status events of the spectral worker, see [`SpectralTasks::set_status_sender`].
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    /// A new slice bank got published.
    SliceBankRebuilt {
        start_offset: usize,
        hop_count: usize,
    },
    /// A voice's pitched buffer got published.
    VoiceResynthesized { voice: usize, frequency: f32 },
    /// A new grain window got published.
    WindowUpdated {
        length: usize,
        window_type: GrainWindowType,
        modifier: f32,
    },
    /// A task failed. Nothing got published and the previous buffers are still in use.
    Failed(String),
}

// -------------------------------------------------------------------------------------------------

/// Source span of a slice bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SourceRange {
    pub start_offset: usize,
    pub hop_count: usize,
}

/// Requested grain window configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct WindowShape {
    pub length: usize,
    pub window_type: GrainWindowType,
    pub modifier: f32,
}

/// A voice's note, tagged with the voice's note-on generation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct NoteRequest {
    pub frequency: f32,
    pub generation: u64,
}

// -------------------------------------------------------------------------------------------------

/// Pending worker requests.
///
/// Every request kind has a single slot: a new request replaces a pending one, so a busy worker
/// only ever computes the latest state. Requests are pushed from the control thread (source and
/// window changes) and the audio thread (voice notes) and never block.
pub(crate) struct WorkerRequests {
    source_range: ArrayQueue<SourceRange>,
    source: ArrayQueue<Arc<[f32]>>,
    window: ArrayQueue<WindowShape>,
    voices: Box<[ArrayQueue<Option<NoteRequest>>]>,
    wake_sender: Sender<()>,
    shutdown: AtomicBool,
}

impl WorkerRequests {
    pub fn new(voice_count: usize) -> (Self, Receiver<()>) {
        let (wake_sender, wake_receiver) = crossbeam_channel::bounded(1);
        let requests = Self {
            source_range: ArrayQueue::new(1),
            source: ArrayQueue::new(1),
            window: ArrayQueue::new(1),
            voices: (0..voice_count).map(|_| ArrayQueue::new(1)).collect(),
            wake_sender,
            shutdown: AtomicBool::new(false),
        };
        (requests, wake_receiver)
    }

    pub fn request_source_range(&self, range: SourceRange) {
        self.source_range.force_push(range);
        self.wake();
    }

    pub fn request_source(&self, source: Arc<[f32]>) {
        // a replaced, not yet processed source gets dropped here in the control thread
        let _ = self.source.force_push(source);
        self.wake();
    }

    pub fn request_window(&self, shape: WindowShape) {
        self.window.force_push(shape);
        self.wake();
    }

    /// Request a pitched buffer for a voice's new note, or mark the voice as released.
    /// Real-time safe.
    pub fn request_voice(&self, voice: usize, note: Option<NoteRequest>) {
        self.voices[voice].force_push(note);
        self.wake();
    }

    fn wake(&self) {
        // a full channel means there's a wakeup pending already
        let _ = self.wake_sender.try_send(());
    }

    fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.wake();
    }

    fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

// -------------------------------------------------------------------------------------------------

/// Worker side state of a [`GranularEngine`](crate::GranularEngine).
///
/// Owns the back instances of all double buffered engine state and computes new ones on request.
/// Run it in a background thread via [`spawn`](Self::spawn), or step it manually via
/// [`run_pending`](Self::run_pending), e.g. in tests or offline renderers.
pub struct SpectralTasks {
    config: EngineConfig,
    requests: Arc<WorkerRequests>,
    wake_receiver: Receiver<()>,
    source: Arc<[f32]>,
    source_range: SourceRange,
    analyzer: SpectralAnalyzer,
    resynthesizer: Resynthesizer,
    bank: FrontBuffer<SliceBank>,
    bank_writer: BackBuffer<SliceBank>,
    pitched_writers: Box<[BackBuffer<PitchedBuffer>]>,
    voice_notes: Box<[Option<NoteRequest>]>,
    window_writer: BackBuffer<GrainWindow>,
    status_sender: Option<Sender<WorkerEvent>>,
}

impl SpectralTasks {
    pub(crate) fn new(
        config: EngineConfig,
        source: Arc<[f32]>,
        requests: Arc<WorkerRequests>,
        wake_receiver: Receiver<()>,
        pitched_writers: Box<[BackBuffer<PitchedBuffer>]>,
        window_writer: BackBuffer<GrainWindow>,
    ) -> Self {
        let mut planner = FftPlanner::new();
        let analyzer = SpectralAnalyzer::new(&mut planner, config.fft_size, config.hop_size);
        let resynthesizer = Resynthesizer::new(
            &mut planner,
            config.fft_size,
            config.hop_size,
            config.bin_mapping,
            config.overtone_gain,
        );
        let (bank, bank_writer) = double_buffer(
            SliceBank::new(config.fft_size, config.hop_size, config.max_hop_count),
            SliceBank::new(config.fft_size, config.hop_size, config.max_hop_count),
        );
        let source_range = SourceRange {
            start_offset: 0,
            hop_count: config.hop_count,
        };
        let voice_notes = vec![None; pitched_writers.len()].into_boxed_slice();
        Self {
            config,
            requests,
            wake_receiver,
            source,
            source_range,
            analyzer,
            resynthesizer,
            bank,
            bank_writer,
            pitched_writers,
            voice_notes,
            window_writer,
            status_sender: None,
        }
    }

    /// Send [`WorkerEvent`]s to the given channel. Events are dropped when the channel is full.
    pub fn set_status_sender(&mut self, sender: Sender<WorkerEvent>) {
        self.status_sender = Some(sender);
    }

    /// The most recently built slice bank.
    pub fn slice_bank(&self) -> &SliceBank {
        &self.bank
    }

    /// Run all pending requests. Returns the number of completed or failed tasks.
    ///
    /// Window changes are applied first, then source changes, which also resynthesize all
    /// playing voices, and finally the voices' note requests.
    pub fn run_pending(&mut self) -> usize {
        let mut task_count = 0;

        if let Some(shape) = self.requests.window.pop() {
            task_count += 1;
            self.update_window(shape);
        }

        let mut rebuild_bank = false;
        if let Some(source) = self.requests.source.pop() {
            self.source = source;
            rebuild_bank = true;
        }
        if let Some(range) = self.requests.source_range.pop() {
            self.source_range = range;
            rebuild_bank = true;
        }
        let mut resynthesize = vec![false; self.voice_notes.len()];
        if rebuild_bank {
            task_count += 1;
            if self.rebuild_slice_bank() {
                for (voice, note) in self.voice_notes.iter().enumerate() {
                    resynthesize[voice] = note.is_some();
                }
            }
        }

        for (voice, request) in self.requests.voices.iter().enumerate() {
            if let Some(note) = request.pop() {
                self.voice_notes[voice] = note;
                resynthesize[voice] = note.is_some();
            }
        }
        for (voice, _) in resynthesize.into_iter().enumerate().filter(|(_, r)| *r) {
            if let Some(note) = self.voice_notes[voice] {
                task_count += 1;
                self.resynthesize_voice(voice, note);
            }
        }

        task_count
    }

    /// Move the tasks into a new worker thread, which runs pending requests as soon as they
    /// arrive. The thread stops when the returned worker gets dropped.
    pub fn spawn(self) -> Result<SpectralWorker, Error> {
        let requests = Arc::clone(&self.requests);
        let thread = thread::Builder::new()
            .name("spectral-grains-worker".to_string())
            .spawn(move || {
                if let Err(payload) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(
                    move || self.run_worker_thread(),
                )) {
                    log::error!(
                        "Ouch. Spectral worker thread panicked: {}",
                        panic_message::panic_message(&payload)
                    );
                }
            })?;
        Ok(SpectralWorker {
            requests,
            thread: Some(thread),
        })
    }

    fn run_worker_thread(mut self) {
        log::info!("Spectral worker thread started");
        // consume requests which arrived before the thread started
        self.run_pending();
        loop {
            match self.wake_receiver.recv() {
                Ok(()) => {
                    if self.requests.is_shutting_down() {
                        log::info!("Spectral worker thread is shutting down...");
                        break;
                    }
                    self.run_pending();
                }
                Err(_) => {
                    log::warn!("Spectral worker thread unexpectedly got disconnected.");
                    break;
                }
            }
        }
    }

    fn update_window(&mut self, shape: WindowShape) {
        let result = self.window_writer.write(|window| {
            window.configure(shape.length, shape.window_type, shape.modifier)
        });
        match result {
            Ok(()) => {
                log::debug!(
                    "Updated grain window: {} samples, {} ({})",
                    shape.length,
                    shape.window_type,
                    shape.modifier
                );
                self.send_status(WorkerEvent::WindowUpdated {
                    length: shape.length,
                    window_type: shape.window_type,
                    modifier: shape.modifier,
                });
            }
            Err(err) => self.report_failure("grain window update", err),
        }
    }

    fn rebuild_slice_bank(&mut self) -> bool {
        let SourceRange {
            start_offset,
            hop_count,
        } = self.source_range;
        let analyzer = &mut self.analyzer;
        let source = &self.source;
        let result = self.bank_writer.write(|bank| {
            analyzer.rebuild_slice_bank(source, start_offset, hop_count, bank)
        });
        match result {
            Ok(()) => {
                self.bank.update();
                log::debug!("Rebuilt slice bank: {hop_count} hops at offset {start_offset}");
                self.send_status(WorkerEvent::SliceBankRebuilt {
                    start_offset,
                    hop_count,
                });
                true
            }
            Err(err) => {
                self.report_failure("slice bank rebuild", err);
                false
            }
        }
    }

    fn resynthesize_voice(&mut self, voice: usize, note: NoteRequest) {
        let NoteRequest {
            frequency,
            generation,
        } = note;
        let resynthesizer = &mut self.resynthesizer;
        let bank = self.bank.get();
        let sample_rate = self.config.sample_rate;
        let overtone_count = self.config.overtone_count;
        let result = self.pitched_writers[voice].write(|pitched| {
            resynthesizer.resynthesize(bank, frequency, sample_rate, overtone_count, pitched);
            pitched.set_generation(generation);
            Ok::<_, Error>(())
        });
        match result {
            Ok(()) => {
                log::debug!("Resynthesized voice #{voice} at {frequency} Hz");
                self.send_status(WorkerEvent::VoiceResynthesized { voice, frequency });
            }
            Err(err) => self.report_failure("voice resynthesis", err),
        }
    }

    fn report_failure(&self, task: &str, err: Error) {
        log::warn!("Spectral worker {task} failed: {err}");
        self.send_status(WorkerEvent::Failed(format!("{task} failed: {err}")));
    }

    fn send_status(&self, event: WorkerEvent) {
        if let Some(sender) = &self.status_sender {
            let _ = sender.try_send(event);
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Handle to a running spectral worker thread. Dropping it stops and joins the thread.
pub struct SpectralWorker {
    requests: Arc<WorkerRequests>,
    thread: Option<thread::JoinHandle<()>>,
}

impl SpectralWorker {
    /// True when the worker thread has stopped, e.g. because it panicked.
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(|thread| thread.is_finished())
    }
}

impl Drop for SpectralWorker {
    fn drop(&mut self) {
        self.requests.shutdown();
        if let Some(thread) = self.thread.take() {
            if let Err(payload) = thread.join() {
                log::error!(
                    "Spectral worker thread panicked: {}",
                    panic_message::panic_message(&payload)
                );
            }
        }
    }
}

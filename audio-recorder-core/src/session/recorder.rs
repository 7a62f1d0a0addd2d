use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::models::audio_models::{InputStreamFormat, OutputTarget, RecorderDiagnostics};
use crate::models::config::RecorderConfig;
use crate::models::error::{FileIoError, RecorderError};
use crate::models::recording_result::{RecordingMetadata, RecordingResult};
use crate::models::state::RecorderState;
use crate::session::render::RenderCallback;
use crate::session::shared::SharedState;
use crate::storage::metadata;
use crate::storage::wav_writer::WavWriterFactory;
use crate::traits::audio_source::AudioSource;
use crate::traits::file_writer::AudioFileWriterFactory;
use crate::traits::recorder_delegate::RecorderDelegate;

/// Control-thread half of the recorder: owns the file lifecycle.
///
/// ```text
/// control thread                      audio thread
/// ──────────────                      ────────────
/// queue()   open file ──┐
/// record()  stop=false, │ state=Recording
///                       └──────────▶  render(): confirmed=true, write
/// stop()    stop=true                 render(): sees stop, confirmed=false
///           wait !confirmed ◀──────── (no further writes)
///           finalize file, state=Idle
/// ```
///
/// Generic over the audio source and the file writer so hosts can plug in
/// their own session and container. [`FileRecorder::new`] uses
/// [`WavWriterFactory`].
pub struct FileRecorder<S: AudioSource, F: AudioFileWriterFactory = WavWriterFactory> {
    source: S,
    writer_factory: F,
    config: RecorderConfig,
    shared: Arc<SharedState>,
    delegate: Option<Arc<dyn RecorderDelegate>>,

    /// Last target set by the caller; reused by `record()` from Idle.
    target: Option<OutputTarget>,
    /// Cached input format; resolved from the source when unset.
    input_format: Option<InputStreamFormat>,
}

impl<S: AudioSource> FileRecorder<S, WavWriterFactory> {
    pub fn new(source: S) -> Self {
        let config = RecorderConfig::default();
        let factory = WavWriterFactory::new(config.writer_buffer_bytes);
        Self::build(source, factory, config)
    }

    pub fn with_config(source: S, config: RecorderConfig) -> Result<Self, RecorderError> {
        let factory = WavWriterFactory::new(config.writer_buffer_bytes);
        Self::with_writer_factory(source, factory, config)
    }
}

impl<S: AudioSource, F: AudioFileWriterFactory> FileRecorder<S, F> {
    pub fn with_writer_factory(
        source: S,
        writer_factory: F,
        config: RecorderConfig,
    ) -> Result<Self, RecorderError> {
        config.validate().map_err(RecorderError::Configuration)?;
        Ok(Self::build(source, writer_factory, config))
    }

    fn build(source: S, writer_factory: F, config: RecorderConfig) -> Self {
        Self {
            source,
            writer_factory,
            config,
            shared: Arc::new(SharedState::new()),
            delegate: None,
            target: None,
            input_format: None,
        }
    }

    pub fn set_delegate(&mut self, delegate: Arc<dyn RecorderDelegate>) {
        self.delegate = Some(delegate);
    }

    pub fn state(&self) -> RecorderState {
        self.shared.state()
    }

    /// Whether the render callback is currently confirming it writes frames.
    pub fn is_recording_confirmed(&self) -> bool {
        self.shared.recording_confirmed.load(Ordering::SeqCst)
    }

    pub fn output_target(&self) -> Option<&OutputTarget> {
        self.target.as_ref()
    }

    /// The cached input format, if one has been set or resolved.
    pub fn input_stream_format(&self) -> Option<InputStreamFormat> {
        self.input_format
    }

    pub fn diagnostics(&self) -> RecorderDiagnostics {
        self.shared.diagnostics()
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Hand out the render callback for the audio thread.
    ///
    /// Only one callback may be attached at a time; dropping it releases
    /// the claim.
    pub fn render_callback(&self) -> Result<RenderCallback, RecorderError> {
        if self.shared.callback_claimed.swap(true, Ordering::SeqCst) {
            return Err(RecorderError::configuration(
                "a render callback is already attached to this recorder",
            ));
        }
        Ok(RenderCallback::new(Arc::clone(&self.shared)))
    }

    /// Replace the output target. Only allowed while Idle.
    pub fn set_output_target(&mut self, target: OutputTarget) -> Result<(), RecorderError> {
        let state = self.state();
        if !state.is_idle() {
            return self.fail(RecorderError::Configuration(format!(
                "cannot change the output target while {}",
                state
            )));
        }
        if let Err(reason) = target.format.validate() {
            return self.fail(RecorderError::Configuration(reason));
        }
        self.target = Some(target);
        Ok(())
    }

    /// Set the format of the buffers the callback will receive.
    ///
    /// A sample rate of 0 is filled in from the audio source when the file
    /// is queued. Only allowed while Idle.
    pub fn set_input_stream_format(
        &mut self,
        format: InputStreamFormat,
    ) -> Result<(), RecorderError> {
        let state = self.state();
        if !state.is_idle() {
            return self.fail(RecorderError::Configuration(format!(
                "cannot change the input stream format while {}",
                state
            )));
        }
        self.input_format = Some(format);
        Ok(())
    }

    /// Open `target` and prepare for recording. Transitions: idle → queued.
    ///
    /// Calling this while already queued or recording logs a warning and
    /// keeps the current file.
    pub fn queue(&mut self, target: OutputTarget) -> Result<(), RecorderError> {
        if !self.check_can_queue()? {
            return Ok(());
        }
        if let Err(reason) = target.format.validate() {
            return self.fail(RecorderError::Configuration(reason));
        }
        self.open_target(target)
    }

    /// [`queue`](Self::queue) the previously configured target.
    pub fn queue_configured(&mut self) -> Result<(), RecorderError> {
        if !self.check_can_queue()? {
            return Ok(());
        }
        let Some(target) = self.target.clone() else {
            return self.fail(RecorderError::configuration(
                "no output target has been set",
            ));
        };
        self.open_target(target)
    }

    /// Start writing frames. Transitions: idle/queued → recording.
    ///
    /// Queues the configured target first when Idle. The callback writes
    /// from its next invocation on.
    pub fn record(&mut self) -> Result<(), RecorderError> {
        self.resolve_input_format()?;

        match self.state() {
            RecorderState::Recording => {
                self.warn("record() called while already recording; ignoring");
                return Ok(());
            }
            RecorderState::Stopping => {
                return self.fail(RecorderError::configuration(
                    "recorder is still stopping; call stop() to reclaim it",
                ));
            }
            RecorderState::Idle => self.queue_configured()?,
            RecorderState::Queued => {}
        }

        self.shared.stop_requested.store(false, Ordering::SeqCst);
        self.set_state(RecorderState::Recording);
        if let Some(target) = &self.target {
            log::info!("Recording to {}", target.path.display());
        }
        Ok(())
    }

    /// Stop recording and finalize the file. Transitions: → stopping → idle.
    ///
    /// Blocks the calling thread until the render callback confirms it has
    /// stopped writing, at most a few buffer periods. Returns `Ok(None)`
    /// when there was nothing to stop.
    ///
    /// On timeout the recorder stays in Stopping with the file open; calling
    /// `stop()` again retries once the audio thread responds. A finalize
    /// failure is returned but the recorder still ends Idle.
    pub fn stop(&mut self) -> Result<Option<RecordingResult>, RecorderError> {
        let state = self.state();
        if state.is_idle() {
            self.warn("stop() called while idle; ignoring");
            return Ok(None);
        }

        if !state.is_stopping() {
            self.set_state(RecorderState::Stopping);
        }
        self.shared.stop_requested.store(true, Ordering::SeqCst);

        if let Err(err) = self.wait_for_callback_to_stop() {
            return self.fail(err);
        }

        // SAFETY: stop is requested and the callback has cleared its
        // confirmation, so it will not touch the writer again.
        let writer = unsafe { self.shared.take_writer() };
        let diagnostics = self.shared.diagnostics();
        let finalized = match writer {
            Some(writer) => writer.finalize(),
            None => Err(FileIoError::Finalize {
                path: self.target_display(),
                reason: "no file is open".into(),
            }),
        };

        // The slot is free whatever happened to the file.
        self.set_state(RecorderState::Idle);

        let finalized = match finalized {
            Ok(finalized) => finalized,
            Err(err) => return self.fail(err.into()),
        };

        if diagnostics.failed_writes > 0 {
            return self.fail(
                FileIoError::CallbackWriteFailed {
                    failed_buffers: diagnostics.failed_writes,
                }
                .into(),
            );
        }
        if diagnostics.format_mismatches > 0 {
            return self.fail(RecorderError::Configuration(format!(
                "input format changed while recording; {} buffer(s) dropped",
                diagnostics.format_mismatches
            )));
        }

        let format = match &self.target {
            Some(target) => target.format,
            None => {
                return self.fail(RecorderError::configuration(
                    "finalized a file without an output target",
                ))
            }
        };
        let metadata = RecordingMetadata::new(
            &finalized.path.to_string_lossy(),
            format,
            diagnostics.frames_written,
            finalized.checksum.clone(),
        );

        if self.config.write_metadata {
            if let Err(err) = metadata::write_metadata(&metadata, &finalized.path) {
                self.warn(&format!("failed to write metadata sidecar: {}", err));
            }
        }

        let result = RecordingResult {
            file_path: finalized.path,
            frames_written: diagnostics.frames_written,
            duration_secs: metadata.duration_secs,
            checksum: finalized.checksum,
            metadata,
        };

        log::info!(
            "Recorded {} frames ({:.2}s) to {}",
            result.frames_written,
            result.duration_secs,
            result.file_path.display()
        );
        if let Some(delegate) = &self.delegate {
            delegate.on_recording_finished(&result);
        }

        Ok(Some(result))
    }

    // --- Internal helpers ---

    /// Shared precondition of the two queue entry points.
    /// `Ok(false)` means a redundant call that was already reported.
    fn check_can_queue(&self) -> Result<bool, RecorderError> {
        match self.state() {
            RecorderState::Idle => Ok(true),
            RecorderState::Queued | RecorderState::Recording => {
                self.warn(&format!(
                    "queue() called while {}; keeping {}",
                    self.state(),
                    self.target_display()
                ));
                Ok(false)
            }
            RecorderState::Stopping => self.fail(RecorderError::configuration(
                "recorder is still stopping; call stop() to reclaim it",
            )),
        }
    }

    fn open_target(&mut self, target: OutputTarget) -> Result<(), RecorderError> {
        let input = self.resolve_input_format()?;
        if let Err(reason) = target.format.check_compatible(&input) {
            return self.fail(RecorderError::Configuration(reason));
        }

        let writer = match self.writer_factory.open(&target, &input) {
            Ok(writer) => writer,
            Err(err) => return self.fail(err.into()),
        };

        self.shared.begin_session(&input);
        // SAFETY: state is Idle, so the callback passes through without
        // touching the slot, and the previous file was taken by `stop()`
        // after confirmation.
        unsafe { self.shared.install_writer(writer) };

        log::info!("Queued {}", target.path.display());
        self.target = Some(target);
        self.set_state(RecorderState::Queued);
        Ok(())
    }

    /// Resolve and cache the input format, completing an unset sample rate
    /// from the audio source.
    fn resolve_input_format(&mut self) -> Result<InputStreamFormat, RecorderError> {
        let Some(mut format) = self.input_format.or_else(|| self.source.stream_format()) else {
            return self.fail(RecorderError::configuration(
                "input stream format is unknown and the audio source cannot report one",
            ));
        };

        if format.sample_rate == 0 {
            match self.source.current_sample_rate() {
                Some(rate) if rate > 0 => format.sample_rate = rate,
                _ => {
                    return self.fail(RecorderError::configuration(
                        "input sample rate is unset and the audio source cannot report one",
                    ))
                }
            }
        }

        if !format.is_resolved() {
            return self.fail(RecorderError::configuration(
                "input stream format has no channels",
            ));
        }

        self.input_format = Some(format);
        Ok(format)
    }

    fn wait_for_callback_to_stop(&self) -> Result<(), RecorderError> {
        let timeout = self.config.stop_timeout(self.buffer_period());
        let started = Instant::now();

        while self.shared.recording_confirmed.load(Ordering::SeqCst) {
            if started.elapsed() >= timeout {
                log::warn!(
                    "Render callback still confirming after {:?}; audio thread stuck?",
                    timeout
                );
                return Err(RecorderError::Timeout(timeout));
            }
            thread::sleep(self.config.stop_poll_interval);
        }
        Ok(())
    }

    /// Period of the most recent buffer seen by the callback.
    fn buffer_period(&self) -> Option<Duration> {
        let frames = self.shared.last_buffer_frames.load(Ordering::Relaxed);
        self.shared.session_format().buffer_period(frames)
    }

    fn target_display(&self) -> String {
        self.target
            .as_ref()
            .map(|t| t.path.display().to_string())
            .unwrap_or_else(|| "<no target>".into())
    }

    fn set_state(&self, state: RecorderState) {
        self.shared.publish_state(state);
        log::debug!("Recorder state: {}", state);
        if let Some(delegate) = &self.delegate {
            delegate.on_state_changed(state);
        }
    }

    fn warn(&self, message: &str) {
        log::warn!("{}", message);
        if let Some(delegate) = &self.delegate {
            delegate.on_warning(message);
        }
    }

    fn fail<T>(&self, err: RecorderError) -> Result<T, RecorderError> {
        log::error!("{}", err);
        if let Some(delegate) = &self.delegate {
            delegate.on_error(&err);
        }
        Err(err)
    }
}

impl<S: AudioSource, F: AudioFileWriterFactory> Drop for FileRecorder<S, F> {
    fn drop(&mut self) {
        if self.state().is_idle() {
            return;
        }
        if let Err(err) = self.stop() {
            log::error!("Failed to stop recorder on drop: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::AtomicBool;

    use parking_lot::Mutex;

    use crate::models::audio_models::{AudioBuffer, OutputFileFormat, SampleEncoding};
    use crate::traits::audio_source::FixedFormatSource;
    use crate::traits::file_writer::{AudioFileWriter, FinalizedFile};

    // --- Test doubles ---

    #[derive(Debug, Default)]
    struct WriterLog {
        opened: Vec<PathBuf>,
        writes: u64,
        frames: u64,
        finalized: u64,
    }

    #[derive(Clone, Default)]
    struct MemoryWriterFactory {
        log: Arc<Mutex<WriterLog>>,
        fail_open: bool,
        fail_write: bool,
        fail_finalize: bool,
    }

    struct MemoryWriter {
        path: PathBuf,
        log: Arc<Mutex<WriterLog>>,
        fail_write: bool,
        fail_finalize: bool,
    }

    impl AudioFileWriterFactory for MemoryWriterFactory {
        fn open(
            &self,
            target: &OutputTarget,
            _input: &InputStreamFormat,
        ) -> Result<Box<dyn AudioFileWriter>, FileIoError> {
            if self.fail_open {
                return Err(FileIoError::Open {
                    path: target.path.display().to_string(),
                    reason: "read-only volume".into(),
                });
            }
            self.log.lock().opened.push(target.path.clone());
            Ok(Box::new(MemoryWriter {
                path: target.path.clone(),
                log: Arc::clone(&self.log),
                fail_write: self.fail_write,
                fail_finalize: self.fail_finalize,
            }))
        }
    }

    impl AudioFileWriter for MemoryWriter {
        fn write(&mut self, buffer: &AudioBuffer<'_>) -> Result<(), FileIoError> {
            if self.fail_write {
                return Err(FileIoError::Write("disk full".into()));
            }
            let mut log = self.log.lock();
            log.writes += 1;
            log.frames += buffer.frames() as u64;
            Ok(())
        }

        fn finalize(self: Box<Self>) -> Result<FinalizedFile, FileIoError> {
            if self.fail_finalize {
                return Err(FileIoError::Finalize {
                    path: self.path.display().to_string(),
                    reason: "device removed".into(),
                });
            }
            self.log.lock().finalized += 1;
            Ok(FinalizedFile {
                path: self.path,
                data_bytes: 0,
                checksum: None,
            })
        }
    }

    #[derive(Default)]
    struct RecordingDelegate {
        warnings: Mutex<Vec<String>>,
        states: Mutex<Vec<RecorderState>>,
        errors: Mutex<Vec<RecorderError>>,
        finished: Mutex<u32>,
    }

    impl RecorderDelegate for RecordingDelegate {
        fn on_state_changed(&self, state: RecorderState) {
            self.states.lock().push(state);
        }

        fn on_warning(&self, message: &str) {
            self.warnings.lock().push(message.to_string());
        }

        fn on_error(&self, error: &RecorderError) {
            self.errors.lock().push(error.clone());
        }

        fn on_recording_finished(&self, _result: &RecordingResult) {
            *self.finished.lock() += 1;
        }
    }

    type TestRecorder = FileRecorder<FixedFormatSource, MemoryWriterFactory>;

    const FORMAT: OutputFileFormat = OutputFileFormat {
        sample_rate: 48000,
        channels: 2,
        bit_depth: 16,
        encoding: SampleEncoding::PcmInt,
    };

    fn target(name: &str) -> OutputTarget {
        OutputTarget::new(format!("/recordings/{}", name), FORMAT)
    }

    fn test_config() -> RecorderConfig {
        RecorderConfig {
            min_stop_timeout: Duration::from_millis(50),
            ..Default::default()
        }
    }

    fn recorder_with(factory: MemoryWriterFactory) -> (TestRecorder, Arc<RecordingDelegate>) {
        let source = FixedFormatSource::new(InputStreamFormat::interleaved(48000, 2));
        let mut recorder =
            FileRecorder::with_writer_factory(source, factory, test_config()).unwrap();
        let delegate = Arc::new(RecordingDelegate::default());
        recorder.set_delegate(delegate.clone());
        (recorder, delegate)
    }

    fn recorder() -> (TestRecorder, MemoryWriterFactory, Arc<RecordingDelegate>) {
        let factory = MemoryWriterFactory::default();
        let (recorder, delegate) = recorder_with(factory.clone());
        (recorder, factory, delegate)
    }

    /// Run `stop()` while an audio thread keeps rendering once the stop
    /// has begun, as a live engine would.
    fn stop_while_rendering<F: AudioFileWriterFactory>(
        recorder: &mut FileRecorder<FixedFormatSource, F>,
        callback: &mut RenderCallback,
        samples: &[f32],
    ) -> Result<Option<RecordingResult>, RecorderError> {
        let done = AtomicBool::new(false);
        thread::scope(|scope| {
            scope.spawn(|| {
                let buffer = AudioBuffer::interleaved(samples, 2);
                while !done.load(Ordering::SeqCst) {
                    if callback.recorder_state().is_stopping() {
                        callback.render(&buffer);
                    }
                    thread::sleep(Duration::from_micros(200));
                }
            });
            let result = recorder.stop();
            done.store(true, Ordering::SeqCst);
            result
        })
    }

    // --- Tests ---

    #[test]
    fn new_recorder_is_idle() {
        let (recorder, _, _) = recorder();
        assert!(recorder.state().is_idle());
        assert!(!recorder.is_recording_confirmed());
        assert!(recorder.output_target().is_none());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = RecorderConfig {
            stop_timeout_periods: 0,
            ..Default::default()
        };
        let result = FileRecorder::with_writer_factory(
            FixedFormatSource::unknown(),
            MemoryWriterFactory::default(),
            config,
        );
        assert!(matches!(result, Err(RecorderError::Configuration(_))));
    }

    #[test]
    fn queue_opens_file_and_transitions_to_queued() {
        let (mut recorder, factory, delegate) = recorder();
        recorder.queue(target("a.wav")).unwrap();

        assert!(recorder.state().is_queued());
        assert_eq!(factory.log.lock().opened, vec![PathBuf::from("/recordings/a.wav")]);
        assert_eq!(*delegate.states.lock(), vec![RecorderState::Queued]);
    }

    #[test]
    fn queue_twice_warns_once_and_keeps_first_file() {
        let (mut recorder, factory, delegate) = recorder();
        recorder.queue(target("a.wav")).unwrap();
        recorder.queue(target("b.wav")).unwrap();

        assert_eq!(factory.log.lock().opened.len(), 1);
        assert_eq!(delegate.warnings.lock().len(), 1);
        assert_eq!(
            recorder.output_target().map(|t| t.path.clone()),
            Some(PathBuf::from("/recordings/a.wav"))
        );
    }

    #[test]
    fn queue_open_failure_leaves_state_unchanged() {
        let factory = MemoryWriterFactory {
            fail_open: true,
            ..Default::default()
        };
        let (mut recorder, delegate) = recorder_with(factory);

        let err = recorder.queue(target("a.wav")).unwrap_err();
        assert!(matches!(err, RecorderError::FileIo(FileIoError::Open { .. })));
        assert!(recorder.state().is_idle());
        assert!(recorder.output_target().is_none());
        assert_eq!(delegate.errors.lock().len(), 1);
    }

    #[test]
    fn queue_rejects_sample_rate_conversion() {
        let (mut recorder, factory, _) = recorder();
        let target = OutputTarget::new("/recordings/a.wav", OutputFileFormat::pcm16(44100, 2));

        let err = recorder.queue(target).unwrap_err();
        assert!(matches!(err, RecorderError::Configuration(_)));
        assert!(factory.log.lock().opened.is_empty());
        assert!(recorder.state().is_idle());
    }

    #[test]
    fn queue_without_any_stream_format_is_a_configuration_error() {
        let mut recorder = FileRecorder::with_writer_factory(
            FixedFormatSource::unknown(),
            MemoryWriterFactory::default(),
            test_config(),
        )
        .unwrap();

        let err = recorder.queue(target("a.wav")).unwrap_err();
        assert!(matches!(err, RecorderError::Configuration(_)));
        assert!(recorder.state().is_idle());
    }

    #[test]
    fn unset_sample_rate_is_taken_from_the_source() {
        let (mut recorder, _, _) = recorder();
        recorder
            .set_input_stream_format(InputStreamFormat::interleaved(0, 2))
            .unwrap();
        recorder.queue(target("a.wav")).unwrap();

        assert_eq!(
            recorder.input_stream_format(),
            Some(InputStreamFormat::interleaved(48000, 2))
        );
    }

    #[test]
    fn record_without_target_is_a_configuration_error() {
        let (mut recorder, factory, _) = recorder();

        let err = recorder.record().unwrap_err();
        assert!(matches!(err, RecorderError::Configuration(_)));
        assert!(recorder.state().is_idle());
        assert!(factory.log.lock().opened.is_empty());
    }

    #[test]
    fn record_from_idle_queues_configured_target() {
        let (mut recorder, factory, delegate) = recorder();
        recorder.set_output_target(target("a.wav")).unwrap();
        recorder.record().unwrap();

        assert!(recorder.state().is_recording());
        assert_eq!(factory.log.lock().opened.len(), 1);
        assert_eq!(
            *delegate.states.lock(),
            vec![RecorderState::Queued, RecorderState::Recording]
        );
    }

    #[test]
    fn record_twice_transitions_once_and_warns_once() {
        let (mut recorder, _, delegate) = recorder();
        recorder.queue(target("a.wav")).unwrap();
        recorder.record().unwrap();
        recorder.record().unwrap();

        let recording_transitions = delegate
            .states
            .lock()
            .iter()
            .filter(|s| s.is_recording())
            .count();
        assert_eq!(recording_transitions, 1);
        assert_eq!(delegate.warnings.lock().len(), 1);
    }

    #[test]
    fn next_render_after_record_writes() {
        let (mut recorder, factory, _) = recorder();
        let mut callback = recorder.render_callback().unwrap();
        let samples = [0.1f32; 1024];

        recorder.queue(target("a.wav")).unwrap();
        callback.render(&AudioBuffer::interleaved(&samples, 2));
        assert_eq!(factory.log.lock().writes, 0, "queued must not write");

        recorder.record().unwrap();
        callback.render(&AudioBuffer::interleaved(&samples, 2));

        assert_eq!(factory.log.lock().writes, 1);
        assert!(recorder.is_recording_confirmed());
        assert_eq!(recorder.diagnostics().frames_written, 512);
    }

    #[test]
    fn stop_while_idle_is_a_no_op() {
        let (mut recorder, factory, delegate) = recorder();

        assert_eq!(recorder.stop().unwrap(), None);
        assert!(recorder.state().is_idle());
        assert_eq!(factory.log.lock().finalized, 0);
        assert_eq!(delegate.warnings.lock().len(), 1);
        assert!(delegate.errors.lock().is_empty());
    }

    #[test]
    fn stop_from_queued_closes_file() {
        let (mut recorder, factory, _) = recorder();
        recorder.queue(target("a.wav")).unwrap();

        let result = recorder.stop().unwrap().unwrap();
        assert_eq!(result.frames_written, 0);
        assert!(recorder.state().is_idle());
        assert_eq!(factory.log.lock().finalized, 1);
    }

    #[test]
    fn stop_twice_finalizes_once_and_warns_once() {
        let (mut recorder, factory, delegate) = recorder();
        recorder.queue(target("a.wav")).unwrap();
        recorder.record().unwrap();

        assert!(recorder.stop().unwrap().is_some());
        assert!(recorder.stop().unwrap().is_none());
        assert_eq!(factory.log.lock().finalized, 1);
        assert_eq!(delegate.warnings.lock().len(), 1);
        assert_eq!(*delegate.finished.lock(), 1);
    }

    #[test]
    fn stop_waits_for_confirmation_and_no_writes_follow() {
        let (mut recorder, factory, _) = recorder();
        let mut callback = recorder.render_callback().unwrap();
        recorder.queue(target("a.wav")).unwrap();
        recorder.record().unwrap();

        let running = Arc::new(AtomicBool::new(true));
        let audio_running = Arc::clone(&running);
        let audio = thread::spawn(move || {
            let samples = [0.25f32; 256];
            let buffer = AudioBuffer::interleaved(&samples, 2);
            while audio_running.load(Ordering::SeqCst) {
                callback.render(&buffer);
                thread::sleep(Duration::from_micros(500));
            }
            callback
        });

        // Let some buffers through.
        while factory.log.lock().writes < 5 {
            thread::sleep(Duration::from_millis(1));
        }

        let result = recorder.stop().unwrap().unwrap();
        assert!(!recorder.is_recording_confirmed());
        let writes_at_close = factory.log.lock().writes;
        assert_eq!(result.frames_written, writes_at_close * 128);

        thread::sleep(Duration::from_millis(20));
        running.store(false, Ordering::SeqCst);
        let callback = audio.join().unwrap();

        assert_eq!(factory.log.lock().writes, writes_at_close);
        assert!(!callback.is_recording_confirmed());
        assert!(recorder.diagnostics().callback_count > writes_at_close);
    }

    #[test]
    fn stop_times_out_when_audio_thread_stalls_and_can_be_retried() {
        let (mut recorder, factory, delegate) = recorder();
        let mut callback = recorder.render_callback().unwrap();
        let samples = [0.0f32; 64];
        recorder.queue(target("a.wav")).unwrap();
        recorder.record().unwrap();
        callback.render(&AudioBuffer::interleaved(&samples, 2));

        let err = recorder.stop().unwrap_err();
        assert!(matches!(err, RecorderError::Timeout(_)));
        assert!(recorder.state().is_stopping());
        assert_eq!(factory.log.lock().finalized, 0);

        // A stalled session refuses new work.
        assert!(matches!(
            recorder.record(),
            Err(RecorderError::Configuration(_))
        ));
        assert!(matches!(
            recorder.queue(target("b.wav")),
            Err(RecorderError::Configuration(_))
        ));

        // The audio thread wakes up and sees the stop.
        callback.render(&AudioBuffer::interleaved(&samples, 2));
        assert!(!callback.is_recording_confirmed());

        let result = recorder.stop().unwrap().unwrap();
        assert_eq!(result.frames_written, 32);
        assert!(recorder.state().is_idle());
        assert_eq!(factory.log.lock().writes, 1);
        assert!(delegate
            .errors
            .lock()
            .iter()
            .any(|e| matches!(e, RecorderError::Timeout(_))));
    }

    #[test]
    fn dropping_the_callback_releases_a_pending_confirmation() {
        let (mut recorder, _, _) = recorder();
        let mut callback = recorder.render_callback().unwrap();
        let samples = [0.0f32; 64];
        recorder.queue(target("a.wav")).unwrap();
        recorder.record().unwrap();
        callback.render(&AudioBuffer::interleaved(&samples, 2));
        assert!(recorder.is_recording_confirmed());

        drop(callback);
        assert!(recorder.stop().unwrap().is_some());
    }

    #[test]
    fn finalize_failure_still_returns_to_idle() {
        let factory = MemoryWriterFactory {
            fail_finalize: true,
            ..Default::default()
        };
        let (mut recorder, _) = recorder_with(factory);
        recorder.queue(target("a.wav")).unwrap();
        recorder.record().unwrap();

        let err = recorder.stop().unwrap_err();
        assert!(matches!(err, RecorderError::FileIo(FileIoError::Finalize { .. })));
        assert!(recorder.state().is_idle());

        // The slot is reusable.
        recorder.queue(target("b.wav")).unwrap();
        assert!(recorder.state().is_queued());
    }

    #[test]
    fn callback_write_failures_are_reported_by_stop() {
        let factory = MemoryWriterFactory {
            fail_write: true,
            ..Default::default()
        };
        let (mut recorder, _) = recorder_with(factory.clone());
        let mut callback = recorder.render_callback().unwrap();
        let samples = [0.0f32; 64];
        recorder.queue(target("a.wav")).unwrap();
        recorder.record().unwrap();

        for _ in 0..3 {
            callback.render(&AudioBuffer::interleaved(&samples, 2));
        }
        assert_eq!(recorder.diagnostics().failed_writes, 3);

        let err = stop_while_rendering(&mut recorder, &mut callback, &samples).unwrap_err();
        assert_eq!(
            err,
            RecorderError::FileIo(FileIoError::CallbackWriteFailed { failed_buffers: 3 })
        );
        assert!(recorder.state().is_idle());
    }

    #[test]
    fn format_change_while_recording_drops_buffers_and_is_reported() {
        let (mut recorder, factory, _) = recorder();
        let mut callback = recorder.render_callback().unwrap();
        recorder.queue(target("a.wav")).unwrap();
        recorder.record().unwrap();

        let mono = [0.0f32; 64];
        callback.render(&AudioBuffer::interleaved(&mono, 1));
        assert_eq!(factory.log.lock().writes, 0);
        assert_eq!(recorder.diagnostics().format_mismatches, 1);

        let stereo = [0.0f32; 128];
        let err = stop_while_rendering(&mut recorder, &mut callback, &stereo).unwrap_err();
        assert!(matches!(err, RecorderError::Configuration(_)));
        assert!(recorder.state().is_idle());
    }

    #[test]
    fn empty_buffers_are_ignored() {
        let (mut recorder, factory, _) = recorder();
        let mut callback = recorder.render_callback().unwrap();
        recorder.queue(target("a.wav")).unwrap();
        recorder.record().unwrap();

        callback.render(&AudioBuffer::interleaved(&[], 2));
        assert_eq!(factory.log.lock().writes, 0);
        assert_eq!(recorder.diagnostics().callback_count, 0);
        assert!(!recorder.is_recording_confirmed());
    }

    #[test]
    fn only_one_render_callback_at_a_time() {
        let (recorder, _, _) = recorder();
        let first = recorder.render_callback().unwrap();
        assert!(recorder.render_callback().is_err());

        drop(first);
        assert!(recorder.render_callback().is_ok());
    }

    #[test]
    fn target_and_format_are_locked_outside_idle() {
        let (mut recorder, _, _) = recorder();
        recorder.queue(target("a.wav")).unwrap();

        assert!(recorder.set_output_target(target("b.wav")).is_err());
        assert!(recorder
            .set_input_stream_format(InputStreamFormat::interleaved(44100, 2))
            .is_err());

        recorder.stop().unwrap();
        assert!(recorder.set_output_target(target("b.wav")).is_ok());
    }

    #[test]
    fn counters_reset_for_each_file() {
        let (mut recorder, _, _) = recorder();
        let mut callback = recorder.render_callback().unwrap();
        let samples = [0.0f32; 64];

        recorder.queue(target("a.wav")).unwrap();
        recorder.record().unwrap();
        callback.render(&AudioBuffer::interleaved(&samples, 2));
        let first = stop_while_rendering(&mut recorder, &mut callback, &samples)
            .unwrap()
            .unwrap();
        assert_eq!(first.frames_written, 32);

        recorder.queue(target("b.wav")).unwrap();
        assert_eq!(recorder.diagnostics().frames_written, 0);
        recorder.record().unwrap();
        let second = recorder.stop().unwrap().unwrap();
        assert_eq!(second.frames_written, 0);
    }

    // --- End to end with the WAV writer ---

    fn temp_wav(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "audio_recorder_session_{}_{}",
            uuid::Uuid::new_v4(),
            name
        ))
    }

    fn wav_recorder(sample_rate: u32) -> FileRecorder<FixedFormatSource> {
        let source = FixedFormatSource::new(InputStreamFormat::interleaved(sample_rate, 2));
        let config = RecorderConfig {
            write_metadata: true,
            ..Default::default()
        };
        FileRecorder::with_config(source, config).unwrap()
    }

    #[test]
    fn records_ten_buffers_to_a_readable_wav() {
        let path = temp_wav("ten_buffers.wav");
        let mut recorder = wav_recorder(44100);
        let mut callback = recorder.render_callback().unwrap();
        recorder
            .set_output_target(OutputTarget::new(&path, OutputFileFormat::pcm16(44100, 2)))
            .unwrap();
        recorder.record().unwrap();

        let samples = vec![0.5f32; 1024];
        for _ in 0..10 {
            callback.render(&AudioBuffer::interleaved(&samples, 2));
        }

        let result = stop_while_rendering(&mut recorder, &mut callback, &samples)
            .unwrap()
            .unwrap();
        assert_eq!(result.frames_written, 5120);
        assert_eq!(result.file_path, path);
        assert!(result.checksum.is_some());

        let reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, 44100);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(reader.len(), 10240);
        assert_eq!(reader.duration(), 5120);

        let sidecar = metadata::read_metadata(&path).unwrap();
        assert_eq!(sidecar.frames, 5120);
        assert_eq!(sidecar.checksum, result.checksum);
        approx::assert_relative_eq!(sidecar.duration_secs, 5120.0 / 44100.0);

        std::fs::remove_file(metadata::metadata_path(&path)).ok();
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn float_recording_is_bit_identical() {
        let path = temp_wav("float.wav");
        let mut recorder = wav_recorder(48000);
        let mut callback = recorder.render_callback().unwrap();
        recorder
            .queue(OutputTarget::new(&path, OutputFileFormat::float32(48000, 2)))
            .unwrap();
        recorder.record().unwrap();

        let samples: Vec<f32> = (0..256).map(|i| (i as f32 - 128.0) / 97.0).collect();
        callback.render(&AudioBuffer::interleaved(&samples, 2));
        drop(callback);

        let result = recorder.stop().unwrap().unwrap();
        assert_eq!(result.frames_written, 128);

        let mut reader = hound::WavReader::open(&path).unwrap();
        let read: Vec<f32> = reader.samples::<f32>().map(|s| s.unwrap()).collect();
        assert_eq!(read.len(), samples.len());
        for (a, b) in read.iter().zip(&samples) {
            assert_eq!(a.to_bits(), b.to_bits());
        }

        std::fs::remove_file(metadata::metadata_path(&path)).ok();
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn dropping_a_recording_recorder_finalizes_the_file() {
        let path = temp_wav("dropped.wav");
        {
            let mut recorder = wav_recorder(48000);
            recorder
                .queue(OutputTarget::new(&path, OutputFileFormat::pcm16(48000, 2)))
                .unwrap();
            recorder.record().unwrap();
            let mut callback = recorder.render_callback().unwrap();
            callback.render(&AudioBuffer::interleaved(&[0.25f32; 64], 2));
        }

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.duration(), 32);

        std::fs::remove_file(metadata::metadata_path(&path)).ok();
        std::fs::remove_file(&path).ok();
    }
}

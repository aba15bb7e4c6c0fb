use std::sync::Arc;

use crate::models::error::MixerError;
use crate::models::format::StreamDescriptor;
use crate::traits::output_device::{OutputDevice, StoppageCallback};
use crate::traits::sample_source::SampleSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SinkState {
    Created,
    Initialized,
    Playing,
    Stopped,
}

/// Drives a pull source through a playback device.
///
/// Thin lifecycle guard around an [`OutputDevice`]: enforces init-before-play,
/// makes `stop` idempotent, and stops the device on drop so the source is
/// never pulled after the sink is gone.
pub struct OutputSink {
    device: Box<dyn OutputDevice>,
    state: SinkState,
}

impl OutputSink {
    pub fn new(device: Box<dyn OutputDevice>) -> Self {
        Self {
            device,
            state: SinkState::Created,
        }
    }

    pub fn init(&mut self, source: Arc<dyn SampleSource>, on_stopped: StoppageCallback) -> Result<(), MixerError> {
        if self.state != SinkState::Created {
            return Err(MixerError::InvalidState("output sink already initialized".into()));
        }
        self.device.init(source, on_stopped)?;
        self.state = SinkState::Initialized;
        Ok(())
    }

    pub fn play(&mut self) -> Result<(), MixerError> {
        if self.state != SinkState::Initialized {
            return Err(MixerError::InvalidState("output sink must be initialized before play".into()));
        }
        self.device.play()?;
        self.state = SinkState::Playing;
        Ok(())
    }

    /// Stop playback. Returns once the device callback has quiesced.
    pub fn stop(&mut self) {
        if self.state == SinkState::Stopped {
            return;
        }
        self.device.stop();
        self.state = SinkState::Stopped;
    }

    pub fn is_playing(&self) -> bool {
        self.state == SinkState::Playing
    }

    pub fn format(&self) -> Option<StreamDescriptor> {
        self.device.format()
    }
}

impl Drop for OutputSink {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    use crate::models::format::CANONICAL_FORMAT;

    #[derive(Default)]
    struct Calls {
        init: usize,
        play: usize,
        stop: usize,
    }

    struct RecordingDevice(Arc<Mutex<Calls>>);

    impl OutputDevice for RecordingDevice {
        fn init(&mut self, _source: Arc<dyn SampleSource>, _on_stopped: StoppageCallback) -> Result<(), MixerError> {
            self.0.lock().init += 1;
            Ok(())
        }

        fn play(&mut self) -> Result<(), MixerError> {
            self.0.lock().play += 1;
            Ok(())
        }

        fn stop(&mut self) {
            self.0.lock().stop += 1;
        }

        fn format(&self) -> Option<StreamDescriptor> {
            Some(CANONICAL_FORMAT)
        }
    }

    struct Silence;

    impl SampleSource for Silence {
        fn format(&self) -> StreamDescriptor {
            CANONICAL_FORMAT
        }

        fn read(&self, out: &mut [f32]) {
            out.fill(0.0);
        }
    }

    #[test]
    fn play_requires_init() {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let mut sink = OutputSink::new(Box::new(RecordingDevice(calls.clone())));
        assert!(matches!(sink.play(), Err(MixerError::InvalidState(_))));

        sink.init(Arc::new(Silence), Arc::new(|_| {})).unwrap();
        sink.play().unwrap();
        assert!(sink.is_playing());
        assert_eq!(calls.lock().play, 1);
    }

    #[test]
    fn stop_is_idempotent_and_runs_on_drop() {
        let calls = Arc::new(Mutex::new(Calls::default()));
        {
            let mut sink = OutputSink::new(Box::new(RecordingDevice(calls.clone())));
            sink.init(Arc::new(Silence), Arc::new(|_| {})).unwrap();
            sink.play().unwrap();
            sink.stop();
            sink.stop();
        }
        assert_eq!(calls.lock().stop, 1);

        {
            let _sink = OutputSink::new(Box::new(RecordingDevice(calls.clone())));
        }
        assert_eq!(calls.lock().stop, 2);
    }
}

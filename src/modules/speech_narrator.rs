use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::errors::errors::SpeechError;

/// Synthesis backend seam. Hosts plug in their engine of choice; the
/// narrator owns pacing and failure handling.
pub trait SpeechEngine: Send {
    fn name(&self) -> &str;
    fn speak(&mut self, text: &str) -> Result<(), SpeechError>;
}

/// Rate-limited narration over a speech engine.
///
/// Utterances are dropped, never queued: a request inside the minimum
/// interval since the last successful utterance is discarded.
pub struct SpeechNarrator {
    engine: Box<dyn SpeechEngine>,
    min_interval: Duration,
    last_spoken: Option<Instant>,
}

impl SpeechNarrator {
    pub fn new(engine: Box<dyn SpeechEngine>, min_interval: Duration) -> Self {
        Self {
            engine,
            min_interval,
            last_spoken: None,
        }
    }

    /// Narration survives engine init failure as a disabled feature: the
    /// error is logged and None comes back.
    pub fn from_engine_init(
        engine: Result<Box<dyn SpeechEngine>, SpeechError>,
        min_interval: Duration,
    ) -> Option<Self> {
        match engine {
            Ok(engine) => Some(Self::new(engine, min_interval)),
            Err(err) => {
                warn!(error = %err, "speech engine unavailable, narration disabled");
                None
            }
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn set_min_interval(&mut self, min_interval: Duration) {
        self.min_interval = min_interval;
    }

    /// speak_if_allowed narrates unless the rate limit suppresses it.
    ///
    /// # Arguments
    /// * `text` - utterance to hand to the engine.
    ///
    /// # Returns
    /// * whether the engine actually spoke.
    pub fn speak_if_allowed(&mut self, text: &str) -> bool {
        self.speak_if_allowed_at(text, Instant::now())
    }

    fn speak_if_allowed_at(&mut self, text: &str, now: Instant) -> bool {
        if let Some(last) = self.last_spoken {
            if now.duration_since(last) < self.min_interval {
                return false;
            }
        }
        match self.engine.speak(text) {
            Ok(()) => {
                debug!(engine = self.engine.name(), text, "spoke");
                self.last_spoken = Some(now);
                true
            }
            Err(err) => {
                // Timestamp stays put so the next frame may retry.
                warn!(error = %err, "dropping utterance");
                false
            }
        }
    }
}

impl std::fmt::Debug for SpeechNarrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechNarrator")
            .field("engine", &self.engine.name())
            .field("min_interval", &self.min_interval)
            .field("last_spoken", &self.last_spoken)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct RecordingEngine {
        spoken: Arc<Mutex<Vec<String>>>,
    }

    impl SpeechEngine for RecordingEngine {
        fn name(&self) -> &str {
            "recording"
        }

        fn speak(&mut self, text: &str) -> Result<(), SpeechError> {
            self.spoken.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    struct FailingEngine;

    impl SpeechEngine for FailingEngine {
        fn name(&self) -> &str {
            "failing"
        }

        fn speak(&mut self, _text: &str) -> Result<(), SpeechError> {
            Err(SpeechError::EngineFailure("device gone".into()))
        }
    }

    fn recording_narrator(min_interval: Duration) -> (SpeechNarrator, Arc<Mutex<Vec<String>>>) {
        let spoken = Arc::new(Mutex::new(Vec::new()));
        let engine = RecordingEngine {
            spoken: Arc::clone(&spoken),
        };
        (SpeechNarrator::new(Box::new(engine), min_interval), spoken)
    }

    #[test]
    fn rate_limiter_suppresses_inside_the_interval() {
        let (mut narrator, spoken) = recording_narrator(Duration::from_secs(2));
        let t0 = Instant::now();
        assert!(narrator.speak_if_allowed_at("Xin chào", t0));
        assert!(!narrator.speak_if_allowed_at("Xin chào", t0 + Duration::from_millis(1500)));
        assert!(narrator.speak_if_allowed_at("Xin chào", t0 + Duration::from_millis(2100)));
        assert_eq!(spoken.lock().unwrap().len(), 2);
    }

    #[test]
    fn boundary_exactly_at_the_interval_is_allowed() {
        let (mut narrator, _) = recording_narrator(Duration::from_secs(2));
        let t0 = Instant::now();
        assert!(narrator.speak_if_allowed_at("Nhóm", t0));
        assert!(narrator.speak_if_allowed_at("Nhóm", t0 + Duration::from_secs(2)));
    }

    #[test]
    fn first_utterance_is_always_allowed() {
        let (mut narrator, spoken) = recording_narrator(Duration::from_secs(60));
        assert!(narrator.speak_if_allowed("Buổi sáng"));
        assert_eq!(spoken.lock().unwrap().as_slice(), ["Buổi sáng"]);
    }

    #[test]
    fn engine_failure_drops_the_utterance_and_keeps_the_window_open() {
        let mut narrator =
            SpeechNarrator::new(Box::new(FailingEngine), Duration::from_secs(2));
        let t0 = Instant::now();
        assert!(!narrator.speak_if_allowed_at("Xin lỗi", t0));
        // No successful utterance yet, so the very next attempt is not limited.
        assert!(!narrator.speak_if_allowed_at("Xin lỗi", t0 + Duration::from_millis(1)));
    }

    #[test]
    fn init_failure_disables_narration() {
        let narrator = SpeechNarrator::from_engine_init(
            Err(SpeechError::InitFailed("no audio device".into())),
            Duration::from_secs(2),
        );
        assert!(narrator.is_none());

        let engine: Box<dyn SpeechEngine> = Box::new(FailingEngine);
        assert!(SpeechNarrator::from_engine_init(Ok(engine), Duration::from_secs(2)).is_some());
    }

    #[test]
    fn interval_can_change_between_frames() {
        let (mut narrator, _) = recording_narrator(Duration::from_secs(10));
        let t0 = Instant::now();
        assert!(narrator.speak_if_allowed_at("Con mèo", t0));
        assert!(!narrator.speak_if_allowed_at("Con mèo", t0 + Duration::from_secs(3)));
        narrator.set_min_interval(Duration::from_secs(2));
        assert!(narrator.speak_if_allowed_at("Con mèo", t0 + Duration::from_secs(4)));
    }
}

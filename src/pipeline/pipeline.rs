use tracing::{debug, warn};

use crate::config::config::{GateConfig, PipelineConfig};
use crate::errors::errors::{CaptureError, ModelError};
use crate::helper::feature_helper::extract_features;
use crate::modules::expression_handler::ExpressionHandler;
use crate::modules::sign_classifier::SignClassifier;
use crate::modules::speech_narrator::SpeechNarrator;
use crate::utils::coordinate::FrameDetections;
use crate::utils::utils::FpsCounter;

/// apply_confidence_gate demotes weak predictions to the idle label.
///
/// # Arguments
/// * `label` - raw label out of the classifier.
/// * `confidence` - its confidence estimate.
/// * `gate` - threshold and idle label to demote to.
///
/// # Returns
/// * the label unchanged when `confidence >= threshold`, the idle label
///   otherwise.
pub fn apply_confidence_gate(label: &str, confidence: f32, gate: &GateConfig) -> String {
    if confidence < gate.confidence_threshold {
        gate.idle_label.clone()
    } else {
        label.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// A gesture passed the gate this frame.
    Recognized,
    /// The classifier ran but the frame resolved to the idle label.
    Idle,
    /// The frame carried no detections.
    Waiting,
    /// Estimator output was malformed; the frame was treated as waiting.
    Degraded,
}

/// Everything a host needs to render one processed frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    pub status: FrameStatus,
    /// Label after gating; the idle label on waiting and degraded frames.
    pub label: String,
    pub display_text: String,
    /// Raw classifier confidence; 0.0 when nothing was classified.
    pub confidence: f32,
    pub spoke: bool,
    /// Measured from the gap to the previous frame, 0.0 on the first.
    pub fps: f32,
}

/// Feed of per-frame detections, typically an estimator attached to a
/// camera. `None` ends the session cleanly.
pub trait DetectionSource {
    fn next_detections(&mut self) -> Result<Option<FrameDetections>, CaptureError>;
}

/// One recognition session: classifier, expression state, optional
/// narration, and the live config.
pub struct SignPipeline {
    classifier: SignClassifier,
    expression: ExpressionHandler,
    narrator: Option<SpeechNarrator>,
    config: PipelineConfig,
    fps: FpsCounter,
}

impl SignPipeline {
    /// new initializes a session around an already-loaded classifier.
    pub fn new(
        classifier: SignClassifier,
        narrator: Option<SpeechNarrator>,
        config: PipelineConfig,
    ) -> Self {
        SignPipeline {
            classifier,
            expression: ExpressionHandler::new(),
            narrator,
            config,
            fps: FpsCounter::new(),
        }
    }

    /// from_config loads the model named by the config and builds a session.
    pub fn from_config(
        config: PipelineConfig,
        narrator: Option<SpeechNarrator>,
    ) -> Result<Self, ModelError> {
        let classifier = SignClassifier::load(&config.classifier.model_path)?;
        Ok(Self::new(classifier, narrator, config))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Live settings; changes apply from the next frame.
    pub fn config_mut(&mut self) -> &mut PipelineConfig {
        &mut self.config
    }

    pub fn narration_enabled(&self) -> bool {
        self.config.speech.enabled && self.narrator.is_some()
    }

    /// process_frame runs the full per-frame path: features, prediction,
    /// gate, expression text, narration.
    ///
    /// Never fails: malformed detections and classifier faults resolve to
    /// an idle-looking frame.
    ///
    /// # Arguments
    /// * `detections` - one frame's landmark sets.
    ///
    /// # Returns
    /// * the frame report for rendering.
    pub fn process_frame(&mut self, detections: &FrameDetections) -> FrameReport {
        let fps = self.fps.tick();

        if detections.is_empty() {
            return self.resolve_idle_frame(FrameStatus::Waiting, fps);
        }
        let features = match extract_features(detections) {
            Ok(features) => features,
            Err(err) => {
                warn!(error = %err, "discarding malformed detections");
                return self.resolve_idle_frame(FrameStatus::Degraded, fps);
            }
        };

        let (label, confidence) = self.classifier.predict_with_confidence(features.view());
        let gated = apply_confidence_gate(&label, confidence, &self.config.gate);
        self.expression.receive(&gated);
        let display_text = self.expression.get_message().to_string();

        let is_idle = gated == self.config.gate.idle_label;
        let mut spoke = false;
        if !is_idle && self.config.speech.enabled {
            if let Some(narrator) = self.narrator.as_mut() {
                narrator.set_min_interval(self.config.speech.min_interval());
                let speech_text = self.expression.get_speech_message();
                if !speech_text.trim().is_empty() {
                    spoke = narrator.speak_if_allowed(speech_text);
                }
            }
        }

        let status = if is_idle {
            FrameStatus::Idle
        } else {
            FrameStatus::Recognized
        };
        debug!(label = %gated, confidence, ?status, "frame processed");
        FrameReport {
            status,
            label: gated,
            display_text,
            confidence,
            spoke,
            fps,
        }
    }

    // Waiting and degraded frames still overwrite the expression state so
    // stale gestures cannot linger on screen.
    fn resolve_idle_frame(&mut self, status: FrameStatus, fps: f32) -> FrameReport {
        self.expression.receive(&self.config.gate.idle_label);
        let display_text = self.expression.get_message().to_string();
        FrameReport {
            status,
            label: self.config.gate.idle_label.clone(),
            display_text,
            confidence: 0.0,
            spoke: false,
            fps,
        }
    }

    /// run drains a detection source until it ends, the observer asks to
    /// stop, or the source fails.
    ///
    /// # Arguments
    /// * `source` - frame feed.
    /// * `on_frame` - per-frame observer; return false to stop the session.
    ///
    /// # Returns
    /// * Ok on clean end of stream or requested stop.
    pub fn run(
        &mut self,
        source: &mut dyn DetectionSource,
        mut on_frame: impl FnMut(&FrameReport) -> bool,
    ) -> Result<(), CaptureError> {
        loop {
            let detections = match source.next_detections()? {
                Some(detections) => detections,
                None => break,
            };
            let report = self.process_frame(&detections);
            if !on_frame(&report) {
                debug!("stop requested, ending session");
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::config::SpeechEngineKind;
    use crate::errors::errors::SpeechError;
    use crate::helper::feature_helper::FEATURE_DIM;
    use crate::modules::speech_narrator::SpeechEngine;
    use crate::svm::model::{Kernel, KernelSvm, PairwiseSvm, PlattSigmoid};
    use crate::utils::coordinate::{
        FaceLandmarks, HandLandmarks, HandSide, LandmarkPoint, FACE_LANDMARK_COUNT,
        HAND_LANDMARK_COUNT,
    };
    use ndarray::{array, Array2};
    use std::collections::BTreeMap;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

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

    fn recording_narrator() -> (SpeechNarrator, Arc<Mutex<Vec<String>>>) {
        let spoken = Arc::new(Mutex::new(Vec::new()));
        let engine = RecordingEngine {
            spoken: Arc::clone(&spoken),
        };
        (
            SpeechNarrator::new(Box::new(engine), Duration::from_secs(2)),
            spoken,
        )
    }

    fn stump(
        positive: usize,
        negative: usize,
        width: usize,
        intercept: f32,
        calibrated: bool,
    ) -> PairwiseSvm {
        PairwiseSvm {
            positive_class: positive,
            negative_class: negative,
            support_vectors: Array2::zeros((1, width)),
            dual_coefs: array![0.0],
            intercept,
            platt: calibrated.then_some(PlattSigmoid { a: -1.0, b: 0.0 }),
        }
    }

    fn mapping_of(labels: &[&str]) -> BTreeMap<usize, String> {
        labels
            .iter()
            .enumerate()
            .map(|(idx, label)| (idx, label.to_string()))
            .collect()
    }

    // Always predicts the first label at the requested confidence.
    fn fixed_classifier(labels: [&str; 2], confidence: f32, width: usize) -> SignClassifier {
        let intercept = (confidence / (1.0 - confidence)).ln();
        let svm = KernelSvm {
            kernel: Kernel::Linear,
            n_classes: 2,
            n_features: width,
            machines: vec![stump(0, 1, width, intercept, true)],
        };
        SignClassifier::from_parts(svm, mapping_of(&labels)).unwrap()
    }

    // Three ambivalent machines: every class ends up near 1/3.
    fn uniform_classifier(labels: [&str; 3]) -> SignClassifier {
        let svm = KernelSvm {
            kernel: Kernel::Linear,
            n_classes: 3,
            n_features: FEATURE_DIM,
            machines: vec![
                stump(0, 1, FEATURE_DIM, 0.0, true),
                stump(0, 2, FEATURE_DIM, 0.0, true),
                stump(1, 2, FEATURE_DIM, 0.0, true),
            ],
        };
        SignClassifier::from_parts(svm, mapping_of(&labels)).unwrap()
    }

    fn speaking_config() -> PipelineConfig {
        let mut config = PipelineConfig::new();
        config.speech.enabled = true;
        config.speech.engine = SpeechEngineKind::Offline;
        config
    }

    fn gesture_frame() -> FrameDetections {
        FrameDetections {
            face: Some(FaceLandmarks {
                points: vec![LandmarkPoint::new(0.5, 0.4); FACE_LANDMARK_COUNT],
            }),
            hands: vec![HandLandmarks {
                side: HandSide::Right,
                points: vec![LandmarkPoint::new(0.3, 0.6); HAND_LANDMARK_COUNT],
            }],
        }
    }

    #[test]
    fn gate_passes_at_the_threshold_and_demotes_below() {
        let gate = GateConfig::new();
        assert_eq!(apply_confidence_gate("xin_chao", 0.5, &gate), "xin_chao");
        assert_eq!(apply_confidence_gate("xin_chao", 0.92, &gate), "xin_chao");
        assert_eq!(apply_confidence_gate("xin_chao", 0.49, &gate), "binh_thuong");
        assert_eq!(apply_confidence_gate("binh_thuong", 0.1, &gate), "binh_thuong");
    }

    #[test]
    fn zero_threshold_passes_everything() {
        let mut gate = GateConfig::new();
        gate.confidence_threshold = 0.0;
        assert_eq!(apply_confidence_gate("Error", 0.0, &gate), "Error");
    }

    #[test]
    fn confident_gesture_is_recognized_displayed_and_spoken() {
        let classifier = fixed_classifier(["xin_chao", "binh_thuong"], 0.92, FEATURE_DIM);
        let (narrator, spoken) = recording_narrator();
        let mut pipeline = SignPipeline::new(classifier, Some(narrator), speaking_config());

        let report = pipeline.process_frame(&gesture_frame());
        assert_eq!(report.status, FrameStatus::Recognized);
        assert_eq!(report.label, "xin_chao");
        assert_eq!(report.display_text, "Xin chào");
        assert!((report.confidence - 0.92).abs() < 1e-2);
        assert!(report.spoke);
        assert_eq!(spoken.lock().unwrap().as_slice(), ["Xin chào"]);
    }

    #[test]
    fn narration_is_rate_limited_across_frames() {
        let classifier = fixed_classifier(["xin_chao", "binh_thuong"], 0.92, FEATURE_DIM);
        let (narrator, spoken) = recording_narrator();
        let mut pipeline = SignPipeline::new(classifier, Some(narrator), speaking_config());

        let first = pipeline.process_frame(&gesture_frame());
        let second = pipeline.process_frame(&gesture_frame());
        assert!(first.spoke);
        assert!(!second.spoke);
        assert_eq!(second.status, FrameStatus::Recognized);
        assert_eq!(spoken.lock().unwrap().len(), 1);
    }

    #[test]
    fn low_confidence_resolves_to_idle_without_narration() {
        let classifier = uniform_classifier(["xin_chao", "nhom", "xin_loi"]);
        let (narrator, spoken) = recording_narrator();
        let mut pipeline = SignPipeline::new(classifier, Some(narrator), speaking_config());

        let report = pipeline.process_frame(&gesture_frame());
        assert_eq!(report.status, FrameStatus::Idle);
        assert_eq!(report.label, "binh_thuong");
        assert_eq!(report.display_text, "...");
        assert!((report.confidence - 1.0 / 3.0).abs() < 1e-2);
        assert!(!report.spoke);
        assert!(spoken.lock().unwrap().is_empty());
    }

    #[test]
    fn classifier_fault_collapses_to_an_idle_frame() {
        // Model trained on a different width than the extractor produces.
        let classifier = fixed_classifier(["xin_chao", "binh_thuong"], 0.92, 10);
        let mut pipeline = SignPipeline::new(classifier, None, PipelineConfig::new());

        let report = pipeline.process_frame(&gesture_frame());
        assert_eq!(report.status, FrameStatus::Idle);
        assert_eq!(report.label, "binh_thuong");
        assert_eq!(report.display_text, "...");
        assert_eq!(report.confidence, 0.0);
        assert!(!report.spoke);
    }

    #[test]
    fn empty_frames_wait_and_clear_stale_gestures() {
        let classifier = fixed_classifier(["xin_chao", "binh_thuong"], 0.92, FEATURE_DIM);
        let mut pipeline = SignPipeline::new(classifier, None, PipelineConfig::new());

        let recognized = pipeline.process_frame(&gesture_frame());
        assert_eq!(recognized.display_text, "Xin chào");

        let waiting = pipeline.process_frame(&FrameDetections::default());
        assert_eq!(waiting.status, FrameStatus::Waiting);
        assert_eq!(waiting.display_text, "...");
        assert_eq!(waiting.confidence, 0.0);
    }

    #[test]
    fn malformed_detections_degrade_to_waiting_behavior() {
        let classifier = fixed_classifier(["xin_chao", "binh_thuong"], 0.92, FEATURE_DIM);
        let mut pipeline = SignPipeline::new(classifier, None, PipelineConfig::new());

        let mut frame = gesture_frame();
        frame.hands[0].points.truncate(3);
        let report = pipeline.process_frame(&frame);
        assert_eq!(report.status, FrameStatus::Degraded);
        assert_eq!(report.label, "binh_thuong");
        assert_eq!(report.display_text, "...");
    }

    #[test]
    fn recognized_idle_class_is_shown_but_never_spoken() {
        // The classifier itself emits the idle class, confidently.
        let classifier = fixed_classifier(["binh_thuong", "xin_chao"], 0.92, FEATURE_DIM);
        let (narrator, spoken) = recording_narrator();
        let mut pipeline = SignPipeline::new(classifier, Some(narrator), speaking_config());

        let report = pipeline.process_frame(&gesture_frame());
        assert_eq!(report.status, FrameStatus::Idle);
        assert_eq!(report.display_text, "...");
        assert!(!report.spoke);
        assert!(spoken.lock().unwrap().is_empty());
    }

    #[test]
    fn gate_threshold_changes_apply_on_the_next_frame() {
        let classifier = fixed_classifier(["xin_chao", "binh_thuong"], 0.6, FEATURE_DIM);
        let mut pipeline = SignPipeline::new(classifier, None, PipelineConfig::new());

        let before = pipeline.process_frame(&gesture_frame());
        assert_eq!(before.status, FrameStatus::Recognized);

        pipeline.config_mut().gate.confidence_threshold = 0.7;
        let after = pipeline.process_frame(&gesture_frame());
        assert_eq!(after.status, FrameStatus::Idle);
        assert_eq!(after.label, "binh_thuong");
    }

    #[test]
    fn disabled_speech_keeps_the_session_silent() {
        let classifier = fixed_classifier(["xin_chao", "binh_thuong"], 0.92, FEATURE_DIM);
        let (narrator, spoken) = recording_narrator();
        let mut config = speaking_config();
        config.speech.enabled = false;
        let mut pipeline = SignPipeline::new(classifier, Some(narrator), config);
        assert!(!pipeline.narration_enabled());

        let report = pipeline.process_frame(&gesture_frame());
        assert_eq!(report.status, FrameStatus::Recognized);
        assert!(!report.spoke);
        assert!(spoken.lock().unwrap().is_empty());
    }

    #[test]
    fn missing_narrator_is_not_an_error() {
        let classifier = fixed_classifier(["xin_chao", "binh_thuong"], 0.92, FEATURE_DIM);
        let mut pipeline = SignPipeline::new(classifier, None, speaking_config());
        assert!(!pipeline.narration_enabled());
        let report = pipeline.process_frame(&gesture_frame());
        assert_eq!(report.status, FrameStatus::Recognized);
        assert!(!report.spoke);
    }

    struct VecSource {
        frames: VecDeque<FrameDetections>,
        fail_after: Option<usize>,
        served: usize,
    }

    impl VecSource {
        fn new(frames: Vec<FrameDetections>) -> Self {
            Self {
                frames: frames.into(),
                fail_after: None,
                served: 0,
            }
        }
    }

    impl DetectionSource for VecSource {
        fn next_detections(&mut self) -> Result<Option<FrameDetections>, CaptureError> {
            if let Some(limit) = self.fail_after {
                if self.served >= limit {
                    return Err(CaptureError::ReadFailed("camera unplugged".into()));
                }
            }
            self.served += 1;
            Ok(self.frames.pop_front())
        }
    }

    #[test]
    fn run_drains_the_source_until_end_of_stream() {
        let classifier = fixed_classifier(["xin_chao", "binh_thuong"], 0.92, FEATURE_DIM);
        let mut pipeline = SignPipeline::new(classifier, None, PipelineConfig::new());
        let mut source = VecSource::new(vec![
            gesture_frame(),
            FrameDetections::default(),
            gesture_frame(),
        ]);

        let mut statuses = Vec::new();
        pipeline
            .run(&mut source, |report| {
                statuses.push(report.status);
                true
            })
            .unwrap();
        assert_eq!(
            statuses,
            vec![
                FrameStatus::Recognized,
                FrameStatus::Waiting,
                FrameStatus::Recognized
            ]
        );
    }

    #[test]
    fn run_stops_when_the_observer_asks() {
        let classifier = fixed_classifier(["xin_chao", "binh_thuong"], 0.92, FEATURE_DIM);
        let mut pipeline = SignPipeline::new(classifier, None, PipelineConfig::new());
        let mut source = VecSource::new(vec![gesture_frame(); 10]);

        let mut seen = 0;
        pipeline
            .run(&mut source, |_| {
                seen += 1;
                false
            })
            .unwrap();
        assert_eq!(seen, 1);
    }

    #[test]
    fn run_propagates_source_failures() {
        let classifier = fixed_classifier(["xin_chao", "binh_thuong"], 0.92, FEATURE_DIM);
        let mut pipeline = SignPipeline::new(classifier, None, PipelineConfig::new());
        let mut source = VecSource::new(vec![gesture_frame(); 3]);
        source.fail_after = Some(2);

        let mut seen = 0;
        let err = pipeline
            .run(&mut source, |_| {
                seen += 1;
                true
            })
            .unwrap_err();
        assert!(matches!(err, CaptureError::ReadFailed(_)));
        assert_eq!(seen, 2);
    }
}

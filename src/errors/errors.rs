use std::path::PathBuf;

use thiserror::Error;

use crate::utils::coordinate::HandSide;

/// Failures while loading or validating a model artifact. All fatal at startup.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("cannot read model artifact {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("model artifact is not a valid bundle")]
    Corrupt(#[from] bincode::Error),
    #[error("model artifact contains no trained classifier")]
    EmptyModel,
    #[error("model bundle is internally inconsistent: {0}")]
    Inconsistent(String),
    #[error("label mapping is missing class index {0}")]
    MissingLabel(usize),
    #[error("only {calibrated} of {total} pairwise machines carry calibration")]
    PartialCalibration { calibrated: usize, total: usize },
}

/// Per-prediction failures. Recoverable; callers fall back to a safe default.
#[derive(Debug, Error)]
pub enum PredictionError {
    #[error("feature vector has {got} dimensions, model expects {expected}")]
    DimensionMismatch { got: usize, expected: usize },
    #[error("no label mapped for predicted class index {0}")]
    UnmappedClass(usize),
    #[error("probability estimates were not finite")]
    NumericFailure,
}

/// Malformed landmark sets coming out of the estimator.
#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("{side} hand has {got} landmarks, expected {expected}")]
    MalformedHand {
        side: HandSide,
        got: usize,
        expected: usize,
    },
    #[error("face has {got} landmarks, expected {expected}")]
    MalformedFace { got: usize, expected: usize },
}

/// Speech backend failures. Init failures disable narration for the session;
/// utterance failures drop the single utterance.
#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("speech engine failed to initialize: {0}")]
    InitFailed(String),
    #[error("speech engine failure: {0}")]
    EngineFailure(String),
}

/// Frame source failures. Fatal to the processing loop.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("frame source unavailable: {0}")]
    SourceUnavailable(String),
    #[error("frame source failed mid-stream: {0}")]
    ReadFailed(String),
}

/// Failures in the offline training path.
#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("cannot read training data directory {path:?}")]
    DataDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no .npy class files found under {0:?}")]
    EmptyDataset(PathBuf),
    #[error("cannot read class file {path:?}")]
    ClassFile {
        path: PathBuf,
        #[source]
        source: ndarray_npy::ReadNpyError,
    },
    #[error("class '{label}' has {got}-column rows, expected {expected}")]
    ShapeMismatch {
        label: String,
        got: usize,
        expected: usize,
    },
    #[error("training needs at least two classes, got {0}")]
    TooFewClasses(usize),
    #[error("class index {0} has no samples")]
    EmptyClass(usize),
    #[error("sample matrix has {rows} rows but {labels} labels")]
    LabelCountMismatch { rows: usize, labels: usize },
}

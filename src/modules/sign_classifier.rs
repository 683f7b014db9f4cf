use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::errors::{ModelError, PredictionError};
use crate::svm::model::{expected_machine_count, KernelSvm};
use crate::utils::utils::argmax;

/// Sentinel label emitted when prediction fails internally. Paired with
/// confidence 0.0 so any threshold demotes it downstream.
pub const ERROR_LABEL: &str = "Error";

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub label: String,
    pub confidence: f32,
}

/// On-disk artifact: the trained machine plus the class-index mapping it was
/// trained with.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ModelBundle {
    svm: KernelSvm,
    mapping: BTreeMap<usize, String>,
}

/// Capability tag fixed at load time. Hard models vote without probability
/// estimates and report full confidence.
#[derive(Debug, Clone)]
pub enum SignModel {
    Probabilistic(KernelSvm),
    Hard(KernelSvm),
}

impl SignModel {
    fn svm(&self) -> &KernelSvm {
        match self {
            SignModel::Probabilistic(svm) => svm,
            SignModel::Hard(svm) => svm,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SignClassifier {
    model: SignModel,
    mapping: BTreeMap<usize, String>,
}

impl SignClassifier {
    /// load reads and validates a model bundle from disk.
    ///
    /// # Arguments
    /// * `path` - model artifact written by `save_bundle`.
    ///
    /// # Returns
    /// * a ready classifier, tagged probabilistic or hard from the bundle's
    ///   calibration state.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let bundle: ModelBundle = bincode::deserialize(&bytes)?;
        let classifier = Self::from_parts(bundle.svm, bundle.mapping)?;
        info!(
            path = %path.display(),
            classes = classifier.n_classes(),
            probabilistic = classifier.is_probabilistic(),
            "loaded sign model"
        );
        Ok(classifier)
    }

    /// Assemble a classifier from an in-memory machine and mapping, applying
    /// the same validation as `load`.
    pub fn from_parts(
        svm: KernelSvm,
        mapping: BTreeMap<usize, String>,
    ) -> Result<Self, ModelError> {
        let calibrated = validate(&svm, &mapping)?;
        let model = if calibrated {
            SignModel::Probabilistic(svm)
        } else {
            SignModel::Hard(svm)
        };
        Ok(Self { model, mapping })
    }

    pub fn is_probabilistic(&self) -> bool {
        matches!(self.model, SignModel::Probabilistic(_))
    }

    pub fn n_classes(&self) -> usize {
        self.model.svm().n_classes
    }

    /// Feature width the model was trained on.
    pub fn feature_dim(&self) -> usize {
        self.model.svm().n_features
    }

    pub fn label(&self, class: usize) -> Option<&str> {
        self.mapping.get(&class).map(String::as_str)
    }

    /// try_predict classifies one feature vector.
    ///
    /// # Arguments
    /// * `features` - vector of width `feature_dim`.
    ///
    /// # Returns
    /// * the winning label with its probability, or 1.0 for hard models.
    pub fn try_predict(&self, features: ArrayView1<f32>) -> Result<Prediction, PredictionError> {
        if features.len() != self.feature_dim() {
            return Err(PredictionError::DimensionMismatch {
                got: features.len(),
                expected: self.feature_dim(),
            });
        }
        let (class, confidence) = match &self.model {
            SignModel::Probabilistic(svm) => {
                let probs = svm
                    .predict_proba(features)
                    .ok_or(PredictionError::NumericFailure)?;
                if probs.iter().any(|p| !p.is_finite()) {
                    return Err(PredictionError::NumericFailure);
                }
                let top = argmax(probs.as_slice().unwrap_or(&[]))
                    .ok_or(PredictionError::NumericFailure)?;
                (top, probs[top])
            }
            SignModel::Hard(svm) => (svm.predict(features), 1.0),
        };
        let label = self
            .mapping
            .get(&class)
            .cloned()
            .ok_or(PredictionError::UnmappedClass(class))?;
        Ok(Prediction { label, confidence })
    }

    /// Never-failing wrapper: prediction errors collapse to the error
    /// sentinel so a single bad frame cannot take the session down.
    pub fn predict_with_confidence(&self, features: ArrayView1<f32>) -> (String, f32) {
        match self.try_predict(features) {
            Ok(prediction) => (prediction.label, prediction.confidence),
            Err(err) => {
                warn!(error = %err, "prediction failed, emitting error sentinel");
                (ERROR_LABEL.to_string(), 0.0)
            }
        }
    }
}

/// save_bundle validates and writes a model artifact.
pub fn save_bundle(
    path: impl AsRef<Path>,
    svm: &KernelSvm,
    mapping: &BTreeMap<usize, String>,
) -> Result<(), ModelError> {
    let path = path.as_ref();
    validate(svm, mapping)?;
    let bundle = ModelBundle {
        svm: svm.clone(),
        mapping: mapping.clone(),
    };
    let bytes = bincode::serialize(&bundle)?;
    fs::write(path, bytes).map_err(|source| ModelError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Structural checks shared by load and save. Returns whether every pairwise
/// machine carries calibration.
fn validate(svm: &KernelSvm, mapping: &BTreeMap<usize, String>) -> Result<bool, ModelError> {
    if svm.n_classes == 0 || svm.machines.is_empty() {
        return Err(ModelError::EmptyModel);
    }
    let expected = expected_machine_count(svm.n_classes);
    if svm.machines.len() != expected {
        return Err(ModelError::Inconsistent(format!(
            "{} pairwise machines for {} classes, expected {}",
            svm.machines.len(),
            svm.n_classes,
            expected
        )));
    }
    for machine in &svm.machines {
        if machine.positive_class >= svm.n_classes || machine.negative_class >= svm.n_classes {
            return Err(ModelError::Inconsistent(format!(
                "machine references class pair ({}, {}) outside 0..{}",
                machine.positive_class, machine.negative_class, svm.n_classes
            )));
        }
        if machine.support_vectors.nrows() != machine.dual_coefs.len() {
            return Err(ModelError::Inconsistent(format!(
                "{} support vectors carry {} dual coefficients",
                machine.support_vectors.nrows(),
                machine.dual_coefs.len()
            )));
        }
        if machine.support_vectors.nrows() > 0
            && machine.support_vectors.ncols() != svm.n_features
        {
            return Err(ModelError::Inconsistent(format!(
                "support vectors are {}-wide, model expects {}",
                machine.support_vectors.ncols(),
                svm.n_features
            )));
        }
    }
    for class in 0..svm.n_classes {
        if !mapping.contains_key(&class) {
            return Err(ModelError::MissingLabel(class));
        }
    }
    let calibrated = svm.machines.iter().filter(|m| m.platt.is_some()).count();
    if calibrated == 0 {
        Ok(false)
    } else if calibrated == svm.machines.len() {
        Ok(true)
    } else {
        Err(ModelError::PartialCalibration {
            calibrated,
            total: svm.machines.len(),
        })
    }
}

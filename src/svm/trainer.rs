use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use ndarray::{Array1, Array2, ArrayView2, Axis};
use ndarray_npy::{read_npy, ReadNpyError};
use ndarray_rand::rand::rngs::StdRng;
use ndarray_rand::rand::seq::SliceRandom;
use ndarray_rand::rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::errors::errors::TrainingError;
use crate::svm::model::{expected_machine_count, Kernel, KernelSvm, PairwiseSvm, PlattSigmoid};

const KKT_TOL: f64 = 1e-3;
const MIN_ALPHA_STEP: f64 = 1e-5;
const SUPPORT_EPS: f64 = 1e-8;
const MAX_STALL_PASSES: usize = 5;
const MAX_SWEEPS: usize = 1000;

/// RBF bandwidth selection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Gamma {
    /// 1 / (n_features * variance of the training matrix).
    Scale,
    Fixed(f32),
}

impl Gamma {
    pub fn resolve(&self, x: ArrayView2<f32>) -> f32 {
        match self {
            Gamma::Fixed(value) => *value,
            Gamma::Scale => {
                let n_features = x.ncols() as f32;
                let var = x.var(0.0);
                if var.is_finite() && var > f32::EPSILON {
                    1.0 / (n_features * var)
                } else {
                    1.0 / n_features
                }
            }
        }
    }
}

/// Sequential-minimal-optimization trainer for the one-vs-one RBF machine.
#[derive(Debug, Clone)]
pub struct SvmTrainer {
    pub c: f32,
    pub gamma: Gamma,
    /// Fit a Platt sigmoid per pair so the model can emit probabilities.
    pub probability: bool,
    pub seed: u64,
}

impl Default for SvmTrainer {
    fn default() -> Self {
        Self {
            c: 100.0,
            gamma: Gamma::Scale,
            probability: true,
            seed: 42,
        }
    }
}

impl SvmTrainer {
    pub fn new(c: f32, gamma: Gamma, probability: bool) -> Self {
        Self {
            c,
            gamma,
            probability,
            ..Self::default()
        }
    }

    /// fit trains one pairwise machine per class pair and assembles the
    /// multi-class model.
    ///
    /// # Arguments
    /// * `x` - sample matrix, one feature row per sample.
    /// * `y` - class index per row, dense in `0..n_classes`.
    ///
    /// # Returns
    /// * the trained model, calibrated when `probability` is set.
    pub fn fit(&self, x: ArrayView2<f32>, y: &[usize]) -> Result<KernelSvm, TrainingError> {
        if x.nrows() != y.len() {
            return Err(TrainingError::LabelCountMismatch {
                rows: x.nrows(),
                labels: y.len(),
            });
        }
        let n_classes = y.iter().copied().max().map_or(0, |top| top + 1);
        if n_classes < 2 {
            return Err(TrainingError::TooFewClasses(n_classes));
        }
        let mut counts = vec![0usize; n_classes];
        for &label in y {
            counts[label] += 1;
        }
        if let Some(missing) = counts.iter().position(|&count| count == 0) {
            return Err(TrainingError::EmptyClass(missing));
        }

        let kernel = Kernel::Rbf {
            gamma: self.gamma.resolve(x),
        };
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut machines = Vec::with_capacity(expected_machine_count(n_classes));

        for class_a in 0..n_classes {
            for class_b in class_a + 1..n_classes {
                let indices: Vec<usize> = y
                    .iter()
                    .enumerate()
                    .filter(|(_, &label)| label == class_a || label == class_b)
                    .map(|(idx, _)| idx)
                    .collect();
                let sub_x = x.select(Axis(0), &indices);
                let sub_y: Vec<f64> = indices
                    .iter()
                    .map(|&idx| if y[idx] == class_a { 1.0 } else { -1.0 })
                    .collect();

                let gram = kernel_matrix(&kernel, sub_x.view());
                let (alpha, bias) = smo(&gram, &sub_y, self.c as f64, &mut rng);

                let kept: Vec<usize> = alpha
                    .iter()
                    .enumerate()
                    .filter(|(_, &value)| value > SUPPORT_EPS)
                    .map(|(idx, _)| idx)
                    .collect();
                let support_vectors = sub_x.select(Axis(0), &kept);
                let dual_coefs =
                    Array1::from_iter(kept.iter().map(|&idx| (alpha[idx] * sub_y[idx]) as f32));

                let platt = if self.probability {
                    let decisions: Vec<f64> = (0..sub_y.len())
                        .map(|col| {
                            let mut sum = bias;
                            for (row, &value) in alpha.iter().enumerate() {
                                if value > SUPPORT_EPS {
                                    sum += value * sub_y[row] * gram[[row, col]];
                                }
                            }
                            sum
                        })
                        .collect();
                    Some(fit_platt(&decisions, &sub_y))
                } else {
                    None
                };

                debug!(
                    pair = ?(class_a, class_b),
                    samples = indices.len(),
                    support_vectors = kept.len(),
                    "trained pairwise machine"
                );
                machines.push(PairwiseSvm {
                    positive_class: class_a,
                    negative_class: class_b,
                    support_vectors,
                    dual_coefs,
                    intercept: bias as f32,
                    platt,
                });
            }
        }

        Ok(KernelSvm {
            kernel,
            n_classes,
            n_features: x.ncols(),
            machines,
        })
    }
}

fn kernel_matrix(kernel: &Kernel, x: ArrayView2<f32>) -> Array2<f64> {
    let n = x.nrows();
    Array2::from_shape_fn((n, n), |(i, j)| kernel.compute(x.row(i), x.row(j)) as f64)
}

/// Simplified SMO over a precomputed Gram matrix. Labels are +1/-1.
fn smo(gram: &Array2<f64>, y: &[f64], c: f64, rng: &mut StdRng) -> (Vec<f64>, f64) {
    let n = y.len();
    let mut alpha = vec![0.0f64; n];
    let mut bias = 0.0f64;
    if n < 2 {
        return (alpha, bias);
    }

    let decision = |alpha: &[f64], bias: f64, col: usize| -> f64 {
        let mut sum = bias;
        for (row, &value) in alpha.iter().enumerate() {
            if value != 0.0 {
                sum += value * y[row] * gram[[row, col]];
            }
        }
        sum
    };

    let mut stalled = 0;
    let mut sweeps = 0;
    while stalled < MAX_STALL_PASSES && sweeps < MAX_SWEEPS {
        sweeps += 1;
        let mut changed = 0usize;
        for i in 0..n {
            let err_i = decision(&alpha, bias, i) - y[i];
            let kkt = y[i] * err_i;
            if !((kkt < -KKT_TOL && alpha[i] < c) || (kkt > KKT_TOL && alpha[i] > 0.0)) {
                continue;
            }
            let mut j = rng.gen_range(0..n - 1);
            if j >= i {
                j += 1;
            }
            let err_j = decision(&alpha, bias, j) - y[j];
            let (alpha_i_old, alpha_j_old) = (alpha[i], alpha[j]);
            let (lo, hi) = if y[i] != y[j] {
                (
                    (alpha_j_old - alpha_i_old).max(0.0),
                    (c + alpha_j_old - alpha_i_old).min(c),
                )
            } else {
                (
                    (alpha_i_old + alpha_j_old - c).max(0.0),
                    (alpha_i_old + alpha_j_old).min(c),
                )
            };
            if hi - lo < 1e-12 {
                continue;
            }
            let eta = 2.0 * gram[[i, j]] - gram[[i, i]] - gram[[j, j]];
            if eta >= 0.0 {
                continue;
            }
            let alpha_j_new = (alpha_j_old - y[j] * (err_i - err_j) / eta).clamp(lo, hi);
            if (alpha_j_new - alpha_j_old).abs() < MIN_ALPHA_STEP {
                continue;
            }
            let alpha_i_new = alpha_i_old + y[i] * y[j] * (alpha_j_old - alpha_j_new);
            alpha[i] = alpha_i_new;
            alpha[j] = alpha_j_new;

            let b1 = bias
                - err_i
                - y[i] * (alpha_i_new - alpha_i_old) * gram[[i, i]]
                - y[j] * (alpha_j_new - alpha_j_old) * gram[[i, j]];
            let b2 = bias
                - err_j
                - y[i] * (alpha_i_new - alpha_i_old) * gram[[i, j]]
                - y[j] * (alpha_j_new - alpha_j_old) * gram[[j, j]];
            bias = if alpha_i_new > 0.0 && alpha_i_new < c {
                b1
            } else if alpha_j_new > 0.0 && alpha_j_new < c {
                b2
            } else {
                (b1 + b2) / 2.0
            };
            changed += 1;
        }
        if changed == 0 {
            stalled += 1;
        } else {
            stalled = 0;
        }
    }
    (alpha, bias)
}

/// Newton fit of the Platt sigmoid on decision values, with backtracking
/// line search. Labels are +1/-1.
pub fn fit_platt(decisions: &[f64], labels: &[f64]) -> PlattSigmoid {
    let prior1 = labels.iter().filter(|&&label| label > 0.0).count() as f64;
    let prior0 = labels.len() as f64 - prior1;
    let hi_target = (prior1 + 1.0) / (prior1 + 2.0);
    let lo_target = 1.0 / (prior0 + 2.0);
    let targets: Vec<f64> = labels
        .iter()
        .map(|&label| if label > 0.0 { hi_target } else { lo_target })
        .collect();

    let objective = |a: f64, b: f64| -> f64 {
        let mut fval = 0.0;
        for (&dec, &target) in decisions.iter().zip(&targets) {
            let f_ap_b = dec * a + b;
            if f_ap_b >= 0.0 {
                fval += target * f_ap_b + (1.0 + (-f_ap_b).exp()).ln();
            } else {
                fval += (target - 1.0) * f_ap_b + (1.0 + f_ap_b.exp()).ln();
            }
        }
        fval
    };

    let mut a = 0.0f64;
    let mut b = ((prior0 + 1.0) / (prior1 + 1.0)).ln();
    let mut fval = objective(a, b);

    for _ in 0..100 {
        // Hessian ridge keeps the 2x2 solve well posed.
        let sigma = 1e-12;
        let (mut h11, mut h22) = (sigma, sigma);
        let mut h21 = 0.0;
        let (mut g1, mut g2) = (0.0, 0.0);
        for (&dec, &target) in decisions.iter().zip(&targets) {
            let f_ap_b = dec * a + b;
            let (p, q) = if f_ap_b >= 0.0 {
                let e = (-f_ap_b).exp();
                (e / (1.0 + e), 1.0 / (1.0 + e))
            } else {
                let e = f_ap_b.exp();
                (1.0 / (1.0 + e), e / (1.0 + e))
            };
            let d2 = p * q;
            h11 += dec * dec * d2;
            h22 += d2;
            h21 += dec * d2;
            let d1 = target - p;
            g1 += dec * d1;
            g2 += d1;
        }
        if g1.abs() < 1e-5 && g2.abs() < 1e-5 {
            break;
        }
        let det = h11 * h22 - h21 * h21;
        let da = -(h22 * g1 - h21 * g2) / det;
        let db = -(-h21 * g1 + h11 * g2) / det;
        let gd = g1 * da + g2 * db;

        let mut step = 1.0f64;
        let mut improved = false;
        while step >= 1e-10 {
            let new_a = a + step * da;
            let new_b = b + step * db;
            let new_f = objective(new_a, new_b);
            if new_f < fval + 1e-4 * step * gd {
                a = new_a;
                b = new_b;
                fval = new_f;
                improved = true;
                break;
            }
            step /= 2.0;
        }
        if !improved {
            break;
        }
    }

    PlattSigmoid {
        a: a as f32,
        b: b as f32,
    }
}

/// Seeded shuffle split. `x` and `y` must have matching lengths; the test
/// partition takes `test_ratio` of the rows, rounded.
pub fn train_test_split(
    x: ArrayView2<f32>,
    y: &[usize],
    test_ratio: f32,
    seed: u64,
) -> (Array2<f32>, Vec<usize>, Array2<f32>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..x.nrows()).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);
    let n_test = ((x.nrows() as f32) * test_ratio).round() as usize;
    let (test_idx, train_idx) = indices.split_at(n_test.min(x.nrows()));

    let take = |idx: &[usize]| -> (Array2<f32>, Vec<usize>) {
        (x.select(Axis(0), idx), idx.iter().map(|&i| y[i]).collect())
    };
    let (train_x, train_y) = take(train_idx);
    let (test_x, test_y) = take(test_idx);
    (train_x, train_y, test_x, test_y)
}

/// load_training_data scans a directory of per-class `.npy` files.
///
/// Each file holds one class: rows are feature vectors, the file stem is the
/// class label. Files are visited in name order so class indices are stable;
/// empty arrays are skipped with a warning and consume no index.
///
/// # Arguments
/// * `dir` - directory containing the class files.
///
/// # Returns
/// * sample matrix, dense class indices, and the index-to-label mapping.
pub fn load_training_data(
    dir: impl AsRef<Path>,
) -> Result<(Array2<f32>, Vec<usize>, BTreeMap<usize, String>), TrainingError> {
    let dir = dir.as_ref();
    let entries = fs::read_dir(dir).map_err(|source| TrainingError::DataDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files: Vec<PathBuf> = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| TrainingError::DataDir {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) == Some("npy") {
            files.push(path);
        }
    }
    files.sort();

    let mut classes: Vec<(String, Array2<f32>)> = Vec::with_capacity(files.len());
    let mut width: Option<usize> = None;
    for path in files {
        let label = match path.file_stem().and_then(|stem| stem.to_str()) {
            Some(stem) => stem.to_string(),
            None => continue,
        };
        let rows = read_class_file(&path).map_err(|source| TrainingError::ClassFile {
            path: path.clone(),
            source,
        })?;
        if rows.nrows() == 0 {
            warn!(class = %label, "skipping empty class file");
            continue;
        }
        match width {
            Some(expected) if rows.ncols() != expected => {
                return Err(TrainingError::ShapeMismatch {
                    label,
                    got: rows.ncols(),
                    expected,
                });
            }
            None => width = Some(rows.ncols()),
            _ => {}
        }
        classes.push((label, rows));
    }

    let width = match width {
        Some(value) => value,
        None => return Err(TrainingError::EmptyDataset(dir.to_path_buf())),
    };
    let n_rows: usize = classes.iter().map(|(_, rows)| rows.nrows()).sum();
    let mut x = Array2::<f32>::zeros((n_rows, width));
    let mut y = Vec::with_capacity(n_rows);
    let mut mapping = BTreeMap::new();
    let mut row = 0;
    for (idx, (label, rows)) in classes.iter().enumerate() {
        mapping.insert(idx, label.clone());
        for source_row in rows.rows() {
            x.row_mut(row).assign(&source_row);
            y.push(idx);
            row += 1;
        }
    }
    info!(classes = mapping.len(), samples = n_rows, "loaded training data");
    Ok((x, y, mapping))
}

// Class files written by numpy default to f64; tolerate f32 dumps too.
fn read_class_file(path: &Path) -> Result<Array2<f32>, ReadNpyError> {
    match read_npy::<_, Array2<f64>>(path) {
        Ok(rows) => Ok(rows.mapv(|v| v as f32)),
        Err(first) => match read_npy::<_, Array2<f32>>(path) {
            Ok(rows) => Ok(rows),
            Err(_) => Err(first),
        },
    }
}

pub fn predict_labels(svm: &KernelSvm, x: ArrayView2<f32>) -> Vec<usize> {
    x.rows().into_iter().map(|row| svm.predict(row)).collect()
}

pub fn accuracy(svm: &KernelSvm, x: ArrayView2<f32>, y: &[usize]) -> f32 {
    if y.is_empty() {
        return 0.0;
    }
    let correct = predict_labels(svm, x)
        .iter()
        .zip(y)
        .filter(|(predicted, truth)| predicted == truth)
        .count();
    correct as f32 / y.len() as f32
}

/// Rows are truth, columns are predictions.
pub fn confusion_matrix(truth: &[usize], predicted: &[usize], n_classes: usize) -> Array2<usize> {
    let mut matrix = Array2::zeros((n_classes, n_classes));
    for (&t, &p) in truth.iter().zip(predicted.iter()) {
        if t < n_classes && p < n_classes {
            matrix[[t, p]] += 1;
        }
    }
    matrix
}

pub fn render_confusion_matrix(
    matrix: &Array2<usize>,
    mapping: &BTreeMap<usize, String>,
) -> String {
    let name = |idx: usize| {
        mapping
            .get(&idx)
            .cloned()
            .unwrap_or_else(|| idx.to_string())
    };
    let label_width = (0..matrix.nrows()).map(|i| name(i).len()).max().unwrap_or(0);
    let cell_width = matrix
        .iter()
        .map(|count| count.to_string().len())
        .max()
        .unwrap_or(1);
    let mut out = String::new();
    for i in 0..matrix.nrows() {
        out.push_str(&format!("{:>label_width$}", name(i)));
        for j in 0..matrix.ncols() {
            out.push_str(&format!(" {:>cell_width$}", matrix[[i, j]]));
        }
        out.push('\n');
    }
    out
}

use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

/// Probabilities out of a Platt sigmoid are clamped away from 0 and 1 so the
/// pairwise coupling stays well conditioned.
const MIN_PAIR_PROB: f64 = 1e-7;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Kernel {
    Linear,
    Rbf { gamma: f32 },
}

impl Kernel {
    /// Kernel value between two feature vectors of equal width.
    pub fn compute(&self, a: ArrayView1<f32>, b: ArrayView1<f32>) -> f32 {
        match self {
            Kernel::Linear => a.dot(&b),
            Kernel::Rbf { gamma } => {
                let dist_sq: f32 = a
                    .iter()
                    .zip(b.iter())
                    .map(|(x, y)| (x - y) * (x - y))
                    .sum();
                (-gamma * dist_sq).exp()
            }
        }
    }
}

/// Sigmoid mapping a decision value to P(positive class), per Platt.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlattSigmoid {
    pub a: f32,
    pub b: f32,
}

impl PlattSigmoid {
    pub fn probability(&self, decision: f32) -> f32 {
        let f = (self.a * decision + self.b) as f64;
        let p = if f >= 0.0 {
            (-f).exp() / (1.0 + (-f).exp())
        } else {
            1.0 / (1.0 + f.exp())
        };
        p as f32
    }
}

/// One binary machine of the one-vs-one decomposition. A positive decision
/// value votes for `positive_class`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairwiseSvm {
    pub positive_class: usize,
    pub negative_class: usize,
    pub support_vectors: Array2<f32>,
    /// Per support vector: alpha_i * y_i.
    pub dual_coefs: Array1<f32>,
    pub intercept: f32,
    pub platt: Option<PlattSigmoid>,
}

impl PairwiseSvm {
    pub fn decision(&self, x: ArrayView1<f32>, kernel: &Kernel) -> f32 {
        let mut sum = self.intercept;
        for (row, coef) in self.support_vectors.rows().into_iter().zip(&self.dual_coefs) {
            sum += coef * kernel.compute(row, x);
        }
        sum
    }
}

/// Multi-class kernel SVM assembled from k(k-1)/2 pairwise machines.
///
/// Evaluation assumes inputs of width `n_features`; callers validate width
/// before handing vectors in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelSvm {
    pub kernel: Kernel,
    pub n_classes: usize,
    pub n_features: usize,
    pub machines: Vec<PairwiseSvm>,
}

/// Machines a full one-vs-one decomposition over `n_classes` must carry.
pub fn expected_machine_count(n_classes: usize) -> usize {
    n_classes * n_classes.saturating_sub(1) / 2
}

impl KernelSvm {
    /// True when every pairwise machine carries Platt parameters.
    pub fn is_calibrated(&self) -> bool {
        self.machines.iter().all(|m| m.platt.is_some())
    }

    /// Raw decision values in machine order.
    pub fn decision_values(&self, x: ArrayView1<f32>) -> Vec<f32> {
        let mut values = Vec::with_capacity(self.machines.len());
        for machine in &self.machines {
            values.push(machine.decision(x, &self.kernel));
        }
        values
    }

    /// predict runs the one-vs-one vote and returns the winning class index.
    ///
    /// # Arguments
    /// * `x` - feature vector of width `n_features`.
    ///
    /// # Returns
    /// * class index with the most pairwise votes, ties resolved toward the
    ///   lowest index.
    pub fn predict(&self, x: ArrayView1<f32>) -> usize {
        let mut votes = vec![0usize; self.n_classes];
        for machine in &self.machines {
            if machine.decision(x, &self.kernel) >= 0.0 {
                votes[machine.positive_class] += 1;
            } else {
                votes[machine.negative_class] += 1;
            }
        }
        let mut winner = 0;
        for (idx, &count) in votes.iter().enumerate() {
            if count > votes[winner] {
                winner = idx;
            }
        }
        winner
    }

    /// predict_proba couples the calibrated pairwise probabilities into a
    /// per-class distribution.
    ///
    /// # Arguments
    /// * `x` - feature vector of width `n_features`.
    ///
    /// # Returns
    /// * per-class probabilities summing to 1, or None when any machine was
    ///   trained without calibration.
    pub fn predict_proba(&self, x: ArrayView1<f32>) -> Option<Array1<f32>> {
        if self.n_classes < 2
            || self.machines.len() != expected_machine_count(self.n_classes)
            || !self.is_calibrated()
        {
            return None;
        }
        let k = self.n_classes;
        let mut r = Array2::<f64>::zeros((k, k));
        for machine in &self.machines {
            let platt = machine.platt.as_ref()?;
            let p = (platt.probability(machine.decision(x, &self.kernel)) as f64)
                .clamp(MIN_PAIR_PROB, 1.0 - MIN_PAIR_PROB);
            r[[machine.positive_class, machine.negative_class]] = p;
            r[[machine.negative_class, machine.positive_class]] = 1.0 - p;
        }
        let coupled = couple_pairwise(&r);
        Some(coupled.mapv(|v| v as f32))
    }
}

/// Iterative fixed-point coupling of pairwise win probabilities into a class
/// distribution (Wu, Lin and Weng's second method).
fn couple_pairwise(r: &Array2<f64>) -> Array1<f64> {
    let k = r.nrows();
    let mut q = Array2::<f64>::zeros((k, k));
    for t in 0..k {
        let mut diag = 0.0;
        for j in 0..k {
            if j != t {
                diag += r[[j, t]] * r[[j, t]];
                q[[t, j]] = -r[[j, t]] * r[[t, j]];
            }
        }
        q[[t, t]] = diag;
    }

    let mut p = Array1::<f64>::from_elem(k, 1.0 / k as f64);
    let mut qp = Array1::<f64>::zeros(k);
    let eps = 0.005 / k as f64;
    let max_iter = 100.max(k);

    for _ in 0..max_iter {
        // Recompute from scratch each round for numerical accuracy.
        let mut pqp = 0.0;
        for t in 0..k {
            qp[t] = 0.0;
            for j in 0..k {
                qp[t] += q[[t, j]] * p[j];
            }
            pqp += p[t] * qp[t];
        }
        let max_error = (0..k).map(|t| (qp[t] - pqp).abs()).fold(0.0, f64::max);
        if max_error < eps {
            break;
        }
        for t in 0..k {
            let diff = (-qp[t] + pqp) / q[[t, t]];
            p[t] += diff;
            pqp = (pqp + diff * (diff * q[[t, t]] + 2.0 * qp[t])) / (1.0 + diff) / (1.0 + diff);
            for j in 0..k {
                qp[j] = (qp[j] + diff * q[[t, j]]) / (1.0 + diff);
                p[j] /= 1.0 + diff;
            }
        }
    }
    p
}

//! Classification metrics over a scored test partition

use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use crate::{DeepFeatError, Result};

/// Confusion-matrix based classification summary
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    n_classes: usize,
    /// `confusion[actual][predicted]`
    confusion: Vec<Vec<usize>>,
}

fn argmax(row: ArrayView1<f32>) -> usize {
    row.iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(best, max), (i, &v)| {
            if v > max {
                (i, v)
            } else {
                (best, max)
            }
        })
        .0
}

impl Evaluation {
    /// Empty evaluation for `n_classes` classes
    pub fn new(n_classes: usize) -> Self {
        Evaluation {
            n_classes,
            confusion: vec![vec![0; n_classes]; n_classes],
        }
    }

    /// Accumulate a batch of one-hot `labels` against network `predictions`
    pub fn eval(&mut self, labels: &Array2<f32>, predictions: &Array2<f32>) -> Result<()> {
        if labels.dim() != predictions.dim() || labels.ncols() != self.n_classes {
            return Err(DeepFeatError::InvalidArgument(format!(
                "labels {:?} and predictions {:?} do not match {} classes",
                labels.dim(),
                predictions.dim(),
                self.n_classes
            )));
        }

        for (label, prediction) in labels.rows().into_iter().zip(predictions.rows()) {
            self.confusion[argmax(label)][argmax(prediction)] += 1;
        }
        Ok(())
    }

    /// Number of classes
    pub fn class_count(&self) -> usize {
        self.n_classes
    }

    /// Number of evaluated examples
    pub fn count(&self) -> usize {
        self.confusion.iter().flatten().sum()
    }

    /// Confusion matrix, indexed `[actual][predicted]`
    pub fn confusion(&self) -> &[Vec<usize>] {
        &self.confusion
    }

    fn true_positives(&self, class: usize) -> usize {
        self.confusion[class][class]
    }

    fn predicted(&self, class: usize) -> usize {
        self.confusion.iter().map(|row| row[class]).sum()
    }

    fn actual(&self, class: usize) -> usize {
        self.confusion[class].iter().sum()
    }

    /// Fraction of correct predictions
    pub fn accuracy(&self) -> f64 {
        let total = self.count();
        if total == 0 {
            return 0.0;
        }
        let correct: usize = (0..self.n_classes).map(|c| self.true_positives(c)).sum();
        correct as f64 / total as f64
    }

    /// Macro precision over classes that were predicted at least once
    pub fn precision(&self) -> f64 {
        macro_average((0..self.n_classes).filter_map(|c| {
            let predicted = self.predicted(c);
            (predicted > 0).then(|| self.true_positives(c) as f64 / predicted as f64)
        }))
    }

    /// Macro recall over classes present in the labels
    pub fn recall(&self) -> f64 {
        macro_average((0..self.n_classes).filter_map(|c| {
            let actual = self.actual(c);
            (actual > 0).then(|| self.true_positives(c) as f64 / actual as f64)
        }))
    }

    /// Harmonic mean of precision and recall
    pub fn f1(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        if p + r > 0.0 {
            2.0 * p * r / (p + r)
        } else {
            0.0
        }
    }

    /// Human-readable summary
    pub fn stats(&self) -> String {
        let mut out = format!(
            "Examples: {}\nAccuracy: {:.4}\nPrecision: {:.4}\nRecall: {:.4}\nF1 Score: {:.4}\n",
            self.count(),
            self.accuracy(),
            self.precision(),
            self.recall(),
            self.f1()
        );
        out.push_str("Confusion matrix (rows = actual, columns = predicted):\n");
        for row in &self.confusion {
            let cells: Vec<String> = row.iter().map(|c| format!("{:>5}", c)).collect();
            out.push_str(&cells.join(" "));
            out.push('\n');
        }
        out
    }
}

fn macro_average(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

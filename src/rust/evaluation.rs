//! Scores predictions against known outcomes, with `"default"` as the
//! positive class.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The condition the model is meant to detect
pub const POSITIVE_LABEL: &str = "default";
pub const NEGATIVE_LABEL: &str = "not-default";

const LABELS: [&str; 2] = [POSITIVE_LABEL, NEGATIVE_LABEL];

#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    #[error("Missing {role} column '{column}'")]
    MissingColumn { role: &'static str, column: String },
}

/// Explicit integer code to label mapping for outcome columns recorded as
/// numbers. Nothing is inferred: without a coding, numeric outcomes are
/// compared as text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelCoding(BTreeMap<i64, String>);

impl LabelCoding {
    pub fn new<S: Into<String>>(entries: impl IntoIterator<Item = (i64, S)>) -> Self {
        Self(entries.into_iter().map(|(k, v)| (k, v.into())).collect())
    }

    /// Normalizes one outcome value: an integer code with an entry becomes its
    /// label, anything else passes through trimmed.
    pub fn normalize(&self, value: &str) -> String {
        let trimmed = value.trim();
        trimmed
            .parse::<i64>()
            .ok()
            .or_else(|| {
                trimmed
                    .parse::<f64>()
                    .ok()
                    .filter(|v| v.fract() == 0.0 && v.is_finite())
                    .map(|v| v as i64)
            })
            .and_then(|code| self.0.get(&code))
            .cloned()
            .unwrap_or_else(|| trimmed.to_string())
    }
}

/// Confusion matrix over `["default", "not-default"]`: rows are actual
/// labels, columns predicted labels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConfusionMatrix(pub [[usize; 2]; 2]);

impl ConfusionMatrix {
    pub fn true_positives(&self) -> usize {
        self.0[0][0]
    }

    pub fn false_negatives(&self) -> usize {
        self.0[0][1]
    }

    pub fn false_positives(&self) -> usize {
        self.0[1][0]
    }

    pub fn true_negatives(&self) -> usize {
        self.0[1][1]
    }
}

/// Per-label scores used by the classification report
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LabelScores {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub confusion_matrix: ConfusionMatrix,
    pub accuracy: f64,
    /// Precision for the positive label
    pub precision: f64,
    /// Recall for the positive label
    pub recall: f64,
    /// F1 for the positive label
    pub f1: f64,
    /// Scores for `default` then `not-default`
    pub per_label: [LabelScores; 2],
    pub total: usize,
}

/// Evaluates `(actual, predicted)` pairs.
///
/// Actual values are normalized through `coding` when one is given.
/// Rows whose labels are neither `default` nor `not-default` count toward
/// accuracy only. Zero denominators yield 0.0, so a batch without a single
/// `default` row scores 0.0 precision, recall and F1 instead of failing.
pub fn evaluate<A, P>(rows: impl IntoIterator<Item = (A, P)>, coding: Option<&LabelCoding>) -> Evaluation
where
    A: AsRef<str>,
    P: AsRef<str>,
{
    let mut matrix = ConfusionMatrix::default();
    let mut correct = 0usize;
    let mut total = 0usize;

    for (actual, predicted) in rows {
        let actual = match coding {
            Some(coding) => coding.normalize(actual.as_ref()),
            None => actual.as_ref().trim().to_string(),
        };
        let predicted = predicted.as_ref().trim();
        total += 1;
        if actual == predicted {
            correct += 1;
        }
        let actual_idx = LABELS.iter().position(|l| *l == actual);
        let predicted_idx = LABELS.iter().position(|l| *l == predicted);
        if let (Some(a), Some(p)) = (actual_idx, predicted_idx) {
            matrix.0[a][p] += 1;
        }
    }

    let per_label = [0, 1].map(|i| label_scores(&matrix, i));
    let positive = per_label[0];
    Evaluation {
        confusion_matrix: matrix,
        accuracy: ratio(correct, total),
        precision: positive.precision,
        recall: positive.recall,
        f1: positive.f1,
        per_label,
        total,
    }
}

/// Evaluates a table by column name, as uploaded with `Actual` and
/// `Prediction` columns.
pub fn evaluate_table(
    headers: &[String],
    rows: &[Vec<String>],
    actual_col: &str,
    pred_col: &str,
    coding: Option<&LabelCoding>,
) -> Result<Evaluation, EvaluationError> {
    let position = |role: &'static str, column: &str| {
        headers
            .iter()
            .position(|h| h == column)
            .ok_or_else(|| EvaluationError::MissingColumn {
                role,
                column: column.to_string(),
            })
    };
    let actual = position("actual", actual_col)?;
    let predicted = position("prediction", pred_col)?;

    let pairs = rows.iter().map(|row| {
        (
            row.get(actual).map(String::as_str).unwrap_or(""),
            row.get(predicted).map(String::as_str).unwrap_or(""),
        )
    });
    Ok(evaluate(pairs, coding))
}

fn label_scores(matrix: &ConfusionMatrix, label: usize) -> LabelScores {
    let other = 1 - label;
    let tp = matrix.0[label][label];
    let fp = matrix.0[other][label];
    let fn_ = matrix.0[label][other];
    let precision = ratio(tp, tp + fp);
    let recall = ratio(tp, tp + fn_);
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };
    LabelScores {
        precision,
        recall,
        f1,
        support: tp + fn_,
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

impl fmt::Display for Evaluation {
    /// Classification report: one line per label, then accuracy.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:>14} {:>9} {:>9} {:>9} {:>9}", "", "precision", "recall", "f1-score", "support")?;
        writeln!(f)?;
        for (label, scores) in LABELS.iter().zip(self.per_label.iter()) {
            writeln!(
                f,
                "{:>14} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                label, scores.precision, scores.recall, scores.f1, scores.support
            )?;
        }
        writeln!(f)?;
        writeln!(f, "{:>14} {:>9} {:>9} {:>9.2} {:>9}", "accuracy", "", "", self.accuracy, self.total)?;
        let cm = &self.confusion_matrix.0;
        writeln!(f)?;
        writeln!(f, "confusion matrix (rows actual, columns predicted)")?;
        writeln!(f, "{:>14} {:>9} {:>12}", "", LABELS[0], LABELS[1])?;
        for (i, label) in LABELS.iter().enumerate() {
            writeln!(f, "{:>14} {:>9} {:>12}", label, cm[i][0], cm[i][1])?;
        }
        Ok(())
    }
}

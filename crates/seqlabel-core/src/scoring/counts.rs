use serde::{Deserialize, Serialize};

use crate::error::{Result, SeqLabelError};

/// Micro-averaged counts over every label strictly above the background.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositiveCounts {
    /// Positions where prediction and gold agree on a positive label.
    pub true_positives: u64,
    /// Positions predicted as a positive label.
    pub predicted: u64,
    /// Positions whose gold label is positive.
    pub gold: u64,
}

impl PositiveCounts {
    /// Adds one aligned run of predicted and gold labels. Only labels
    /// strictly above `background` count as positives.
    pub fn update(&mut self, predicted: &[u32], gold: &[u32], background: u32) -> Result<()> {
        if predicted.len() != gold.len() {
            return Err(SeqLabelError::LengthMismatch {
                what: "predicted vs gold labels",
                left: predicted.len(),
                right: gold.len(),
            });
        }
        for (&p, &g) in predicted.iter().zip(gold) {
            let p_positive = p > background;
            self.predicted += u64::from(p_positive);
            self.gold += u64::from(g > background);
            self.true_positives += u64::from(p_positive && p == g);
        }
        Ok(())
    }

    /// Fraction of positive predictions that are correct; `0.0` without any.
    pub fn precision(&self) -> f64 {
        ratio(self.true_positives, self.predicted)
    }

    /// Fraction of gold positives recovered; `0.0` without any.
    pub fn recall(&self) -> f64 {
        ratio(self.true_positives, self.gold)
    }

    /// `100 × 2PR / (P + R)`, or `0.0` when either side is zero.
    pub fn f_score(&self) -> f64 {
        let precision = self.precision();
        let recall = self.recall();
        if precision == 0.0 || recall == 0.0 {
            return 0.0;
        }
        100.0 * 2.0 * precision * recall / (precision + recall)
    }

    pub fn merge(&mut self, other: &PositiveCounts) {
        self.true_positives += other.true_positives;
        self.predicted += other.predicted;
        self.gold += other.gold;
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_counts_score_zero() {
        let counts = PositiveCounts::default();
        assert_eq!(counts.precision(), 0.0);
        assert_eq!(counts.recall(), 0.0);
        assert_eq!(counts.f_score(), 0.0);
    }

    #[test]
    fn background_and_lower_labels_are_ignored() {
        let mut counts = PositiveCounts::default();
        counts.update(&[0, 1, 4, 4], &[0, 2, 4, 3], 4).unwrap();
        assert_eq!(counts, PositiveCounts::default());
        assert_eq!(counts.f_score(), 0.0);
    }

    #[test]
    fn micro_averaged_scores() {
        let mut counts = PositiveCounts::default();
        // predicted positives: 5, 6, 7 (two correct); gold positives: 5, 6, 8, 9
        counts.update(&[5, 6, 7, 4], &[5, 6, 8, 9], 4).unwrap();
        assert_eq!(counts.true_positives, 2);
        assert_eq!(counts.predicted, 3);
        assert_eq!(counts.gold, 4);

        let p = 2.0 / 3.0;
        let r = 0.5;
        assert!((counts.precision() - p).abs() < 1e-12);
        assert!((counts.recall() - r).abs() < 1e-12);
        assert!((counts.f_score() - 100.0 * 2.0 * p * r / (p + r)).abs() < 1e-9);
    }

    #[test]
    fn predictions_without_gold_positives_score_zero() {
        let mut counts = PositiveCounts::default();
        counts.update(&[5, 6], &[4, 4], 4).unwrap();
        assert_eq!(counts.precision(), 0.0);
        assert_eq!(counts.recall(), 0.0);
        assert_eq!(counts.f_score(), 0.0);
    }

    #[test]
    fn merge_adds_counts() {
        let mut total = PositiveCounts {
            true_positives: 1,
            predicted: 2,
            gold: 3,
        };
        total.merge(&PositiveCounts {
            true_positives: 4,
            predicted: 5,
            gold: 6,
        });
        assert_eq!(total.predicted, 7);
    }

    #[test]
    fn update_rejects_length_mismatch() {
        let mut counts = PositiveCounts::default();
        assert!(matches!(
            counts.update(&[5], &[5, 6], 4),
            Err(SeqLabelError::LengthMismatch { left: 1, right: 2, .. })
        ));
    }
}

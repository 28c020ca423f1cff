//! Metrics Module for Segmentation Evaluation
//!
//! Pixel-level metrics for comparing predicted masks against ground truth:
//! - Pixel accuracy
//! - Per-class and mean intersection-over-union
//! - Confusion matrix (rows = actual class, columns = predicted class)

use serde::{Deserialize, Serialize};

use super::error::{Result, TiramisuError};

/// Pixel metrics for a batch of segmentation masks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentationMetrics {
    /// Pixels that took part in the evaluation (ignored pixels excluded)
    pub evaluated_pixels: usize,

    /// Correctly classified pixels / evaluated pixels
    pub pixel_accuracy: f64,

    /// IoU per class; `None` for classes absent from both prediction and target
    pub per_class_iou: Vec<Option<f64>>,

    /// Mean IoU over classes with a defined IoU
    pub mean_iou: f64,

    /// Pixel confusion matrix
    pub confusion_matrix: ConfusionMatrix,
}

impl SegmentationMetrics {
    /// Compute metrics from flattened predicted and target masks.
    ///
    /// Pixels whose target equals `ignore_index` (the void class in CamVid
    /// style datasets) are left out entirely. Any other label outside
    /// `0..num_classes` is an error.
    pub fn from_masks(
        predictions: &[usize],
        targets: &[usize],
        num_classes: usize,
        ignore_index: Option<usize>,
    ) -> Result<Self> {
        if predictions.len() != targets.len() {
            return Err(TiramisuError::InvalidInput(format!(
                "prediction mask has {} pixels but target mask has {}",
                predictions.len(),
                targets.len()
            )));
        }

        let mut confusion_matrix = ConfusionMatrix::new(num_classes);
        for (pixel, (&pred, &actual)) in predictions.iter().zip(targets.iter()).enumerate() {
            if Some(actual) == ignore_index {
                continue;
            }
            if actual >= num_classes || pred >= num_classes {
                return Err(TiramisuError::InvalidInput(format!(
                    "pixel {} has label {} (target) / {} (prediction), expected < {}",
                    pixel, actual, pred, num_classes
                )));
            }
            confusion_matrix.add(actual, pred);
        }

        let per_class_iou: Vec<Option<f64>> = (0..num_classes)
            .map(|class_idx| {
                if Some(class_idx) == ignore_index {
                    None
                } else {
                    confusion_matrix.iou(class_idx)
                }
            })
            .collect();

        let defined: Vec<f64> = per_class_iou.iter().flatten().copied().collect();
        let mean_iou = if defined.is_empty() {
            0.0
        } else {
            defined.iter().sum::<f64>() / defined.len() as f64
        };

        Ok(Self {
            evaluated_pixels: confusion_matrix.total(),
            pixel_accuracy: confusion_matrix.accuracy(),
            per_class_iou,
            mean_iou,
            confusion_matrix,
        })
    }
}

impl std::fmt::Display for SegmentationMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Pixels evaluated: {}", self.evaluated_pixels)?;
        writeln!(f, "Pixel accuracy:   {:6.2}%", self.pixel_accuracy * 100.0)?;
        writeln!(f, "Mean IoU:         {:6.2}%", self.mean_iou * 100.0)?;
        for (class_idx, iou) in self.per_class_iou.iter().enumerate() {
            match iou {
                Some(iou) => writeln!(f, "  class {:>3}: {:6.2}%", class_idx, iou * 100.0)?,
                None => writeln!(f, "  class {:>3}:      -", class_idx)?,
            }
        }
        Ok(())
    }
}

/// Confusion Matrix for multi-class pixel classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    /// Number of classes
    pub num_classes: usize,

    /// Matrix data (row = actual, column = predicted)
    /// Stored as a flat vector in row-major order
    pub matrix: Vec<usize>,
}

impl ConfusionMatrix {
    /// Create a new empty confusion matrix
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            matrix: vec![0; num_classes * num_classes],
        }
    }

    /// Add a single pixel to the matrix; out-of-range labels are dropped
    pub fn add(&mut self, actual: usize, predicted: usize) {
        if actual < self.num_classes && predicted < self.num_classes {
            let idx = actual * self.num_classes + predicted;
            self.matrix[idx] += 1;
        }
    }

    /// Get the count at (actual, predicted)
    pub fn get(&self, actual: usize, predicted: usize) -> usize {
        if actual < self.num_classes && predicted < self.num_classes {
            self.matrix[actual * self.num_classes + predicted]
        } else {
            0
        }
    }

    /// Get the total count
    pub fn total(&self) -> usize {
        self.matrix.iter().sum()
    }

    /// Get the number of correct predictions (diagonal sum)
    pub fn correct(&self) -> usize {
        (0..self.num_classes).map(|i| self.get(i, i)).sum()
    }

    /// Get overall accuracy
    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total > 0 {
            self.correct() as f64 / total as f64
        } else {
            0.0
        }
    }

    /// Intersection over union for one class.
    ///
    /// Returns `None` when the class appears in neither prediction nor target.
    pub fn iou(&self, class_idx: usize) -> Option<f64> {
        let true_positives = self.get(class_idx, class_idx);
        let false_positives: usize = (0..self.num_classes)
            .filter(|&i| i != class_idx)
            .map(|i| self.get(i, class_idx))
            .sum();
        let false_negatives: usize = (0..self.num_classes)
            .filter(|&i| i != class_idx)
            .map(|i| self.get(class_idx, i))
            .sum();

        let union = true_positives + false_positives + false_negatives;
        if union == 0 {
            None
        } else {
            Some(true_positives as f64 / union as f64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confusion_matrix() {
        let predictions = [0, 1, 2, 0, 1, 2, 0, 0, 2, 2];
        let targets = [0, 1, 2, 0, 2, 2, 1, 0, 1, 2];

        let mut cm = ConfusionMatrix::new(3);
        for (&p, &t) in predictions.iter().zip(targets.iter()) {
            cm.add(t, p);
        }

        assert_eq!(cm.get(0, 0), 3);
        assert_eq!(cm.get(1, 1), 1);
        assert_eq!(cm.get(2, 2), 3);
        assert_eq!(cm.total(), 10);
        assert_eq!(cm.correct(), 7);
        assert!((cm.accuracy() - 0.7).abs() < 0.001);
    }

    #[test]
    fn test_iou_per_class() {
        // class 0: TP=2, FP=1, FN=1 -> 2/4
        let predictions = [0, 0, 0, 1, 1];
        let targets = [0, 0, 1, 1, 0];

        let metrics = SegmentationMetrics::from_masks(&predictions, &targets, 2, None).unwrap();

        assert!((metrics.per_class_iou[0].unwrap() - 0.5).abs() < 1e-9);
        // class 1: TP=1, FP=1, FN=1 -> 1/3
        assert!((metrics.per_class_iou[1].unwrap() - 1.0 / 3.0).abs() < 1e-9);
        assert!((metrics.mean_iou - (0.5 + 1.0 / 3.0) / 2.0).abs() < 1e-9);
        assert!((metrics.pixel_accuracy - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_ignore_index_excludes_void_pixels() {
        let predictions = [0, 1, 1, 2];
        let targets = [0, 1, 2, 2];

        let metrics = SegmentationMetrics::from_masks(&predictions, &targets, 3, Some(2)).unwrap();

        assert_eq!(metrics.evaluated_pixels, 2);
        assert!((metrics.pixel_accuracy - 1.0).abs() < 1e-9);
        assert_eq!(metrics.per_class_iou[2], None);
        assert!((metrics.mean_iou - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_absent_class_has_no_iou() {
        let metrics = SegmentationMetrics::from_masks(&[0, 0], &[0, 0], 3, None).unwrap();
        assert_eq!(metrics.per_class_iou, vec![Some(1.0), None, None]);
        assert!((metrics.mean_iou - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_out_of_range_labels_are_rejected() {
        let result = SegmentationMetrics::from_masks(&[0, 1, 2, 0], &[0, 1, 2, 7], 3, None);
        assert!(matches!(result, Err(TiramisuError::InvalidInput(_))));

        let result = SegmentationMetrics::from_masks(&[0, 5], &[0, 1], 3, None);
        assert!(matches!(result, Err(TiramisuError::InvalidInput(_))));
    }

    #[test]
    fn test_ignored_pixels_skip_range_check() {
        // Void pixels may carry any prediction
        let metrics = SegmentationMetrics::from_masks(&[0, 9], &[0, 255], 3, Some(255)).unwrap();
        assert_eq!(metrics.evaluated_pixels, 1);
    }

    #[test]
    fn test_mask_length_mismatch() {
        let result = SegmentationMetrics::from_masks(&[0, 1], &[0], 2, None);
        assert!(matches!(result, Err(TiramisuError::InvalidInput(_))));
    }
}

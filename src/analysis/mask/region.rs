//! Centroid to anatomical region lookup over a 3x3 grid.

use serde::Serialize;

const LOWER_SPLIT: f64 = 0.4;
const UPPER_SPLIT: f64 = 0.6;

/// Named prostate region derived from a normalised centroid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AnatomicalRegion {
    LeftAnterior,
    LeftPeripheral,
    LeftPosterior,
    AnteriorTransition,
    Central,
    PosteriorTransition,
    RightAnterior,
    RightPeripheral,
    RightPosterior,
}

impl AnatomicalRegion {
    /// Map a centroid in `[0, 1] x [0, 1]` (x = left→right, y = anterior→posterior).
    ///
    /// Horizontal: `x < 0.4` left, `x > 0.6` right, otherwise centre.
    /// Vertical: `y < 0.4` anterior, `y < 0.6` middle, otherwise posterior.
    pub fn from_centroid(x: f64, y: f64) -> Self {
        use AnatomicalRegion::*;
        let row = if y < LOWER_SPLIT {
            0
        } else if y < UPPER_SPLIT {
            1
        } else {
            2
        };
        if x < LOWER_SPLIT {
            [LeftAnterior, LeftPeripheral, LeftPosterior][row]
        } else if x > UPPER_SPLIT {
            [RightAnterior, RightPeripheral, RightPosterior][row]
        } else {
            [AnteriorTransition, Central, PosteriorTransition][row]
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AnatomicalRegion::LeftAnterior => "Left anterior region",
            AnatomicalRegion::LeftPeripheral => "Left peripheral region",
            AnatomicalRegion::LeftPosterior => "Left posterior region",
            AnatomicalRegion::AnteriorTransition => "Anterior transition zone",
            AnatomicalRegion::Central => "Central zone",
            AnatomicalRegion::PosteriorTransition => "Posterior transition zone",
            AnatomicalRegion::RightAnterior => "Right anterior region",
            AnatomicalRegion::RightPeripheral => "Right peripheral region",
            AnatomicalRegion::RightPosterior => "Right posterior region",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_corners_and_centre() {
        assert_eq!(AnatomicalRegion::from_centroid(0.1, 0.1), AnatomicalRegion::LeftAnterior);
        assert_eq!(AnatomicalRegion::from_centroid(0.9, 0.9), AnatomicalRegion::RightPosterior);
        assert_eq!(AnatomicalRegion::from_centroid(0.5, 0.5), AnatomicalRegion::Central);
        assert_eq!(AnatomicalRegion::from_centroid(0.9, 0.5), AnatomicalRegion::RightPeripheral);
        assert_eq!(AnatomicalRegion::from_centroid(0.5, 0.1), AnatomicalRegion::AnteriorTransition);
    }

    #[test]
    fn horizontal_splits_are_inclusive_of_the_centre() {
        assert_eq!(AnatomicalRegion::from_centroid(0.4, 0.5), AnatomicalRegion::Central);
        assert_eq!(AnatomicalRegion::from_centroid(0.6, 0.5), AnatomicalRegion::Central);
        assert_eq!(AnatomicalRegion::from_centroid(0.39, 0.5), AnatomicalRegion::LeftPeripheral);
    }

    #[test]
    fn vertical_upper_split_belongs_to_posterior() {
        assert_eq!(AnatomicalRegion::from_centroid(0.5, 0.4), AnatomicalRegion::Central);
        assert_eq!(
            AnatomicalRegion::from_centroid(0.5, 0.6),
            AnatomicalRegion::PosteriorTransition
        );
    }

    #[test]
    fn labels_are_unique() {
        use std::collections::HashSet;
        let labels: HashSet<_> = [
            (0.1, 0.1),
            (0.1, 0.5),
            (0.1, 0.9),
            (0.5, 0.1),
            (0.5, 0.5),
            (0.5, 0.9),
            (0.9, 0.1),
            (0.9, 0.5),
            (0.9, 0.9),
        ]
        .into_iter()
        .map(|(x, y)| AnatomicalRegion::from_centroid(x, y).label())
        .collect();
        assert_eq!(labels.len(), 9);
    }
}

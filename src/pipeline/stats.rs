//! Class-wide grade statistics behind every stamp.

use serde::{Deserialize, Serialize};

/// Grade threshold separating the colour classes.
pub const CLASS_THRESHOLD: f64 = 4.0;

/// Whisker reach in multiples of the interquartile range.
const WHISKER_IQR: f64 = 1.5;

/// Background class of a stamp, decided once per batch from the quartiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Classification {
    /// `Q1 > 4`: green.
    Favorable,
    /// `Q3 < 4`: red.
    Unfavorable,
    /// Neither: orange.
    Mixed,
}

impl Classification {
    pub fn from_quartiles(q1: f64, q3: f64) -> Self {
        if q1 > CLASS_THRESHOLD {
            Classification::Favorable
        } else if q3 < CLASS_THRESHOLD {
            Classification::Unfavorable
        } else {
            Classification::Mixed
        }
    }

    /// Fill colour as RGB.
    pub fn rgb(&self) -> [u8; 3] {
        match self {
            Classification::Favorable => [0, 128, 0],
            Classification::Unfavorable => [255, 0, 0],
            Classification::Mixed => [255, 165, 0],
        }
    }
}

/// Linear-interpolated quantile of an ascending slice, `q` in `[0, 1]`.
///
/// Returns `None` for an empty slice.
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    let pos = (n - 1) as f64 * q.clamp(0.0, 1.0);
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Five-number summary plus outliers, as drawn by the box plot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxSummary {
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    /// Smallest grade within `Q1 - 1.5·IQR`.
    pub whisker_low: f64,
    /// Largest grade within `Q3 + 1.5·IQR`.
    pub whisker_high: f64,
    /// Grades beyond the whiskers.
    pub outliers: Vec<f64>,
    pub min: f64,
    pub max: f64,
}

impl BoxSummary {
    /// Summarise a class's grades. Non-finite values are ignored; `None`
    /// when nothing is left.
    pub fn from_grades(grades: &[f64]) -> Option<Self> {
        let mut sorted: Vec<f64> = grades.iter().copied().filter(|g| g.is_finite()).collect();
        sorted.sort_by(f64::total_cmp);

        let q1 = quantile(&sorted, 0.25)?;
        let median = quantile(&sorted, 0.5)?;
        let q3 = quantile(&sorted, 0.75)?;
        let iqr = q3 - q1;
        let low_fence = q1 - WHISKER_IQR * iqr;
        let high_fence = q3 + WHISKER_IQR * iqr;

        let whisker_low = sorted
            .iter()
            .copied()
            .find(|&g| g >= low_fence)
            .unwrap_or(q1);
        let whisker_high = sorted
            .iter()
            .rev()
            .copied()
            .find(|&g| g <= high_fence)
            .unwrap_or(q3);
        let outliers = sorted
            .iter()
            .copied()
            .filter(|&g| g < whisker_low || g > whisker_high)
            .collect();

        Some(Self {
            q1,
            median,
            q3,
            whisker_low,
            whisker_high,
            outliers,
            min: sorted[0],
            max: sorted[sorted.len() - 1],
        })
    }

    pub fn classification(&self) -> Classification {
        Classification::from_quartiles(self.q1, self.q3)
    }
}

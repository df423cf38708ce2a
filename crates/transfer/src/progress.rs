//! Progress math.
//!
//! While chunks are still being confirmed the percentage is capped at 99 so
//! callers never see 100 before the server reports completion.

/// Highest percentage reported before completion.
const IN_FLIGHT_CAP: u8 = 99;

/// One progress report for a single upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadProgress {
    pub uploaded_bytes: u64,
    pub total_bytes: u64,
    pub percent: u8,
}

impl UploadProgress {
    /// Progress for `confirmed` of `total` bytes while the upload is running.
    pub fn in_flight(confirmed: u64, total: u64) -> Self {
        Self {
            uploaded_bytes: confirmed.min(total),
            total_bytes: total,
            percent: percent_in_flight(confirmed, total),
        }
    }

    /// Final progress once the server has confirmed completion.
    pub fn complete(total: u64) -> Self {
        Self {
            uploaded_bytes: total,
            total_bytes: total,
            percent: 100,
        }
    }
}

/// `round(confirmed / total * 100)`, clamped to `[0, 99]`.
///
/// An empty payload reports 0 until completion.
pub fn percent_in_flight(confirmed: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let ratio = confirmed.min(total) as f64 / total as f64;
    let pct = (ratio * 100.0).round() as u8;
    pct.min(IN_FLIGHT_CAP)
}

/// Rounded mean of per-file percentages (0 for an empty list).
pub fn overall_percent(percents: &[u8]) -> u8 {
    if percents.is_empty() {
        return 0;
    }
    let sum: u64 = percents.iter().map(|&p| u64::from(p)).sum();
    (sum as f64 / percents.len() as f64).round() as u8
}

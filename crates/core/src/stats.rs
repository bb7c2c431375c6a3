//! Aggregate run statistics and the derived values shown to observers.

use serde::{Deserialize, Serialize};

/// Running totals for the current run.
///
/// Owned and mutated only by the result aggregator; everyone else receives
/// copies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Sum of the sizes of every input admitted to this run.
    pub total_input_bytes_seen: u64,
    /// Sum of original sizes of successfully converted inputs.
    pub total_original_bytes_completed: u64,
    /// Sum of output sizes of successfully converted inputs.
    pub total_output_bytes_completed: u64,
    /// Inputs admitted to this run, including those not yet materialised.
    pub expected_file_count: u64,
    /// Inputs materialised as tasks.
    pub target_file_count: u64,
    /// Successful conversions.
    pub completed_count: u64,
    /// Failed conversions.
    pub error_count: u64,
    pub queue_depth: u64,
    pub in_flight_count: u64,
    /// Highest queue depth observed during this run.
    pub peak_queue_depth: u64,
}

impl RunStats {
    /// Tasks that reached a terminal outcome.
    pub fn settled_count(&self) -> u64 {
        self.completed_count + self.error_count
    }

    /// Bytes saved so far; negative when outputs are larger.
    pub fn saved_bytes(&self) -> i64 {
        self.total_original_bytes_completed as i64 - self.total_output_bytes_completed as i64
    }

    /// Rounded percentage saved relative to the completed originals.
    pub fn saved_percent(&self) -> i64 {
        saved_percent(
            self.total_original_bytes_completed,
            self.total_output_bytes_completed,
        )
    }

    /// `completed + errors + in_flight + queue_depth == target`.
    pub fn is_conserved(&self) -> bool {
        self.settled_count() + self.in_flight_count + self.queue_depth == self.target_file_count
    }

    /// Every admitted input has settled.
    pub fn is_done(&self) -> bool {
        self.expected_file_count > 0 && self.settled_count() == self.expected_file_count
    }

    /// Completion ratio in `0.0..=1.0` against the expected count.
    pub fn progress_ratio(&self) -> f64 {
        if self.expected_file_count == 0 {
            return 0.0;
        }
        (self.settled_count() as f64 / self.expected_file_count as f64).clamp(0.0, 1.0)
    }

    /// Record the current queue depth, tracking the peak.
    pub fn observe_queue_depth(&mut self, depth: usize) {
        let depth = depth as u64;
        self.queue_depth = depth;
        self.peak_queue_depth = self.peak_queue_depth.max(depth);
    }
}

/// Rounded percentage of `original` saved by shrinking it to `output`.
///
/// Returns 0 when `original` is 0; negative when the output grew.
pub fn saved_percent(original: u64, output: u64) -> i64 {
    if original == 0 {
        return 0;
    }
    let saved = original as f64 - output as f64;
    (saved / original as f64 * 100.0).round() as i64
}

// ---------------------------------------------------------------------------
// Size formatting
// ---------------------------------------------------------------------------

const SIZE_UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Human-readable byte count with base 1024 and at most one decimal.
///
/// Negative values keep their sign (`"-12 KB"`), which is how session diffs
/// are rendered.
pub fn format_size(bytes: i64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }
    let sign = if bytes < 0 { "-" } else { "" };
    let mut value = bytes.unsigned_abs() as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = (value * 10.0).round() / 10.0;
    if rounded.fract() == 0.0 {
        format!("{sign}{} {}", rounded as u64, SIZE_UNITS[unit])
    } else {
        format!("{sign}{rounded:.1} {}", SIZE_UNITS[unit])
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_values_from_totals() {
        let stats = RunStats {
            total_original_bytes_completed: 150,
            total_output_bytes_completed: 50,
            completed_count: 2,
            error_count: 1,
            target_file_count: 3,
            expected_file_count: 3,
            ..Default::default()
        };
        assert_eq!(stats.settled_count(), 3);
        assert_eq!(stats.saved_bytes(), 100);
        assert_eq!(stats.saved_percent(), 67);
        assert!(stats.is_conserved());
        assert!(stats.is_done());
        assert!((stats.progress_ratio() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn conservation_counts_queue_and_in_flight() {
        let stats = RunStats {
            target_file_count: 10,
            completed_count: 3,
            error_count: 1,
            in_flight_count: 2,
            queue_depth: 4,
            ..Default::default()
        };
        assert!(stats.is_conserved());
        assert!(!RunStats { queue_depth: 3, ..stats }.is_conserved());
    }

    #[test]
    fn empty_run_is_not_done() {
        let stats = RunStats::default();
        assert!(!stats.is_done());
        assert_eq!(stats.progress_ratio(), 0.0);
        assert_eq!(stats.saved_percent(), 0);
    }

    #[test]
    fn peak_queue_depth_is_monotonic() {
        let mut stats = RunStats::default();
        stats.observe_queue_depth(5);
        stats.observe_queue_depth(2);
        assert_eq!(stats.queue_depth, 2);
        assert_eq!(stats.peak_queue_depth, 5);
    }

    #[test]
    fn saved_percent_handles_growth() {
        assert_eq!(saved_percent(100, 40), 60);
        assert_eq!(saved_percent(100, 130), -30);
        assert_eq!(saved_percent(0, 10), 0);
    }

    // -- format_size ---------------------------------------------------------

    #[test]
    fn formats_sizes_with_units() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1024), "1 KB");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5 MB");
    }

    #[test]
    fn formats_negative_sizes() {
        assert_eq!(format_size(-12 * 1024), "-12 KB");
        assert_eq!(format_size(-20), "-20 B");
    }

    #[test]
    fn clamps_to_largest_unit() {
        let huge = 3 * 1024_i64.pow(5);
        assert_eq!(format_size(huge), "3072 TB");
    }
}

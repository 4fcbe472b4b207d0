//! Progress counters of a bootstrap session.

/// Snapshot of what a bootstrap session has seen so far.
///
/// Updated after every consumed frame; readable at any time through
/// [`Bootstrapper::report`](super::Bootstrapper::report).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BootstrapReport {
    pub frames_consumed: usize,
    /// Frames that could not be related to the reference frame.
    pub tracking_losses: usize,
    pub consecutive_lost: usize,
    /// Reference frame switches, including the first one.
    pub reference_resets: usize,
    pub last_num_matches: usize,
    pub last_num_inliers: usize,
    /// Median parallax of the last triangulation, in degrees.
    pub last_parallax_deg: f64,
    pub last_triangulated: usize,
}

impl BootstrapReport {
    pub(crate) fn record_lost(&mut self) {
        self.tracking_losses += 1;
        self.consecutive_lost += 1;
    }
}

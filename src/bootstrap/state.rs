//! Bootstrap phase machine.
//!
//! ```text
//! Uninitialized --set_camera_parameters--> CalibrationSet
//! CalibrationSet --set_camera_parameters--> CalibrationSet
//! CalibrationSet --run--> Accumulating
//! Accumulating --ready--> Succeeded
//! Accumulating --exhausted / lost--> Failed
//! ```

use std::sync::atomic::{AtomicU8, Ordering};

/// Phase of a bootstrap session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BootstrapPhase {
    /// No calibration has been provided yet.
    #[default]
    Uninitialized,
    /// Calibration is set; `run()` may be called.
    CalibrationSet,
    /// `run()` is consuming frames.
    Accumulating,
    /// A map was produced.
    Succeeded,
    /// The session ended without a map. Terminal.
    Failed,
}

impl BootstrapPhase {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Uninitialized,
            1 => Self::CalibrationSet,
            2 => Self::Accumulating,
            3 => Self::Succeeded,
            _ => Self::Failed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Uninitialized => 0,
            Self::CalibrationSet => 1,
            Self::Accumulating => 2,
            Self::Succeeded => 3,
            Self::Failed => 4,
        }
    }

    /// Succeeded and Failed never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Phase cell that can be read without taking the session lock.
#[derive(Debug, Default)]
pub(crate) struct AtomicPhase(AtomicU8);

impl AtomicPhase {
    pub(crate) fn load(&self) -> BootstrapPhase {
        BootstrapPhase::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn store(&self, phase: BootstrapPhase) {
        self.0.store(phase.as_u8(), Ordering::Release);
    }

    /// Move `from -> to` atomically. Returns the phase observed on failure.
    pub(crate) fn transition(
        &self,
        from: BootstrapPhase,
        to: BootstrapPhase,
    ) -> Result<(), BootstrapPhase> {
        self.0
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(BootstrapPhase::from_u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_uninitialized() {
        assert_eq!(AtomicPhase::default().load(), BootstrapPhase::Uninitialized);
    }

    #[test]
    fn test_transition_requires_expected_phase() {
        let phase = AtomicPhase::default();
        assert_eq!(
            phase.transition(BootstrapPhase::CalibrationSet, BootstrapPhase::Accumulating),
            Err(BootstrapPhase::Uninitialized)
        );

        phase
            .transition(BootstrapPhase::Uninitialized, BootstrapPhase::CalibrationSet)
            .unwrap();
        phase
            .transition(BootstrapPhase::CalibrationSet, BootstrapPhase::Accumulating)
            .unwrap();
        assert_eq!(phase.load(), BootstrapPhase::Accumulating);
    }

    #[test]
    fn test_terminal_phases() {
        for p in [
            BootstrapPhase::Uninitialized,
            BootstrapPhase::CalibrationSet,
            BootstrapPhase::Accumulating,
        ] {
            assert!(!p.is_terminal());
        }
        assert!(BootstrapPhase::Succeeded.is_terminal());
        assert!(BootstrapPhase::Failed.is_terminal());
    }
}

//! Visibility policy.
//!
//! Decides whether the host should run attended (a client is showing samples
//! itself, no indicator) or unattended (nobody is watching, so the controller
//! must self-report through the persistent indicator while reporting is active).
//!
//! The policy is pure bookkeeping. It returns a [`Transition`] and the
//! controller performs the side effects.

use crate::error::ControlError;

/// Whether location reporting was requested. Persisted across restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, uniffi::Enum)]
pub enum ReportingState {
    #[default]
    Inactive,
    Active,
}

impl ReportingState {
    pub fn from_flag(active: bool) -> Self {
        if active { Self::Active } else { Self::Inactive }
    }

    pub fn is_active(self) -> bool {
        self == Self::Active
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, uniffi::Enum)]
pub enum Visibility {
    /// No client attached, the host shows an indicator while reporting.
    #[default]
    Unattended,
    /// At least one client is displaying samples, the indicator is suppressed.
    Attended,
}

/// Side effect requested by a policy transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    None,
    /// Cancel the indicator and leave the foreground.
    Attend,
    /// Show the indicator and enter the foreground.
    Unattend,
}

#[derive(Debug, Default)]
pub struct VisibilityPolicy {
    visibility: Visibility,
    attachments: u32,
    reconfiguring: bool,
}

impl VisibilityPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn attachments(&self) -> u32 {
        self.attachments
    }

    pub fn is_reconfiguring(&self) -> bool {
        self.reconfiguring
    }

    pub fn attach(&mut self) -> Transition {
        let previous = self.attachments;
        self.attachments += 1;

        if previous == 0 {
            self.reconfiguring = false;
            self.visibility = Visibility::Attended;
            Transition::Attend
        } else {
            Transition::None
        }
    }

    pub fn detach(&mut self, reporting: ReportingState) -> Result<Transition, ControlError> {
        if self.attachments == 0 {
            return Err(ControlError::Precondition(
                "detach called with no attachments".to_string(),
            ));
        }
        self.attachments -= 1;

        // a reconfiguring host stays attended until it attaches again
        if self.attachments > 0 || self.reconfiguring {
            return Ok(Transition::None);
        }

        self.visibility = Visibility::Unattended;
        if reporting.is_active() {
            Ok(Transition::Unattend)
        } else {
            Ok(Transition::None)
        }
    }

    /// The host is being torn down and will attach again right away.
    pub fn mark_reconfiguring(&mut self) {
        self.reconfiguring = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng, rngs::StdRng};

    #[test]
    fn starts_unattended() {
        let policy = VisibilityPolicy::new();
        assert_eq!(policy.visibility(), Visibility::Unattended);
        assert_eq!(policy.attachments(), 0);
        assert!(!policy.is_reconfiguring());
    }

    #[test]
    fn first_attach_attends() {
        let mut policy = VisibilityPolicy::new();
        assert_eq!(policy.attach(), Transition::Attend);
        assert_eq!(policy.attach(), Transition::None);
        assert_eq!(policy.visibility(), Visibility::Attended);
        assert_eq!(policy.attachments(), 2);
    }

    #[test]
    fn last_detach_while_active_unattends() {
        let mut policy = VisibilityPolicy::new();
        policy.attach();
        policy.attach();

        assert_eq!(
            policy.detach(ReportingState::Active).unwrap(),
            Transition::None
        );
        assert_eq!(
            policy.detach(ReportingState::Active).unwrap(),
            Transition::Unattend
        );
        assert_eq!(policy.visibility(), Visibility::Unattended);
    }

    #[test]
    fn last_detach_while_inactive_unattends_without_side_effects() {
        let mut policy = VisibilityPolicy::new();
        policy.attach();
        assert_eq!(
            policy.detach(ReportingState::Inactive).unwrap(),
            Transition::None
        );
        assert_eq!(policy.attachments(), 0);
        assert_eq!(policy.visibility(), Visibility::Unattended);
    }

    #[test]
    fn reconfiguring_suppresses_unattend_until_next_attach() {
        let mut policy = VisibilityPolicy::new();
        policy.attach();
        policy.mark_reconfiguring();
        assert_eq!(policy.visibility(), Visibility::Attended);

        assert_eq!(
            policy.detach(ReportingState::Active).unwrap(),
            Transition::None
        );
        assert!(policy.is_reconfiguring());

        assert_eq!(policy.attach(), Transition::Attend);
        assert!(!policy.is_reconfiguring());

        // a genuine departure now unattends again
        assert_eq!(
            policy.detach(ReportingState::Active).unwrap(),
            Transition::Unattend
        );
    }

    #[test]
    fn detach_past_zero_is_precondition_error() {
        let mut policy = VisibilityPolicy::new();
        let err = policy.detach(ReportingState::Active).unwrap_err();
        assert!(matches!(err, ControlError::Precondition(_)));
        assert_eq!(policy.attachments(), 0);
    }

    #[test]
    fn count_tracks_attaches_minus_detaches() {
        let mut rng = StdRng::seed_from_u64(0x10ca7e);

        for _ in 0..50 {
            let mut policy = VisibilityPolicy::new();
            let mut expected: i64 = 0;

            for _ in 0..200 {
                if rng.gen_bool(0.5) {
                    policy.attach();
                    expected += 1;
                } else {
                    let res = policy.detach(ReportingState::Active);
                    if expected == 0 {
                        assert!(matches!(res, Err(ControlError::Precondition(_))));
                    } else {
                        assert!(res.is_ok());
                        expected -= 1;
                    }
                }

                assert_eq!(policy.attachments() as i64, expected);
                let attended = policy.visibility() == Visibility::Attended;
                assert_eq!(attended, expected > 0);
            }
        }
    }
}

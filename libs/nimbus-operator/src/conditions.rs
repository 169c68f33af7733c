//! The shared "read/write the status conditions vec" seam every unit kind's status implements
//! (§4.8, §4.11), so the reconciler's condition logic is written once against all three unit
//! kinds instead of three times. Grounded on `stackabletech-operator-rs`'s `status.rs`
//! `Conditions` trait; uses `k8s_openapi`'s own `Condition` rather than a hand-rolled struct, as
//! the corpus does in `kaniop`'s CRDs.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};

/// The one condition type this operator ever writes (§6, §8). Per-unit-kind status types may
/// carry others in the future, but the reconciler only ever touches this one.
pub const AVAILABLE: &str = "Available";

pub const REASON_PROVISIONING: &str = "Provisioning";
pub const REASON_PROVISIONED: &str = "Provisioned";
pub const REASON_CANCELLED: &str = "Cancelled";
pub const REASON_TIMED_OUT: &str = "TimedOut";
pub const REASON_ERRORED: &str = "Errored";

/// Implemented by each unit kind's status type so reconciler code can read/write conditions
/// without matching on the unit kind.
pub trait Conditions {
    fn conditions(&self) -> &[Condition];
    fn conditions_mut(&mut self) -> &mut Vec<Condition>;
}

fn status_string(status: bool) -> String {
    if status { "True" } else { "False" }.to_string()
}

/// Reports the status of `condition_type`, if present.
pub fn get<C: Conditions>(target: &C, condition_type: &str) -> Option<&Condition> {
    target
        .conditions()
        .iter()
        .find(|c| c.type_ == condition_type)
}

pub fn is_true<C: Conditions>(target: &C, condition_type: &str) -> bool {
    get(target, condition_type).is_some_and(|c| c.status == "True")
}

/// Sets (or inserts) `condition_type`. Write-only per §4.8: if the condition is already present
/// with the same status/reason/message, this is a no-op (no `last_transition_time` bump) and
/// returns `false`; otherwise it writes through and returns `true`.
pub fn set<C: Conditions>(
    target: &mut C,
    condition_type: &str,
    status: bool,
    reason: &str,
    message: impl Into<String>,
    observed_generation: Option<i64>,
) -> bool {
    let status = status_string(status);
    let message = message.into();
    let conditions = target.conditions_mut();

    if let Some(existing) = conditions.iter_mut().find(|c| c.type_ == condition_type) {
        if existing.status == status && existing.reason == reason && existing.message == message {
            return false;
        }
        existing.status = status;
        existing.reason = reason.to_string();
        existing.message = message;
        existing.observed_generation = observed_generation;
        existing.last_transition_time = Time(chrono::Utc::now());
        return true;
    }

    conditions.push(Condition {
        type_: condition_type.to_string(),
        status,
        reason: reason.to_string(),
        message,
        observed_generation,
        last_transition_time: Time(chrono::Utc::now()),
    });
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct FakeStatus {
        conditions: Vec<Condition>,
    }

    impl Conditions for FakeStatus {
        fn conditions(&self) -> &[Condition] {
            &self.conditions
        }
        fn conditions_mut(&mut self) -> &mut Vec<Condition> {
            &mut self.conditions
        }
    }

    #[test]
    fn set_inserts_then_skips_identical_write() {
        let mut status = FakeStatus::default();
        assert!(set(&mut status, AVAILABLE, false, REASON_PROVISIONING, "starting", Some(1)));
        let first_transition = get(&status, AVAILABLE).unwrap().last_transition_time.clone();

        assert!(!set(&mut status, AVAILABLE, false, REASON_PROVISIONING, "starting", Some(1)));
        assert_eq!(
            get(&status, AVAILABLE).unwrap().last_transition_time,
            first_transition
        );
    }

    #[test]
    fn set_updates_on_change_and_bumps_transition_time() {
        let mut status = FakeStatus::default();
        set(&mut status, AVAILABLE, false, REASON_PROVISIONING, "starting", Some(1));
        assert!(set(&mut status, AVAILABLE, true, REASON_PROVISIONED, "done", Some(2)));
        assert!(is_true(&status, AVAILABLE));
        assert_eq!(get(&status, AVAILABLE).unwrap().reason, REASON_PROVISIONED);
    }

    #[test]
    fn get_is_none_for_missing_condition() {
        let status = FakeStatus::default();
        assert!(get(&status, AVAILABLE).is_none());
        assert!(!is_true(&status, AVAILABLE));
    }
}

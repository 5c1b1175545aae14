use crate::core::sync::{JobStatus, can_transition};

#[test]
fn in_progress_settles_to_either_terminal_status() {
    assert!(can_transition(JobStatus::InProgress, JobStatus::Completed));
    assert!(can_transition(JobStatus::InProgress, JobStatus::Failed));
}

#[test]
fn terminal_statuses_never_transition_again() {
    for from in [JobStatus::Completed, JobStatus::Failed] {
        for to in [JobStatus::InProgress, JobStatus::Completed, JobStatus::Failed] {
            assert!(
                !can_transition(from, to),
                "expected {:?} -> {:?} to be rejected",
                from,
                to
            );
        }
    }
}

#[test]
fn in_progress_does_not_reenter_itself() {
    assert!(!can_transition(JobStatus::InProgress, JobStatus::InProgress));
}

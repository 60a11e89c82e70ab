//! Pure lifecycle policy: when to extend and what to do on termination.

/// Outcome chosen for a job that reached a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationDecision {
    /// Stopped by the user: report terminated, never redeploy.
    UserStopped,
    /// Ended too early: report failed, never redeploy.
    Flapping,
    /// Ran long enough: post a replacement.
    Redeploy,
    /// Ran long enough but nothing to redeploy from: report terminated.
    Release,
}

/// Decide what follows a termination.
pub fn decide_termination(
    user_stopped: bool,
    runtime_secs: i64,
    redeployable: bool,
    min_runtime_for_redeploy_secs: u64,
) -> TerminationDecision {
    if user_stopped {
        return TerminationDecision::UserStopped;
    }
    let min_runtime = i64::try_from(min_runtime_for_redeploy_secs).unwrap_or(i64::MAX);
    if runtime_secs < min_runtime {
        return TerminationDecision::Flapping;
    }
    if redeployable {
        TerminationDecision::Redeploy
    } else {
        TerminationDecision::Release
    }
}

/// Extend when the lease is known, still positive, and at or below the threshold.
pub fn should_extend(remaining_secs: Option<i64>, threshold_secs: u64) -> bool {
    let threshold = i64::try_from(threshold_secs).unwrap_or(i64::MAX);
    remaining_secs.is_some_and(|remaining| remaining > 0 && remaining <= threshold)
}

//! Interrupt gate

use super::error::ProbeError;
use super::outcome::Outcome;
use super::severity::Severity;

/// CRITICAL always interrupts; ERROR interrupts when `interrupt_on_error`
/// is set.
pub fn should_interrupt(outcome: &Outcome, interrupt_on_error: bool) -> bool {
    outcome.severity >= Severity::Critical
        || (outcome.severity >= Severity::Error && interrupt_on_error)
}

/// Turn an interrupting outcome into [`ProbeError::Interrupted`]
pub fn check(outcome: Outcome, interrupt_on_error: bool) -> Result<Outcome, ProbeError> {
    if !should_interrupt(&outcome, interrupt_on_error) {
        return Ok(outcome);
    }

    let reason = if outcome.severity >= Severity::Critical {
        format!("critical alert, pipeline interrupted: {}", outcome.name)
    } else {
        format!("error alert, pipeline interrupted: {}", outcome.name)
    };
    tracing::warn!(alert = %outcome.name, severity = %outcome.severity, "{}", reason);

    Err(ProbeError::Interrupted {
        reason,
        outcome: Box::new(outcome),
    })
}

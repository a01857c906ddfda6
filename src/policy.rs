//! Per-route authentication enforcement policy.
//!
//! The policy is a per-route immutable value attached to the pipeline
//! when it is composed — never a process-wide toggle shared across
//! registrations. One route's registration cannot mutate another's
//! posture, and the security stance of the whole table is auditable by
//! reading the registrations.

use crate::context::Capability;

/// What a route demands of the authentication stages.
///
/// Fixed at registration time; never changes while a request is in flight.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Policy {
    /// No provider required. Unauthenticated access permitted; the
    /// authentication stages are typically absent from the chain entirely.
    Open,
    /// Provider resolution is attempted and the outcome is recorded, but
    /// absence is tolerated — the terminal handler decides what a missing
    /// session means.
    SoftAuth,
    /// Provider and authenticated session are mandatory. Absence is
    /// terminal: the request is rejected before the terminal handler runs.
    Enforced,
}

impl Policy {
    /// Whether a missing or invalid session must terminate the request.
    pub fn requires_session(self) -> bool {
        matches!(self, Self::Enforced)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open     => "open",
            Self::SoftAuth => "soft-auth",
            Self::Enforced => "enforced",
        }
    }
}

impl std::fmt::Display for Policy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The pipeline seeds its route's policy into the request context before
/// the first stage runs, so shared stage instances can serve routes with
/// different postures.
impl Capability for Policy {
    const NAME: &'static str = "policy";
}

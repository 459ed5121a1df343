/// Substrings that mark an upstream failure as a rate/quota problem.
const RATE_LIMIT_MARKERS: &[&str] = &["rate", "limit", "quota", "429"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The credential hit a rate or quota wall and should cool down.
    RateLimited,
    /// Anything else; credential health is unaffected.
    Upstream,
}

/// Classifies an upstream failure from its HTTP-equivalent status and
/// error message. Classification happens exactly once, at the
/// orchestrator boundary.
pub fn classify_failure(status: Option<u16>, message: &str) -> FailureKind {
    if status == Some(429) {
        return FailureKind::RateLimited;
    }
    let lower = message.to_ascii_lowercase();
    if RATE_LIMIT_MARKERS.iter().any(|marker| lower.contains(marker)) {
        FailureKind::RateLimited
    } else {
        FailureKind::Upstream
    }
}

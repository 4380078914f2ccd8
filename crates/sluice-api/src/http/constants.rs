//! Shared HTTP constants (problem URIs, header names).

pub(crate) const HEADER_REQUEST_ID: &str = "x-request-id";

pub(crate) const PROBLEM_INTERNAL: &str = "https://sluice.dev/problems/internal";
pub(crate) const PROBLEM_BAD_REQUEST: &str = "https://sluice.dev/problems/bad-request";
pub(crate) const PROBLEM_SERVICE_UNAVAILABLE: &str =
    "https://sluice.dev/problems/service-unavailable";
pub(crate) const PROBLEM_ENGINE_UNAVAILABLE: &str =
    "https://sluice.dev/problems/engine-unavailable";

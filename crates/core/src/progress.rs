//! Progress milestones reported while a task is dispatched.
//!
//! The backend exposes no intermediate progress, so the poll phase
//! advances linearly with the attempt count.

pub const PROGRESS_PREPARING: f64 = 5.0;
pub const PROGRESS_UPLOADING: f64 = 10.0;
pub const PROGRESS_BUILDING: f64 = 15.0;
pub const PROGRESS_SUBMITTING: f64 = 25.0;
pub const PROGRESS_POLL_START: f64 = 35.0;
pub const PROGRESS_POLL_SPAN: f64 = 55.0;
pub const PROGRESS_FETCHING: f64 = 90.0;

/// Progress for poll attempt `attempt` (0-based) out of `max_attempts`.
///
/// Runs from 35 at the first attempt towards 90 at the last.
pub fn poll_progress(attempt: u32, max_attempts: u32) -> f64 {
    if max_attempts == 0 {
        return PROGRESS_POLL_START;
    }
    let fraction = (attempt.min(max_attempts) as f64) / (max_attempts as f64);
    PROGRESS_POLL_START + fraction * PROGRESS_POLL_SPAN
}

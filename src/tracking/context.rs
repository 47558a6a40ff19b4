//! Persistent tracker state carried between frames.

use crate::geometry::SE3;
use crate::tracking::TrackingState;

/// Everything the tracker remembers from one frame to the next.
#[derive(Debug, Clone, Default)]
pub struct TrackingContext {
    pub state: TrackingState,
    /// Current camera-to-world pose hypothesis, if any.
    pub pose: Option<SE3>,
    /// Consecutive steady-state PnP failures.
    pub pnp_retries: u32,
    /// Consecutive initialization failures.
    pub localize_retries: u32,
}

impl TrackingContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops everything and returns to global initialization.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_uninitialized() {
        let ctx = TrackingContext::new();
        assert_eq!(ctx.state, TrackingState::Init);
        assert!(ctx.pose.is_none());
        assert_eq!(ctx.pnp_retries, 0);
        assert_eq!(ctx.localize_retries, 0);
    }
}

//! Tracking state machine.

/// Phase of the pose tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingState {
    /// No pose hypothesis at all; global initialization from scratch.
    Init,
    /// Lost but holding a stale pose; initialization biased by it.
    LocalInit,
    /// Fresh initialization pose being verified with a first PnP pass.
    InitPnp,
    /// Steady-state frame-to-frame PnP refinement.
    Pnp,
    /// Fine alignment against model edges after PnP has converged.
    Edges,
}

impl Default for TrackingState {
    fn default() -> Self {
        Self::Init
    }
}

impl TrackingState {
    /// Whether the tracker currently trusts its pose hypothesis.
    pub fn is_tracking(&self) -> bool {
        matches!(self, Self::InitPnp | Self::Pnp | Self::Edges)
    }
}

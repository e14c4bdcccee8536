//! Error taxonomy for patch construction and scheduling.
//!
//! Every variant is raised synchronously at the control-rate boundary, before
//! anything reaches the render thread. Out-of-range parameter values are not
//! errors: they are clamped where they are scheduled.

use thiserror::Error;

use crate::graph::node::PortKind;

/// Errors raised while building a patch or issuing control-rate requests.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PatchError {
    /// A named port does not exist on the unit.
    #[error("unit '{unit}' has no {direction} port named '{port}'")]
    PortNotFound {
        /// Name of the unit that was searched.
        unit: String,
        /// Requested port name.
        port: String,
        /// "input", "output" or "parameter".
        direction: &'static str,
    },

    /// A connection violates the port-kind rules.
    #[error("cannot connect {source_kind:?} '{source_port}' to {dest_kind:?} '{dest_port}': {reason}")]
    TypeMismatch {
        /// `unit.port` of the source.
        source_port: String,
        /// Kind of the source port.
        source_kind: PortKind,
        /// `unit.port` of the destination.
        dest_port: String,
        /// Kind of the destination port.
        dest_kind: PortKind,
        /// Which rule was broken.
        reason: &'static str,
    },

    /// A ramp was configured with a non-positive floor or duration.
    #[error("invalid automation config: {0}")]
    InvalidAutomationConfig(String),

    /// A unit id does not belong to this graph.
    #[error("unit {0} is not registered in this patch graph")]
    UnknownUnit(String),

    /// The connection would close a loop made only of audio-rate edges.
    #[error("connecting '{source_port}' to '{dest_port}' creates an audio-rate cycle")]
    AudioRateCycle {
        /// `unit.port` of the source.
        source_port: String,
        /// `unit.port` of the destination.
        dest_port: String,
    },

    /// The render thread has not drained enough of a parameter's queue to
    /// take the whole request. Nothing was scheduled.
    #[error("automation queue for '{param}' is full: {needed} slots needed, {free} free")]
    QueueFull {
        /// `unit.param` whose queue is full.
        param: String,
        needed: usize,
        free: usize,
    },

    /// A control event named a unit/parameter or group with no binding.
    #[error("no control bound to '{0}'")]
    UnknownControl(String),
}

impl PatchError {
    pub(crate) fn invalid_automation(reason: impl Into<String>) -> Self {
        PatchError::InvalidAutomationConfig(reason.into())
    }
}

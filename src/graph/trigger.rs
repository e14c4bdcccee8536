//! One gesture, many envelopes.
//!
//! A trigger group fans a single "play" out to every envelope registered in
//! it. The timestamp is captured once, before the first envelope is touched,
//! so all of them peak on the same sample even if the render clock moves
//! while the group is being walked.

use tracing::debug;

use crate::{
    engine::clock::RenderClock,
    graph::{envelope::EnvelopeId, patch::UnitTable},
    PatchError,
};

#[derive(Debug, Clone, PartialEq)]
pub struct TriggerBroadcaster {
    name: String,
    envelopes: Vec<EnvelopeId>,
}

impl TriggerBroadcaster {
    pub fn new(name: impl Into<String>, envelopes: Vec<EnvelopeId>) -> Self {
        Self {
            name: name.into(),
            envelopes,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Envelopes in registration order.
    pub fn envelopes(&self) -> &[EnvelopeId] {
        &self.envelopes
    }

    /// Retrigger every envelope at one shared time; returns that time.
    pub(crate) fn fire(
        &self,
        units: &mut UnitTable,
        clock: &RenderClock,
        at: Option<f64>,
    ) -> Result<f64, PatchError> {
        let time = at.map_or_else(|| clock.now(), |t| t.max(0.0));

        for &envelope in &self.envelopes {
            units.envelope(envelope)?.trigger(Some(time))?;
        }

        debug!(group = %self.name, time, envelopes = self.envelopes.len(), "trigger fired");
        Ok(time)
    }
}

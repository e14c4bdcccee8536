//! Modulation depth scaling.
//!
//! An oscillator swings between -1 and 1. A frequency input wants hertz. The
//! scaler (a DCA) sits between them and multiplies the modulator by its
//! `gain`, so a depth of 100 turns a full-scale modulator into ±100 Hz of
//! deviation. It is the only unit whose output may drive a parameter input.

use crate::{
    engine::scheduler::{ParamHandle, ParamRange},
    graph::node::UnitId,
    PatchError,
};

/// Upper bound of the depth parameter unless configured otherwise.
pub const DEFAULT_MAX_DEPTH: f32 = 1_000.0;

/// Name of the scaler's depth parameter.
pub const GAIN: &str = "gain";

/// Handle to a scaler unit in a patch graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScalerId(pub(crate) UnitId);

impl ScalerId {
    pub fn unit(self) -> UnitId {
        self.0
    }
}

impl From<ScalerId> for UnitId {
    fn from(id: ScalerId) -> Self {
        id.0
    }
}

/// Mutable view of a scaler's depth.
pub struct ModulationScaler<'a> {
    gain: &'a mut ParamHandle,
}

impl<'a> ModulationScaler<'a> {
    pub(crate) fn new(gain: &'a mut ParamHandle) -> Self {
        Self { gain }
    }

    pub fn max_depth(&self) -> f32 {
        self.gain.range().max
    }

    pub fn range(&self) -> ParamRange {
        self.gain.range()
    }

    pub fn gain(&self) -> &ParamHandle {
        self.gain
    }

    /// Step the depth now. Out-of-range values are clamped.
    pub fn set_gain(&mut self, value: f32) -> Result<f64, PatchError> {
        self.gain.set_value(value, None)
    }

    pub fn set_gain_at(&mut self, value: f32, at: f64) -> Result<f64, PatchError> {
        self.gain.set_value(value, Some(at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::clock::RenderClock;

    #[test]
    fn depth_is_clamped_to_max() {
        let (mut handle, _) = ParamHandle::new(
            "dca.gain",
            ParamRange::new(0.0, DEFAULT_MAX_DEPTH),
            0.0,
            RenderClock::new(48_000.0),
            8,
        );
        let mut dca = ModulationScaler::new(&mut handle);

        dca.set_gain(5_000.0).unwrap();
        assert_eq!(dca.gain().events()[0].value, DEFAULT_MAX_DEPTH);

        dca.set_gain(-1.0).unwrap();
        assert_eq!(dca.gain().current_value(), 0.0);
    }
}

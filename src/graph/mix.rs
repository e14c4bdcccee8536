use crate::{
    engine::scheduler::ParamHandle,
    graph::node::{PortKind, PortRef, UnitId},
    PatchError,
};

/*
Normalized Mixer
================

The mixer sums a fixed number of channels, each through its own level, and
divides by the channel count:

    out = (level₀·in₀ + level₁·in₁ + … + levelₙ₋₁·inₙ₋₁) / N

With every level at 1.0 the output is the arithmetic mean of the inputs, so
three full-scale oscillators never clip the bus:

    in₀  ──[level₀]──┐
    in₁  ──[level₁]──┼──▶ Σ ──▶ × 1/N ──▶ out
    in₂  ──[level₂]──┘

The arity is fixed when the mixer is added to the graph. Channels with
nothing connected contribute silence but still count towards N.

Ports are named by channel: audio inputs `in0`, `in1`, …, and parameter
inputs `level0`, `level1`, ….
*/

/// Handle to a mixer unit in a patch graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MixerId(pub(crate) UnitId);

impl MixerId {
    pub fn unit(self) -> UnitId {
        self.0
    }

    /// The audio input of `channel`. Validated when connected.
    pub fn input(self, channel: usize) -> PortRef {
        PortRef {
            unit: self.0,
            kind: PortKind::AudioInput,
            slot: channel,
        }
    }
}

impl From<MixerId> for UnitId {
    fn from(id: MixerId) -> Self {
        id.0
    }
}

/// Mutable view of a mixer's channel levels.
pub struct Mixer<'a> {
    name: &'a str,
    levels: &'a mut [ParamHandle],
}

impl<'a> Mixer<'a> {
    pub(crate) fn new(name: &'a str, levels: &'a mut [ParamHandle]) -> Self {
        Self { name, levels }
    }

    pub fn channels(&self) -> usize {
        self.levels.len()
    }

    pub fn level(&self, channel: usize) -> Result<&ParamHandle, PatchError> {
        self.levels
            .get(channel)
            .ok_or_else(|| missing_channel(self.name, channel))
    }

    /// Step one channel's level now. Out-of-range values are clamped.
    pub fn set_level(&mut self, channel: usize, value: f32) -> Result<f64, PatchError> {
        let name = self.name;
        self.levels
            .get_mut(channel)
            .ok_or_else(|| missing_channel(name, channel))?
            .set_value(value, None)
    }
}

fn missing_channel(unit: &str, channel: usize) -> PatchError {
    PatchError::PortNotFound {
        unit: unit.to_string(),
        port: format!("level{channel}"),
        direction: "parameter",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{clock::RenderClock, scheduler::ParamRange};

    fn levels(n: usize) -> Vec<ParamHandle> {
        let clock = RenderClock::new(48_000.0);
        (0..n)
            .map(|c| {
                ParamHandle::new(
                    format!("mix.level{c}"),
                    ParamRange::new(0.0, 1.0),
                    1.0,
                    clock.clone(),
                    8,
                )
                .0
            })
            .collect()
    }

    #[test]
    fn set_level_clamps() {
        let mut handles = levels(3);
        let mut mixer = Mixer::new("mix", &mut handles);

        mixer.set_level(1, 1.5).unwrap();
        assert_eq!(mixer.level(1).unwrap().current_value(), 1.0);
    }

    #[test]
    fn unknown_channel_is_port_not_found() {
        let mut handles = levels(3);
        let mut mixer = Mixer::new("mix", &mut handles);

        assert!(matches!(
            mixer.set_level(3, 0.5),
            Err(PatchError::PortNotFound { .. })
        ));
    }
}

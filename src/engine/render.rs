use rtrb::Consumer;
use tracing::debug;

use crate::{
    dsp::mix::sum_in_place,
    engine::{
        clock::RenderClock,
        nodes::{ProcessIo, RenderCtx, RenderNode, SourceCommand},
        scheduler::ParamTimeline,
    },
    graph::{
        node::{GraphId, PortKind, UnitId},
        unit::UnitRenderParts,
    },
    MAX_BLOCK_SIZE,
};

/*
Block Renderer
==============

The renderer owns every processor and walks a fixed topology once per block.
The control side never touches it after `build()`; everything it wants to
change arrives through the per-parameter and per-source queues.

One block
---------

  1. Drain queues       automation events → timelines, start/stop/waveform
                        commands → processors (also while suspended, so the
                        control side never finds a queue full)
  2. For each unit, in processing order:
       inputs  = Σ outputs of every unit wired into each audio input
       params  = timeline value per sample + Σ wired modulation signals
       output  = processor(inputs, params)
  3. Copy the output bus into the caller's buffer
  4. Advance the render clock, fold elapsed automation

Processing order
----------------

Audio edges may never form a loop (the graph rejects that at connect time),
so they always admit a topological order. Parameter edges may loop: the FM
ring below is legal.

    op1 ──▶ env1 ──▶ dca1 ──┐ frequency
     ▲                      ▼
    dca3                   op2 ──▶ env2 ──▶ dca2 ──┐
     ▲                                             ▼ frequency
    env3 ◀── op3 ◀─────────────────────────────────┘

Kahn's algorithm places a unit once all of its sources are placed. When that
stalls, the cycle is broken at a unit whose remaining sources only feed its
parameters. Those edges read the source's output from the previous block:
one block of latency in the modulation loop, never in the audio path.

Outputs persist between blocks, which is also what makes self-modulation
(a unit wired into its own parameter) well defined.
*/

/// A resolved connection, by unit index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Wire {
    pub source: usize,
    pub dest: usize,
    pub kind: PortKind,
    pub slot: usize,
}

struct RenderUnit {
    node: Box<dyn RenderNode>,
    params: Vec<ParamTimeline>,
    param_names: Vec<String>,
    commands: Option<Consumer<SourceCommand>>,
    inputs: Vec<Vec<f32>>,
    input_connected: Vec<bool>,
    param_values: Vec<Vec<f32>>,
    /// Wires ending at this unit.
    incoming: Vec<Wire>,
}

pub struct Renderer {
    graph: GraphId,
    clock: RenderClock,
    units: Vec<RenderUnit>,
    outputs: Vec<Vec<f32>>,
    order: Vec<usize>,
    destination: usize,
    last_len: usize,
}

impl Renderer {
    pub(crate) fn new(
        graph: GraphId,
        clock: RenderClock,
        parts: Vec<(UnitRenderParts, Vec<String>)>,
        wires: &[Wire],
        destination: usize,
    ) -> Self {
        let order = processing_order(parts.len(), wires);

        let units: Vec<RenderUnit> = parts
            .into_iter()
            .enumerate()
            .map(|(index, (part, param_names))| {
                let incoming: Vec<Wire> =
                    wires.iter().copied().filter(|w| w.dest == index).collect();
                let input_connected = (0..part.audio_inputs)
                    .map(|slot| {
                        incoming
                            .iter()
                            .any(|w| w.kind == PortKind::AudioInput && w.slot == slot)
                    })
                    .collect();

                RenderUnit {
                    node: part.node,
                    param_values: vec![vec![0.0; MAX_BLOCK_SIZE]; part.params.len()],
                    params: part.params,
                    param_names,
                    commands: part.commands,
                    inputs: vec![vec![0.0; MAX_BLOCK_SIZE]; part.audio_inputs],
                    input_connected,
                    incoming,
                }
            })
            .collect();

        debug!(units = units.len(), wires = wires.len(), ?order, "renderer ready");

        Self {
            graph,
            clock,
            outputs: vec![vec![0.0; MAX_BLOCK_SIZE]; units.len()],
            units,
            order,
            destination,
            last_len: 0,
        }
    }

    pub fn clock(&self) -> &RenderClock {
        &self.clock
    }

    pub fn sample_rate(&self) -> f32 {
        self.clock.sample_rate()
    }

    /// Unit indices in the order they are processed each block.
    pub fn processing_order(&self) -> &[usize] {
        &self.order
    }

    /// Render any number of frames, in chunks of at most `MAX_BLOCK_SIZE`.
    pub fn render(&mut self, out: &mut [f32]) {
        for chunk in out.chunks_mut(MAX_BLOCK_SIZE) {
            self.render_block(chunk);
        }
    }

    /// Render one block. Longer buffers are split into `MAX_BLOCK_SIZE`
    /// chunks, as with [`render`](Self::render).
    pub fn render_block(&mut self, out: &mut [f32]) {
        if out.len() > MAX_BLOCK_SIZE {
            self.render(out);
            return;
        }
        let len = out.len();

        // Suspended: keep the queues empty, hold the clock, output silence.
        self.drain();
        if self.clock.is_suspended() {
            out.fill(0.0);
            return;
        }

        let ctx = RenderCtx::new(self.clock.sample_rate(), self.clock.frames());

        for &index in &self.order {
            let RenderUnit {
                node,
                params,
                inputs,
                input_connected,
                param_values,
                incoming,
                ..
            } = &mut self.units[index];

            for input in inputs.iter_mut() {
                input[..len].fill(0.0);
            }
            for (values, timeline) in param_values.iter_mut().zip(params.iter()) {
                timeline.render(&mut values[..len], ctx.start_frame, ctx.sample_rate);
            }

            for wire in incoming.iter() {
                let source = &self.outputs[wire.source][..len];
                let target = match wire.kind {
                    PortKind::AudioInput => &mut inputs[wire.slot][..len],
                    PortKind::ParameterInput => &mut param_values[wire.slot][..len],
                    PortKind::AudioOutput => continue,
                };
                sum_in_place(target, source);
            }

            let io = ProcessIo {
                inputs: inputs.as_slice(),
                input_connected: input_connected.as_slice(),
                params: param_values.as_slice(),
            };
            node.process(&io, &mut self.outputs[index][..len], &ctx);
        }

        out[..len].copy_from_slice(&self.outputs[self.destination][..len]);
        self.last_len = len;

        self.clock.advance(len);
        let now = self.clock.now();
        for unit in &mut self.units {
            for timeline in &mut unit.params {
                timeline.prune(now);
            }
        }
    }

    fn drain(&mut self) {
        for unit in &mut self.units {
            for timeline in &mut unit.params {
                timeline.drain();
            }
            if let Some(rx) = unit.commands.as_mut() {
                while let Ok(command) = rx.pop() {
                    unit.node.handle(command);
                }
            }
        }
    }

    /// Output of `unit` for the last rendered block.
    pub fn unit_output(&self, unit: UnitId) -> Option<&[f32]> {
        self.index_of(unit)
            .map(|index| &self.outputs[index][..self.last_len])
    }

    /// Effective per-sample values of a parameter for the last rendered
    /// block, modulation included.
    pub fn param_values(&self, unit: UnitId, param: &str) -> Option<&[f32]> {
        let render_unit = &self.units[self.index_of(unit)?];
        let slot = render_unit.param_names.iter().position(|n| n == param)?;
        Some(&render_unit.param_values[slot][..self.last_len])
    }

    fn index_of(&self, unit: UnitId) -> Option<usize> {
        (unit.graph == self.graph && unit.index < self.units.len()).then_some(unit.index)
    }
}

/// Topological order over all wires, breaking cycles at parameter edges.
pub(crate) fn processing_order(unit_count: usize, wires: &[Wire]) -> Vec<usize> {
    let mut placed = vec![false; unit_count];
    let mut order = Vec::with_capacity(unit_count);

    while order.len() < unit_count {
        let ready = (0..unit_count)
            .find(|&u| !placed[u] && pending(wires, &placed, u).next().is_none());

        let next = ready
            .or_else(|| {
                (0..unit_count).find(|&u| {
                    !placed[u]
                        && pending(wires, &placed, u).all(|w| w.kind == PortKind::ParameterInput)
                })
            })
            .or_else(|| (0..unit_count).find(|&u| !placed[u]));

        let Some(unit) = next else { break };
        placed[unit] = true;
        order.push(unit);
    }

    order
}

/// Wires into `unit` whose source is not placed yet. Self-wires read the
/// previous block and never block placement.
fn pending<'a>(
    wires: &'a [Wire],
    placed: &'a [bool],
    unit: usize,
) -> impl Iterator<Item = &'a Wire> + 'a {
    wires
        .iter()
        .filter(move |w| w.dest == unit && w.source != unit && !placed[w.source])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn audio(source: usize, dest: usize) -> Wire {
        Wire {
            source,
            dest,
            kind: PortKind::AudioInput,
            slot: 0,
        }
    }

    fn param(source: usize, dest: usize) -> Wire {
        Wire {
            source,
            dest,
            kind: PortKind::ParameterInput,
            slot: 0,
        }
    }

    #[test]
    fn chain_is_ordered_sources_first() {
        let wires = [audio(2, 1), audio(1, 0)];
        assert_eq!(processing_order(3, &wires), vec![2, 1, 0]);
    }

    #[test]
    fn modulation_ring_is_broken_at_a_parameter_edge() {
        // 0 → 1 (audio), 1 → 2 (param), 2 → 3 (audio), 3 → 0 (param)
        let wires = [audio(0, 1), param(1, 2), audio(2, 3), param(3, 0)];
        let order = processing_order(4, &wires);

        assert_eq!(order.len(), 4);
        let pos = |u: usize| order.iter().position(|&x| x == u).unwrap();
        assert!(pos(0) < pos(1), "audio edges keep same-block order");
        assert!(pos(2) < pos(3));
    }

    #[test]
    fn self_modulation_does_not_stall() {
        let wires = [param(0, 0), audio(0, 1)];
        assert_eq!(processing_order(2, &wires), vec![0, 1]);
    }
}

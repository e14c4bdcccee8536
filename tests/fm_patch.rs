use saavy_patch::{
    control::ControlEvent,
    dsp::oscillator::Waveform,
    graph::{EnvelopeState, UnitKind},
    patch::{FmPatch, PatchConfig, PLAY},
    PatchError, MAX_BLOCK_SIZE,
};

fn build() -> (FmPatch, saavy_patch::engine::Renderer) {
    FmPatch::build(&PatchConfig::default()).unwrap()
}

#[test]
fn ring_builds_with_expected_topology() {
    let (patch, renderer) = build();
    let topology = patch.graph().topology();

    assert_eq!(patch.operators().len(), 3);
    // destination + 3 × (osc, vca, env, dca) + mixer + amp
    assert_eq!(topology.units.len(), 15);
    assert_eq!(renderer.processing_order().len(), 15);

    // every oscillator's frequency is driven by the previous operator's scaler
    for (i, op) in patch.operators().iter().enumerate() {
        let prev = &patch.operators()[(i + 2) % 3];
        let sources: Vec<_> = topology
            .connections_into(op.oscillator)
            .map(|c| c.source.unit)
            .collect();
        assert_eq!(sources, vec![prev.dca.unit()]);
    }

    let play = patch.graph().trigger_group(PLAY).unwrap();
    assert_eq!(play.envelopes().len(), 4);
    assert_eq!(play.envelopes()[0], patch.amplitude_envelope());
    assert_eq!(topology.unit("mix").unwrap().kind, UnitKind::Mixer);
}

#[test]
fn ring_renders_bounded_audio() {
    let (mut patch, mut renderer) = build();
    patch.play().unwrap();

    let mut out = vec![0.0; 48_000];
    renderer.render(&mut out);

    assert_eq!(patch.clock().frames(), 48_000);
    assert!(out.iter().all(|s| s.is_finite() && s.abs() <= 1.0));
    assert!(out[..4_800].iter().any(|s| s.abs() > 1e-3));
}

#[test]
fn render_handles_buffers_larger_than_a_block() {
    let (mut patch, mut renderer) = build();
    patch.play().unwrap();

    let mut out = vec![0.0; MAX_BLOCK_SIZE * 2 + 17];
    renderer.render(&mut out);
    assert_eq!(patch.clock().frames(), out.len() as u64);
}

#[test]
fn play_retriggers_every_envelope_at_once() {
    let (mut patch, _renderer) = build();

    let t = patch.play().unwrap();

    let mut envelopes = vec![patch.amplitude_envelope()];
    envelopes.extend(patch.operators().iter().map(|op| op.envelope));
    for env in envelopes {
        assert_eq!(patch.graph().envelope_state(env).unwrap(), EnvelopeState::Decaying);
        let peak = patch.graph_mut().envelope(env).unwrap().level().events()[0].time;
        assert_eq!(peak, t);
    }
}

#[test]
fn operator_gain_sets_vca_and_depth_together() {
    let (mut patch, _renderer) = build();

    patch.handle(&ControlEvent::parameter("op2", "gain", 0.5)).unwrap();

    let op = patch.operator(1).unwrap().clone();
    assert_eq!(op.gain(patch.graph()).unwrap(), 0.5);
    let depth = patch.graph_mut().scaler(op.dca).unwrap().gain().current_value();
    assert_eq!(depth, 500.0);
}

#[test]
fn operator_gain_is_clamped_before_scaling() {
    let (mut patch, _renderer) = build();

    patch.handle(&ControlEvent::parameter("op1", "gain", 3.0)).unwrap();

    let op = patch.operator(0).unwrap().clone();
    assert_eq!(op.gain(patch.graph()).unwrap(), 1.0);
    let depth = patch.graph_mut().scaler(op.dca).unwrap().gain().current_value();
    assert_eq!(depth, 1_000.0);
}

#[test]
fn frequency_and_waveform_controls() {
    let (mut patch, _renderer) = build();

    patch.handle(&ControlEvent::parameter("op3", "frequency", 9_000.0)).unwrap();
    patch.handle(&ControlEvent::waveform("op3", Waveform::Square)).unwrap();

    let op = patch.operator(2).unwrap();
    assert_eq!(op.frequency(patch.graph()).unwrap(), 4_000.0);
    assert_eq!(op.waveform(patch.graph()).unwrap(), Waveform::Square);
}

#[test]
fn patch_decay_applies_to_every_envelope() {
    let (mut patch, _renderer) = build();

    patch.handle(&ControlEvent::parameter("patch", "decay", 1.5)).unwrap();

    assert_eq!(patch.graph().decay_time(patch.amplitude_envelope()).unwrap(), 1.5);
    for op in patch.operators() {
        assert_eq!(patch.graph().decay_time(op.envelope).unwrap(), 1.5);
    }
}

#[test]
fn trigger_and_transport_events() {
    let (mut patch, _renderer) = build();

    let t = patch.handle(&ControlEvent::trigger(PLAY)).unwrap();
    assert_eq!(t, Some(0.0));

    patch.handle(&ControlEvent::TransportToggled).unwrap();
    assert!(patch.clock().is_suspended());
}

#[test]
fn unknown_controls_are_rejected() {
    let (mut patch, _renderer) = build();

    assert!(matches!(
        patch.handle(&ControlEvent::parameter("op9", "gain", 0.5)),
        Err(PatchError::UnknownControl(_))
    ));
    assert!(matches!(
        patch.handle(&ControlEvent::waveform("mix", Waveform::Sine)),
        Err(PatchError::UnknownControl(_))
    ));
}

#[test]
fn non_positive_floor_is_invalid() {
    let config = PatchConfig::default().with_floor(0.0);
    assert!(matches!(
        FmPatch::build(&config),
        Err(PatchError::InvalidAutomationConfig(_))
    ));
}

#[test]
fn operator_count_follows_frequencies() {
    let config = PatchConfig::default()
        .with_frequencies(vec![220.0, 330.0, 440.0, 550.0])
        .with_mixer_channels(3);
    let (patch, mut renderer) = FmPatch::build(&config).unwrap();

    assert_eq!(patch.operators().len(), 4);
    assert!(patch.controls().binding("mix", "level3").is_some());

    let mut out = vec![0.0; 1024];
    renderer.render(&mut out);
    assert!(out.iter().all(|s| s.is_finite()));
}

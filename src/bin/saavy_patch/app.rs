//! Audio device setup and the render callback.

use color_eyre::eyre::{eyre, Result as EyreResult, WrapErr};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use rtrb::RingBuffer;
use tracing::{error, info};

use saavy_patch::{
    patch::{FmPatch, PatchConfig},
    MAX_BLOCK_SIZE,
};

use super::ui::PatchUi;

/// Samples in flight from the audio thread to the oscilloscope.
const SCOPE_CAPACITY: usize = 8192;

/// Build the patch at the device's rate, start the stream, run the UI.
pub fn run() -> EyreResult<()> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| eyre!("no default output device available"))?;
    let supported = device
        .default_output_config()
        .wrap_err("failed to fetch default output config")?;

    let sample_rate = supported.sample_rate().0 as f32;
    let channels = supported.channels() as usize;
    info!(sample_rate, channels, "output device ready");

    let config = PatchConfig::default().with_sample_rate(sample_rate);
    let (patch, mut renderer) = FmPatch::build(&config).wrap_err("failed to build patch")?;

    let (mut scope_tx, scope_rx) = RingBuffer::<f32>::new(SCOPE_CAPACITY);
    let mut block = vec![0.0f32; MAX_BLOCK_SIZE];

    // The renderer moves into the callback: no lock on the audio thread.
    let stream = device.build_output_stream(
        &supported.into(),
        move |data: &mut [f32], _| {
            let total_frames = data.len() / channels;
            let mut frames_written = 0;

            while frames_written < total_frames {
                let frames = (total_frames - frames_written).min(MAX_BLOCK_SIZE);
                let out = &mut block[..frames];
                renderer.render_block(out);

                // Mono to every channel
                let offset = frames_written * channels;
                for (i, &sample) in out.iter().enumerate() {
                    let start = offset + i * channels;
                    data[start..start + channels].fill(sample);
                    let _ = scope_tx.push(sample);
                }

                frames_written += frames;
            }
        },
        |err| error!(%err, "audio stream error"),
        None,
    )?;
    stream.play()?;

    let mut terminal = ratatui::init();
    let result = PatchUi::new(patch, scope_rx).run(&mut terminal);
    ratatui::restore();

    result
}

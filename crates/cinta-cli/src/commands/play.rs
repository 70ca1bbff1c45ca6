//! Stream a soundfile to the default audio output.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Args;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use cinta_core::BaseDir;
use cinta_stream::{MAX_VECSIZE, OpenRequest, StreamReader};

use super::common::probe;

/// Stream a soundfile to the default audio output.
#[derive(Args)]
pub struct PlayArgs {
    /// Soundfile to play
    pub file: PathBuf,

    /// Frames to skip before playback
    #[arg(long, default_value = "0")]
    pub skip: u64,
}

/// Run the play command.
pub fn run(args: PlayArgs) -> anyhow::Result<()> {
    let spec = probe(&args.file)?;

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| anyhow::anyhow!("no audio output device available"))?;
    let config = device.default_output_config()?;
    if config.sample_rate() != spec.samplerate {
        tracing::warn!(
            file = spec.samplerate,
            device = config.sample_rate(),
            "sample rate mismatch, playing at the device rate"
        );
    }
    let out_channels = config.channels() as usize;
    let file_channels = spec.channels;

    let reader = Arc::new(StreamReader::new(
        file_channels,
        0,
        Arc::new(BaseDir::new(".")),
    )?);
    let mut req = OpenRequest::new(args.file.to_string_lossy());
    req.onset_frames = args.skip;
    reader.open(req);
    reader.start();

    let done = Arc::new(AtomicBool::new(false));
    let cb_reader = Arc::clone(&reader);
    let cb_done = Arc::clone(&done);
    let mut planes: Vec<Vec<f32>> = vec![vec![0.0; MAX_VECSIZE]; file_channels];

    let stream = device.build_output_stream(
        &config.into(),
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            // The device may hand blocks larger than the FIFO quantum;
            // split them before entering the stream object.
            let frames_total = data.len() / out_channels;
            let mut frame = 0;
            while frame < frames_total {
                let n = (frames_total - frame).min(MAX_VECSIZE);
                let mut slices: Vec<&mut [f32]> =
                    planes.iter_mut().map(|p| &mut p[..n]).collect();
                cb_reader.process(&mut slices);
                for f in 0..n {
                    for ch in 0..out_channels {
                        let v = if ch < file_channels { planes[ch][f] } else { 0.0 };
                        data[(frame + f) * out_channels + ch] = v;
                    }
                }
                if cb_reader.take_done() {
                    cb_done.store(true, Ordering::SeqCst);
                }
                frame += n;
            }
        },
        |err| tracing::error!(error = %err, "output stream error"),
        None,
    )?;
    stream.play()?;

    println!("playing {}...", args.file.display());
    while !done.load(Ordering::SeqCst) {
        std::thread::sleep(std::time::Duration::from_millis(50));
    }
    drop(stream);
    if let Some(err) = reader.take_error() {
        return Err(err.into());
    }
    reader.stop();
    Ok(())
}

//! Record the default audio input to a soundfile.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use clap::Args;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use cinta_core::{Atom, BaseDir};
use cinta_stream::{MAX_VECSIZE, StreamWriter};

/// Record the default audio input to a soundfile.
#[derive(Args)]
pub struct RecordArgs {
    /// Output soundfile (extension selects the container)
    pub file: PathBuf,

    /// Bytes per sample (2, 3, or 4)
    #[arg(long, default_value = "2")]
    pub bytes: usize,

    /// Channels to record (default: all device channels)
    #[arg(long)]
    pub channels: Option<usize>,

    /// Seconds to record (default: until ctrl-c)
    #[arg(long)]
    pub seconds: Option<f32>,

    /// Metadata entry (key=value); repeatable, container permitting
    #[arg(long, value_parser = parse_key_val, number_of_values = 1)]
    pub meta: Vec<(String, String)>,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("invalid metadata '{s}' (expected key=value)"))
}

/// Run the record command.
pub fn run(args: RecordArgs) -> anyhow::Result<()> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow::anyhow!("no audio input device available"))?;
    let config = device.default_input_config()?;
    let in_channels = config.channels() as usize;
    let channels = args.channels.unwrap_or(in_channels).clamp(1, in_channels);
    let rate = config.sample_rate();

    let writer = Arc::new(StreamWriter::new(channels, 0, Arc::new(BaseDir::new(".")))?);
    writer.configure(MAX_VECSIZE, rate);
    writer.open(&[
        Atom::from("-bytes"),
        Atom::Float(args.bytes as f32),
        Atom::from("-rate"),
        Atom::Float(rate as f32),
        Atom::from(args.file.to_string_lossy().into_owned()),
    ])?;
    for (key, value) in &args.meta {
        writer.meta(&[Atom::from(key.clone()), Atom::from(value.clone())]);
    }
    writer.start();

    let cb_writer = Arc::clone(&writer);
    let mut planes: Vec<Vec<f32>> = vec![vec![0.0; MAX_VECSIZE]; channels];
    let stream = device.build_input_stream(
        &config.into(),
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            let frames_total = data.len() / in_channels;
            let mut frame = 0;
            while frame < frames_total {
                let n = (frames_total - frame).min(MAX_VECSIZE);
                for (ch, plane) in planes.iter_mut().enumerate() {
                    for f in 0..n {
                        plane[f] = data[(frame + f) * in_channels + ch];
                    }
                }
                let slices: Vec<&[f32]> = planes.iter().map(|p| &p[..n]).collect();
                cb_writer.process(&slices);
                frame += n;
            }
        },
        |err| tracing::error!(error = %err, "input stream error"),
        None,
    )?;
    stream.play()?;

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst))?;
    }
    println!("recording {} ... press ctrl-c to stop", args.file.display());
    let started = Instant::now();
    while !stop.load(Ordering::SeqCst) {
        if let Some(secs) = args.seconds
            && started.elapsed().as_secs_f32() >= secs
        {
            break;
        }
        std::thread::sleep(Duration::from_millis(50));
    }

    drop(stream);
    writer.stop();
    writer.wait_idle();
    if let Some(err) = writer.take_error() {
        return Err(err.into());
    }
    println!(
        "wrote {} frames to {}",
        writer.frames_written(),
        args.file.display()
    );
    Ok(())
}

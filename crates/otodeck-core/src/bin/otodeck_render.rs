//! Offline render of one or two tracks through the dual-deck mixer
//!
//! ```text
//! otodeck-render <track-a> [track-b] [--seconds N] [--out mix.wav] [--config path]
//! ```
//!
//! Both decks start at position 0 with the gain and speed presets from the
//! mixer config. The mix is written as 32-bit float stereo WAV.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use otodeck_core::config::{default_config_path, MixerConfig};
use otodeck_core::decoder::{is_supported_extension, SourceId, SourceOpener, SymphoniaOpener};
use otodeck_core::engine::DualDeckMixer;
use otodeck_core::loader::DeckLoader;
use otodeck_core::types::{DeckId, StereoBuffer, NUM_DECKS};

const LOAD_TIMEOUT: Duration = Duration::from_secs(120);

struct Args {
    tracks: Vec<PathBuf>,
    seconds: f64,
    out: PathBuf,
    config: PathBuf,
}

fn usage() -> &'static str {
    "usage: otodeck-render <track-a> [track-b] [--seconds N] [--out mix.wav] [--config path]"
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        tracks: Vec::new(),
        seconds: 30.0,
        out: PathBuf::from("mix.wav"),
        config: default_config_path(),
    };

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--seconds" => {
                let value = iter.next().context("--seconds needs a value")?;
                args.seconds = value
                    .parse()
                    .with_context(|| format!("Invalid --seconds value: {}", value))?;
            }
            "--out" => args.out = iter.next().context("--out needs a path")?.into(),
            "--config" => args.config = iter.next().context("--config needs a path")?.into(),
            "-h" | "--help" => {
                println!("{}", usage());
                std::process::exit(0);
            }
            flag if flag.starts_with("--") => bail!("Unknown flag {}\n{}", flag, usage()),
            track => args.tracks.push(PathBuf::from(track)),
        }
    }

    if args.tracks.is_empty() || args.tracks.len() > NUM_DECKS {
        bail!("Expected one or two tracks\n{}", usage());
    }
    if !(args.seconds.is_finite() && args.seconds > 0.0) {
        bail!("--seconds must be positive");
    }
    Ok(args)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = parse_args()?;

    // Build the pool before the first render so the render loop does not pay
    // for lazy initialization
    rayon::ThreadPoolBuilder::new()
        .num_threads(NUM_DECKS)
        .thread_name(|i| format!("rayon-mix-{}", i))
        .build_global()
        .context("Failed to initialize Rayon thread pool")?;

    let config = MixerConfig::load(&args.config);
    let opener: Arc<dyn SourceOpener> = Arc::new(SymphoniaOpener::new());
    let mut mixer = DualDeckMixer::new(opener, &config)?;

    let loader = DeckLoader::spawn(mixer.controllers().to_vec())
        .context("Failed to spawn deck loader")?;
    for (index, track) in args.tracks.iter().enumerate() {
        if !is_supported_extension(track) {
            log::warn!("{:?} has an unrecognized extension, trying anyway", track);
        }
        loader.request(DeckId::new(index), SourceId::from(track.as_path()));
    }
    for _ in 0..args.tracks.len() {
        let outcome = loader
            .recv_timeout(LOAD_TIMEOUT)
            .context("Timed out waiting for track loads")?;
        outcome.result?;
    }

    for controller in mixer.controllers() {
        controller.start();
    }

    let format = mixer
        .output_format()
        .context("Mixer has no output format")?;
    let spec = hound::WavSpec {
        channels: format.channels,
        sample_rate: format.sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(&args.out, spec)
        .with_context(|| format!("Failed to create {:?}", args.out))?;

    let total_frames = (args.seconds * format.sample_rate as f64).round() as usize;
    let mut block = StereoBuffer::silence(mixer.block_size());
    let mut written = 0usize;
    let mut peak = 0.0f32;

    while written < total_frames {
        let len = mixer.block_size().min(total_frames - written);
        block.set_len_from_capacity(len);
        mixer.render(&mut block);
        peak = peak.max(block.peak());
        for &sample in block.as_interleaved() {
            writer.write_sample(sample)?;
        }
        written += len;

        if mixer.controllers().iter().all(|c| !c.is_playing()) {
            log::info!("All decks reached the end of their tracks");
            break;
        }
    }

    writer.finalize().context("Failed to finalize WAV file")?;
    mixer.release();

    log::info!(
        "Wrote {:.2}s to {:?} (peak {:.3})",
        written as f64 / format.sample_rate as f64,
        args.out,
        peak
    );
    if peak > 1.0 {
        log::warn!("Mix clips; lower the deck gains in {:?}", args.config);
    }
    Ok(())
}

//! `nes-apu` command line renderer
//!
//! ```text
//! nes-apu [--sample-rate N] [--pal] [--config cfg.json] demo <out.wav>
//! nes-apu [--sample-rate N] [--pal] [--config cfg.json] render <log.json> <out.wav>
//! ```

use anyhow::{bail, Context};
use std::env;
use std::fs;
use std::time::Instant;

use nes_apu::script::demo_sample_byte;
use nes_apu::{write_wav, ApuConfig, NesSound, Region, RegisterLog};

const USAGE: &str = "Usage:
  nes-apu [options] demo <out.wav>
  nes-apu [options] render <log.json> <out.wav>

Options:
  --sample-rate <N>    Output sample rate in Hz (default 44100)
  --pal                PAL timing (default NTSC)
  --config <file>      Load an ApuConfig from JSON; other options override it
  -h, --help           Show this help

Set RUST_LOG=debug for engine diagnostics.";

enum Command {
    Demo { output: String },
    Render { log: String, output: String },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut sample_rate: Option<u32> = None;
    let mut pal = false;
    let mut config_path: Option<String> = None;
    let mut positional: Vec<String> = Vec::new();

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--help" | "-h" => {
                println!("{USAGE}");
                return Ok(());
            }
            "--pal" => pal = true,
            "--sample-rate" => {
                let value = args.next().context("--sample-rate requires a value")?;
                sample_rate = Some(
                    value
                        .parse()
                        .with_context(|| format!("invalid sample rate '{value}'"))?,
                );
            }
            _ if arg.starts_with("--sample-rate=") => {
                let value = &arg["--sample-rate=".len()..];
                sample_rate = Some(
                    value
                        .parse()
                        .with_context(|| format!("invalid sample rate '{value}'"))?,
                );
            }
            "--config" => {
                config_path = Some(args.next().context("--config requires a file")?);
            }
            _ if arg.starts_with('-') => {
                eprintln!("Unknown flag: {}", arg);
                eprintln!("{USAGE}");
                bail!("unknown flag {arg}");
            }
            _ => positional.push(arg),
        }
    }

    let command = match positional.as_slice() {
        [cmd, output] if cmd == "demo" => Command::Demo {
            output: output.clone(),
        },
        [cmd, log, output] if cmd == "render" => Command::Render {
            log: log.clone(),
            output: output.clone(),
        },
        _ => {
            eprintln!("{USAGE}");
            bail!("expected a command");
        }
    };

    let mut config = match &config_path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read config '{path}'"))?;
            ApuConfig::from_json(&text)?
        }
        None => ApuConfig::default(),
    };
    if pal {
        config = ApuConfig {
            clock_rate: nes_apu::config::PAL_CLOCK_RATE,
            region: Region::Pal,
            ..config
        };
    }
    if let Some(rate) = sample_rate {
        config.sample_rate = rate;
    }

    let (log, output) = match command {
        Command::Demo { output } => (RegisterLog::demo(config.region), output),
        Command::Render { log, output } => {
            let text =
                fs::read_to_string(&log).with_context(|| format!("failed to read log '{log}'"))?;
            (RegisterLog::from_json(&text)?, output)
        }
    };

    let started = Instant::now();
    let mut sound = NesSound::initialize(demo_sample_byte, config)?;
    let pcm = log.play(&mut sound)?;
    write_wav(&output, &pcm, config.sample_rate)?;

    println!(
        "Rendered {} frames to {} ({} samples, {:.2}s of audio) in {:.1} ms",
        log.len(),
        output,
        pcm.len(),
        pcm.len() as f64 / f64::from(config.sample_rate),
        started.elapsed().as_secs_f64() * 1000.0
    );
    Ok(())
}

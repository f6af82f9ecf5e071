//! Engine entry point
//!
//! Initializes logging, builds the pipeline from command-line selections,
//! and drives the control protocol from stdin as a stand-in transport
//! (the production UI talks over IPC owned by a collaborator). Type
//! `PING`, `BYPASS 1`, `PRESET streaming`, `CONFIG {…}` or `QUIT`.

use std::io::BufRead;

use anyhow::{bail, Context, Result};
use tracing_subscriber::EnvFilter;

use clearmic::audio::{list_input_devices, list_output_devices};
use clearmic::control;
use clearmic::{Config, Pipeline, Preset};

struct Args {
    list_devices: bool,
    input: Option<String>,
    output: Option<String>,
    preset: Option<String>,
    model: Option<String>,
    meters: bool,
}

fn print_usage() {
    println!(
        "Usage: clearmic [options]\n\
         \n\
         Options:\n\
         \x20 --list-devices      List available audio devices and exit\n\
         \x20 --input <name>      Input device name (default: system default)\n\
         \x20 --output <name>     Output device name (default: auto-discover virtual device)\n\
         \x20 --preset <name>     Initial preset: podcast | meeting | streaming\n\
         \x20 --model <name>      Denoiser model: rnnoise | deepfilter\n\
         \x20 --meters            Print METERS lines while running\n\
         \x20 --help, -h          Show this help"
    );
}

fn parse_args() -> Result<Option<Args>> {
    let mut args = Args {
        list_devices: false,
        input: None,
        output: None,
        preset: None,
        model: None,
        meters: false,
    };

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                return Ok(None);
            }
            "--list-devices" => args.list_devices = true,
            "--meters" => args.meters = true,
            "--input" => args.input = Some(iter.next().context("--input needs a value")?),
            "--output" => args.output = Some(iter.next().context("--output needs a value")?),
            "--preset" => args.preset = Some(iter.next().context("--preset needs a value")?),
            "--model" => args.model = Some(iter.next().context("--model needs a value")?),
            other => bail!("unknown argument: {other}"),
        }
    }

    Ok(Some(args))
}

fn list_devices() -> Result<()> {
    println!("=== Input Devices (Microphones) ===");
    for (i, device) in list_input_devices()?.iter().enumerate() {
        let marker = if device.is_default { " (default)" } else { "" };
        println!("  [{i}] {}{marker}", device.name);
    }

    println!("\n=== Output Devices (Speakers/Virtual) ===");
    for (i, device) in list_output_devices()?.iter().enumerate() {
        let marker = if device.is_default { " (default)" } else { "" };
        println!("  [{i}] {}{marker}", device.name);
    }

    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let Some(args) = parse_args()? else {
        return Ok(());
    };

    if args.list_devices {
        return list_devices();
    }

    let mut config = Config::default();
    if let Some(input) = args.input {
        config.devices.input_device = input;
    }
    if let Some(output) = args.output {
        config.devices.output_device = output;
    }
    if let Some(model) = args.model {
        config.ai_model = model;
    }
    if let Some(name) = &args.preset {
        let preset = Preset::from_name(name)
            .with_context(|| format!("unknown preset: {name}"))?;
        preset.apply_to(&mut config);
    }

    let mut pipeline = Pipeline::new();
    pipeline
        .initialize(config)
        .context("failed to initialize audio pipeline")?;

    if args.meters {
        // Print every 25th block (~4 Hz) so stdout stays readable
        let mut counter = 0u32;
        pipeline.set_meter_sink(Box::new(move |peak, rms, gain_reduction| {
            counter += 1;
            if counter % 25 == 0 {
                println!("{}", control::format_meters(peak, rms, gain_reduction));
            }
        }));
    }

    pipeline.start().context("failed to start audio pipeline")?;
    tracing::info!("processing audio; enter control commands or QUIT to exit");

    let handle = pipeline.handle();
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("stdin closed unexpectedly")?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.eq_ignore_ascii_case("quit") {
            break;
        }

        match control::parse(trimmed) {
            Ok(command) => println!("{}", control::dispatch(&handle, command)),
            Err(e) => println!("ERR:{e}"),
        }
    }

    pipeline.stop().context("failed to stop audio pipeline")?;
    tracing::info!("shut down cleanly");
    Ok(())
}

//! Ostinato Live - terminal front end for the looper engine
//!
//! Starts the duplex audio system and drives it from stdin:
//! 1. Loads the YAML config (devices, track count, pre-roll)
//! 2. Starts the capture/playback streams with the engine on the audio thread
//! 3. Translates typed commands into the lock-free command queue

use std::io::{BufRead, Write};

use anyhow::{Context, Result};

use ostinato_core::audio::start_audio_system;
use ostinato_core::config::{default_config_path, OstinatoConfig};
use ostinato_core::engine::{LooperCommand, TrackIntent};

const CONFIG_FILE: &str = "config.yaml";

fn main() -> Result<()> {
    // Initialize logger - set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    log::info!("ostinato-live starting up");

    let config_path = default_config_path(CONFIG_FILE);
    let config = OstinatoConfig::load(&config_path);
    if !config_path.exists() {
        // Leave a template on first run so the defaults are editable
        if let Err(e) = config.save(&config_path) {
            log::warn!("could not write default config: {:#}", e);
        }
    }

    let mut system = start_audio_system(
        &config.audio,
        config.effective_num_tracks(),
        config.max_loop_seconds,
    )
    .context("Failed to start audio system")?;

    println!(
        "ostinato-live: {} tracks, {} Hz, {} frames (~{:.1}ms latency)",
        system.track_atomics.len(),
        system.sample_rate,
        system.buffer_size,
        system.latency_ms
    );

    // Arm every track's latency compensation from the configured pre-roll
    let pre_roll = config.pre_roll_samples(system.sample_rate);
    if pre_roll > 0 {
        for track in 0..system.track_atomics.len() {
            let _ = system.command_sender.send(LooperCommand::SetPreDelay {
                track,
                samples: pre_roll,
            });
        }
        log::info!("pre-roll set to {} samples", pre_roll);
    }

    print_help();

    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }

        match parse_line(line.trim()) {
            Some(Input::Command(cmd)) => {
                if system.command_sender.send(cmd).is_err() {
                    log::warn!("command queue full, command dropped");
                }
            }
            Some(Input::Status) => print_status(&system),
            Some(Input::Help) => print_help(),
            Some(Input::Quit) => break,
            None => {
                if !line.trim().is_empty() {
                    println!("unrecognized command (h for help)");
                }
            }
        }
    }

    log::info!("ostinato-live shutting down");
    Ok(())
}

enum Input {
    Command(LooperCommand),
    Status,
    Help,
    Quit,
}

/// Parse one input line into a command
fn parse_line(line: &str) -> Option<Input> {
    let mut parts = line.split_whitespace();
    let word = parts.next()?;

    let track_arg = |parts: &mut std::str::SplitWhitespace| -> Option<usize> {
        parts.next()?.parse().ok()
    };

    let cmd = match word {
        "r" | "rec" => LooperCommand::Trigger {
            track: track_arg(&mut parts)?,
            intent: TrackIntent::RecordOrPlay,
        },
        "p" | "play" => LooperCommand::Trigger {
            track: track_arg(&mut parts)?,
            intent: TrackIntent::Play,
        },
        "s" | "stop" => LooperCommand::Trigger {
            track: track_arg(&mut parts)?,
            intent: TrackIntent::Stop,
        },
        "c" | "clear" => LooperCommand::Trigger {
            track: track_arg(&mut parts)?,
            intent: TrackIntent::Clear,
        },
        "sel" => LooperCommand::SelectTrack(track_arg(&mut parts)),
        "t" | "trig" => LooperCommand::TriggerSelected(TrackIntent::RecordOrPlay),
        "v" | "vol" => {
            let track = track_arg(&mut parts)?;
            let volume: f32 = parts.next()?.parse().ok()?;
            LooperCommand::SetVolume { track, volume }
        }
        "stopall" => LooperCommand::StopAll,
        "clearall" => LooperCommand::ClearAll,
        "st" | "status" => return Some(Input::Status),
        "h" | "help" => return Some(Input::Help),
        "q" | "quit" => return Some(Input::Quit),
        _ => return None,
    };
    Some(Input::Command(cmd))
}

fn print_help() {
    println!("commands:");
    println!("  r <n>        record or play track n");
    println!("  p <n>        play track n");
    println!("  s <n>        stop track n");
    println!("  c <n>        clear track n");
    println!("  sel <n>      select track n (sel alone deselects)");
    println!("  t            trigger the selected track");
    println!("  v <n> <vol>  set track n volume (0.0 - 1.0)");
    println!("  stopall / clearall");
    println!("  st           show track status");
    println!("  q            quit");
}

fn print_status(system: &ostinato_core::audio::AudioSystemResult) {
    match system.transport.bpm() {
        Some(bpm) => println!(
            "transport: {:.1} BPM, t={} samples",
            bpm,
            system.transport.current_sample_time()
        ),
        None => println!("transport: no tempo (record a master loop first)"),
    }
    for (i, atomics) in system.track_atomics.iter().enumerate() {
        let master = if atomics.is_master() { " [master]" } else { "" };
        println!(
            "  track {}: {:?}, {} samples{}",
            i + 1,
            atomics.state(),
            atomics.recorded_len(),
            master
        );
    }
}

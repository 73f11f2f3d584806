//! Daemon runtime helpers.
//!
//! Wires the decoder thread, the player thread and the chosen output together, and
//! implements the `play`, `run` and `plugins` subcommands.

use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use crossbeam_channel::Sender;

use crate::config::{OutputSettings, Settings};
use crate::player::{OutputFactory, PlayerCommand, PlayerHandle, spawn_player};
use playd_decoder::config::DecoderConfig;
use playd_decoder::control::{DecoderControl, PlayerControl};
use playd_decoder::input::DefaultInputFactory;
use playd_decoder::output::{AudioOutput, DeviceOutput, PipeOutput};
use playd_decoder::plugin::StreamKinds;
use playd_decoder::registry::DecoderRegistry;
use playd_decoder::song::{Song, SongMapper};
use playd_decoder::thread::DecoderThread;

const STATUS_TIMEOUT: Duration = Duration::from_secs(2);

/// Built-in registry limited to the configured backends.
pub fn build_registry(config: &DecoderConfig) -> Result<DecoderRegistry> {
    let mut registry = DecoderRegistry::builtin();
    if !config.enabled_plugins.is_empty() {
        for name in &config.enabled_plugins {
            if registry.by_name(name).is_none() {
                tracing::warn!(plugin = %name, "unknown decoder plugin in config");
            }
        }
        registry.retain_named(&config.enabled_plugins);
    }
    if registry.is_empty() {
        bail!("no decoder plugins enabled");
    }
    if registry.by_name(&config.default_decoder).is_none() {
        tracing::warn!(
            plugin = %config.default_decoder,
            "default decoder is not available; unmatched streams will fail"
        );
    }
    Ok(registry)
}

fn output_factory(output: OutputSettings) -> OutputFactory {
    Box::new(move || -> Result<Box<dyn AudioOutput>> {
        Ok(match output {
            OutputSettings::Device { device } => Box::new(DeviceOutput::new(device)),
            OutputSettings::Pipe {
                command,
                sample_format,
            } => Box::new(PipeOutput::new(command, sample_format)?),
        })
    })
}

/// Start the decoder and player threads.
pub fn start(settings: &Settings, exit_when_idle: bool) -> Result<PlayerHandle> {
    let registry = build_registry(&settings.decoder)?;
    tracing::info!(
        plugins = ?registry.iter().map(|p| p.name()).collect::<Vec<_>>(),
        "decoder plugins"
    );

    let player = PlayerControl::new();
    let control = Arc::new(DecoderControl::new(player.notify().clone()));
    let pipe = Arc::new(settings.decoder.pipe());

    DecoderThread::new(
        control.clone(),
        Arc::new(registry),
        Arc::new(DefaultInputFactory::new(settings.decoder.http.clone())),
        SongMapper::new(settings.music_dir.clone()),
        pipe.clone(),
    )
    .with_default_decoder(settings.decoder.default_decoder.clone())
    .spawn()
    .context("spawn decoder thread")?;

    spawn_player(
        control,
        pipe,
        output_factory(settings.output.clone()),
        exit_when_idle,
    )
}

fn install_ctrlc(cmd_tx: Sender<PlayerCommand>) {
    let _ = ctrlc::set_handler(move || {
        if cmd_tx.send(PlayerCommand::Quit).is_err() {
            std::process::exit(130);
        }
    });
}

/// Play `songs` in order and return once the last one has finished.
pub fn run_play(settings: &Settings, songs: &[String], ctrlc: bool) -> Result<()> {
    let handle = start(settings, true)?;
    if ctrlc {
        install_ctrlc(handle.cmd_tx.clone());
    }
    for locator in songs {
        handle
            .cmd_tx
            .send(PlayerCommand::Enqueue(Song::parse(locator)))
            .context("player thread exited")?;
    }
    handle.join();
    Ok(())
}

/// A parsed stdin control line.
#[derive(Debug)]
enum ControlLine {
    Player(PlayerCommand),
    Status,
}

fn parse_line(line: &str) -> Result<Option<ControlLine>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };
    let needs_arg = |what: &str| -> Result<()> {
        if rest.is_empty() {
            bail!("{verb}: missing {what}");
        }
        Ok(())
    };
    let cmd = match verb.to_ascii_lowercase().as_str() {
        "play" => {
            needs_arg("song")?;
            PlayerCommand::Play(Song::parse(rest))
        }
        "add" => {
            needs_arg("song")?;
            PlayerCommand::Enqueue(Song::parse(rest))
        }
        "stop" => PlayerCommand::Stop,
        "next" => PlayerCommand::Next,
        "pause" => PlayerCommand::PauseToggle,
        "seek" => {
            needs_arg("position")?;
            let secs: f64 = rest
                .parse()
                .with_context(|| format!("seek: bad position {rest:?}"))?;
            PlayerCommand::Seek(secs)
        }
        "status" => return Ok(Some(ControlLine::Status)),
        "quit" | "exit" => PlayerCommand::Quit,
        other => bail!("unknown command: {other}"),
    };
    Ok(Some(ControlLine::Player(cmd)))
}

fn print_status(cmd_tx: &Sender<PlayerCommand>) -> Result<()> {
    let (tx, rx) = crossbeam_channel::bounded(1);
    cmd_tx
        .send(PlayerCommand::Status(tx))
        .context("player thread exited")?;
    let status = rx
        .recv_timeout(STATUS_TIMEOUT)
        .context("player did not answer status request")?;
    println!("{}", serde_json::to_string(&status)?);
    Ok(())
}

/// Serve control lines from stdin until `quit` or end of input.
pub fn run_stdin(settings: &Settings, ctrlc: bool) -> Result<()> {
    let handle = start(settings, false)?;
    if ctrlc {
        install_ctrlc(handle.cmd_tx.clone());
    }
    tracing::info!("reading commands from stdin");

    for line in std::io::stdin().lock().lines() {
        let line = line.context("read stdin")?;
        match parse_line(&line) {
            Ok(None) => {}
            Ok(Some(ControlLine::Status)) => {
                if let Err(err) = print_status(&handle.cmd_tx) {
                    tracing::warn!("status failed: {err:#}");
                }
            }
            Ok(Some(ControlLine::Player(cmd))) => {
                let quit = matches!(cmd, PlayerCommand::Quit);
                if handle.cmd_tx.send(cmd).is_err() || quit {
                    break;
                }
            }
            Err(err) => eprintln!("error: {err:#}"),
        }
    }

    let _ = handle.cmd_tx.send(PlayerCommand::Quit);
    handle.join();
    Ok(())
}

/// Print the enabled decoder plugins to stdout.
pub fn list_plugins(settings: &Settings) -> Result<()> {
    let registry = build_registry(&settings.decoder)?;
    for plugin in registry.iter() {
        let mut kinds = Vec::new();
        if plugin.stream_kinds().contains(StreamKinds::FILE) {
            kinds.push("file");
        }
        if plugin.stream_kinds().contains(StreamKinds::URL) {
            kinds.push("url");
        }
        println!(
            "{:<10} kinds={} suffixes={} mime={}",
            plugin.name(),
            kinds.join(","),
            plugin.suffixes().join(","),
            plugin.mime_types().join(",")
        );
    }
    Ok(())
}

/// List output devices and print them to stdout.
pub fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    playd_decoder::output::list_devices(&host)
}

// src/main.rs

//! The terminal front end for the vigil console core.

use anyhow::{Context, Result, anyhow, bail};
use serde_json::json;
use std::env;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{filter::EnvFilter, prelude::*};
use vigil::config::Config;
use vigil::core::ConsoleState;
use vigil::core::realtime::{ChannelEvent, Listener, channels};
use vigil::core::session::LoginCredentials;

const USAGE: &str = "\
Usage: vigil [--config <path>] <command>

Commands:
  login <username> [--mfa <code>]   log in (password read from VIGIL_PASSWORD)
  logout                            end the session
  whoami                            show the logged-in user
  refresh                           renew the access token
  can <permission>                  check a permission, e.g. cameras:write
  watch <channel>...                stream events: alerts, system, detections[:<camera>],
                                    camera:<id>, or a raw channel key";

#[tokio::main]
async fn main() -> Result<()> {
    run_app().await
}

async fn run_app() -> Result<()> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let mut args: Vec<String> = env::args().skip(1).collect();

    // Handle --version before touching config or logging.
    if args.iter().any(|arg| arg == "--version") {
        println!("vigil version {VERSION}");
        return Ok(());
    }

    // 1. Load configuration. The path can be given with --config; otherwise "vigil.toml",
    // falling back to built-in defaults when that file does not exist.
    let config_path = take_flag_value(&mut args, "--config")?.unwrap_or_else(|| "vigil.toml".into());
    let config = match Config::from_file_or_default(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration from \"{config_path}\": {e:#}");
            std::process::exit(1);
        }
    };

    // 2. Initialize logging. RUST_LOG overrides the configured level.
    let log_level = env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());
    tracing_subscriber::registry()
        .with(EnvFilter::new(log_level))
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_ansi(true)
                .with_writer(std::io::stderr),
        )
        .init();

    let Some(command) = args.first().cloned() else {
        println!("{USAGE}");
        return Ok(());
    };

    // 3. Build the console and restore any persisted session.
    let console = ConsoleState::from_config(config).context("Failed to build console")?;
    console.session.initialize().await;

    // 4. Dispatch the command.
    if let Err(e) = run_command(&console, &command, &args[1..]).await {
        error!("{:#}", e);
        return Err(e);
    }
    Ok(())
}

async fn run_command(console: &ConsoleState, command: &str, rest: &[String]) -> Result<()> {
    match command {
        "login" => login(console, rest).await,
        "logout" => {
            console.logout().await;
            println!("Logged out.");
            Ok(())
        }
        "whoami" => {
            match console.session.user() {
                Some(user) => println!("{} ({}, id {})", user.username, user.role, user.id),
                None => println!("Not logged in."),
            }
            Ok(())
        }
        "refresh" => {
            let user = console
                .session
                .refresh()
                .await
                .context("Session could not be refreshed and has been cleared")?;
            println!("Session refreshed for {}.", user.username);
            Ok(())
        }
        "can" => {
            let permission = rest
                .first()
                .ok_or_else(|| anyhow!("'can' needs a permission, e.g. cameras:write"))?;
            let verdict = if console.session.has_permission(permission) {
                "allowed"
            } else {
                "denied"
            };
            println!("{verdict}");
            Ok(())
        }
        "watch" => watch(console, rest).await,
        other => {
            println!("{USAGE}");
            bail!("unknown command '{other}'")
        }
    }
}

async fn login(console: &ConsoleState, rest: &[String]) -> Result<()> {
    let mut rest = rest.to_vec();
    let mfa_code = take_flag_value(&mut rest, "--mfa")?;
    let username = rest
        .first()
        .ok_or_else(|| anyhow!("'login' needs a username"))?;
    let password =
        env::var("VIGIL_PASSWORD").context("Set VIGIL_PASSWORD to the account password")?;

    // The MFA code is only sent when given.
    let mut credentials = LoginCredentials::new(username.as_str(), password);
    if let Some(code) = mfa_code {
        credentials = credentials.with_mfa_code(code);
    }

    match console.session.login(&credentials).await {
        Ok(user) => {
            println!("Logged in as {} ({}).", user.username, user.role);
            Ok(())
        }
        Err(failure) => bail!("{}", failure.message),
    }
}

async fn watch(console: &ConsoleState, targets: &[String]) -> Result<()> {
    if targets.is_empty() {
        bail!("'watch' needs at least one channel");
    }

    let mut subscriptions = Vec::with_capacity(targets.len());
    for target in targets {
        let key = channel_key_for(target);
        let listener_key = key.clone();
        let listener: Listener = Arc::new(move |event: &ChannelEvent| {
            let line = match event {
                ChannelEvent::Connected => json!({ "channel": listener_key, "event": "connected" }),
                ChannelEvent::Disconnected => {
                    json!({ "channel": listener_key, "event": "disconnected" })
                }
                ChannelEvent::Error(message) => {
                    json!({ "channel": listener_key, "event": "error", "message": message })
                }
                ChannelEvent::Message(data) => {
                    json!({ "channel": listener_key, "event": "message", "data": data })
                }
            };
            println!("{line}");
        });
        let subscription = console
            .subscribe(&key, listener)
            .with_context(|| format!("Cannot watch '{key}'; log in first"))?;
        subscriptions.push(subscription);
    }

    // Block until interrupted, then tear down every channel.
    info!("Watching {} channel(s). Press Ctrl-C to stop.", subscriptions.len());
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    for subscription in &subscriptions {
        subscription.unsubscribe();
    }
    console.channels.disconnect_all();
    Ok(())
}

/// Maps the CLI's channel shorthands onto channel keys.
fn channel_key_for(target: &str) -> String {
    match target {
        "alerts" => channels::alerts(),
        "system" => channels::system(),
        "detections" => channels::detections(None),
        _ => {
            if let Some(camera) = target.strip_prefix("detections:") {
                channels::detections(Some(camera))
            } else if let Some(camera) = target.strip_prefix("camera:") {
                channels::camera_stream(camera)
            } else {
                target.to_string()
            }
        }
    }
}

/// Removes `flag` and its value from `args`, returning the value.
fn take_flag_value(args: &mut Vec<String>, flag: &str) -> Result<Option<String>> {
    let Some(index) = args.iter().position(|arg| arg == flag) else {
        return Ok(None);
    };
    if index + 1 >= args.len() {
        bail!("{flag} flag requires a value");
    }
    let value = args.remove(index + 1);
    args.remove(index);
    Ok(Some(value))
}

//! Control-box service entry point.
//!
//! Wires together the relay listeners, the authorization thread, and the
//! LED/LCD threads, then blocks until Ctrl-C.
//!
//! ```text
//! main()
//!  ├─ load config, init tracing
//!  ├─ RelayServer::start      (5 Tokio tasks: 2 accept, 3 forward)
//!  ├─ AuthMachine::run        (dedicated thread)
//!  ├─ run_led_loop            (dedicated thread)
//!  └─ run_lcd_loop            (dedicated thread)
//! ```
//!
//! This binary carries no camera/RFID/GPIO drivers; it starts with the
//! placeholder collaborators, which leave the rig permanently unauthorized
//! unless `auth.enabled = false` opens display admission for bench use.
//! Deployments with hardware attached wire their drivers through
//! [`rodlink_control::auth::AuthMachine`] instead.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use rodlink_core::config::{load_config, AppConfig};
use rodlink_core::net::tls;

use rodlink_control::auth::collaborators::{UnavailableFaceScanner, UnavailableRfidReader};
use rodlink_control::auth::{AuthMachine, AuthTimings};
use rodlink_control::devices::{run_lcd_loop, run_led_loop, LogLcd, LogLedBank};
use rodlink_control::relay::RelayServer;
use rodlink_control::state::SharedDeviceState;

/// Control-box relay and authorization service.
#[derive(Parser, Debug)]
#[command(name = "rodlink-control")]
#[command(about = "Reactor-rod demonstrator control box")]
#[command(version)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "rodlink.toml")]
    config: PathBuf,

    /// Log level override (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config: AppConfig =
        load_config(&args.config).with_context(|| format!("loading {:?}", args.config))?;

    let level = args
        .log_level
        .unwrap_or_else(|| config.service.log_level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    info!("*** rodlink control box starting ***");

    let state = SharedDeviceState::new(config.refresh.clone());
    let shutdown = Arc::new(AtomicBool::new(false));

    // ── TLS ───────────────────────────────────────────────────────────────────
    let acceptor = if config.tls.enabled {
        let acceptor = tls::server_acceptor(
            &config.tls.cert_path(),
            &config.tls.key_path(),
            &config.tls.ca_path(),
        )
        .context("building TLS acceptor")?;
        info!(cert_dir = %config.tls.cert_dir.display(), "mutual TLS enabled");
        Some(acceptor)
    } else {
        None
    };

    // ── Relay listeners ───────────────────────────────────────────────────────
    let stream_addr = format!(
        "{}:{}",
        config.network.bind_address, config.network.stream_port
    );
    let control_addr = format!(
        "{}:{}",
        config.network.bind_address, config.network.control_port
    );
    let stream_listener = TcpListener::bind(&stream_addr)
        .await
        .with_context(|| format!("binding stream listener on {stream_addr}"))?;
    let control_listener = TcpListener::bind(&control_addr)
        .await
        .with_context(|| format!("binding control listener on {control_addr}"))?;
    info!(%stream_addr, %control_addr, "relay listening");

    let relay = RelayServer::start(
        stream_listener,
        control_listener,
        acceptor,
        Arc::clone(&state),
        Arc::clone(&shutdown),
    );

    // ── Hardware threads ──────────────────────────────────────────────────────
    let mut threads = Vec::new();

    if config.auth.enabled {
        let machine = AuthMachine::new(
            Arc::clone(&state),
            UnavailableFaceScanner::new(),
            UnavailableRfidReader::new(),
            config.auth.approved_users.clone(),
            AuthTimings::from(&config.auth),
            Arc::clone(&shutdown),
        );
        threads.push(std::thread::spawn(move || machine.run()));
    } else {
        warn!("authorization disabled in config; admitting display clients unconditionally");
        state.open_admission();
    }

    {
        let led_state = Arc::clone(&state);
        let led_shutdown = Arc::clone(&shutdown);
        threads.push(std::thread::spawn(move || {
            run_led_loop(led_state, LogLedBank, led_shutdown)
        }));
    }
    {
        let lcd_state = Arc::clone(&state);
        let lcd_shutdown = Arc::clone(&shutdown);
        threads.push(std::thread::spawn(move || {
            run_lcd_loop(lcd_state, LogLcd, lcd_shutdown)
        }));
    }

    // ── Shutdown handling ─────────────────────────────────────────────────────
    let signal_flag = Arc::clone(&shutdown);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            signal_flag.store(true, Ordering::Relaxed);
        }
    });

    info!("control box ready; press Ctrl-C to exit");
    while !shutdown.load(Ordering::Relaxed) {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }

    relay.stop().await;
    for handle in threads {
        let _ = handle.join();
    }

    info!("*** rodlink control box stopped ***");
    Ok(())
}

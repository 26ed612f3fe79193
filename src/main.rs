//! surface-bind - drive a MIDI control surface from reactive bindings
//!
//! Runs the demonstration layout against a hardware surface: inbound MIDI
//! is routed through the binding core, feedback is flushed at a fixed
//! interval, and preference values follow the config file.

use anyhow::Result;
use clap::Parser;
use std::time::Duration;
use surface_bind::config::{AppConfig, PreferenceWatcher};
use surface_bind::ports::SurfacePorts;
use surface_bind::prefs::Preferences;
use surface_bind::scheduler::MonotonicClock;
use surface_bind::Surface;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod layout;

use crate::layout::Layout;

/// Editors write in several steps; re-read once the file is quiet this long
const RELOAD_QUIET: Duration = Duration::from_millis(250);

/// Bind a MIDI control surface to application state
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// List available MIDI ports
    #[arg(long)]
    list_ports: bool,
}

// The binding core is !Send; everything runs on one thread
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    init_logging(&args.log_level)?;

    if args.list_ports {
        SurfacePorts::print_ports();
        return Ok(());
    }

    info!("Starting surface-bind...");
    info!("Configuration file: {}", args.config);

    let (preference_watcher, initial_config) =
        PreferenceWatcher::new(args.config.clone(), RELOAD_QUIET).await?;
    info!("Configuration loaded; preferences reload on change");

    run_app(initial_config, preference_watcher, shutdown_signal()).await?;

    info!("surface-bind shutdown complete");
    Ok(())
}

async fn run_app(
    config: AppConfig,
    mut preference_watcher: PreferenceWatcher,
    shutdown: impl std::future::Future<Output = ()>,
) -> Result<()> {
    let surface = Surface::new(config.timing);
    let prefs = Preferences::new();
    let layout = Layout::build(&surface, &prefs, config.surface.channel)?;

    if let Err(e) = prefs.apply(&config.preferences) {
        warn!("Ignoring preferences from config: {}", e);
    }

    let mut ports = SurfacePorts::new(&config.midi.input_port, &config.midi.output_port);
    ports.connect()?;
    let mut inbound = ports
        .take_event_receiver()
        .ok_or_else(|| anyhow::anyhow!("Failed to get surface event receiver"))?;

    let clock = MonotonicClock::new();
    let mut flush_interval =
        tokio::time::interval(Duration::from_millis(config.surface.flush_interval_ms));
    flush_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    info!("Ready to process MIDI events!");

    tokio::pin!(shutdown);

    loop {
        let next_timer = surface.next_deadline_ms().map(|ms| clock.instant_at(ms));
        let timer = async move {
            match next_timer {
                Some(at) => tokio::time::sleep_until(at.into()).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            Some(event) = inbound.recv() => {
                match event.message.as_inbound() {
                    Some(msg) => {
                        let at_ms = clock.ms_at(event.timestamp);
                        if !surface.handle_inbound(&msg, at_ms) {
                            debug!("Unhandled: {}", event.message);
                        }
                    }
                    None => debug!("Ignoring {}", event.message),
                }
            }

            _ = timer => {
                surface.advance_to(clock.now_ms());
            }

            _ = flush_interval.tick() => {
                let feedback = surface.flush();
                let program_changes = layout.take_program_changes();
                for message in feedback.iter().map(|f| f.to_midi()).chain(program_changes) {
                    if let Err(e) = ports.send(&message) {
                        warn!("Failed to send to surface: {}", e);
                    }
                }
            }

            Some(update) = preference_watcher.next_update() => {
                for section in &update.restart_required {
                    warn!("Config section '{}' changed; restart to apply it", section);
                }
                if !update.changed.is_empty() {
                    // Feedback for affected values goes out with the next flush
                    match prefs.apply(&update.changed) {
                        Ok(changed) => info!("Preferences reloaded ({} changed)", changed),
                        Err(e) => warn!("Failed to apply preferences (keeping old values): {}", e),
                    }
                }
            }

            _ = &mut shutdown => {
                info!("Shutdown signal received, stopping event loop");
                break;
            }
        }
    }

    info!(
        "Stopped in {} mode with {} saved snapshots",
        layout.mode(),
        layout.snapshots().saved_count()
    );
    ports.disconnect();
    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for CTRL+C: {}", e);
        std::future::pending::<()>().await;
    }
}

//! Emergency detection and alert dispatch service.
//!
//! Reads sensor, speech and UI events as JSON lines on stdin (see
//! [`feed`]), runs the detectors over them and dispatches SOS episodes to the
//! emergency contacts. Contacts, location history and unsent alerts live in
//! SQLite and are reconciled with the safety backend whenever it is reachable.

mod app;
mod bridge;
mod config;
mod feed;
mod health;
mod refresh;

use std::sync::Arc;

use clap::Parser;
use database::Database;
use detectors::{
    event_channel, AccelBus, ChannelRecognizer, FallConfig, FallMonitor, ShakeConfig,
    ShakeMonitor, VoiceConfig, VoiceMonitor,
};
use orchestrator::{LoggingRecorder, LoggingTelephony, SosConfig, SosCoordinator, SosServices};
use repositories::{
    sync_channel, AlertRepository, Connectivity, ContactRepository, LocationRepository,
};
use safety_api::{SafetyBackend, SafetyClient};
use sync_worker::{scheduler, SyncConfig, SyncReconciler};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app::App;
use crate::config::Config;

#[derive(Debug, Parser)]
#[command(name = "guardian")]
#[command(about = "Detect emergencies and alert emergency contacts")]
struct Args {
    /// SQLite database URL (overrides GUARDIAN_DATABASE_URL)
    #[arg(long)]
    database_url: Option<String>,

    /// Safety backend base URL (overrides GUARDIAN_BACKEND_URL)
    #[arg(long)]
    backend_url: Option<String>,

    /// Do not start the shake monitor
    #[arg(long)]
    no_shake: bool,

    /// Do not start the fall monitor
    #[arg(long)]
    no_fall: bool,

    /// Do not start the voice monitor
    #[arg(long)]
    no_voice: bool,

    /// Keep running after stdin closes, until interrupted
    #[arg(long)]
    keep_running: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let mut config = Config::from_env()?;
    if let Some(url) = args.database_url.clone() {
        config.database_url = url;
    }
    if let Some(url) = args.backend_url.clone() {
        config.backend.base_url = url;
    }
    info!(
        database = %config.database_url,
        backend = %config.backend.base_url,
        user_id = %config.user_id,
        "Starting guardian"
    );

    let db = Database::connect(&config.database_url).await?;
    db.migrate().await?;

    let backend: Arc<dyn SafetyBackend> = Arc::new(SafetyClient::new(config.backend.clone())?);
    let connectivity = Connectivity::new(false);
    let (requester, requests) = sync_channel();

    let contacts = Arc::new(ContactRepository::new(
        db.clone(),
        backend.clone(),
        connectivity.clone(),
        requester.clone(),
    ));
    let alerts = Arc::new(AlertRepository::new(
        db.clone(),
        backend.clone(),
        config.user_id.clone(),
        connectivity.clone(),
        requester,
    ));
    let locations = Arc::new(
        LocationRepository::open(
            db,
            backend.clone(),
            config.user_id.clone(),
            connectivity.clone(),
            config.retention,
        )
        .await?,
    );

    let reconciler = Arc::new(SyncReconciler::new(
        contacts.clone(),
        alerts.clone(),
        connectivity.clone(),
        SyncConfig {
            interval: config.sync_interval,
            ..SyncConfig::default()
        },
    ));
    let _sync = scheduler::spawn(reconciler, requests);
    let _refresh = refresh::spawn(contacts.clone(), connectivity.clone());
    let _health = health::spawn(backend, connectivity.clone(), config.health_interval);

    let (sos, _coordinator) = SosCoordinator::spawn(
        SosServices {
            contacts: contacts.clone(),
            alerts,
            locations: locations.clone(),
            telephony: Arc::new(LoggingTelephony::new(
                config.sms_permission,
                config.call_permission,
            )),
            recorder: Arc::new(LoggingRecorder),
        },
        SosConfig::default(),
    );

    let (events, detector_events) = event_channel();
    let _bridge = bridge::spawn(detector_events, sos.clone());

    let bus = AccelBus::default();
    let shake = if args.no_shake {
        None
    } else {
        Some(ShakeMonitor::new(ShakeConfig::default()).spawn(&bus, events.clone())?)
    };
    let fall = if args.no_fall {
        None
    } else {
        Some(FallMonitor::new(FallConfig::default()).spawn(&bus, events.clone())?)
    };
    let (voice, speech) = if args.no_voice {
        (None, None)
    } else {
        let (speech, recognizer) = ChannelRecognizer::new();
        match VoiceMonitor::new(recognizer, VoiceConfig::default())
            .spawn(events.clone())
            .await
        {
            Ok(handle) => (Some(handle), Some(speech)),
            Err(e) => {
                warn!(error = %e, "Voice monitor unavailable; continuing without it");
                (None, None)
            }
        }
    };
    drop(events);

    let app = App {
        bus,
        shake,
        fall,
        voice,
        speech,
        sos,
        connectivity,
        contacts,
        locations,
    };

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut input_open = true;

    info!("Listening for events on stdin");
    loop {
        tokio::select! {
            line = lines.next_line(), if input_open => match line {
                Ok(Some(line)) => match feed::parse_line(&line) {
                    Ok(Some(event)) => app.handle(event).await,
                    Ok(None) => {}
                    Err(e) => warn!(error = %e, "Ignoring malformed input line"),
                },
                Ok(None) => {
                    info!("Input closed");
                    if !args.keep_running {
                        break;
                    }
                    input_open = false;
                }
                Err(e) => {
                    error!(error = %e, "Failed to read input");
                    break;
                }
            },
            result = &mut shutdown => {
                if let Err(e) = result {
                    error!(error = %e, "Failed to listen for interrupt");
                }
                info!("Interrupted");
                break;
            }
        }
    }

    app.shutdown().await;
    info!("Guardian stopped");
    Ok(())
}

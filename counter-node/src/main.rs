mod api;
mod camera;
mod config;
mod counting;
mod error;
mod imaging;
mod inference;
mod metrics;
mod settings;
mod state;
mod storage;

use actix_web::{web, App, HttpServer};
use anyhow::Context;
use clap::Parser;
use crate::config::{NodeConfig, SourceKind};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use trafficount_simulator::Scene;

use camera::{CameraSource, HttpSnapshotSource, SimulatedCameraSource};
use counting::CounterLifecycle;
use inference::{ModelLoader, RemoteTrackerLoader, SimulatedTrackerLoader};
use metrics::Metrics;
use settings::Settings;
use state::CounterState;
use storage::PgClient;

#[derive(Parser, Debug)]
#[command(author, version, about = "People-counting appliance", long_about = None)]
struct Args {
    /// Config file path
    #[arg(short, long, default_value = "config/trafficount.yaml")]
    config: String,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Print the effective configuration as YAML and exit
    #[arg(long)]
    print_config: bool,
}

/// Shared with every web handler.
pub struct AppState {
    pub state: Arc<CounterState>,
    pub pg: Arc<PgClient>,
    pub settings_path: PathBuf,
    pub jpeg_quality: u8,
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level)?;

    let config = load_config(&args.config)?;
    if args.print_config {
        print!("{}", serde_yaml::to_string(&config)?);
        return Ok(());
    }

    info!("Starting Trafficount ({:?} source)", config.source.kind);

    let settings = initial_settings(&config).await;
    let state = CounterState::new(settings, Metrics::new()?);

    let pg = Arc::new(PgClient::new(state.clone(), config.database.clone())?);
    tokio::spawn(pg.clone().run());

    let (cameras, models) = build_sources(&config)?;
    let lifecycle = CounterLifecycle::new(state.clone(), cameras, models, pg.clone(), &config);
    lifecycle.spawn();

    let app_state = web::Data::new(AppState {
        state,
        pg,
        settings_path: config.storage.settings_path.clone(),
        jpeg_quality: config.source.jpeg_quality,
    });

    let bind = (config.server.host.clone(), config.server.port);
    let server = HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .configure(api::configure)
    })
    .bind(bind.clone())
    .with_context(|| format!("Failed to bind {}:{}", bind.0, bind.1))?
    .run();

    info!("Dashboard listening on http://{}:{}", bind.0, bind.1);

    server.await?;

    info!("Trafficount stopped");
    Ok(())
}

fn init_logging(level: &str) -> anyhow::Result<()> {
    let log_level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install the log subscriber")?;

    Ok(())
}

fn load_config(path: &str) -> anyhow::Result<NodeConfig> {
    let settings = ::config::Config::builder()
        .add_source(::config::File::with_name(path).required(false))
        .add_source(::config::Environment::with_prefix("TRAFFICOUNT").separator("__"))
        .build()
        .with_context(|| format!("Failed to read configuration {}", path))?;

    settings
        .try_deserialize()
        .context("Invalid node configuration")
}

/// Runtime settings from the settings file, or the defaults when it is
/// missing or partly invalid.
async fn initial_settings(config: &NodeConfig) -> Settings {
    let mut runtime = Settings::default();
    let path = &config.storage.settings_path;

    match settings::load_from_file(path).await {
        Ok(values) => {
            for refused in runtime.apply(&values) {
                warn!("Ignoring saved setting {}", refused);
            }
        }
        Err(e) => warn!("No saved settings loaded from {}: {}", path.display(), e),
    }
    runtime
}

fn build_sources(config: &NodeConfig) -> anyhow::Result<(Box<dyn CameraSource>, Box<dyn ModelLoader>)> {
    let source = &config.source;
    let cameras: Box<dyn CameraSource>;
    let models: Box<dyn ModelLoader>;

    match source.kind {
        SourceKind::Simulated => {
            let scene = Arc::new(Mutex::new(Scene::new(source.scene.clone())));
            cameras = Box::new(SimulatedCameraSource::new(scene.clone()));
            models = Box::new(SimulatedTrackerLoader::new(scene));
        }
        SourceKind::Http => {
            cameras = Box::new(HttpSnapshotSource::new(
                source.camera_url.clone(),
                source.request_timeout(),
            )?);
            models = Box::new(RemoteTrackerLoader::new(
                source.tracker_url.clone(),
                source.request_timeout(),
                source.jpeg_quality,
            )?);
        }
    }

    Ok((cameras, models))
}

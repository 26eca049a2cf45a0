use log::{error, info};
use rand::rngs::StdRng;
use rand::SeedableRng;

use helmet_sim::config::SimulatorConfig;
use helmet_sim::error::SimulatorError;
use helmet_sim::models::SessionStats;
use helmet_sim::service::HttpStatusService;
use helmet_sim::session;
use helmet_sim::transport::{MqttTransport, Topics};

async fn run_simulation(config: SimulatorConfig) -> Result<SessionStats, SimulatorError> {
    let service = HttpStatusService::new(&config.service)?;

    let rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mqtt = config.mqtt;
    let topics = Topics::new(&config.session.device_id);
    session::launch(
        config.session,
        &service,
        || MqttTransport::connect(&mqtt, topics),
        rng,
    )
    .await
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_timestamp_secs()
        .init();

    // Load configuration
    let config = match SimulatorConfig::new() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    info!("Smart helmet simulator starting up");
    config.log_summary();

    // Ctrl+C ends the whole process; there is no mid-cycle abort
    let (tx, mut rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = tx.send(());
        }
    });

    tokio::select! {
        result = run_simulation(config) => {
            match result {
                Ok(_) => info!("Simulation completed successfully"),
                Err(e) => {
                    error!("Fatal error: {}", e);
                    return Err(e.into());
                }
            }
        }
        Ok(()) = &mut rx => {
            info!("Simulation terminated by user. Exiting.");
        }
    }

    Ok(())
}

use std::{sync::Arc, time::Duration};

use crate::{
    backend::SchedulerBackend,
    configuration::Configuration,
    configuration_handler::{load_availability_seed, ConfigurationHandler},
    database_interface::DatabaseInterface,
    http::create_app,
    local_store::LocalStore,
    notifier::LogNotifier,
    scheduler::{Scheduler, SchedulerSettings},
};
use tokio::{net::TcpListener, time::sleep};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod backend;
mod configuration;
mod configuration_handler;
mod database_interface;
mod error;
mod http;
mod local_store;
mod notifier;
mod scheduler;
mod schema;
mod slots;
#[cfg(test)]
mod testutils;
mod types;

fn seed_availability<B: SchedulerBackend>(scheduler: &Scheduler<B>, configuration: &impl Configuration) {
    let Some(path) = configuration.availability_file() else {
        return;
    };
    let seed = match load_availability_seed(&path) {
        Ok(seed) => seed,
        Err(err) => {
            warn!(%err, "Skipping availability seed");
            return;
        }
    };
    for entry in seed {
        match scheduler.add_window(entry.host_id, entry.window) {
            Ok(window) => info!(window_id = %window.id, host_id = %window.host_id, "Seeded availability window"),
            Err(err) => warn!(%err, host_id = %entry.host_id, "Skipped availability window"),
        }
    }
}

async fn run<B: SchedulerBackend>(backend: B, configuration: ConfigurationHandler, listener: TcpListener) {
    let scheduler = Scheduler::new(
        backend,
        Arc::new(LogNotifier),
        SchedulerSettings::from_configuration(&configuration),
    );
    seed_availability(&scheduler, &configuration);

    let app = create_app(scheduler, configuration);
    if let Err(err) = axum::serve(listener, app).await {
        error!(?err, "Server stopped");
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("##########################");
    println!("# Consultation Scheduler #");
    println!("##########################");

    let configuration = ConfigurationHandler::parse_arguments();

    let address = format!("0.0.0.0:{}", configuration.port());
    println!("Accessable at:\n{}", address.clone());
    let listener = match TcpListener::bind(&address).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(?err, "Failed to bind {address}");
            return;
        }
    };

    if let Some(database_url) = configuration.database_url() {
        let backend = loop {
            match DatabaseInterface::new(&database_url) {
                Ok(backend) => {
                    info!("Successfully connected to database");
                    break backend;
                }
                Err(err) => {
                    error!(?err, "Failed to establish database connection: {database_url}. Retry in 1 sec. You may want to restart it with database disabled (bookings kept in memory).");
                    sleep(Duration::from_secs(1)).await;
                }
            }
        };
        run(backend, configuration, listener).await;
    } else {
        run(LocalStore::default(), configuration, listener).await;
    }
}

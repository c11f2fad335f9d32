#[macro_use]
extern crate rocket;

use std::sync::Arc;

use rocket::http::Method;
use rocket::{Build, Rocket};
use rocket_cors::{AllowedHeaders, AllowedOrigins};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crate::aggregate::Aggregator;
use crate::config::{Config, StoreBackend};
use crate::enrollment::EnrollmentManager;
use crate::error::{BackendError, ConfigurationError};
use crate::route::mount_api;
use crate::security::Security;
use crate::store::{MemoryStore, MongoStore, SharedStore};

pub mod aggregate;
pub mod config;
pub mod credential;
pub mod data;
pub mod enrollment;
pub mod error;
pub mod resp;
pub mod role;
pub mod route;
pub mod security;
pub mod store;
pub mod util;

#[cfg(test)]
pub mod testing;

pub async fn create(log_level: Option<Level>) -> Result<Rocket<Build>, BackendError> {
    if let Some(l) = log_level {
        let subscriber = FmtSubscriber::builder().with_max_level(l).finish();

        if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
            eprintln!("Unable to set global logger: {}", err);
        };
        if let Err(err) = tracing_log::LogTracer::init() {
            eprintln!("Unable to forward log records: {}", err);
        }
    }

    tracing::info!("Reading .env file...");
    if dotenv::dotenv().is_err() {
        tracing::warn!("Unable to load .env file.");
    }

    tracing::info!("Loading configuration...");
    let c = match Config::load() {
        Ok(c) => {
            tracing::info!("Configuration loaded.");
            c
        }
        Err(ConfigurationError::NotFound(dir)) => {
            tracing::info!("No configuration in '{}', using defaults.", dir.display());
            let c = Config::default();
            if c.save().is_err() {
                tracing::warn!("Unable to save generated configuration.");
            }
            c
        }
        Err(other) => {
            tracing::error!("Configuration error: {}", other);
            return Err(other.into());
        }
    };

    let security = Security::load(&c)?;

    let store: SharedStore = match c.store {
        StoreBackend::MongoDb => {
            tracing::info!("Connecting to MongoDB: {}", c.mongodb_uri);
            let mongo = MongoStore::connect(&c.mongodb_uri, &c.mongodb_db, c.store_timeout()).await?;
            mongo.ensure_indexes().await?;
            tracing::info!("Using MongoDB database: {}", c.mongodb_db);
            Arc::new(mongo)
        }
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store. Nothing will be persisted.");
            Arc::new(MemoryStore::new())
        }
    };

    build(c, security, store)
}

/// Assembles the server around an already opened store.
pub fn build(
    config: Config,
    security: Security,
    store: SharedStore,
) -> Result<Rocket<Build>, BackendError> {
    tracing::info!("Setting up CORS...");
    let allowed_origins = if config.allowed_origins.is_empty() {
        AllowedOrigins::All
    } else {
        AllowedOrigins::some_exact(&config.allowed_origins)
    };

    let cors = rocket_cors::CorsOptions {
        allowed_origins,
        allowed_methods: vec![Method::Get, Method::Put, Method::Post, Method::Delete]
            .into_iter()
            .map(From::from)
            .collect(),
        allowed_headers: AllowedHeaders::All,
        allow_credentials: true,
        ..Default::default()
    }
    .to_cors()?;

    let r = rocket::build()
        .manage(EnrollmentManager::new(store.clone()))
        .manage(Aggregator::new(store.clone()))
        .manage(security.token_service())
        .manage(store)
        .manage(security)
        .manage(config)
        .attach(cors);

    Ok(mount_api(r))
}

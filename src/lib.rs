#[macro_use]
extern crate rocket;
#[macro_use]
extern crate serde;
#[macro_use]
extern crate lazy_static;

use error::BackendError;
use mongodb::{Client, Database};
use rocket::http::Method;
use rocket::Rocket;
use rocket_cors::{AllowedHeaders, AllowedOrigins};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crate::config::Config;
use crate::error::ConfigurationError;
use crate::route::mount_api;
use crate::security::Security;

pub mod config;
pub mod data;
pub mod error;
pub mod resp;
pub mod role;
pub mod route;
pub mod security;
pub mod util;

lazy_static! {
    pub static ref SECURITY: Security = Security::load();
}

pub fn init_logging(log_level: Option<Level>) {
    if let Some(l) = log_level {
        let subscriber = FmtSubscriber::builder().with_max_level(l).finish();

        if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
            eprintln!("Unable to set global logger: {}", err);
        };
    }
}

pub fn load_config() -> Result<Config, BackendError> {
    tracing::info!("Reading .env file...");
    if dotenv::dotenv().is_err() {
        tracing::warn!("Unable to load .env file.");
    }

    tracing::info!("Loading configuration...");
    match Config::load() {
        Ok(c) => {
            tracing::info!("Configuration loaded.");
            Ok(c)
        }
        Err(ConfigurationError::NotFound(_)) => {
            let c = Config::default();
            if c.save().is_err() {
                tracing::warn!("Unable to save generated configuration.");
            }
            Ok(c)
        }
        Err(other) => {
            tracing::error!("Configuration error: {}", other);
            Err(other.into())
        }
    }
}

pub async fn connect_database(c: &Config) -> Result<Database, BackendError> {
    tracing::info!("Connecting to MongoDB: {}", c.mongodb_uri);
    let client = Client::with_uri_str(c.mongodb_uri.as_str()).await?;

    tracing::info!("Using MongoDB database: {}", c.mongodb_db);
    let db = client.database(c.mongodb_db.as_str());

    if let Err(e) = db.list_collection_names(None).await {
        tracing::error!("Unable to connect to MongoDB.");
        return Err(e.into());
    }

    Ok(db)
}

pub async fn create(log_level: Option<Level>) -> Result<Rocket<rocket::Build>, BackendError> {
    init_logging(log_level);

    let c = load_config()?;

    tracing::info!("Initializing security information...");
    let security: Security = SECURITY.clone();

    let db = connect_database(&c).await?;

    tracing::info!("Setting up CORS...");
    let allowed_origins = if c.allowed_origins.is_empty() {
        AllowedOrigins::All
    } else {
        AllowedOrigins::some_exact(&c.allowed_origins)
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
    .to_cors()
    .expect("Unable to configure CORS.");

    tracing::info!("Starting HTTP server...");
    let mut r = rocket::build().manage(c).manage(db).manage(security);
    r = r.attach(cors);
    r = mount_api(r);

    Ok(r)
}

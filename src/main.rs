use sqlx::postgres::PgPoolOptions;
use std::net::TcpListener;

use refresh_rotation::configuration::get_configuration;
use refresh_rotation::routes::RefreshCookie;
use refresh_rotation::startup::{build_engine, run};
use refresh_rotation::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_telemetry();

    tracing::info!("Starting application");

    let configuration = get_configuration()
        .and_then(|config| config.validate().map(|_| config))
        .map_err(|e| {
            tracing::error!("Failed to load configuration: {}", e);
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "Configuration error")
        })?;
    tracing::info!("Configuration loaded successfully");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&configuration.database.connection_string())
        .await
        .map_err(|e| {
            tracing::error!("Failed to create connection pool: {}", e);
            std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "Database connection error",
            )
        })?;
    tracing::info!("Database connection pool created successfully");

    let engine = build_engine(&configuration.jwt, pool);
    let refresh_cookie =
        RefreshCookie::new(&configuration.cookie, configuration.application.environment);

    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    let listener = TcpListener::bind(&address)?;
    tracing::info!("Server listening on: {}", address);

    run(listener, engine, refresh_cookie)?.await
}

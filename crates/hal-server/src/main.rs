mod cleanup;
mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::http::{
    HeaderValue, Method,
    header::{AUTHORIZATION, CONTENT_TYPE},
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use hal_api::auth::{self, AppState, AppStateInner};
use hal_api::mailer::Mailer;
use hal_api::upload::UploadStore;
use hal_db::Database;
use hal_db::models::NewUser;
use hal_gateway::Dispatcher;
use hal_types::models::UserType;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "hal=debug,hal_api=debug,hal_gateway=debug,hal_db=info,tower_http=debug".into()
            }),
        )
        .init();

    let config = Config::from_env()?;
    if !config.has_usable_secret() {
        eprintln!("FATAL: HAL_JWT_SECRET is unset or still a placeholder.");
        eprintln!("       Set it in your .env file and restart.");
        std::process::exit(1);
    }

    let db = Arc::new(Database::open(&config.db_path)?);
    let seeded = db.seed_locations()?;
    if seeded > 0 {
        info!("Seeded {} cities", seeded);
    }
    if let Some((email, password)) = &config.admin {
        bootstrap_admin(&db, email, password)?;
    }

    let mailer = match &config.smtp {
        Some(smtp) => Mailer::smtp(smtp)?,
        None => {
            warn!("SMTP not configured, outgoing mail will only be logged");
            Mailer::Log
        }
    };
    let uploads = UploadStore::new(config.upload_dir.clone(), &config.public_url).await?;

    let state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret: config.jwt_secret.clone(),
        dispatcher: Dispatcher::new(),
        uploads,
        mailer,
        frontend_url: config.frontend_url.clone(),
    });

    tokio::spawn(cleanup::run_cleanup_loop(state.clone(), config.report_sweep_secs));

    let app = Router::new()
        .merge(hal_api::router(state))
        .nest_service("/uploads", ServeDir::new(&config.upload_dir))
        .layer(cors_layer(&config.cors_origins))
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Hal Kompleksi API listening on {}", addr);
    info!("Serving uploads from {}", config.upload_dir.display());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Create the configured admin account unless that email is already taken.
fn bootstrap_admin(db: &Database, email: &str, password: &str) -> anyhow::Result<()> {
    if db.get_user_by_email(email)?.is_some() {
        return Ok(());
    }
    let password_hash = auth::hash_password(password).map_err(|e| anyhow::anyhow!("{e}"))?;
    let admin = db.create_user(&NewUser {
        name: "Admin",
        email,
        password_hash: &password_hash,
        phone: "",
        user_type: UserType::Admin,
    })?;
    info!("Created admin account {}", admin.email);
    Ok(())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.is_empty() {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| match o.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!("Ignoring invalid CORS origin {}", o);
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(false)
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}

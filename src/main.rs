use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use keysentinel::cli::{self, KeyCommands};
use keysentinel::config::{self, StoreBackend};
use keysentinel::models::credential::{
    generate_sentinel_token, mask_secret, NewCredential,
};
use keysentinel::store::{self, CredentialStore};
use keysentinel::{app, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::load()?;

    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "keysentinel=debug,tower_http=debug".into()),
    );
    let registry = tracing_subscriber::registry().with(filter);
    if cfg.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    let args = cli::Cli::parse();

    let result = match args.command {
        Some(cli::Commands::Serve { port }) => {
            let port = port.unwrap_or(cfg.port);
            run_server(cfg, port).await
        }
        Some(cli::Commands::Key { command }) => handle_key_command(&cfg, command).await,
        None => {
            let port = cfg.port;
            run_server(cfg, port).await
        }
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

async fn run_server(cfg: config::Config, port: u16) -> anyhow::Result<()> {
    tracing::info!(backend = ?cfg.store_backend, "Initializing credential store...");
    let state = Arc::new(AppState::from_config(cfg).await?);

    if state.store.is_none() {
        tracing::warn!("No credential store configured; /api/proxy will answer 500");
    }
    if state.config.admin_key.is_none() {
        tracing::warn!("KEYSENTINEL_ADMIN_KEY not set; management API is disabled");
    }
    tracing::info!(providers = ?state.registry.ids(), "Provider registry loaded");

    let app = app::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("KeySentinel gateway listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn handle_key_command(cfg: &config::Config, cmd: KeyCommands) -> anyhow::Result<()> {
    if cfg.store_backend == StoreBackend::Memory {
        anyhow::bail!("key commands need a persistent store; set KEYSENTINEL_STORE=postgres or remote");
    }
    let store: Arc<dyn CredentialStore> = store::connect(cfg)
        .await?
        .context("KEYSENTINEL_STORE_URL is not set")?;

    match cmd {
        KeyCommands::Add {
            user_id,
            name,
            provider,
            key,
            description,
            notify_email,
            rate_limit,
        } => {
            let cred = store
                .create_credential(NewCredential {
                    owner_id: user_id,
                    name,
                    provider,
                    api_key: key,
                    description,
                    notify_email,
                    rate_limit,
                    scopes: vec![],
                })
                .await?;
            let token = generate_sentinel_token(&cred.id);
            store
                .create_sentinel(&token, &cred.id)
                .await
                .context("failed to store sentinel token")?;

            println!("✅ Key stored");
            println!("   ID:       {}", cred.id);
            println!("   Provider: {}", cred.provider);
            println!("   Sentinel: {}", token);
        }
        KeyCommands::List { user_id } => {
            let keys = store.list_credentials(&user_id).await?;
            if keys.is_empty() {
                println!("No keys found for {}", user_id);
                return Ok(());
            }
            println!(
                "{:<38} {:<20} {:<8} {:<14} {:>10}",
                "ID", "NAME", "PROVIDER", "KEY", "REQUESTS"
            );
            for (cred, sentinel) in keys {
                println!(
                    "{:<38} {:<20} {:<8} {:<14} {:>10}",
                    cred.id,
                    cred.name,
                    cred.provider,
                    mask_secret(&cred.api_key),
                    format!("{}/{}", cred.requests, cred.rate_limit),
                );
                if let Some(token) = sentinel {
                    println!("    sentinel: {}", token);
                }
            }
        }
    }
    Ok(())
}

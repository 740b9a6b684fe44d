use std::{net::SocketAddr, path::Path, sync::Arc, time::Duration};

use axum::{
    Router,
    extract::{ConnectInfo, Request, ws::WebSocketUpgrade},
    http::HeaderMap,
    routing::any,
};
use clap::Parser;
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use warren::{
    ControlSocket, Dispatcher, GatewayHandler, GracefulShutdown, Inspector, MemoryCredentialStore,
    MemoryLogStore, PeerRegistry, Recorder, ReplayEngine,
    config::{ServerConfig, ServerConfigValidator, loader::load_config},
    ports::{credential_store::CredentialStore, log_store::LogStore},
    tracing_setup,
};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(short, long, default_value = "warren.toml")]
    config: String,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        #[clap(short, long, default_value = "warren.toml")]
        config: String,
    },
    /// Start the gateway server (default)
    Serve {
        /// Configuration file to use
        #[clap(short, long, default_value = "warren.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    let (command, config_path) = match args.command {
        Some(Commands::Validate { config }) => ("validate", config),
        Some(Commands::Serve { config }) => ("serve", config),
        None => ("serve", args.config),
    };

    if command == "validate" {
        return validate_config_command(&config_path).await;
    }

    let config: ServerConfig = if Path::new(&config_path).exists() {
        load_config(&config_path)
            .await
            .with_context(|| format!("Failed to load config from {config_path}"))?
    } else {
        eprintln!("Config file {config_path} not found, using defaults");
        ServerConfig::default()
    };

    tracing_setup::init_tracing_with_config(&config.log)
        .map_err(|e| eyre!("Failed to initialize tracing: {}", e))?;

    ServerConfigValidator::validate(&config)
        .map_err(|e| eyre!("Invalid configuration: {}", e))?;

    // Wire the forwarding engine: registry → dispatcher → recorder → stores.
    let registry = Arc::new(PeerRegistry::new());
    let log_store: Arc<MemoryLogStore> = Arc::new(MemoryLogStore::new());
    let credentials: Arc<MemoryCredentialStore> = Arc::new(MemoryCredentialStore::new());
    let recorder = Recorder::spawn(log_store.clone(), &config.recorder);
    let dispatcher = Arc::new(Dispatcher::new(recorder.clone(), &config.dispatch));
    let replay = Arc::new(ReplayEngine::new(
        registry.clone(),
        dispatcher.clone(),
        log_store.clone() as Arc<dyn LogStore>,
        recorder,
        Duration::from_secs(config.dispatch.replay_timeout_secs),
    ));

    for (hostname, password) in &config.inspector.credentials {
        credentials
            .upsert(hostname, password)
            .await
            .map_err(|e| eyre!("Failed to seed credential for {hostname}: {e}"))?;
        tracing::info!(hostname, "seeded inspector credential");
    }

    let control = Arc::new(ControlSocket::new(registry.clone(), config.tunnel.clone()));
    let inspector = Arc::new(Inspector::new(
        log_store.clone() as Arc<dyn LogStore>,
        credentials.clone() as Arc<dyn CredentialStore>,
        replay,
        config.inspector.clone(),
    ));
    let gateway = Arc::new(GatewayHandler::new(
        registry.clone(),
        dispatcher,
        &config.dispatch,
    ));

    let control_route = {
        let control = control.clone();
        any(
            move |ws: WebSocketUpgrade,
                  ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
                  headers: HeaderMap| {
                let control = control.clone();
                async move { control.handle_upgrade(ws, &headers, remote_addr).await }
            },
        )
    };
    let inspector_route = {
        let inspector = inspector.clone();
        any(move |req: Request| {
            let inspector = inspector.clone();
            async move { inspector.handle_request(req).await }
        })
    };
    let public_fallback = {
        let gateway = gateway.clone();
        move |req: Request| {
            let gateway = gateway.clone();
            async move { gateway.handle_request(req).await }
        }
    };

    let app = Router::new()
        .route(&config.tunnel.control_path, control_route)
        .route(&config.inspector.path_prefix, inspector_route)
        .fallback(public_fallback);

    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .context("Failed to parse listen address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    tracing::info!(
        "Warren gateway listening on {} (control: {}, inspector: {})",
        addr,
        config.tunnel.control_path,
        config.inspector.path_prefix
    );

    let graceful_shutdown = Arc::new(GracefulShutdown::new());
    let signals = graceful_shutdown.clone();
    tokio::spawn(async move { signals.listen_for_signals().await });

    tokio::select! {
        result = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        ) => {
            result.context("Server error")?;
        }
        reason = graceful_shutdown.signalled() => {
            tracing::info!(?reason, "stopping accept loop");
        }
    }

    tracing::info!("Warren gateway stopped");
    Ok(())
}

/// Validate configuration file and exit
async fn validate_config_command(config_path: &str) -> Result<()> {
    println!("🔍 Validating configuration file: {config_path}");

    if !Path::new(config_path).exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' not found");
        std::process::exit(1);
    }

    let config = match load_config(config_path).await {
        Ok(config) => {
            println!("✅ Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("❌ Configuration parsing failed:");
            eprintln!("   {e}");
            std::process::exit(1);
        }
    };

    match ServerConfigValidator::validate(&config) {
        Ok(()) => {
            println!("✅ Configuration validation: OK");
            println!();
            println!("📋 Configuration Summary:");
            println!("   • Listen Address: {}", config.listen_addr);
            println!("   • Control Path: {}", config.tunnel.control_path);
            println!("   • Inspector Path: {}", config.inspector.path_prefix);
            println!(
                "   • Buffered Deadline: {}s",
                config.dispatch.buffered_timeout_secs
            );
            println!("   • Log Retention: {} days", config.recorder.retention_days);
            println!(
                "   • Seeded Credentials: {}",
                config.inspector.credentials.len()
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed:");
            eprintln!("{e}");
            println!();
            println!("💡 Common fixes:");
            println!("   • Verify listen address format (e.g., '127.0.0.1:8080')");
            println!("   • Ensure control and inspector paths start with '/' and differ");
            println!("   • Deadlines, retention, and queue capacity must be non-zero");
            std::process::exit(1);
        }
    }
}

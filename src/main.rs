use std::{net::SocketAddr, path::Path, sync::Arc};

use clap::Parser;
use color_eyre::{Result, eyre::WrapErr};
use scatter::{
    HttpClient, HttpClientAdapter, HttpHandler, ProxyService,
    adapters::router,
    config::{ProxyConfigValidator, load_config, loader::load_config_unchecked},
    tracing_setup,
    utils::GracefulShutdown,
};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        #[clap(short, long, default_value = "config.toml")]
        config: String,
    },
    /// Initialize a new configuration file
    Init {
        /// Output path for the new config file
        #[clap(short, long, default_value = "config.toml")]
        config: String,
    },
    /// Start the proxy (default)
    Serve {
        /// Configuration file to use
        #[clap(short, long, default_value = "config.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    match args.command {
        Some(Commands::Validate { config }) => validate_config_command(&config).await,
        Some(Commands::Init { config }) => init_config_command(&config).await,
        Some(Commands::Serve { config }) => serve(&config).await,
        None => serve(&args.config).await,
    }
}

async fn serve(config_path: &str) -> Result<()> {
    let config = load_config(config_path)
        .await
        .wrap_err_with(|| format!("Failed to load config from {config_path}"))?;

    tracing_setup::init_tracing(&config.logging).wrap_err("Failed to initialize tracing")?;
    tracing::info!("Loaded configuration from {config_path}");

    let transport = &config.transport;
    tracing::info!(
        connect_timeout = ?transport.connect_timeout(),
        keepalive = ?transport.keepalive(),
        max_idle_connections = transport.max_idle_connections,
        idle_timeout = ?transport.idle_timeout(),
        tls_handshake_timeout = ?transport.tls_handshake_timeout(),
        expect_continue_timeout = ?transport.expect_continue_timeout(),
        "Upstream transport settings"
    );

    let http_client: Arc<dyn HttpClient> = Arc::new(
        HttpClientAdapter::new(transport).wrap_err("Failed to create HTTP client adapter")?,
    );
    let proxy_service = Arc::new(
        ProxyService::from_config(&config, http_client)
            .wrap_err("Failed to build proxy service")?,
    );
    let app = router(Arc::new(HttpHandler::new(proxy_service)));

    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .wrap_err("Failed to parse listen address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .wrap_err_with(|| format!("Failed to bind to {addr}"))?;

    let graceful_shutdown = GracefulShutdown::new();
    let signal_handler_shutdown = graceful_shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = signal_handler_shutdown.run_signal_handler().await {
            tracing::error!("Signal handler error: {}", e);
        }
    });

    tracing::info!(
        "Scatter listening on {} with {} upstream target(s), selection: {:?}",
        addr,
        config.targets.len(),
        config.selection
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let reason = graceful_shutdown.wait_for_shutdown_signal().await;
        tracing::info!("Shutdown signal received: {:?}", reason);
    })
    .await
    .wrap_err("Server error")?;

    tracing::info!("Graceful shutdown completed");
    Ok(())
}

/// Validate configuration file and exit
async fn validate_config_command(config_path: &str) -> Result<()> {
    println!("🔍 Validating configuration file: {config_path}");

    if !Path::new(config_path).exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' not found");
        std::process::exit(1);
    }

    let config = match load_config_unchecked(config_path).await {
        Ok(config) => {
            println!("✅ Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("❌ Configuration parsing failed:");
            eprintln!("   {e:#}");
            std::process::exit(1);
        }
    };

    match ProxyConfigValidator::validate(&config) {
        Ok(()) => {
            println!("✅ Configuration validation: OK");
            println!();
            println!("📋 Configuration Summary:");
            println!("   • Listen Address: {}", config.listen_addr);
            println!("   • Targets: {}", config.targets.len());
            for target in &config.targets {
                println!("     - {target}");
            }
            println!("   • Selection: {:?}", config.selection);
            println!();
            println!("🎉 Configuration is valid and ready to use!");
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed:");
            eprintln!("{e}");
            println!();
            println!("💡 Common fixes:");
            println!("   • Ensure all target URLs start with http:// or https://");
            println!("   • Verify listen address format (e.g., '127.0.0.1:2000')");
            println!("   • Timeouts must be greater than zero");
            std::process::exit(1);
        }
    }
}

/// Initialize a new configuration file
async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' already exists");
        std::process::exit(1);
    }

    let default_config = r#"# Scatter reverse proxy configuration

# The address to listen on
listen_addr = "127.0.0.1:2000"

# Upstream base URLs; each request goes to one of them
targets = [
    "http://127.0.0.1:2003",
    "http://127.0.0.1:2004",
]

# "random" or "round_robin"
selection = "random"

# Sent upstream when the client did not set a User-Agent
default_user_agent = "user-agent"

[transport]
connect_timeout_secs = 30
keepalive_secs = 30
max_idle_connections = 100
idle_timeout_secs = 90
tls_handshake_timeout_secs = 10
expect_continue_timeout_secs = 1

[transformer]
body_read_timeout_secs = 60

[logging]
level = "info"
json = false
"#;

    tokio::fs::write(path, default_config)
        .await
        .wrap_err("Failed to write config file")?;
    println!("✅ Created default configuration at: {config_path}");
    println!("   Run 'scatter serve --config {config_path}' to start the proxy");
    Ok(())
}

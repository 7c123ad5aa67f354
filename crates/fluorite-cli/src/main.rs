//! fluorite CLI - multi-service dashboard
//!
//! Usage:
//!   fluorite dashboard serve             Run the IPC server in the foreground
//!   fluorite dashboard daemon            Run the IPC server in the background
//!   fluorite dashboard test-connection   Check a running server
//!   fluorite dashboard tui               Open the terminal dashboard
//!   fluorite services list               List supported services
//!   fluorite services info <name>        Show one service descriptor

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use fluorite_core::fail_open::fail_open_with_retries;
use fluorite_core::{Capability, DashboardConfig, FluoriteError, DEFAULT_IPC_PORT};
use fluorite_dashboard::run as run_dashboard;
use fluorite_ipc::error::UNAUTHORIZED;
use fluorite_ipc::{
    dashboard_methods, ClientConfig, Endpoint, IpcClient, IpcError, IpcServer, ServerConfig,
};
use fluorite_orchestrator::DashboardOrchestrator;
use fluorite_services::ServiceFactory;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const TOKEN_ENV: &str = "FLUORITE_IPC_TOKEN";
const DAEMON_LOG: &str = ".fluorite/daemon.log";
const READY_ATTEMPTS: usize = 10;
const READY_DELAY: Duration = Duration::from_millis(200);

#[derive(Parser)]
#[command(name = "fluorite")]
#[command(author, version, about = "Multi-service dashboard for cloud providers")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dashboard server and viewer
    Dashboard {
        #[command(subcommand)]
        action: DashboardCommands,
    },

    /// Supported service providers
    Services {
        #[command(subcommand)]
        action: ServicesCommands,
    },
}

#[derive(Subcommand)]
enum DashboardCommands {
    /// Run the JSON-RPC server until interrupted
    Serve(ServeArgs),

    /// Start the JSON-RPC server as a background process
    Daemon(ServeArgs),

    /// Connect to a running server and exercise a few methods
    TestConnection(ConnectArgs),

    /// Open the terminal dashboard
    Tui {
        /// Services to show (comma separated)
        #[arg(long, value_delimiter = ',')]
        services: Vec<String>,

        /// Refresh interval in milliseconds
        #[arg(long, default_value = "5000")]
        refresh: u64,

        /// Configuration file (defaults to .fluorite/dashboard.toml)
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum ServicesCommands {
    /// List supported services
    List {
        /// Only services with this capability (e.g. deployments, database)
        #[arg(long)]
        capability: Option<Capability>,
    },

    /// Show a service's capabilities and configuration schema
    Info {
        /// Service name
        name: String,
    },
}

#[derive(Args, Debug, Clone, Default, PartialEq)]
struct ServeArgs {
    /// TCP port to listen on
    #[arg(long)]
    port: Option<u16>,

    /// Interface to bind
    #[arg(long)]
    host: Option<String>,

    /// Listen on a local domain socket instead of TCP
    #[arg(long, value_name = "PATH")]
    socket_path: Option<PathBuf>,

    /// Token clients must present via auth.login
    #[arg(long, env = TOKEN_ENV, hide_env_values = true)]
    auth_token: Option<String>,

    /// Services to register at startup (comma separated)
    #[arg(long, value_delimiter = ',')]
    services: Vec<String>,

    /// Configuration file (defaults to .fluorite/dashboard.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

impl ServeArgs {
    /// Configuration file, then flags on top
    fn resolve(&self) -> Result<DashboardConfig> {
        let mut config = load_config(self.config.as_deref())?;

        if let Some(port) = self.port {
            config.protocol.port = port;
        }
        if let Some(host) = &self.host {
            config.protocol.host = host.clone();
        }
        if let Some(path) = &self.socket_path {
            config.protocol.socket_path = Some(path.clone());
        }
        if let Some(token) = self.auth_token.as_ref().filter(|t| !t.trim().is_empty()) {
            config.protocol.auth_token = Some(token.clone());
        }
        add_services(&mut config, &self.services);

        config.validate().context("Invalid dashboard configuration")?;
        Ok(config)
    }

    /// Arguments for a child `serve` process. The token travels through the
    /// environment so it never shows up in the process list.
    fn to_serve_args(&self) -> Vec<String> {
        let mut args = vec!["dashboard".to_string(), "serve".to_string()];
        if let Some(port) = self.port {
            args.extend(["--port".to_string(), port.to_string()]);
        }
        if let Some(host) = &self.host {
            args.extend(["--host".to_string(), host.clone()]);
        }
        if let Some(path) = &self.socket_path {
            args.extend(["--socket-path".to_string(), path.display().to_string()]);
        }
        if !self.services.is_empty() {
            args.extend(["--services".to_string(), self.services.join(",")]);
        }
        if let Some(path) = &self.config {
            args.extend(["--config".to_string(), path.display().to_string()]);
        }
        args
    }
}

#[derive(Args, Debug, Clone)]
struct ConnectArgs {
    /// Server port
    #[arg(long, default_value_t = DEFAULT_IPC_PORT)]
    port: u16,

    /// Server host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Connect over a local domain socket instead of TCP
    #[arg(long, value_name = "PATH")]
    socket_path: Option<PathBuf>,

    /// Token for auth.login
    #[arg(long, env = TOKEN_ENV, hide_env_values = true)]
    auth_token: Option<String>,

    /// Per-request timeout in milliseconds
    #[arg(long, default_value = "5000")]
    timeout_ms: u64,
}

impl ConnectArgs {
    fn client_config(&self) -> ClientConfig {
        let endpoint = match &self.socket_path {
            Some(path) => Endpoint::Unix(path.clone()),
            None => Endpoint::tcp(self.host.clone(), self.port),
        };
        let config =
            ClientConfig::new(endpoint).with_timeout(Duration::from_millis(self.timeout_ms));
        match self.auth_token.as_ref().filter(|t| !t.trim().is_empty()) {
            Some(token) => config.with_auth_token(token.clone()),
            None => config,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Dashboard { action } => match action {
            DashboardCommands::Serve(args) => cmd_serve(args).await,
            DashboardCommands::Daemon(args) => cmd_daemon(args).await,
            DashboardCommands::TestConnection(args) => cmd_test_connection(args).await,
            DashboardCommands::Tui {
                services,
                refresh,
                config,
            } => cmd_tui(services, refresh, config).await,
        },
        Commands::Services { action } => match action {
            ServicesCommands::List { capability } => cmd_services_list(capability),
            ServicesCommands::Info { name } => cmd_services_info(&name),
        },
    }
}

fn load_config(path: Option<&Path>) -> Result<DashboardConfig> {
    match path {
        Some(path) => DashboardConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => {
            let cwd = std::env::current_dir().context("Failed to read current directory")?;
            DashboardConfig::load_or_default(&cwd).context("Failed to load dashboard config")
        }
    }
}

fn add_services(config: &mut DashboardConfig, services: &[String]) {
    for name in services {
        let name = name.trim();
        if !name.is_empty() && !config.auto_init_services.iter().any(|s| s == name) {
            config.auto_init_services.push(name.to_string());
        }
    }
}

/// Build and initialize an orchestrator, rejecting unknown service names up front
async fn start_orchestrator(config: DashboardConfig) -> Result<DashboardOrchestrator> {
    let factory = Arc::new(ServiceFactory::new());
    let unknown: Vec<&str> = config
        .auto_init_services
        .iter()
        .map(String::as_str)
        .filter(|name| !factory.is_supported(name))
        .collect();
    if !unknown.is_empty() {
        bail!(
            "Unsupported service(s): {} (supported: {})",
            unknown.join(", "),
            factory.supported_services().join(", ")
        );
    }

    let orchestrator = DashboardOrchestrator::new(config, factory);
    orchestrator
        .initialize()
        .await
        .context("Failed to initialize dashboard orchestrator")?;
    Ok(orchestrator)
}

async fn cmd_serve(args: ServeArgs) -> Result<()> {
    let config = args.resolve()?;
    let server_config = ServerConfig::from_protocol(&config.protocol);
    let orchestrator = start_orchestrator(config).await?;

    let server = IpcServer::new(server_config, dashboard_methods(orchestrator.clone()));
    let address = server.start().await.context("Failed to start IPC server")?;

    info!(
        "Serving {} service(s) on {}",
        orchestrator.registered_services().await.len(),
        address
    );
    if server.auth_required() {
        info!("Clients must authenticate with auth.login");
    }
    println!("fluorite dashboard listening on {}", address);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("Shutting down");
    server.stop().await;
    orchestrator.shutdown();
    Ok(())
}

async fn cmd_daemon(args: ServeArgs) -> Result<()> {
    // Validate before detaching
    let config = args.resolve()?;

    let exe = std::env::current_exe().context("Failed to locate fluorite executable")?;
    let log_path = PathBuf::from(DAEMON_LOG);
    if let Some(dir) = log_path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let log = std::fs::File::create(&log_path)
        .with_context(|| format!("Failed to create {}", log_path.display()))?;

    let mut command = Command::new(exe);
    command
        .args(args.to_serve_args())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::from(log));
    match &config.protocol.auth_token {
        Some(token) => command.env(TOKEN_ENV, token),
        None => command.env_remove(TOKEN_ENV),
    };
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    let child = command.spawn().context("Failed to spawn dashboard daemon")?;
    let pid = child.id();
    println!("fluorite dashboard daemon started (pid {})", pid);
    println!("  Log: {}", log_path.display());

    let client_config =
        ClientConfig::from_protocol(&config.protocol).with_timeout(Duration::from_secs(1));
    let ready = fail_open_with_retries(
        "daemon readiness",
        || ping(client_config.clone()),
        READY_ATTEMPTS,
        READY_DELAY,
    )
    .await;

    match ready {
        Some(()) => println!("  Listening on {}", client_config.endpoint),
        None => {
            warn!("Daemon {} did not answer system.ping", pid);
            println!("  Not answering yet; check {}", log_path.display());
        }
    }
    Ok(())
}

async fn ping(config: ClientConfig) -> fluorite_core::Result<()> {
    let client = IpcClient::new(config);
    let result = async {
        client.connect().await?;
        client.call("system.ping", None).await
    }
    .await;
    client.disconnect().await;
    result
        .map(|_| ())
        .map_err(|e| FluoriteError::Other(e.to_string()))
}

async fn cmd_test_connection(args: ConnectArgs) -> Result<()> {
    let config = args.client_config();
    let endpoint = config.endpoint.clone();
    let client = IpcClient::new(config);

    println!("Connecting to {}", endpoint);
    if let Err(e) = client.connect().await {
        client.disconnect().await;
        return Err(with_auth_hint(e, &format!("Failed to connect to {}", endpoint)));
    }

    let outcome = exercise(&client).await;
    client.disconnect().await;
    outcome?;

    println!("\nConnection OK");
    Ok(())
}

async fn exercise(client: &IpcClient) -> Result<()> {
    let pong = client
        .call("system.ping", None)
        .await
        .map_err(|e| with_auth_hint(e, "system.ping failed"))?;
    println!("  system.ping      {}", pong);

    let version = client
        .call("system.version", None)
        .await
        .map_err(|e| with_auth_hint(e, "system.version failed"))?;
    println!("  system.version   {}", version);

    let data = client
        .call("dashboard.getData", None)
        .await
        .map_err(|e| with_auth_hint(e, "dashboard.getData failed"))?;
    print_snapshot(&data);
    Ok(())
}

/// Wrap `err` with `context`, naming the token flag when the server refused us
fn with_auth_hint(err: IpcError, context: &str) -> anyhow::Error {
    let rejected =
        err.code() == Some(UNAUTHORIZED) || matches!(err, IpcError::AuthenticationFailed(_));
    let err = anyhow::Error::new(err).context(context.to_string());
    if rejected {
        err.context(format!(
            "Server requires authentication: pass --auth-token or set {}",
            TOKEN_ENV
        ))
    } else {
        err
    }
}

fn print_snapshot(data: &Value) {
    let aggregated = &data["aggregated"];
    println!(
        "  dashboard.getData  health={} resources={} errors={}",
        aggregated["overallHealth"].as_str().unwrap_or("unknown"),
        aggregated["totalResources"],
        aggregated["totalErrors"],
    );

    if let Some(services) = data["services"].as_object() {
        for (name, entry) in services {
            match entry["error"].as_str() {
                Some(error) => println!("    {:<12} error: {}", name, error),
                None => println!(
                    "    {:<12} {} resource(s)",
                    name,
                    entry["resources"].as_array().map_or(0, Vec::len)
                ),
            }
        }
    }
}

async fn cmd_tui(services: Vec<String>, refresh: u64, config: Option<PathBuf>) -> Result<()> {
    info!("Launching dashboard");

    let mut config = load_config(config.as_deref())?;
    config.refresh_interval = refresh;
    add_services(&mut config, &services);

    let orchestrator = start_orchestrator(config).await?;
    let outcome = run_dashboard(orchestrator.clone()).await;
    orchestrator.shutdown();
    outcome.context("Dashboard exited with an error")
}

fn cmd_services_list(capability: Option<Capability>) -> Result<()> {
    let factory = ServiceFactory::new();
    let mut infos = factory.all_service_info();
    if let Some(capability) = capability {
        infos.retain(|info| info.capabilities.has(capability));
    }

    if infos.is_empty() {
        println!("No services found");
        return Ok(());
    }

    println!("{:<12} {:<14} DESCRIPTION", "NAME", "DISPLAY NAME");
    for info in infos {
        println!(
            "{:<12} {:<14} {}",
            info.name, info.display_name, info.description
        );
    }
    Ok(())
}

fn cmd_services_info(name: &str) -> Result<()> {
    let factory = ServiceFactory::new();
    let Some(info) = factory.service_info(name) else {
        bail!(
            "Unknown service '{}' (supported: {})",
            name,
            factory.supported_services().join(", ")
        );
    };

    println!("{} ({})", info.display_name, info.name);
    println!("  {}", info.description);

    let capabilities: Vec<&str> = info
        .capabilities
        .enabled()
        .iter()
        .map(Capability::as_str)
        .collect();
    println!("\nCapabilities: {}", capabilities.join(", "));

    println!("\nConfiguration:");
    let schema = serde_json::to_string_pretty(&info.config_schema)
        .context("Failed to render configuration schema")?;
    println!("{}", schema);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn serve_args(argv: &[&str]) -> ServeArgs {
        let mut full = vec!["fluorite", "dashboard", "serve"];
        full.extend_from_slice(argv);
        match Cli::try_parse_from(full).unwrap().command {
            Commands::Dashboard {
                action: DashboardCommands::Serve(args),
            } => args,
            _ => panic!("expected dashboard serve"),
        }
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_serve_flags_override_config() {
        let args = serve_args(&[
            "--port",
            "9500",
            "--host",
            "0.0.0.0",
            "--services",
            "vercel,github",
            "--auth-token",
            "secret",
            "--config",
            "/nonexistent/fluorite/dashboard.toml",
        ]);
        assert_eq!(args.services, vec!["vercel", "github"]);

        // An explicit config path must exist
        assert!(args.resolve().is_err());

        let args = ServeArgs {
            config: None,
            ..args
        };
        let config = args.resolve().unwrap();
        assert_eq!(config.protocol.port, 9500);
        assert_eq!(config.protocol.host, "0.0.0.0");
        assert_eq!(config.protocol.auth_token.as_deref(), Some("secret"));
        assert!(config.auto_init_services.contains(&"github".to_string()));
    }

    #[test]
    fn test_blank_token_is_ignored() {
        let args = ServeArgs {
            auth_token: Some("  ".to_string()),
            ..ServeArgs::default()
        };
        assert_eq!(args.resolve().unwrap().protocol.auth_token, None);
    }

    #[test]
    fn test_daemon_args_omit_token() {
        let args = ServeArgs {
            port: Some(9200),
            auth_token: Some("secret".to_string()),
            services: vec!["turso".to_string(), "aws".to_string()],
            ..ServeArgs::default()
        };
        let argv = args.to_serve_args();
        assert_eq!(
            argv,
            vec!["dashboard", "serve", "--port", "9200", "--services", "turso,aws"]
        );
        assert!(!argv.iter().any(|a| a.contains("secret")));
    }

    #[test]
    fn test_capability_filter_parses() {
        let cli =
            Cli::try_parse_from(["fluorite", "services", "list", "--capability", "database"])
                .unwrap();
        match cli.command {
            Commands::Services {
                action: ServicesCommands::List { capability },
            } => assert_eq!(capability, Some(Capability::Database)),
            _ => panic!("expected services list"),
        }

        assert!(
            Cli::try_parse_from(["fluorite", "services", "list", "--capability", "teleport"])
                .is_err()
        );
    }

    #[test]
    fn test_connect_args_prefer_socket() {
        let cli = Cli::try_parse_from([
            "fluorite",
            "dashboard",
            "test-connection",
            "--socket-path",
            "/tmp/fluorite.sock",
            "--timeout-ms",
            "250",
        ])
        .unwrap();
        let Commands::Dashboard {
            action: DashboardCommands::TestConnection(args),
        } = cli.command
        else {
            panic!("expected test-connection");
        };
        let config = args.client_config();
        assert_eq!(config.endpoint, Endpoint::Unix("/tmp/fluorite.sock".into()));
        assert_eq!(config.timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_unauthorized_errors_name_the_token_flag() {
        let err = with_auth_hint(
            IpcError::Rpc {
                code: UNAUTHORIZED,
                message: "Unauthorized".to_string(),
                data: None,
            },
            "system.ping failed",
        );
        let rendered = format!("{:#}", err);
        assert!(rendered.contains("--auth-token"));
        assert!(rendered.contains(TOKEN_ENV));
        assert!(rendered.contains("system.ping failed"));

        let err = with_auth_hint(
            IpcError::AuthenticationFailed("Invalid token".to_string()),
            "Failed to connect to 127.0.0.1:9123",
        );
        assert!(err.to_string().contains("--auth-token"));

        let err = with_auth_hint(IpcError::ConnectionLost, "system.ping failed");
        assert!(!format!("{:#}", err).contains("--auth-token"));
    }

    #[tokio::test]
    async fn test_unknown_service_is_rejected() {
        let config = DashboardConfig {
            refresh_interval: 0,
            auto_init_services: vec!["vercel".to_string(), "heroku".to_string()],
            ..DashboardConfig::default()
        };
        let err = start_orchestrator(config).await.err().unwrap();
        assert!(err.to_string().contains("heroku"));
    }
}

//! VEIL CLI
//!
//! Operator tooling for post-quantum device sessions and TOTP-gated
//! credential exchange.

mod config;
mod progress;

use clap::{Parser, Subcommand};
use console::style;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::task::JoinSet;

use veil_core::{
    Clock, CredentialExchange, DeviceCredentials, HandshakeClient, ManualClock, MemoryRegistry,
    SessionConfig, SessionManager,
};
use veil_crypto::{EnrollmentSecret, totp};

use config::{Config, LoggingConfig};
use progress::{DemoProgress, Timings, format_duration};

/// VEIL - Post-quantum sessions and credential exchange for embedded devices
#[derive(Parser)]
#[command(name = "veil")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a device enrollment secret
    Keygen,

    /// Print the current one-time code for a device
    Code {
        /// Enrollment secret as text
        #[arg(long, conflicts_with = "secret_hex", required_unless_present = "secret_hex")]
        secret: Option<String>,

        /// Enrollment secret as hex
        #[arg(long)]
        secret_hex: Option<String>,

        /// Enrollment time (Unix seconds)
        #[arg(long)]
        enrolled_at: u64,

        /// Evaluation time (Unix seconds, defaults to now)
        #[arg(long)]
        at: Option<u64>,
    },

    /// Run an in-process handshake, envelope and credential exchange
    Demo {
        /// Number of simulated devices
        #[arg(short = 'n', long, default_value_t = 4)]
        clients: usize,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let (config, config_path) = match &cli.config {
        Some(path) => (Config::load(path)?, path.clone()),
        None => (Config::load_or_default()?, Config::default_path()),
    };

    // Validate configuration
    config.validate()?;

    init_logging(cli.verbose, &config.logging)?;
    tracing::debug!("Loaded configuration from {}", config_path.display());

    match cli.command {
        Commands::Keygen => generate_secret()?,
        Commands::Code {
            secret,
            secret_hex,
            enrolled_at,
            at,
        } => print_code(secret, secret_hex, enrolled_at, at)?,
        Commands::Demo { clients } => run_demo(clients, &config).await?,
        Commands::Config => {
            println!("# {}", config_path.display());
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

/// Install the tracing subscriber
fn init_logging(verbose: bool, logging: &LoggingConfig) -> anyhow::Result<()> {
    let level = if verbose {
        "debug".to_string()
    } else {
        logging.level.to_lowercase()
    };
    let builder = tracing_subscriber::fmt().with_env_filter(level.as_str());

    match &logging.file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            builder.with_writer(Mutex::new(file)).with_ansi(false).init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}

/// Print a fresh enrollment secret
fn generate_secret() -> anyhow::Result<()> {
    let secret = EnrollmentSecret::generate()?;
    let text = secret
        .as_str()
        .ok_or_else(|| anyhow::anyhow!("generated secret is not printable"))?;
    println!("{text}");
    Ok(())
}

/// Print the code for `at` (or now)
fn print_code(
    secret: Option<String>,
    secret_hex: Option<String>,
    enrolled_at: u64,
    at: Option<u64>,
) -> anyhow::Result<()> {
    let secret = match (secret, secret_hex) {
        (Some(text), _) => EnrollmentSecret::from(text.as_str()),
        (None, Some(encoded)) => EnrollmentSecret::new(hex::decode(encoded.trim())?),
        (None, None) => anyhow::bail!("either --secret or --secret-hex is required"),
    };

    let enrolled_at = UNIX_EPOCH + Duration::from_secs(enrolled_at);
    let now = match at {
        Some(secs) => UNIX_EPOCH + Duration::from_secs(secs),
        None => SystemTime::now(),
    };

    let code = totp::derive_code(&secret, enrolled_at, now)?;
    let step = totp::time_counter(enrolled_at, now);
    tracing::debug!("Derived code for time step {}", step);
    println!("{code}");
    Ok(())
}

/// Per-client phase timings
struct ClientRun {
    handshake: Duration,
    envelope: Duration,
    credentials: Duration,
}

type Exchange = CredentialExchange<MemoryRegistry, MemoryRegistry>;

/// Run `clients` simulated devices through the full exchange
async fn run_demo(clients: usize, config: &Config) -> anyhow::Result<()> {
    if clients == 0 {
        anyhow::bail!("--clients must be at least 1");
    }

    let exchange_config = config.exchange_config();
    let session = exchange_config.session.clone();
    println!(
        "KEM: {}  AEAD: {}  pending TTL: {}s",
        style(session.kem).cyan(),
        style(session.aead).cyan(),
        session.pending_ttl.as_secs()
    );

    // Frozen clock: every device stays inside one time step for the whole run
    let clock = Arc::new(ManualClock::new(SystemTime::now()));
    let sessions = Arc::new(SessionManager::with_clock(&exchange_config, clock.clone())?);
    let registry = Arc::new(MemoryRegistry::new());
    let exchange = Arc::new(CredentialExchange::new(
        sessions,
        registry.clone(),
        registry.clone(),
    ));

    let enrolled_at = clock.now() - Duration::from_secs(45);
    let progress = DemoProgress::new(clients as u64);
    let mut tasks = JoinSet::new();

    for index in 0..clients {
        let device_id = format!("device-{index}");
        let secret = registry.register(
            &device_id,
            enrolled_at,
            DeviceCredentials::new(format!("user-{index}"), format!("pass-{index}")),
        )?;

        let exchange = Arc::clone(&exchange);
        let session = session.clone();
        tasks.spawn(async move {
            run_client(index, &device_id, &secret, enrolled_at, &session, &exchange).await
        });
    }

    let mut handshake = Timings::default();
    let mut envelope = Timings::default();
    let mut credentials = Timings::default();
    let mut failures = 0usize;

    while let Some(joined) = tasks.join_next().await {
        match joined? {
            Ok(run) => {
                handshake.record(run.handshake);
                envelope.record(run.envelope);
                credentials.record(run.credentials);
            }
            Err(e) => {
                failures += 1;
                tracing::error!("Client exchange failed: {}", e);
            }
        }
        progress.inc();
    }

    progress.finish_with_message(format!("{} of {} clients completed", handshake.len(), clients));

    for (phase, timings) in [
        ("handshake", &handshake),
        ("envelope round trip", &envelope),
        ("credential exchange", &credentials),
    ] {
        println!(
            "{:<22} mean {:>10}  max {:>10}",
            phase,
            format_duration(timings.mean()),
            format_duration(timings.max())
        );
    }

    if failures > 0 {
        println!("{}", style(format!("{failures} client(s) failed")).red().bold());
        anyhow::bail!("demo finished with {failures} failure(s)");
    }
    println!("{}", style("All exchanges succeeded").green().bold());
    Ok(())
}

/// One device: handshake, echo an envelope, then fetch credentials
async fn run_client(
    index: usize,
    device_id: &str,
    secret: &EnrollmentSecret,
    enrolled_at: SystemTime,
    session: &SessionConfig,
    exchange: &Exchange,
) -> anyhow::Result<ClientRun> {
    let sessions = exchange.sessions();
    let mut client = HandshakeClient::from_config(format!("client-{index}"), session);

    let started = Instant::now();
    let offer = sessions.handle_initiate(&client.initiate_request());
    sessions.handle_complete(&client.complete_request(&offer)?)?;
    let handshake = started.elapsed();

    let started = Instant::now();
    let request = client.seal_request(&serde_json::json!({ "ping": index }))?;
    let body: serde_json::Value = sessions.open_json(&request)?;
    let reply = sessions.seal_json(client.client_id(), &body)?;
    let echoed: serde_json::Value = client.open_response(&reply)?;
    if echoed != body {
        anyhow::bail!("envelope echo mismatch for {}", client.client_id());
    }
    let envelope = started.elapsed();

    let started = Instant::now();
    let code = totp::derive_code(secret, enrolled_at, sessions.clock().now())?;
    let request = client.seal_request(&serde_json::json!({
        "device_id": device_id,
        "code": code,
    }))?;
    let response = exchange.exchange_credentials(&request).await?;
    let released: DeviceCredentials = client.open_response(&response)?;
    if released.username != format!("user-{index}") {
        anyhow::bail!("wrong credentials released for {device_id}");
    }
    let credentials = started.elapsed();

    Ok(ClientRun {
        handshake,
        envelope,
        credentials,
    })
}

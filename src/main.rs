//! fedifetch binary entry point

use clap::{Parser, Subcommand};
use fedifetch::federation::Keypair;
use fedifetch::{AppState, config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "fedifetch")]
#[command(about = "Signed ActivityPub fetches and HTTP signature keys")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Dereference an IRI and print the node as JSON
    Fetch {
        /// IRI to dereference
        iri: String,
    },

    /// Print a fresh PEM keypair
    Keygen,

    /// Resolve the public key behind a signature keyId
    VerifyKey {
        /// keyId, usually an actor IRI with a `#main-key` fragment
        key_id: String,
    },
}

/// Install the tracing subscriber described by `logging`
///
/// `RUST_LOG` overrides the configured level.
fn init_tracing(logging: &config::LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| logging.default_directive().into());
    let registry = tracing_subscriber::registry().with(filter);

    if logging.is_json() {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
            .init();
    }
}

/// Set up everything a network command needs
///
/// # Setup
/// 1. Load configuration from file and environment
/// 2. Initialize tracing/logging from `logging.*`
/// 3. Initialize metrics
/// 4. Initialize AppState
async fn init_state() -> Result<AppState, Box<dyn std::error::Error>> {
    // 1. Load configuration
    let config = config::AppConfig::load()?;

    // 2. Initialize tracing/logging
    init_tracing(&config.logging);
    tracing::info!(
        domain = %config.instance.domain,
        protocol = %config.instance.protocol,
        "Configuration loaded"
    );

    // 3. Initialize metrics
    fedifetch::metrics::init_metrics();

    // 4. Initialize application state
    Ok(AppState::new(config).await?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        // Key generation needs no state
        Commands::Keygen => {
            let keypair = Keypair::generate()?;
            print!("{}", keypair.private_key_pem()?);
            print!("{}", keypair.public_key_pem()?);
        }
        Commands::Fetch { iri } => {
            let state = init_state().await?;
            let node = state.dereferencer.dereference(&iri).await?;
            println!("{}", serde_json::to_string_pretty(&node)?);
        }
        Commands::VerifyKey { key_id } => {
            let state = init_state().await?;
            let keypair = state.dereferencer.fetch_public_key(&key_id).await?;
            tracing::info!(key_id = %key_id, "Public key resolved");
            print!("{}", keypair.public_key_pem()?);
        }
    }

    Ok(())
}

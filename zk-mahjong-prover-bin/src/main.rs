use clap::{Parser, Subcommand};
use color_eyre::{Result, eyre::Context};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use zk_mahjong_prover_lib::{
    CircuitKind, KeyOrigin, Prover, ProverConfig, SetupPipeline, SnarkjsCli,
};

#[derive(Parser)]
#[command(version, about = "Prepare setup artifacts and generate zk-mahjong proofs")]
struct Cli {
    /// Prover configuration (TOML).
    #[arg(long, env = "ZK_PROVER_CONFIG", default_value = "prover.toml")]
    config: PathBuf,
    /// The snarkjs executable used for setup and proving.
    #[arg(long, env = "SNARKJS", default_value = "snarkjs")]
    snarkjs: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch SRS files and build or reuse proving keys for every configured circuit.
    Prepare,
    /// Generate one proof and print it as JSON.
    Prove {
        /// elGamalSecretKey, encrypt or shuffleEncrypt
        #[arg(long)]
        circuit: CircuitKind,
        /// Circuit input signals (JSON).
        #[arg(long)]
        input: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ProverConfig::from_toml_file(&cli.config)
        .with_context(|| format!("Loading config {}", cli.config.display()))?;
    let pipeline = SetupPipeline::open(&config, Arc::new(SnarkjsCli::new(&cli.snarkjs)))
        .context("Opening artifact store")?;

    match cli.command {
        Command::Prepare => {
            let prepared = pipeline
                .prepare(&config.session)
                .await
                .context("Preparing circuits")?;
            for (circuit, entry) in prepared.iter() {
                let origin = match entry.origin {
                    KeyOrigin::Reused => "reused",
                    KeyOrigin::Built => "built",
                };
                println!("{}: proving key {}", circuit, origin);
            }
        }
        Command::Prove { circuit, input } => {
            let raw = tokio::fs::read_to_string(&input)
                .await
                .with_context(|| format!("Reading input {}", input.display()))?;
            let input: serde_json::Value =
                serde_json::from_str(&raw).context("Parsing circuit input")?;

            let prover = Prover::spawn(pipeline).context("Starting prover")?;
            prover
                .init(config.session.clone())
                .await
                .context("Initializing prover")?;
            tracing::info!(%circuit, "Prover ready, generating proof");
            let proof = prover
                .prove(circuit, input)
                .await
                .with_context(|| format!("Proving {}", circuit))?;
            println!("{}", serde_json::to_string_pretty(&proof)?);
            prover.dispose();
        }
    }

    Ok(())
}

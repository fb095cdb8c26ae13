use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "facesync", about = "facesync face index reconciliation CLI")]
struct Cli {
    /// Talk to a daemon on the session bus instead of the system bus
    #[arg(long, global = true)]
    session: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile the face index against the employee directory
    Sync,
    /// Fingerprint indexed photos that have no fingerprint yet
    Backfill,
    /// Show daemon status
    Status,
    /// Print the perceptual fingerprint of a local image
    Hash {
        /// Image file to fingerprint
        path: PathBuf,
    },
}

#[zbus::proxy(
    interface = "org.facesync.FaceSync1",
    default_service = "org.facesync.FaceSync1",
    default_path = "/org/facesync/FaceSync1"
)]
trait FaceSync {
    fn sync_employees(&self) -> zbus::Result<String>;
    fn update_fingerprints(&self) -> zbus::Result<String>;
    fn status(&self) -> zbus::Result<String>;
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Sync => {
            println!("Reconciling face index...");
            let reply = connect(cli.session).await?.sync_employees().await?;
            println!("{}", render_envelope(&reply)?);
        }
        Commands::Backfill => {
            println!("Backfilling fingerprints...");
            let reply = connect(cli.session).await?.update_fingerprints().await?;
            println!("{}", render_envelope(&reply)?);
        }
        Commands::Status => {
            let reply = connect(cli.session).await?.status().await?;
            let status: serde_json::Value =
                serde_json::from_str(&reply).context("daemon returned malformed status")?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::Hash { path } => {
            // Local only; does not need the daemon.
            let fingerprint = facesync_core::fingerprint::fingerprint_file(&path)
                .with_context(|| format!("failed to fingerprint {}", path.display()))?;
            println!("{fingerprint}");
        }
    }

    Ok(())
}

async fn connect(session: bool) -> Result<FaceSyncProxy<'static>> {
    tracing::debug!(session, "connecting to facesyncd");
    let connection = if session {
        zbus::Connection::session().await
    } else {
        zbus::Connection::system().await
    }
    .context("failed to connect to D-Bus")?;

    FaceSyncProxy::new(&connection)
        .await
        .context("facesyncd is not reachable")
}

/// Pretty-print the result of a successful envelope, or fail with its error.
fn render_envelope(reply: &str) -> Result<String> {
    let envelope: serde_json::Value =
        serde_json::from_str(reply).context("daemon returned malformed reply")?;

    if envelope["success"].as_bool() != Some(true) {
        let error = envelope["error"].as_str().unwrap_or("unknown error");
        bail!("daemon reported failure: {error}");
    }
    Ok(serde_json::to_string_pretty(&envelope["result"])?)
}

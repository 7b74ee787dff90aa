use clap::{Parser, Subcommand};
use healthbot_rag::builder::build_index_dir;
use healthbot_rag::embedding::build_embedder;
use healthbot_rag::{api, Settings};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "healthbot", version, about = "Multilingual health question answering service")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Run the chat API (POST /chat, GET /health)
    Serve {
        #[arg(long)]
        port: Option<u16>,
    },
    /// Chunk and embed the document directory into a fresh index
    BuildIndex {
        #[arg(long)]
        docs_dir: Option<PathBuf>,
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut settings = Settings::from_env();
    tracing::info!("healthbot {}", healthbot_rag::VERSION);

    match Cli::parse().cmd {
        Cmd::Serve { port } => {
            if let Some(port) = port {
                settings.port = port;
            }
            api::run(settings).await?
        }
        Cmd::BuildIndex { docs_dir, out_dir } => {
            let docs_dir = docs_dir.unwrap_or_else(|| settings.docs_dir.clone());
            let out_dir = out_dir.unwrap_or_else(|| settings.index_dir.clone());
            let embedder = build_embedder(&settings.embedding)?;
            let report = build_index_dir(
                &docs_dir,
                &out_dir,
                settings.index_backend,
                embedder.as_ref(),
                settings.embedding.batch_size,
            )
            .await?;
            tracing::info!(
                "Indexed {} chunks ({} dims, {} backend) into {}",
                report.chunks,
                report.dimension,
                report.backend,
                out_dir.display()
            );
        }
    }
    Ok(())
}

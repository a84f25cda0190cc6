use anyhow::Context;
use clap::{Parser, Subcommand};
use lectern::{
    api::{self, AppState},
    auth::AuthService,
    config::{self, Config},
    embedding,
    files::FileStore,
    index::{self, IndexGateway},
    ingest::{IngestWorker, IngestionPipeline, PageLoader, PdfLoader, TextChunker},
    llm,
    logging,
    metrics::IngestMetrics,
    quiz::QuizGenerator,
    rag::AnswerEngine,
    store::MemoryRepository,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(name = "lectern")]
#[command(version, about = "PDF workspace with translated pages, cited answers and quizzes", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Print the text extracted from each page of a PDF
    Extract {
        /// Path to the PDF file
        pdf: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_tracing();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve().await,
        Command::Extract { pdf } => extract(pdf).await,
    }
}

async fn serve() -> anyhow::Result<()> {
    let config = config::init_config().context("invalid configuration")?;
    let app = api::create_router(build_state(config)?);

    let (listener, port) = bind_listener(config)
        .await
        .context("failed to bind listener")?;
    tracing::info!("Listening on http://0.0.0.0:{}", port);
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

fn build_state(config: &Config) -> anyhow::Result<AppState> {
    let repository = Arc::new(MemoryRepository::new());
    let embedder = embedding::build_embedding_client(config)?;
    let store = index::build_vector_store(config)?;
    let llm = llm::build_language_model(config)?;
    let index = IndexGateway::new(store, embedder);
    let metrics = Arc::new(IngestMetrics::new());

    let pipeline = IngestionPipeline::new(
        repository.clone(),
        Arc::new(PdfLoader::new()),
        llm.clone(),
        index.clone(),
        TextChunker::from_config(config)?,
        config.target_language.clone(),
        metrics.clone(),
    );

    tracing::info!(
        vector_store = ?config.vector_store,
        embedding_provider = ?config.embedding_provider,
        llm_provider = ?config.llm_provider,
        upload_dir = %config.upload_dir.display(),
        "Components initialized"
    );

    Ok(AppState {
        repository: repository.clone(),
        auth: Arc::new(AuthService::new()),
        files: FileStore::new(config.upload_dir.clone()),
        index: index.clone(),
        worker: IngestWorker::new(Arc::new(pipeline), config.ingest_concurrency),
        answers: AnswerEngine::new(index.clone(), llm.clone(), config.target_language.clone()),
        quizzes: QuizGenerator::new(repository, index, llm, config.target_language.clone()),
        metrics,
        max_upload_bytes: config.max_upload_bytes,
    })
}

async fn extract(pdf: PathBuf) -> anyhow::Result<()> {
    let pages = PdfLoader::new()
        .load(&pdf)
        .await
        .with_context(|| format!("failed to load {}", pdf.display()))?;
    for page in pages {
        println!("--- page {} ---", page.index + 1);
        println!("{}", page.text.trim_end());
    }
    Ok(())
}

async fn bind_listener(config: &Config) -> Result<(TcpListener, u16), std::io::Error> {
    use std::net::Ipv4Addr;

    if let Some(port) = config.server_port {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map(|listener| (listener, port));
    }

    const PORT_RANGE: std::ops::RangeInclusive<u16> = 4100..=4199;
    for port in PORT_RANGE {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "No available port found in range 4100-4199",
    ))
}

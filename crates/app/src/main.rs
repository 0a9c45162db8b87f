use chrono::Utc;
use clap::{Parser, Subcommand};
use manual_ingest_core::{
    ingest_folder, CharacterNgramEmbedder, ChromaStore, ContentRecord, ContentStore, ContentType,
    Embedder, FileExtractor, HttpEmbedder, InMemoryJobStore, IngestionPipeline, OpenSearchStore,
    PipelineConfig, RecordFilter, SearchRequest, DEFAULT_EMBEDDING_DIMENSIONS,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

/// Vector size of the sentence-embedding model served behind `--embedding-endpoint`.
const HTTP_EMBEDDING_DIMENSIONS: usize = 384;

#[derive(Parser)]
#[command(name = "manual-ingest", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// OpenSearch base URL
    #[arg(long, env = "OPENSEARCH_URL", default_value = "http://localhost:9200")]
    opensearch_url: String,

    /// OpenSearch index holding content records
    #[arg(long, env = "OPENSEARCH_INDEX", default_value = "manual_content")]
    opensearch_index: String,

    /// ChromaDB base URL
    #[arg(long, env = "CHROMA_URL", default_value = "http://localhost:8000")]
    chroma_url: String,

    /// ChromaDB collection
    #[arg(long, env = "CHROMA_COLLECTION", default_value = "manual_content")]
    chroma_collection: String,

    /// Embedding service URL. The offline trigram embedder is used when unset.
    #[arg(long, env = "EMBEDDING_ENDPOINT")]
    embedding_endpoint: Option<String>,

    /// Bearer token for the embedding service
    #[arg(long, env = "EMBEDDING_API_KEY", hide_env_values = true)]
    embedding_api_key: Option<String>,

    /// Override the embedding vector size
    #[arg(long, env = "EMBEDDING_DIMENSIONS")]
    embedding_dimensions: Option<usize>,

    /// Where uploads are staged while they are processed
    #[arg(long, env = "UPLOAD_DIRECTORY")]
    upload_dir: Option<PathBuf>,

    /// Minimum readability score a chunk needs to be stored
    #[arg(long, default_value_t = 0.3)]
    min_readability: f64,

    /// Chunks per embedding batch
    #[arg(long, default_value_t = 32)]
    batch_size: usize,

    /// Per-document processing budget in seconds
    #[arg(long, default_value_t = 300)]
    timeout_secs: u64,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest one manual or every manual under a folder.
    Ingest {
        /// A single .pdf or .txt manual.
        #[arg(long, conflicts_with = "folder", required_unless_present = "folder")]
        file: Option<PathBuf>,
        /// Folder that contains manuals recursively.
        #[arg(long)]
        folder: Option<PathBuf>,
    },
    /// Similarity search over stored content.
    Search {
        #[arg(long)]
        query: String,
        #[arg(long)]
        manufacturer: Option<String>,
        /// troubleshooting, maintenance, safety or warranty
        #[arg(long)]
        content_type: Option<ContentType>,
        #[arg(long, default_value_t = 0.0)]
        min_confidence: f64,
        #[arg(long, default_value = "10")]
        max_results: usize,
    },
    /// List stored records, newest first.
    List {
        #[arg(long)]
        manufacturer: Option<String>,
        #[arg(long)]
        content_type: Option<ContentType>,
        #[arg(long, default_value = "50")]
        limit: usize,
        #[arg(long, default_value = "0")]
        offset: usize,
    },
    /// Print one record in full.
    Get {
        #[arg(long)]
        id: Uuid,
    },
    /// Delete a record from both stores.
    Delete {
        #[arg(long)]
        id: Uuid,
    },
    /// Re-score a record and rewrite it under a new id.
    Reprocess {
        #[arg(long)]
        id: Uuid,
    },
    /// Corpus quality report as JSON.
    Report,
    /// Near-duplicate pairs among the most recent records.
    Duplicates,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = PipelineConfig {
        min_readability_score: cli.min_readability,
        embedding_batch_size: cli.batch_size,
        job_timeout: Duration::from_secs(cli.timeout_secs),
        ..PipelineConfig::default()
    };
    if let Some(upload_dir) = &cli.upload_dir {
        config.upload_directory = upload_dir.clone();
    }

    let embedder: Arc<dyn Embedder> = match &cli.embedding_endpoint {
        Some(endpoint) => Arc::new(
            HttpEmbedder::new(
                endpoint,
                cli.embedding_dimensions.unwrap_or(HTTP_EMBEDDING_DIMENSIONS),
            )
            .with_api_key(cli.embedding_api_key.clone()),
        ),
        None => Arc::new(CharacterNgramEmbedder {
            dimensions: cli.embedding_dimensions.unwrap_or(DEFAULT_EMBEDDING_DIMENSIONS),
        }),
    };

    let records = Arc::new(OpenSearchStore::new(&cli.opensearch_url, &cli.opensearch_index));
    let vectors = Arc::new(ChromaStore::new(
        &cli.chroma_url,
        &cli.chroma_collection,
        embedder.dimensions(),
    ));
    records.ensure_index().await?;

    let content = Arc::new(ContentStore::new(
        records,
        vectors,
        embedder,
        config.clone(),
    )?);
    if let Err(error) = content.ensure_ready().await {
        warn!(error = %error, "vector store unavailable, searches will use the text fallback");
    }

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "manual-ingest boot"
    );

    match cli.command {
        Command::Ingest { file, folder } => {
            let pipeline = IngestionPipeline::new(
                Arc::new(InMemoryJobStore::new()),
                Arc::new(FileExtractor::new(config.min_text_length)),
                Arc::clone(&content),
            )?;

            if let Some(file) = file {
                let summary = pipeline.ingest_file(&file).await?;
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else if let Some(folder) = folder {
                let report = ingest_folder(&pipeline, &folder, &config).await?;
                for skipped in &report.skipped {
                    warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped manual");
                }

                let stored = report.summaries.iter().map(|summary| summary.stored).sum::<usize>();
                println!(
                    "{} manuals ingested, {} skipped, {stored} chunks stored at {}",
                    report.summaries.len(),
                    report.skipped.len(),
                    Utc::now().to_rfc3339()
                );
            }
        }
        Command::Search {
            query,
            manufacturer,
            content_type,
            min_confidence,
            max_results,
        } => {
            let request = SearchRequest {
                query,
                manufacturer,
                content_type,
                min_confidence,
                max_results,
            };
            let response = content.search(&request).await?;

            println!(
                "query: {} ({} results in {:.2}ms{})",
                response.query,
                response.total_results,
                response.search_time_ms,
                if response.fallback { ", text fallback" } else { "" }
            );
            for hit in response.results {
                println!("score={:.4}", hit.similarity_score);
                print_record(&hit.record);
            }
        }
        Command::List {
            manufacturer,
            content_type,
            limit,
            offset,
        } => {
            let filter = RecordFilter {
                manufacturer,
                content_type,
                ..RecordFilter::default()
            };
            for record in content.list(&filter, limit, offset).await? {
                print_record(&record);
            }
        }
        Command::Get { id } => match content.get(id).await? {
            Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
            None => anyhow::bail!("content not found: {id}"),
        },
        Command::Delete { id } => {
            if !content.delete(id).await {
                anyhow::bail!("content not found or not deleted: {id}");
            }
            println!("deleted {id}");
        }
        Command::Reprocess { id } => match content.reprocess(id).await? {
            Some(record) => println!("{id} reprocessed as {}", record.id),
            None => println!("{id} fell below the readability threshold and was removed"),
        },
        Command::Report => {
            let report = content.quality_report().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Duplicates => {
            let pairs = content.find_duplicates().await?;
            if pairs.is_empty() {
                println!("no duplicates found");
            }
            for pair in pairs {
                println!("{} ~ {} similarity={:.4}", pair.id_a, pair.id_b, pair.score);
            }
        }
    }

    Ok(())
}

fn print_record(record: &ContentRecord) {
    println!(
        "[{}] {} {} / {} ({}, {}, confidence={:.3})",
        record.id,
        record.content_type,
        record.manufacturer,
        record.model_series,
        record.source_manual,
        record.page_reference,
        record.confidence_score
    );
    println!("  {}", record.section_title);
    println!("  {}", record.content);
}

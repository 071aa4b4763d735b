use chrono::Utc;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use pdf_chat_core::normalize::is_arabic_char;
use pdf_chat_core::{
    ingest_folder, load_document, AzureChatClient, AzureEmbeddingClient, ChatSession,
    ChunkingOptions, HybridChunker, LmdbVectorStore, LopdfExtractor, QualityTier, ReportChunk,
    Retriever, ServiceConfig, StoreWriter, VectorStore, WriteMode, DEFAULT_TEMPERATURE,
    DEFAULT_TOP_K,
};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "pdf-chat", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory of the embedded vector store.
    #[arg(long, env = "PDF_CHAT_STORE_DIR", default_value = "data/kb")]
    store: PathBuf,

    /// Knowledge-base table to operate on.
    #[arg(long, env = "PDF_CHAT_TABLE", default_value = "reports")]
    table: String,
}

#[derive(Subcommand)]
enum Command {
    /// Extract and clean the text of one PDF report.
    Extract {
        /// PDF file to process.
        #[arg(long)]
        file: PathBuf,
        /// Write the cleaned text here instead of printing a sample.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Chunk one PDF and report how the token budget was spent.
    Chunk {
        /// PDF file to process.
        #[arg(long)]
        file: PathBuf,
        /// Override the per-language token budget.
        #[arg(long)]
        max_tokens: Option<usize>,
        /// Override the minimum viable chunk size.
        #[arg(long)]
        min_tokens: Option<usize>,
        /// Keep small same-section neighbours as separate chunks.
        #[arg(long)]
        no_merge: bool,
        /// Dump every chunk to this file for inspection.
        #[arg(long)]
        dump: Option<PathBuf>,
    },
    /// Ingest a folder of PDFs: extract, chunk, embed, persist.
    Embed {
        /// Folder that contains PDFs recursively.
        #[arg(long)]
        folder: PathBuf,
        /// What to do with existing table rows: overwrite or append.
        #[arg(long, default_value = "overwrite")]
        mode: String,
    },
    /// One-shot similarity search against the knowledge base.
    Search {
        /// Search query.
        #[arg(long)]
        query: String,
        /// Number of records to return.
        #[arg(long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,
    },
    /// Interactive question answering over the knowledge base.
    Chat {
        /// Retrieved records per question.
        #[arg(long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,
        /// Sampling temperature for the chat model, clamped to [0, 2].
        #[arg(long, default_value_t = DEFAULT_TEMPERATURE)]
        temperature: f32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "pdf-chat boot"
    );

    match cli.command {
        Command::Extract { file, output } => run_extract(&file, output.as_deref()),
        Command::Chunk {
            file,
            max_tokens,
            min_tokens,
            no_merge,
            dump,
        } => run_chunk(&file, max_tokens, min_tokens, no_merge, dump.as_deref()),
        Command::Embed { folder, mode } => {
            run_embed(&cli.store, &cli.table, &folder, &mode).await
        }
        Command::Search { query, top_k } => {
            run_search(&cli.store, &cli.table, &query, top_k).await
        }
        Command::Chat { top_k, temperature } => {
            run_chat(&cli.store, &cli.table, top_k, temperature).await
        }
    }
}

fn run_extract(file: &Path, output: Option<&Path>) -> anyhow::Result<()> {
    let document = load_document(&LopdfExtractor, file)
        .map_err(|error| anyhow::anyhow!(error.to_string()))?;

    let text = document
        .pages
        .iter()
        .map(|page| page.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    let total_chars = text.chars().count();
    let arabic_chars = text.chars().filter(|&c| is_arabic_char(c)).count();

    println!("file: {}", document.fingerprint.filename);
    println!("language: {}", document.fingerprint.language.as_str());
    println!("pages with text: {}", document.pages.len());
    for page in &document.pages {
        println!("  page {}: {} chars", page.number, page.text.chars().count());
    }
    println!("characters after cleaning: {total_chars}");
    if arabic_chars > 0 {
        println!("arabic characters: {arabic_chars}");
    }
    println!("checksum: {}", document.fingerprint.checksum);

    match output {
        Some(path) => {
            std::fs::write(path, &text)?;
            println!("cleaned text saved to {}", path.display());
        }
        None => {
            let sample: String = text.chars().take(800).collect();
            println!("\nsample:\n{sample}");
        }
    }

    Ok(())
}

fn run_chunk(
    file: &Path,
    max_tokens: Option<usize>,
    min_tokens: Option<usize>,
    no_merge: bool,
    dump: Option<&Path>,
) -> anyhow::Result<()> {
    let document = load_document(&LopdfExtractor, file)
        .map_err(|error| anyhow::anyhow!(error.to_string()))?;

    let mut options = ChunkingOptions::for_language(document.fingerprint.language);
    if let Some(max) = max_tokens {
        options.max_tokens = max;
    }
    if let Some(min) = min_tokens {
        options.min_tokens = min;
    }
    options.merge_peers = !no_merge;

    let chunker =
        HybridChunker::new(options).map_err(|error| anyhow::anyhow!(error.to_string()))?;
    let chunked = chunker
        .chunk(&document)
        .map_err(|error| anyhow::anyhow!(error.to_string()))?;

    println!(
        "file: {} ({})",
        document.fingerprint.filename,
        document.fingerprint.language.as_str()
    );
    println!("chunks created: {}", chunked.chunks.len());
    println!("short fragments dropped: {}", chunked.dropped_short);

    let mut high = 0usize;
    let mut medium = 0usize;
    let mut low = 0usize;
    for chunk in &chunked.chunks {
        match chunk.quality {
            QualityTier::High => high += 1,
            QualityTier::Medium => medium += 1,
            QualityTier::Low => low += 1,
        }
    }
    println!("quality tiers: high={high} medium={medium} low={low}");

    for chunk in chunked.chunks.iter().take(3) {
        let preview: String = chunk.text.chars().take(150).collect();
        println!(
            "\nchunk {} tokens={} pages={:?} section={}",
            chunk.chunk_index + 1,
            chunk.token_count,
            chunk.page_numbers,
            chunk.section.as_deref().unwrap_or("-")
        );
        println!("  {preview}...");
    }

    if let Some(path) = dump {
        let mut out = String::new();
        for (index, chunk) in chunked.chunks.iter().enumerate() {
            out.push_str(&format!("=== CHUNK {} ===\n", index + 1));
            out.push_str(&chunk.text);
            out.push_str(&format!("\n\n{}\n\n", "=".repeat(50)));
        }
        std::fs::write(path, out)?;
        println!("\nchunks saved to {}", path.display());
    }

    Ok(())
}

async fn run_embed(
    store_dir: &Path,
    table: &str,
    folder: &Path,
    mode: &str,
) -> anyhow::Result<()> {
    let mode: WriteMode = mode
        .parse()
        .map_err(|reason: String| anyhow::anyhow!(reason))?;
    let config = ServiceConfig::from_env().map_err(|error| anyhow::anyhow!(error.to_string()))?;

    let report = ingest_folder(&LopdfExtractor, folder, None)
        .map_err(|error| anyhow::anyhow!(error.to_string()))?;

    if !report.skipped_files.is_empty() {
        warn!(
            "skipped_files={} for folder={}",
            report.skipped_files.len(),
            folder.display()
        );
        for skipped in &report.skipped_files {
            warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped pdf");
        }
    }

    info!(folder = %folder.display(), chunk_count = report.chunk_count(), "embedding chunks");

    let chunks: Vec<ReportChunk> = report
        .documents
        .into_iter()
        .flat_map(|document| document.chunks)
        .collect();
    if chunks.is_empty() {
        println!("0 chunks to embed (all files were skipped)");
        return Ok(());
    }

    let embedder =
        AzureEmbeddingClient::new(&config).map_err(|error| anyhow::anyhow!(error.to_string()))?;
    let store =
        LmdbVectorStore::open(store_dir).map_err(|error| anyhow::anyhow!(error.to_string()))?;
    let writer = StoreWriter::new(embedder, store);

    let write_report = writer
        .write(table, &chunks, mode)
        .await
        .map_err(|error| anyhow::anyhow!(error.to_string()))?;

    for failed in &write_report.failed {
        warn!(chunk_index = failed.chunk_index, reason = %failed.reason, "chunk skipped");
    }
    println!(
        "{} records written to table {:?} ({} failed, mode {}) at {}",
        write_report.written,
        write_report.table,
        write_report.failed.len(),
        mode,
        write_report.finished_at.to_rfc3339()
    );

    Ok(())
}

async fn run_search(
    store_dir: &Path,
    table: &str,
    query: &str,
    top_k: usize,
) -> anyhow::Result<()> {
    let config = ServiceConfig::from_env().map_err(|error| anyhow::anyhow!(error.to_string()))?;
    let embedder =
        AzureEmbeddingClient::new(&config).map_err(|error| anyhow::anyhow!(error.to_string()))?;
    let store =
        LmdbVectorStore::open(store_dir).map_err(|error| anyhow::anyhow!(error.to_string()))?;

    let retriever = Retriever::new(embedder, store.clone(), table);
    let hits = retriever
        .retrieve(query, top_k)
        .await
        .map_err(|error| anyhow::anyhow!(error.to_string()))?;

    println!("query: {query}");
    for (position, hit) in hits.iter().enumerate() {
        let preview: String = hit.record.text.chars().take(150).collect();
        let metadata = &hit.record.metadata;
        println!("\n{}. score={:.4} {}", position + 1, hit.score, preview);
        println!(
            "   source={} pages={:?} quality={}",
            metadata.filename,
            metadata.page_numbers,
            metadata.quality.as_str()
        );
    }

    let rows = store
        .count(table)
        .await
        .map_err(|error| anyhow::anyhow!(error.to_string()))?;
    println!("\n{rows} records in table {table:?}");

    Ok(())
}

async fn run_chat(
    store_dir: &Path,
    table: &str,
    top_k: usize,
    temperature: f32,
) -> anyhow::Result<()> {
    let config = ServiceConfig::from_env().map_err(|error| anyhow::anyhow!(error.to_string()))?;
    let embedder =
        AzureEmbeddingClient::new(&config).map_err(|error| anyhow::anyhow!(error.to_string()))?;
    let chat = AzureChatClient::new(&config, temperature)
        .map_err(|error| anyhow::anyhow!(error.to_string()))?;
    let store =
        LmdbVectorStore::open(store_dir).map_err(|error| anyhow::anyhow!(error.to_string()))?;

    // Refuse to start when nothing has been ingested; the store error says
    // which step to run.
    let rows = store
        .count(table)
        .await
        .map_err(|error| anyhow::anyhow!(error.to_string()))?;
    if rows == 0 {
        anyhow::bail!(
            "table {table:?} in {} is empty; run the embed step before chatting",
            store_dir.display()
        );
    }
    println!("knowledge base ready: {rows} records in table {table:?}");
    println!("Ask about the ingested reports. Type 'quit' to exit.");

    let mut session =
        ChatSession::new(Retriever::new(embedder, store, table), chat).with_top_k(top_k);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\n> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        let lowered = question.to_lowercase();
        if matches!(lowered.as_str(), "quit" | "exit" | "q") {
            break;
        }

        let turn = match session.run_turn(question).await {
            Ok(turn) => turn,
            Err(error) if error.is_store_missing() => {
                println!("no knowledge base loaded: {error}");
                continue;
            }
            Err(error) => {
                println!("turn failed while {}: {error}", error.phase());
                continue;
            }
        };

        if !turn.hits.is_empty() {
            println!("retrieved context:");
            for (position, hit) in turn.hits.iter().enumerate() {
                let metadata = &hit.record.metadata;
                let preview: String = hit.record.text.chars().take(200).collect();
                println!("\n{}. {preview}...", position + 1);
                println!(
                    "   source={} pages={:?} score={:.3}",
                    metadata.filename, metadata.page_numbers, hit.score
                );
            }
        }

        println!();
        let mut reply = String::new();
        let mut stream = turn.stream;
        while let Some(fragment) = stream.next().await {
            match fragment {
                Ok(text) => {
                    print!("{text}");
                    std::io::stdout().flush()?;
                    reply.push_str(&text);
                }
                Err(error) => {
                    println!();
                    warn!(%error, "reply stream interrupted");
                    break;
                }
            }
        }
        println!();
        session.record_reply(reply);
    }

    println!("goodbye");
    Ok(())
}

//! CLI binary entrypoint.
//!
//! Exit codes: nonzero only for startup failures (bad flags, missing
//! credentials, unreachable home directory). Operational failures are
//! reported in the JSON response body with exit code zero.

use clap::{Parser, Subcommand};
use semindex_adapters::JsonLineLogger;
use semindex_config::BackendEnv;
use semindex_domain::{CodebaseStatus, SearchHit};
use semindex_infra::{is_terminal_refusal, ContextBackend, IndexCodebaseStatus, StatusReport};
use semindex_shared::{ErrorEnvelope, RequestContext};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "semindex", version, about = "Semantic codebase indexing CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Index a codebase into the vector store.
    Index {
        /// Codebase root (defaults to the current directory).
        #[arg(long)]
        path: Option<PathBuf>,
        /// Drop any existing collection first.
        #[arg(long)]
        force: bool,
    },
    /// Search an indexed codebase.
    Search {
        /// Query text.
        query: String,
        /// Path under an indexed root (defaults to the current directory).
        #[arg(long)]
        path: Option<PathBuf>,
        /// Maximum number of hits (capped at 50).
        #[arg(long, default_value_t = 10)]
        limit: u32,
        /// Restrict hits to these extensions (comma-separated).
        #[arg(long)]
        extensions: Option<String>,
        /// Minimum score.
        #[arg(long)]
        threshold: Option<f32>,
    },
    /// Remove a codebase's collection, snapshot, and registry entry.
    Clear {
        /// Codebase root (defaults to the current directory).
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Show indexing status.
    Status {
        /// Optional path to resolve; omit for the aggregate report.
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(error) => {
            eprintln!("failed to start runtime: {error}");
            return std::process::ExitCode::FAILURE;
        }
    };

    runtime.block_on(run(cli))
}

async fn run(cli: Cli) -> std::process::ExitCode {
    let env = match BackendEnv::from_std_env() {
        Ok(env) => env,
        Err(error) => {
            eprintln!("configuration error: {error}");
            return std::process::ExitCode::FAILURE;
        }
    };

    let logger: Arc<dyn semindex_ports::LoggerPort> = Arc::new(JsonLineLogger::new());
    let backend = match ContextBackend::new(env, Some(logger)).await {
        Ok(backend) => Arc::new(backend),
        Err(error) => {
            eprintln!("startup failed: {error}");
            return std::process::ExitCode::FAILURE;
        }
    };
    backend.install_signal_handlers();

    let ctx = RequestContext::for_request();
    let result = dispatch(&backend, &ctx, cli.command).await;
    backend.shutdown();

    match result {
        Ok(body) => {
            println!("{body:#}");
            std::process::ExitCode::SUCCESS
        }
        Err(error) => {
            // Operational failures are response bodies, not crashes.
            println!("{:#}", error_body(&error));
            std::process::ExitCode::SUCCESS
        }
    }
}

async fn dispatch(
    backend: &Arc<ContextBackend>,
    ctx: &RequestContext,
    command: Commands,
) -> Result<serde_json::Value, ErrorEnvelope> {
    match command {
        Commands::Index { path, force } => {
            let path = resolve_cwd(path)?;
            let output = backend.index_codebase(ctx, &path, force).await?;
            Ok(json!({
                "indexedFiles": output.indexed_files,
                "totalChunks": output.total_chunks,
                "status": match output.status {
                    IndexCodebaseStatus::Completed => "completed",
                    IndexCodebaseStatus::LimitReached => "limitReached",
                },
            }))
        }
        Commands::Search {
            query,
            path,
            limit,
            extensions,
            threshold,
        } => {
            let path = resolve_cwd(path)?;
            let extension_filter = extensions
                .as_deref()
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|ext| !ext.is_empty())
                        .map(|ext| ext.to_owned().into_boxed_str())
                        .collect()
                })
                .unwrap_or_default();
            let hits = backend
                .search_code(ctx, &path, &query, limit, extension_filter, threshold)
                .await?;
            Ok(json!({ "results": hits.iter().map(hit_body).collect::<Vec<_>>() }))
        }
        Commands::Clear { path } => {
            let path = resolve_cwd(path)?;
            backend.clear_index(ctx, &path).await?;
            Ok(json!({ "cleared": true }))
        }
        Commands::Status { path } => {
            let report = backend.get_indexing_status(path.as_deref()).await?;
            Ok(status_body(&report))
        }
    }
}

fn resolve_cwd(path: Option<PathBuf>) -> Result<PathBuf, ErrorEnvelope> {
    match path {
        Some(path) => Ok(path),
        None => std::env::current_dir().map_err(ErrorEnvelope::from),
    }
}

fn hit_body(hit: &SearchHit) -> serde_json::Value {
    json!({
        "relativePath": hit.key.relative_path.as_ref(),
        "startLine": hit.key.span.start_line(),
        "endLine": hit.key.span.end_line(),
        "language": hit.language.map(|language| language.as_str()),
        "score": hit.score,
        "content": hit.content.as_deref(),
    })
}

fn status_body(report: &StatusReport) -> serde_json::Value {
    match report {
        StatusReport::Codebase(record) => record_body(record),
        StatusReport::Aggregate(report) => json!({
            "indexed": report.indexed.iter().map(record_body).collect::<Vec<_>>(),
            "indexing": report.indexing.iter().map(record_body).collect::<Vec<_>>(),
            "failed": report.failed.iter().map(record_body).collect::<Vec<_>>(),
        }),
    }
}

fn record_body(record: &semindex_domain::CodebaseRecord) -> serde_json::Value {
    let mut body = json!({
        "rootPath": record.root_path.as_ref(),
        "collectionName": record.collection_name.as_str(),
        "status": record.status.label(),
        "lastUpdatedMs": record.last_updated_ms,
    });
    if let Some(object) = body.as_object_mut() {
        match &record.status {
            CodebaseStatus::Indexing { percent } => {
                object.insert("progressPercent".into(), json!(percent));
            }
            CodebaseStatus::Indexed { stats } => {
                object.insert(
                    "stats".into(),
                    json!({ "files": stats.files, "chunks": stats.chunks }),
                );
            }
            CodebaseStatus::IndexFailed {
                error_message,
                last_attempted_percent,
            } => {
                object.insert("errorMessage".into(), json!(error_message.as_ref()));
                object.insert("lastAttemptedPercent".into(), json!(last_attempted_percent));
            }
        }
    }
    body
}

fn error_body(error: &ErrorEnvelope) -> serde_json::Value {
    json!({
        "error": {
            "code": error.code.to_string(),
            "message": error.message,
            "terminal": is_terminal_refusal(error),
        }
    })
}

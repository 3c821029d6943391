//! Index a codebase: scan, split, embed in adaptive batches, and persist.

mod memory;
mod pipeline;
mod scanner;
mod types;

pub use types::{
    IndexCodebaseDeps, IndexCodebaseInput, IndexCodebaseOutput, IndexCodebaseStatus, IndexProgress,
    ProgressCallback,
};

use pipeline::{drain_all, schedule_embedding_batch, spawn_file_task, PipelineState, RunContext};
use semindex_shared::{ErrorCode, ErrorEnvelope, RequestContext, Result};
use std::collections::VecDeque;
use types::{FileOutcome, PendingChunk, ProgressTracker};

/// Run the indexing pipeline for one codebase.
pub async fn index_codebase(
    ctx: &RequestContext,
    deps: &IndexCodebaseDeps,
    input: IndexCodebaseInput,
) -> Result<IndexCodebaseOutput> {
    ctx.ensure_live("index_codebase")?;

    let mut progress = ProgressTracker::new(input.on_progress.clone());
    progress.emit("Preparing collection...", 0, 100, 0);
    ensure_collection(ctx, deps, &input).await?;

    progress.emit("Scanning files...", 0, 100, 5);
    let files = scanner::discover_files(ctx, deps, &input).await?;

    if files.is_empty() {
        progress.emit("No files to index", 100, 100, 100);
        return Ok(IndexCodebaseOutput {
            indexed_files: 0,
            total_chunks: 0,
            status: IndexCodebaseStatus::Completed,
        });
    }
    progress.emit("Scan complete", 0, files.len() as u64, 15);

    let run = RunContext::new(ctx, deps, &input)?;
    let mut state = PipelineState::new();
    let mut output = IndexCodebaseOutput {
        indexed_files: 0,
        total_chunks: 0,
        status: IndexCodebaseStatus::Completed,
    };

    process_files(&run, &input, &files, &mut state, &mut output, &mut progress).await?;

    if output.status == IndexCodebaseStatus::LimitReached {
        progress.emit("Chunk limit reached", files.len() as u64, files.len() as u64, 100);
    }

    Ok(output)
}

async fn process_files(
    run: &RunContext,
    input: &IndexCodebaseInput,
    files: &[Box<str>],
    state: &mut PipelineState,
    output: &mut IndexCodebaseOutput,
    progress: &mut ProgressTracker,
) -> Result<()> {
    let prefetch = input.tuning.file_concurrency.saturating_mul(2).max(1);
    let mut inflight = VecDeque::new();
    let mut next_submit = 0usize;
    let mut pending: Vec<PendingChunk> = Vec::new();

    for file_index in 0..files.len() {
        run.ctx.ensure_live("index.process_file")?;

        while next_submit < files.len() && inflight.len() < prefetch {
            inflight.push_back(spawn_file_task(run, files[next_submit].clone()));
            next_submit += 1;
        }

        let handle = inflight.pop_front().ok_or_else(|| {
            ErrorEnvelope::invariant(ErrorCode::internal(), "file task queue underflow")
        })?;
        let outcome = handle.await.map_err(|error| {
            ErrorEnvelope::unexpected(
                ErrorCode::internal(),
                format!("file task failed: {error}"),
                semindex_shared::ErrorClass::NonRetriable,
            )
        })??;

        if output.total_chunks >= input.chunk_limit {
            output.status = IndexCodebaseStatus::LimitReached;
            break;
        }

        let FileOutcome::Split {
            relative_path,
            chunks,
        } = outcome
        else {
            progress.emit_file_progress(file_index + 1, files.len());
            continue;
        };

        let mut truncated_mid_file = false;
        for (chunk_index, chunk) in chunks.into_iter().enumerate() {
            run.ctx.ensure_live("index.chunk_loop")?;

            if output.total_chunks >= input.chunk_limit {
                output.status = IndexCodebaseStatus::LimitReached;
                truncated_mid_file = true;
                break;
            }

            pending.push(PendingChunk {
                relative_path: relative_path.clone(),
                span: chunk.span,
                language: chunk.language,
                content: chunk.content,
                file_extension: scanner::file_extension_of(&relative_path),
                chunk_index: u32::try_from(chunk_index).unwrap_or(u32::MAX),
            });
            output.total_chunks += 1;

            match run.effective_batch_threshold() {
                Some(threshold) => {
                    while pending.len() >= threshold {
                        let batch: Vec<PendingChunk> = pending.drain(..threshold).collect();
                        schedule_embedding_batch(run, state, batch).await?;
                    }
                }
                None => {
                    // Critical memory pressure: freeze the buffer now.
                    let batch = std::mem::take(&mut pending);
                    schedule_embedding_batch(run, state, batch).await?;
                }
            }
        }

        if !truncated_mid_file {
            output.indexed_files += 1;
        }
        progress.emit_file_progress(file_index + 1, files.len());

        if output.status == IndexCodebaseStatus::LimitReached {
            break;
        }
    }

    // Abandon prefetched work that will never be consumed (limit reached).
    for handle in inflight {
        handle.abort();
    }

    schedule_embedding_batch(run, state, std::mem::take(&mut pending)).await?;
    drain_all(run, state).await?;
    Ok(())
}

async fn ensure_collection(
    ctx: &RequestContext,
    deps: &IndexCodebaseDeps,
    input: &IndexCodebaseInput,
) -> Result<()> {
    let exists = deps
        .store
        .has_collection(ctx, input.collection_name.clone())
        .await?;

    if exists && input.force_reindex {
        deps.store
            .drop_collection(ctx, input.collection_name.clone())
            .await?;
    } else if exists {
        return Ok(());
    }

    if !deps.store.check_collection_limit(ctx).await? {
        return Err(ErrorEnvelope::expected(
            ErrorCode::collection_limit_reached(),
            "exceeded the limit number of collections",
        ));
    }

    let dimension = deps.embedding.detect_dimension(ctx).await?;
    match input.index_mode {
        semindex_domain::IndexMode::Hybrid => {
            deps.store
                .create_hybrid_collection(ctx, input.collection_name.clone(), dimension, None)
                .await
        }
        semindex_domain::IndexMode::Dense => {
            deps.store
                .create_collection(ctx, input.collection_name.clone(), dimension, None)
                .await
        }
    }
}

//! Two-stage pipeline machinery: file tasks feed a chunk buffer, frozen
//! batches flow through embedding workers into a bounded insert queue.
//!
//! Backpressure is positional: embed results are drained in submission order
//! once the in-flight window fills, and each drained batch immediately
//! queues its insert, so stage B overlaps later stage A work.

use super::memory::{MemoryGauge, MemoryPressure};
use super::scanner::file_extension_of;
use super::types::{FileOutcome, IndexCodebaseDeps, IndexCodebaseInput, PendingChunk};
use semindex_domain::{derive_chunk_id, ChunkIdInput, IndexMode, Language};
use semindex_ports::{ChunkDocument, ChunkDocumentMetadata, RelPath};
use semindex_shared::{
    retry_async, ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result, RetryPolicy,
    TaskLimiter,
};
use std::sync::Arc;
use tokio::task::JoinHandle;

pub(crate) struct EmbeddedBatch {
    pub documents: Vec<ChunkDocument>,
}

/// Everything a spawned stage task needs, clonable into `'static` futures.
#[derive(Clone)]
pub(crate) struct RunContext {
    pub ctx: RequestContext,
    pub deps: IndexCodebaseDeps,
    pub codebase_root: std::path::PathBuf,
    pub codebase_label: Box<str>,
    pub collection: semindex_domain::CollectionName,
    pub index_mode: IndexMode,
    pub file_limiter: TaskLimiter,
    pub embed_limiter: TaskLimiter,
    pub insert_limiter: TaskLimiter,
    pub gauge: Arc<MemoryGauge>,
    pub embedding_batch_size: usize,
    pub max_inflight_embeds: usize,
    pub max_queued_inserts: usize,
}

impl RunContext {
    pub(crate) fn new(
        ctx: &RequestContext,
        deps: &IndexCodebaseDeps,
        input: &IndexCodebaseInput,
    ) -> Result<Self> {
        let tuning = input.tuning;
        Ok(Self {
            ctx: ctx.clone(),
            deps: deps.clone(),
            codebase_root: input.codebase_root.clone(),
            codebase_label: input
                .codebase_root
                .to_string_lossy()
                .into_owned()
                .into_boxed_str(),
            collection: input.collection_name.clone(),
            index_mode: input.index_mode,
            file_limiter: TaskLimiter::new(tuning.file_concurrency)?,
            embed_limiter: TaskLimiter::new(tuning.api_concurrency)?,
            insert_limiter: TaskLimiter::new(tuning.api_concurrency)?,
            gauge: Arc::new(MemoryGauge::new(tuning.memory_limit_mb)),
            embedding_batch_size: tuning.embedding_batch_size,
            max_inflight_embeds: tuning.api_concurrency.saturating_mul(2).max(1),
            max_queued_inserts: tuning.insert_queue_depth().max(1),
        })
    }

    /// Batch threshold under the current memory pressure; `None` means
    /// freeze whatever is buffered right now.
    pub(crate) fn effective_batch_threshold(&self) -> Option<usize> {
        match self.gauge.pressure() {
            MemoryPressure::Normal => Some(self.embedding_batch_size),
            MemoryPressure::Elevated => Some((self.embedding_batch_size / 2).max(1)),
            MemoryPressure::Critical => None,
        }
    }
}

/// Mutable per-run pipeline state, drained positionally.
pub(crate) struct PipelineState {
    pub embed_tasks: Vec<JoinHandle<Result<EmbeddedBatch>>>,
    pub next_embed_to_drain: usize,
    pub insert_tasks: Vec<JoinHandle<Result<()>>>,
    pub next_insert_to_drain: usize,
}

impl PipelineState {
    pub(crate) const fn new() -> Self {
        Self {
            embed_tasks: Vec::new(),
            next_embed_to_drain: 0,
            insert_tasks: Vec::new(),
            next_insert_to_drain: 0,
        }
    }

    fn embeds_in_flight(&self) -> usize {
        self.embed_tasks.len() - self.next_embed_to_drain
    }

    fn inserts_queued(&self) -> usize {
        self.insert_tasks.len() - self.next_insert_to_drain
    }
}

/// Spawn a read+split task for one file.
pub(crate) fn spawn_file_task(
    run: &RunContext,
    relative_path: Box<str>,
) -> JoinHandle<Result<FileOutcome>> {
    let run = run.clone();
    tokio::spawn(async move {
        let _permit = run.file_limiter.acquire(&run.ctx).await?;
        run.ctx.ensure_live("index.file_task")?;

        let rel = match RelPath::new(&relative_path) {
            Ok(rel) => rel,
            Err(_) => return Ok(FileOutcome::Skipped),
        };
        let content = match run
            .deps
            .filesystem
            .read_file_text(&run.ctx, run.codebase_root.clone(), rel)
            .await
        {
            Ok(content) => content,
            Err(error) => {
                if error.is_cancelled() {
                    return Err(error);
                }
                if let Some(logger) = run.deps.logger.as_ref() {
                    logger.warn("index.file_read_failed", "Cannot read file; skipping", None);
                }
                return Ok(FileOutcome::Skipped);
            }
        };

        let language = file_extension_of(&relative_path)
            .map_or(Language::Text, |ext| Language::from_extension(&ext));

        match run
            .deps
            .splitter
            .split(&run.ctx, content, language, &relative_path)
            .await
        {
            Ok(chunks) => Ok(FileOutcome::Split {
                relative_path,
                chunks,
            }),
            Err(error) => {
                if error.is_cancelled() {
                    return Err(error);
                }
                if let Some(logger) = run.deps.logger.as_ref() {
                    logger.warn("index.split_failed", "Splitter failed; skipping file", None);
                }
                Ok(FileOutcome::Skipped)
            }
        }
    })
}

/// Freeze `batch` into an embedding task and apply stage-A backpressure.
pub(crate) async fn schedule_embedding_batch(
    run: &RunContext,
    state: &mut PipelineState,
    batch: Vec<PendingChunk>,
) -> Result<()> {
    if batch.is_empty() {
        return Ok(());
    }

    let task_run = run.clone();
    let handle = tokio::spawn(async move { embed_batch_task(task_run, batch).await });
    state.embed_tasks.push(handle);

    while state.embeds_in_flight() >= run.max_inflight_embeds {
        drain_one_embedding_batch(run, state).await?;
    }
    Ok(())
}

async fn embed_batch_task(run: RunContext, batch: Vec<PendingChunk>) -> Result<EmbeddedBatch> {
    let _permit = run.embed_limiter.acquire(&run.ctx).await?;
    run.ctx.ensure_live("index.embed_batch")?;

    let texts: Vec<Box<str>> = batch.iter().map(|chunk| chunk.content.clone()).collect();
    let vectors = run.deps.embedding.embed_batch(&run.ctx, texts).await?;
    if vectors.len() != batch.len() {
        return Err(ErrorEnvelope::unexpected(
            ErrorCode::new("embedding", "invalid_response"),
            "embedding batch size mismatch",
            ErrorClass::NonRetriable,
        ));
    }

    let mut documents = Vec::with_capacity(batch.len());
    for (chunk, vector) in batch.into_iter().zip(vectors) {
        let id = derive_chunk_id(&ChunkIdInput {
            relative_path: &chunk.relative_path,
            span: chunk.span,
            content: &chunk.content,
        })
        .map_err(ErrorEnvelope::from)?;

        documents.push(ChunkDocument {
            id: id.into_inner(),
            vector: vector.into_vector(),
            content: chunk.content,
            relative_path: chunk.relative_path,
            span: chunk.span,
            file_extension: chunk.file_extension,
            metadata: ChunkDocumentMetadata {
                codebase_path: run.codebase_label.clone(),
                language: Some(chunk.language),
                chunk_index: chunk.chunk_index,
            },
        });
    }
    Ok(EmbeddedBatch { documents })
}

/// Await the next embedding task in submission order. Failed batches are
/// dropped with a warning; successful ones queue their insert immediately.
pub(crate) async fn drain_one_embedding_batch(
    run: &RunContext,
    state: &mut PipelineState,
) -> Result<()> {
    if state.next_embed_to_drain >= state.embed_tasks.len() {
        return Ok(());
    }
    let index = state.next_embed_to_drain;
    state.next_embed_to_drain += 1;

    let handle = state
        .embed_tasks
        .get_mut(index)
        .ok_or_else(|| missing_task("embedding"))?;
    let embedded = match handle.await.map_err(join_error)? {
        Ok(embedded) => embedded,
        Err(error) => {
            if error.is_cancelled() {
                return Err(error);
            }
            // Partial index beats none: the batch is gone, the run goes on.
            if let Some(logger) = run.deps.logger.as_ref() {
                logger.error(
                    "index.embed_batch_dropped",
                    "Embedding failed after retries; dropping batch",
                    None,
                );
            }
            return Ok(());
        }
    };

    schedule_insert_batch(run, state, embedded);
    while state.inserts_queued() >= run.max_queued_inserts {
        drain_one_insert_batch(run, state).await?;
    }

    if run.gauge.wants_gc_hint() {
        // No collector to poke on this host; record that we would have.
        if let Some(logger) = run.deps.logger.as_ref() {
            logger.debug("index.memory.gc_hint", "Memory above hint threshold", None);
        }
    }
    Ok(())
}

fn schedule_insert_batch(run: &RunContext, state: &mut PipelineState, embedded: EmbeddedBatch) {
    if embedded.documents.is_empty() {
        return;
    }
    let task_run = run.clone();
    let handle = tokio::spawn(async move {
        let _permit = task_run.insert_limiter.acquire(&task_run.ctx).await?;
        task_run.ctx.ensure_live("index.insert_batch")?;

        let ctx = task_run.ctx.clone();
        let documents = embedded.documents;
        retry_async(
            &ctx,
            RetryPolicy::transient(),
            "index.insert_batch",
            move || {
                let run = task_run.clone();
                let documents = documents.clone();
                async move {
                    match run.index_mode {
                        IndexMode::Hybrid => {
                            run.deps
                                .store
                                .insert_hybrid(&run.ctx, run.collection.clone(), documents)
                                .await
                        }
                        IndexMode::Dense => {
                            run.deps
                                .store
                                .insert(&run.ctx, run.collection.clone(), documents)
                                .await
                        }
                    }
                }
            },
        )
        .await
    });
    state.insert_tasks.push(handle);
}

/// Await the next insert in submission order. Insert failures after retries
/// abort the run.
pub(crate) async fn drain_one_insert_batch(
    _run: &RunContext,
    state: &mut PipelineState,
) -> Result<()> {
    if state.next_insert_to_drain >= state.insert_tasks.len() {
        return Ok(());
    }
    let index = state.next_insert_to_drain;
    state.next_insert_to_drain += 1;

    let handle = state
        .insert_tasks
        .get_mut(index)
        .ok_or_else(|| missing_task("insert"))?;
    handle.await.map_err(join_error)?
}

/// Drain everything still in flight.
pub(crate) async fn drain_all(run: &RunContext, state: &mut PipelineState) -> Result<()> {
    while state.next_embed_to_drain < state.embed_tasks.len() {
        drain_one_embedding_batch(run, state).await?;
    }
    while state.next_insert_to_drain < state.insert_tasks.len() {
        drain_one_insert_batch(run, state).await?;
    }
    Ok(())
}

fn join_error(error: tokio::task::JoinError) -> ErrorEnvelope {
    ErrorEnvelope::unexpected(
        ErrorCode::internal(),
        format!("pipeline task failed: {error}"),
        ErrorClass::NonRetriable,
    )
}

fn missing_task(stage: &str) -> ErrorEnvelope {
    ErrorEnvelope::unexpected(
        ErrorCode::internal(),
        format!("missing {stage} task"),
        ErrorClass::NonRetriable,
    )
}

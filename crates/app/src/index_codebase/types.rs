//! Inputs, outputs, and run-scoped state for `index_codebase`.

use semindex_config::BatchTuning;
use semindex_domain::{CollectionName, IndexMode, Language, LineSpan};
use semindex_ports::{
    EmbeddingPort, FileSystemPort, IgnorePort, LoggerPort, SplitterPort, VectorStorePort,
};
use std::path::PathBuf;
use std::sync::Arc;

/// Progress update emitted by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexProgress {
    /// Phase description.
    pub phase: Box<str>,
    /// Current item count.
    pub current: u64,
    /// Total item count.
    pub total: u64,
    /// Completion percentage (0-100).
    pub percent: u8,
}

/// Callback invoked with progress updates.
pub type ProgressCallback = Arc<dyn Fn(IndexProgress) + Send + Sync>;

/// Completion status of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexCodebaseStatus {
    /// Every discovered file was processed.
    Completed,
    /// Stopped at the per-run chunk ceiling.
    LimitReached,
}

/// Result of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexCodebaseOutput {
    /// Files fully processed.
    pub indexed_files: usize,
    /// Chunks persisted.
    pub total_chunks: usize,
    /// Completion status.
    pub status: IndexCodebaseStatus,
}

/// Dependencies of the pipeline.
#[derive(Clone)]
pub struct IndexCodebaseDeps {
    /// Embedding client (already batching-aware).
    pub embedding: Arc<dyn EmbeddingPort>,
    /// Vector store.
    pub store: Arc<dyn VectorStorePort>,
    /// Splitter.
    pub splitter: Arc<dyn SplitterPort>,
    /// Filesystem access.
    pub filesystem: Arc<dyn FileSystemPort>,
    /// Ignore matcher resolved for this root.
    pub ignore: Arc<dyn IgnorePort>,
    /// Optional structured logger.
    pub logger: Option<Arc<dyn LoggerPort>>,
}

/// Input configuration of one run.
#[derive(Clone)]
pub struct IndexCodebaseInput {
    /// Absolute canonical codebase root.
    pub codebase_root: PathBuf,
    /// Target collection.
    pub collection_name: CollectionName,
    /// Dense or hybrid.
    pub index_mode: IndexMode,
    /// Allowed extensions without leading dots; empty means defaults applied
    /// by the caller.
    pub extensions: Vec<Box<str>>,
    /// Restrict the run to these relative paths (incremental reindex).
    pub file_list: Option<Vec<Box<str>>>,
    /// Drop an existing collection first.
    pub force_reindex: bool,
    /// Batching and concurrency knobs.
    pub tuning: BatchTuning,
    /// Hard chunk ceiling for this run.
    pub chunk_limit: usize,
    /// Optional progress callback.
    pub on_progress: Option<ProgressCallback>,
}

/// One chunk waiting to be embedded.
#[derive(Debug, Clone)]
pub(crate) struct PendingChunk {
    pub relative_path: Box<str>,
    pub span: LineSpan,
    pub language: Language,
    pub content: Box<str>,
    pub file_extension: Option<Box<str>>,
    pub chunk_index: u32,
}

/// Outcome of reading and splitting one file.
#[derive(Debug)]
pub(crate) enum FileOutcome {
    Skipped,
    Split {
        relative_path: Box<str>,
        chunks: Vec<semindex_ports::CodeChunk>,
    },
}

/// Progress emission from a single site, keeping percent monotone.
pub(crate) struct ProgressTracker {
    callback: Option<ProgressCallback>,
    last_percent: u8,
}

impl ProgressTracker {
    pub(crate) fn new(callback: Option<ProgressCallback>) -> Self {
        Self {
            callback,
            last_percent: 0,
        }
    }

    pub(crate) fn emit(&mut self, phase: &str, current: u64, total: u64, percent: u8) {
        let percent = percent.min(100).max(self.last_percent);
        self.last_percent = percent;
        if let Some(callback) = self.callback.as_ref() {
            callback(IndexProgress {
                phase: phase.into(),
                current,
                total,
                percent,
            });
        }
    }

    /// Scan accounts for a fixed 15% of the bar; files fill the rest.
    pub(crate) fn emit_file_progress(&mut self, files_done: usize, files_total: usize) {
        let percent = file_phase_percent(files_done, files_total);
        self.emit(
            &format!("Processing files ({files_done}/{files_total})..."),
            files_done as u64,
            files_total as u64,
            percent,
        );
    }

    pub(crate) const fn last_percent(&self) -> u8 {
        self.last_percent
    }
}

pub(crate) fn file_phase_percent(files_done: usize, files_total: usize) -> u8 {
    if files_total == 0 {
        return 100;
    }
    let done = files_done.min(files_total) as u64;
    let share = done.saturating_mul(85) / files_total as u64;
    u8::try_from(15 + share).unwrap_or(100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn file_phase_percent_spans_fifteen_to_hundred() {
        assert_eq!(file_phase_percent(0, 10), 15);
        assert_eq!(file_phase_percent(5, 10), 57);
        assert_eq!(file_phase_percent(10, 10), 100);
        assert_eq!(file_phase_percent(0, 0), 100);
    }

    #[test]
    fn tracker_never_regresses() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_in_callback = Arc::clone(&seen);
        let callback: ProgressCallback = Arc::new(move |progress: IndexProgress| {
            seen_in_callback
                .lock()
                .expect("progress lock")
                .push(progress.percent);
        });

        let mut tracker = ProgressTracker::new(Some(callback));
        tracker.emit("a", 0, 10, 40);
        tracker.emit("b", 1, 10, 20);
        tracker.emit("c", 2, 10, 60);

        let recorded = seen.lock().expect("progress lock").clone();
        assert_eq!(recorded, vec![40, 40, 60]);
        assert_eq!(tracker.last_percent(), 60);
    }
}

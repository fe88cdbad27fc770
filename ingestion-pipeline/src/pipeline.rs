use std::{
    collections::{BTreeMap, HashMap, HashSet},
    fs,
    path::{Path, PathBuf},
    time::Instant,
};

use tracing::{info, warn};

use common::{
    error::AppError,
    storage::{
        chunks::{read_chunks, write_chunks_atomic, ChunkRecord},
        manifest::{IngestionManifest, ManifestConfig, ManifestFileEntry, SplitterConfig},
    },
    utils::{hashing::sha256_hex, time::now_utc_iso},
};

use crate::{
    loader::load_document,
    splitter::{normalize_text, sentence_tokenize, stable_doc_id, window_sentences},
};

const SUPPORTED_EXTENSIONS: [&str; 3] = ["pdf", "txt", "md"];

/// Summary of one incremental ingestion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestionOutcome {
    pub total_chunks: usize,
    pub preserved_chunks: usize,
    pub new_chunks: usize,
    pub changed_files: usize,
    pub unchanged_files: usize,
    pub deleted_files: usize,
}

/// Runs the manifest-driven incremental ingestion:
/// change analysis, preservation of untouched chunks, re-chunking of changed
/// files, atomic JSONL rewrite, and manifest update.
///
/// `workspace_root` anchors the relative manifest keys; files outside it are
/// keyed by their absolute path.
#[tracing::instrument(skip_all, fields(input_dir = %input_dir.display()))]
pub fn ingest(
    input_dir: &Path,
    index_dir: &Path,
    workspace_root: &Path,
) -> Result<IngestionOutcome, AppError> {
    let started = Instant::now();
    let splitter = SplitterConfig::default();
    let manifest_path = index_dir.join("manifest.json");
    let chunks_path = index_dir.join("chunks.jsonl");

    if !input_dir.exists() {
        info!(dir = %input_dir.display(), "Seed directory missing; creating it");
        fs::create_dir_all(input_dir)?;
    }

    let manifest = IngestionManifest::load(&manifest_path);
    let current_fingerprint = splitter.fingerprint();
    let config_changed = manifest.config.config_fingerprint != current_fingerprint;
    if config_changed && !manifest.files.is_empty() {
        info!("Splitter config changed; forcing full rebuild");
    }

    let source_files = list_source_files(input_dir)?;
    let mut changed: Vec<(PathBuf, String, String)> = Vec::new();
    let mut unchanged: Vec<PathBuf> = Vec::new();
    let mut current_keys = HashSet::new();

    for file in &source_files {
        let rel = manifest_key(file, workspace_root);
        current_keys.insert(rel.clone());
        let content_hash = hash_file(file);
        let prior = manifest.files.get(&rel);
        let is_changed = config_changed
            || prior.is_none()
            || prior.is_some_and(|entry| entry.content_hash != content_hash);
        if is_changed {
            changed.push((file.clone(), rel, content_hash));
        } else {
            unchanged.push(file.clone());
        }
    }

    let deleted: Vec<String> = manifest
        .files
        .keys()
        .filter(|key| !current_keys.contains(*key))
        .cloned()
        .collect();

    info!(
        changed = changed.len(),
        unchanged = unchanged.len(),
        deleted = deleted.len(),
        "Change analysis complete"
    );

    let preserved = preserve_unchanged_chunks(&chunks_path, &unchanged, workspace_root)?;
    let (new_chunks, contributed) = build_chunks(&changed, &splitter);

    let mut merged = preserved.clone();
    merged.extend(new_chunks.clone());
    write_chunks_atomic(&chunks_path, &merged)?;

    let updated = update_manifest(
        manifest,
        &splitter,
        &current_fingerprint,
        &changed,
        &deleted,
        &contributed,
        &new_chunks,
    );
    updated.save(&manifest_path)?;

    let outcome = IngestionOutcome {
        total_chunks: merged.len(),
        preserved_chunks: preserved.len(),
        new_chunks: new_chunks.len(),
        changed_files: changed.len(),
        unchanged_files: unchanged.len(),
        deleted_files: deleted.len(),
    };
    info!(
        total_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        total = outcome.total_chunks,
        preserved = outcome.preserved_chunks,
        new = outcome.new_chunks,
        "Incremental ingestion finished"
    );
    Ok(outcome)
}

/// Immediate children of the seed directory with a supported extension.
/// Intentionally non-recursive; sorted for deterministic chunk indexes.
fn list_source_files(dir: &Path) -> Result<Vec<PathBuf>, AppError> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let supported = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase)
            .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()));
        if supported {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn manifest_key(file: &Path, workspace_root: &Path) -> String {
    file.strip_prefix(workspace_root)
        .unwrap_or(file)
        .display()
        .to_string()
}

fn hash_file(path: &Path) -> String {
    match fs::read(path) {
        Ok(bytes) => sha256_hex(&bytes),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Failed to hash source file");
            String::new()
        }
    }
}

/// Keeps prior chunks whose `source_path` matches an unchanged file, under
/// either its absolute or workspace-relative form.
fn preserve_unchanged_chunks(
    chunks_path: &Path,
    unchanged: &[PathBuf],
    workspace_root: &Path,
) -> Result<Vec<ChunkRecord>, AppError> {
    if unchanged.is_empty() {
        return Ok(Vec::new());
    }

    let mut keep_paths = HashSet::new();
    for file in unchanged {
        keep_paths.insert(file.display().to_string());
        keep_paths.insert(manifest_key(file, workspace_root));
    }

    let preserved: Vec<ChunkRecord> = read_chunks(chunks_path)?
        .into_iter()
        .filter(|chunk| keep_paths.contains(&chunk.source_path))
        .collect();
    info!(
        preserved = preserved.len(),
        files = unchanged.len(),
        "Preserved chunks from unchanged files"
    );
    Ok(preserved)
}

/// Chunks each changed file; returns the new records and the set of source
/// paths whose loader contributed records (only those get manifest updates).
fn build_chunks(
    changed: &[(PathBuf, String, String)],
    splitter: &SplitterConfig,
) -> (Vec<ChunkRecord>, HashSet<String>) {
    let mut chunks = Vec::new();
    let mut contributed = HashSet::new();

    for (file, rel, _hash) in changed {
        let records = load_document(file);
        if records.is_empty() {
            continue;
        }
        contributed.insert(rel.clone());

        // One counter per doc id so multi-page PDFs keep unique chunk ids.
        let mut next_index: HashMap<String, usize> = HashMap::new();
        for record in records {
            let stem = Path::new(&record.source_path)
                .file_stem()
                .and_then(|stem| stem.to_str())
                .unwrap_or_default();
            let doc_id = stable_doc_id(stem);

            let sentences = sentence_tokenize(&record.content);
            for window in window_sentences(
                &sentences,
                splitter.sent_window_size,
                splitter.sent_window_overlap,
            ) {
                let text = normalize_text(&window);
                if text.is_empty() {
                    continue;
                }
                let index = next_index.entry(doc_id.clone()).or_insert(0);
                chunks.push(ChunkRecord {
                    id: format!("{doc_id}#{index}"),
                    doc_id: doc_id.clone(),
                    source_path: record.source_path.clone(),
                    source_type: record.source_type.clone(),
                    page: record.page,
                    heading_path: record.heading_path.clone(),
                    hash: sha256_hex(text.as_bytes()),
                    text,
                    created_at: now_utc_iso(),
                });
                *index = index.saturating_add(1);
            }
        }
    }

    info!(new = chunks.len(), "Generated chunks from changed files");
    (chunks, contributed)
}

fn update_manifest(
    mut manifest: IngestionManifest,
    splitter: &SplitterConfig,
    fingerprint: &str,
    changed: &[(PathBuf, String, String)],
    deleted: &[String],
    contributed: &HashSet<String>,
    new_chunks: &[ChunkRecord],
) -> IngestionManifest {
    manifest.config = ManifestConfig {
        splitter: *splitter,
        config_fingerprint: fingerprint.to_string(),
    };

    for key in deleted {
        if manifest.files.remove(key).is_some() {
            info!(file = %key, "Removed deleted file from manifest");
        }
    }

    let mut chunks_per_source: BTreeMap<&str, usize> = BTreeMap::new();
    for chunk in new_chunks {
        let count = chunks_per_source.entry(chunk.source_path.as_str()).or_insert(0);
        *count = count.saturating_add(1);
    }

    let now = now_utc_iso();
    for (file, rel, content_hash) in changed {
        if !contributed.contains(rel) {
            continue;
        }
        let stem = file
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or_default();
        let chunks_count = chunks_per_source
            .get(file.display().to_string().as_str())
            .copied()
            .unwrap_or(0);
        manifest.files.insert(
            rel.clone(),
            ManifestFileEntry {
                doc_id: stable_doc_id(stem),
                content_hash: content_hash.clone(),
                chunks_count,
                updated_at: now.clone(),
            },
        );
    }

    manifest
}

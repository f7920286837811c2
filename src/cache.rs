//! Persistent per-workspace index cache.
//!
//! Layout: `<repoRoot>/.repo-slice/cache/<key>/cache.bin`, where the key is
//! the first 16 hex chars of SHA-256 over `workspaceRoot|configHash|
//! toolVersion`. The file is self-describing: magic `RSLC`, a little-endian
//! u16 format version, then a bincode body. A JSON body (written when
//! `REPO_SLICE_CACHE_JSON=1`) is the human-readable debugging mode and is
//! detected by the absence of the magic. Any read or decode failure is a
//! cache miss, never fatal.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::types::{CallExpression, EdgeKind, FileFingerprint, ImportGraph, PyDefinition};

pub const CACHE_MAGIC: &[u8; 4] = b"RSLC";
pub const CACHE_FORMAT_VERSION: u16 = 1;

/// Schema version of the record body, bumped on breaking layout changes.
pub const CACHE_SCHEMA_VERSION: u32 = 2;

pub fn tool_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Fingerprint `stat` batch width.
const STAT_BATCH: usize = 50;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TsCacheData {
    pub import_graph: ImportGraph,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub call_expressions: Option<Vec<CallExpression>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PyCacheData {
    pub module_map: BTreeMap<String, String>,
    pub definitions: BTreeMap<String, Vec<PyDefinition>>,
    pub import_graph: ImportGraph,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub call_expressions: Option<Vec<CallExpression>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkspaceCacheRecord {
    pub schema_version: u32,
    pub tool_version: String,
    pub workspace_root: String,
    pub config_hash: String,
    pub files: Vec<FileFingerprint>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ts: Option<TsCacheData>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub py: Option<PyCacheData>,
}

/// Stable hash of the inputs that invalidate a cache.
pub fn config_hash(ignore_patterns: &[String], python_import_roots: &[String]) -> String {
    let canonical = serde_json::json!({
        "ignorePatterns": ignore_patterns,
        "pythonImportRoots": python_import_roots,
    });
    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn cache_key(workspace_root: &str, config_hash: &str, tool_version: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}|{}|{}", workspace_root, config_hash, tool_version).as_bytes());
    format!("{:x}", hasher.finalize())
        .chars()
        .take(16)
        .collect()
}

pub fn cache_path(repo_root: &str, key: &str) -> PathBuf {
    Path::new(repo_root)
        .join(".repo-slice")
        .join("cache")
        .join(key)
        .join("cache.bin")
}

/// Load and verify metadata for a workspace; fingerprint validation is the
/// caller's job via [`fingerprints_match`]. Corruption of any kind is a miss.
pub fn load(repo_root: &str, workspace_root: &str, config_hash: &str) -> Option<WorkspaceCacheRecord> {
    let key = cache_key(workspace_root, config_hash, tool_version());
    let path = cache_path(repo_root, &key);
    let bytes = std::fs::read(&path).ok()?;
    let record = decode(&bytes).or_else(|| {
        debug!(path = %path.display(), "corrupt cache treated as miss");
        None
    })?;
    let valid = record.schema_version == CACHE_SCHEMA_VERSION
        && record.tool_version == tool_version()
        && record.workspace_root == workspace_root
        && record.config_hash == config_hash;
    if !valid {
        debug!(path = %path.display(), "cache metadata mismatch");
        return None;
    }
    Some(record)
}

fn decode(bytes: &[u8]) -> Option<WorkspaceCacheRecord> {
    if bytes.len() >= 6 && &bytes[..4] == CACHE_MAGIC {
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != CACHE_FORMAT_VERSION {
            return None;
        }
        return bincode::deserialize(&bytes[6..]).ok();
    }
    // Human-readable mode; also the entry point for legacy JSON records.
    decode_json(bytes)
}

/// Write the record at end of a successful run: temp file plus persist so a
/// dropped task never leaves a partial cache behind.
pub fn store(repo_root: &str, record: &WorkspaceCacheRecord) -> std::io::Result<()> {
    let key = cache_key(&record.workspace_root, &record.config_hash, &record.tool_version);
    let path = cache_path(repo_root, &key);
    let dir = path.parent().expect("cache path has parent");
    std::fs::create_dir_all(dir)?;

    let payload = if std::env::var("REPO_SLICE_CACHE_JSON").is_ok_and(|v| v == "1") {
        serde_json::to_vec_pretty(record).map_err(std::io::Error::other)?
    } else {
        let body = bincode::serialize(record).map_err(std::io::Error::other)?;
        let mut bytes = Vec::with_capacity(body.len() + 6);
        bytes.extend_from_slice(CACHE_MAGIC);
        bytes.extend_from_slice(&CACHE_FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&body);
        bytes
    };

    let mut tmp = tempfile::Builder::new()
        .prefix("repo-slice-cache")
        .tempfile_in(dir)?;
    tmp.write_all(&payload)?;
    tmp.flush()?;
    tmp.persist(&path).map_err(|e| e.error)?;
    Ok(())
}

/// O(n) fingerprint comparison via a hashed lookup of the cached list: same
/// count, same `(mtime-ms, size)` per path.
pub fn fingerprints_match(record: &WorkspaceCacheRecord, current: &[FileFingerprint]) -> bool {
    if record.files.len() != current.len() {
        return false;
    }
    let cached: HashMap<&str, (u64, u64)> = record
        .files
        .iter()
        .map(|f| (f.path.as_str(), (f.mtime_ms, f.size)))
        .collect();
    current
        .iter()
        .all(|f| cached.get(f.path.as_str()) == Some(&(f.mtime_ms, f.size)))
}

/// Collect `(mtime-ms, size)` fingerprints, statting in parallel batches of
/// up to 50; results keep the input order.
pub fn collect_fingerprints(files: &[String]) -> Vec<FileFingerprint> {
    let mut out: Vec<Option<FileFingerprint>> = vec![None; files.len()];
    for (chunk_idx, chunk) in files.chunks(STAT_BATCH).enumerate() {
        let base = chunk_idx * STAT_BATCH;
        let results: Vec<(usize, Option<FileFingerprint>)> = std::thread::scope(|scope| {
            let handles: Vec<_> = chunk
                .iter()
                .enumerate()
                .map(|(offset, path)| {
                    scope.spawn(move || (base + offset, fingerprint_one(path)))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().expect("stat thread panicked"))
                .collect()
        });
        for (idx, fp) in results {
            out[idx] = fp;
        }
    }
    out.into_iter().flatten().collect()
}

fn fingerprint_one(path: &str) -> Option<FileFingerprint> {
    let meta = std::fs::metadata(path).ok()?;
    let mtime_ms = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    Some(FileFingerprint {
        path: path.to_string(),
        mtime_ms,
        size: meta.len(),
    })
}

// --- JSON (debug / legacy) decoding -----------------------------------------

/// Import-graph targets in the JSON form: the current map-of-edge-kinds or
/// the legacy list-of-targets, which deserializes to all-static edges.
#[derive(Deserialize)]
#[serde(untagged)]
enum JsonEdgeTargets {
    Kinds(BTreeMap<String, EdgeKind>),
    Legacy(Vec<String>),
}

impl JsonEdgeTargets {
    fn into_kinds(self) -> BTreeMap<String, EdgeKind> {
        match self {
            Self::Kinds(map) => map,
            Self::Legacy(targets) => targets
                .into_iter()
                .map(|t| (t, EdgeKind::Static))
                .collect(),
        }
    }
}

type JsonImportGraph = BTreeMap<String, JsonEdgeTargets>;

#[derive(Deserialize)]
struct JsonTsCacheData {
    import_graph: JsonImportGraph,
    #[serde(default)]
    call_expressions: Option<Vec<CallExpression>>,
}

#[derive(Deserialize)]
struct JsonPyCacheData {
    module_map: BTreeMap<String, String>,
    definitions: BTreeMap<String, Vec<PyDefinition>>,
    import_graph: JsonImportGraph,
    #[serde(default)]
    call_expressions: Option<Vec<CallExpression>>,
}

#[derive(Deserialize)]
struct JsonCacheRecord {
    schema_version: u32,
    tool_version: String,
    workspace_root: String,
    config_hash: String,
    files: Vec<FileFingerprint>,
    #[serde(default)]
    ts: Option<JsonTsCacheData>,
    #[serde(default)]
    py: Option<JsonPyCacheData>,
}

fn convert_graph(graph: JsonImportGraph) -> ImportGraph {
    graph
        .into_iter()
        .map(|(from, targets)| (from, targets.into_kinds()))
        .collect()
}

fn decode_json(bytes: &[u8]) -> Option<WorkspaceCacheRecord> {
    let raw: JsonCacheRecord = serde_json::from_slice(bytes).ok()?;
    Some(WorkspaceCacheRecord {
        schema_version: raw.schema_version,
        tool_version: raw.tool_version,
        workspace_root: raw.workspace_root,
        config_hash: raw.config_hash,
        files: raw.files,
        ts: raw.ts.map(|ts| TsCacheData {
            import_graph: convert_graph(ts.import_graph),
            call_expressions: ts.call_expressions,
        }),
        py: raw.py.map(|py| PyCacheData {
            module_map: py.module_map,
            definitions: py.definitions,
            import_graph: convert_graph(py.import_graph),
            call_expressions: py.call_expressions,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_record(root: &str) -> WorkspaceCacheRecord {
        let mut graph = ImportGraph::new();
        graph.entry(format!("{}/a.ts", root)).or_default().insert(
            format!("{}/b.ts", root),
            EdgeKind::Dynamic,
        );
        WorkspaceCacheRecord {
            schema_version: CACHE_SCHEMA_VERSION,
            tool_version: tool_version().to_string(),
            workspace_root: root.to_string(),
            config_hash: config_hash(&[], &["src".to_string(), ".".to_string()]),
            files: vec![FileFingerprint {
                path: format!("{}/a.ts", root),
                mtime_ms: 1234,
                size: 56,
            }],
            ts: Some(TsCacheData {
                import_graph: graph,
                call_expressions: None,
            }),
            py: None,
        }
    }

    #[test]
    fn binary_round_trip_preserves_edge_kinds() {
        let dir = TempDir::new().expect("tempdir");
        let repo = dir.path().to_string_lossy().to_string();
        let record = sample_record("/ws");
        store(&repo, &record).expect("store");

        let loaded = load(&repo, "/ws", &record.config_hash).expect("load");
        assert_eq!(loaded.files, record.files);
        let graph = loaded.ts.expect("ts data").import_graph;
        assert_eq!(graph["/ws/a.ts"]["/ws/b.ts"], EdgeKind::Dynamic);
    }

    #[test]
    fn magic_prefix_is_present() {
        let dir = TempDir::new().expect("tempdir");
        let repo = dir.path().to_string_lossy().to_string();
        let record = sample_record("/ws");
        store(&repo, &record).expect("store");
        let key = cache_key("/ws", &record.config_hash, tool_version());
        let bytes = std::fs::read(cache_path(&repo, &key)).expect("read");
        assert_eq!(&bytes[..4], CACHE_MAGIC);
    }

    #[test]
    fn corrupt_cache_is_a_miss() {
        let dir = TempDir::new().expect("tempdir");
        let repo = dir.path().to_string_lossy().to_string();
        let record = sample_record("/ws");
        let key = cache_key("/ws", &record.config_hash, tool_version());
        let path = cache_path(&repo, &key);
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(&path, b"RSLC\x01\x00garbage").expect("write");
        assert!(load(&repo, "/ws", &record.config_hash).is_none());
    }

    #[test]
    fn legacy_list_form_deserializes_all_static() {
        let json = serde_json::json!({
            "schema_version": CACHE_SCHEMA_VERSION,
            "tool_version": tool_version(),
            "workspace_root": "/ws",
            "config_hash": "abc",
            "files": [],
            "ts": {
                "import_graph": {"/ws/a.ts": ["/ws/b.ts", "/ws/c.ts"]}
            }
        });
        let record = decode(json.to_string().as_bytes()).expect("decode legacy");
        let graph = record.ts.expect("ts").import_graph;
        assert_eq!(graph["/ws/a.ts"]["/ws/b.ts"], EdgeKind::Static);
        assert_eq!(graph["/ws/a.ts"]["/ws/c.ts"], EdgeKind::Static);
    }

    #[test]
    fn fingerprint_validation_is_exact() {
        let record = sample_record("/ws");
        let same = record.files.clone();
        assert!(fingerprints_match(&record, &same));

        let mut touched = record.files.clone();
        touched[0].mtime_ms += 1;
        assert!(!fingerprints_match(&record, &touched));

        assert!(!fingerprints_match(&record, &[]));
    }

    #[test]
    fn key_changes_with_any_input() {
        let a = cache_key("/ws", "h1", "0.3.0");
        assert_ne!(a, cache_key("/ws2", "h1", "0.3.0"));
        assert_ne!(a, cache_key("/ws", "h2", "0.3.0"));
        assert_ne!(a, cache_key("/ws", "h1", "0.4.0"));
        assert_eq!(a.len(), 16);
    }
}

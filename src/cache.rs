//! SQLite-backed cache of complete panel evaluations.
//!
//! Keyed by a content hash over the model, the prompt templates, the scoring
//! settings and the three submission fields. Values are whole [`AggregateResult`]s stored as JSON.

use async_trait::async_trait;
use fs2::FileExt;
use rusqlite::{params, Connection};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::aggregate::AggregateResult;
use crate::judge::JudgeSettings;
use crate::rubric::PerJudge;
use crate::submission::SubmissionContent;

pub const CACHE_PATH_ENV: &str = "PANEL_CACHE_PATH";
pub const DEFAULT_CACHE_PATH: &str = ".panel_eval_cache.sqlite";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationCacheKey {
    pub model: String,
    pub template_hash: String,
    pub settings_hash: String,
    pub problem_hash: String,
    pub content_hash: String,
    pub visual_hash: String,
    pub key_hash: String,
}

impl EvaluationCacheKey {
    pub fn new(
        model: &str,
        template_hash: &str,
        settings_hash: &str,
        content: &SubmissionContent,
    ) -> Self {
        let problem_hash = hash_text(&content.problem_statement);
        let content_hash = hash_text(&content.ppt_content);
        let visual_hash = hash_text(&content.visual_analysis);
        let key_hash = hash_fields(&[
            model,
            template_hash,
            settings_hash,
            &problem_hash,
            &content_hash,
            &visual_hash,
        ]);

        Self {
            model: model.to_string(),
            template_hash: template_hash.to_string(),
            settings_hash: settings_hash.to_string(),
            problem_hash,
            content_hash,
            visual_hash,
            key_hash,
        }
    }
}

/// Hash of everything besides the submission that shapes a stored result.
pub fn settings_hash(weights: &PerJudge<f64>, settings: &JudgeSettings) -> String {
    let budget = settings.budget;
    hash_fields(&[
        &weights.technical.to_bits().to_string(),
        &weights.product.to_bits().to_string(),
        &weights.execution.to_bits().to_string(),
        &settings.max_tokens.to_string(),
        &settings.temperature.to_bits().to_string(),
        &budget.problem_tokens.to_string(),
        &budget.content_tokens.to_string(),
        &budget.visual_chars.to_string(),
    ])
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache lock poisoned")]
    Poisoned,
    #[error("task join error: {0}")]
    Join(String),
    #[error("serialization error: {0}")]
    Serde(String),
}

#[async_trait]
pub trait EvaluationCache: Send + Sync {
    async fn get(&self, key: &EvaluationCacheKey) -> Result<Option<AggregateResult>, CacheError>;
    async fn put(&self, key: &EvaluationCacheKey, value: &AggregateResult) -> Result<(), CacheError>;
}

#[derive(Clone)]
pub struct SqliteEvaluationCache {
    path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteEvaluationCache {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(&path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL; \
             PRAGMA synchronous=NORMAL; \
             CREATE TABLE IF NOT EXISTS evaluation_cache ( \
               key_hash TEXT PRIMARY KEY, \
               model TEXT NOT NULL, \
               template_hash TEXT NOT NULL, \
               problem_hash TEXT NOT NULL, \
               content_hash TEXT NOT NULL, \
               visual_hash TEXT NOT NULL, \
               final_score REAL NOT NULL, \
               score_category TEXT NOT NULL, \
               result_json TEXT NOT NULL, \
               created_at INTEGER NOT NULL, \
               updated_at INTEGER NOT NULL, \
               hit_count INTEGER NOT NULL DEFAULT 0 \
             );",
        )?;

        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var(CACHE_PATH_ENV) {
            return PathBuf::from(path);
        }
        PathBuf::from(DEFAULT_CACHE_PATH)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_exclusive(&self) -> Result<CacheLock, CacheError> {
        CacheLock::new(&self.path)
    }

    fn with_conn<F, R>(&self, f: F) -> Result<R, CacheError>
    where
        F: FnOnce(&Connection) -> Result<R, CacheError>,
    {
        let guard = self.conn.lock().map_err(|_| CacheError::Poisoned)?;
        f(&guard)
    }
}

#[async_trait]
impl EvaluationCache for SqliteEvaluationCache {
    async fn get(&self, key: &EvaluationCacheKey) -> Result<Option<AggregateResult>, CacheError> {
        let key_hash = key.key_hash.clone();
        let conn = self.clone();
        tokio::task::spawn_blocking(move || {
            conn.with_conn(|conn| {
                let mut stmt =
                    conn.prepare("SELECT result_json FROM evaluation_cache WHERE key_hash = ?1")?;
                let mut rows = stmt.query(params![key_hash])?;
                let Some(row) = rows.next()? else {
                    return Ok(None);
                };
                let json: String = row.get(0)?;
                let result: AggregateResult =
                    serde_json::from_str(&json).map_err(|e| CacheError::Serde(e.to_string()))?;
                conn.execute(
                    "UPDATE evaluation_cache \
                     SET hit_count = hit_count + 1, updated_at = ?1 \
                     WHERE key_hash = ?2",
                    params![now_epoch(), key_hash],
                )?;
                Ok(Some(result))
            })
        })
        .await
        .map_err(|e| CacheError::Join(e.to_string()))?
    }

    async fn put(&self, key: &EvaluationCacheKey, value: &AggregateResult) -> Result<(), CacheError> {
        let key = key.clone();
        let json = serde_json::to_string(value).map_err(|e| CacheError::Serde(e.to_string()))?;
        let final_score = value.final_score;
        let category = value.score_category.label();
        let conn = self.clone();
        tokio::task::spawn_blocking(move || {
            conn.with_conn(|conn| {
                let now = now_epoch();
                conn.execute(
                    "INSERT INTO evaluation_cache ( \
                        key_hash, model, template_hash, problem_hash, content_hash, visual_hash, \
                        final_score, score_category, result_json, created_at, updated_at \
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11) \
                     ON CONFLICT(key_hash) DO UPDATE SET \
                        final_score = excluded.final_score, \
                        score_category = excluded.score_category, \
                        result_json = excluded.result_json, \
                        updated_at = excluded.updated_at",
                    params![
                        key.key_hash,
                        key.model,
                        key.template_hash,
                        key.problem_hash,
                        key.content_hash,
                        key.visual_hash,
                        final_score,
                        category,
                        json,
                        now,
                        now,
                    ],
                )?;
                Ok(())
            })
        })
        .await
        .map_err(|e| CacheError::Join(e.to_string()))?
    }
}

#[derive(Debug)]
pub struct CacheLock {
    _file: std::fs::File,
}

impl CacheLock {
    fn new(db_path: &Path) -> Result<Self, CacheError> {
        let mut lock_path = db_path.to_path_buf();
        lock_path.set_extension("lock");
        let file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(lock_path)?;
        file.lock_exclusive()?;
        Ok(Self { _file: file })
    }
}

#[derive(Debug, Serialize)]
pub struct CacheExportRow {
    pub key_hash: String,
    pub model: String,
    pub template_hash: String,
    pub problem_hash: String,
    pub content_hash: String,
    pub visual_hash: String,
    pub final_score: f64,
    pub score_category: String,
    pub result: serde_json::Value,
    pub created_at: i64,
    pub updated_at: i64,
    pub hit_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CachePruneStats {
    pub deleted: usize,
    pub remaining: usize,
}

impl SqliteEvaluationCache {
    /// Write every row as one JSON line, most recently used first.
    pub async fn export_jsonl(&self, path: impl AsRef<Path>) -> Result<usize, CacheError> {
        let path = path.as_ref().to_path_buf();
        let conn = self.clone();
        tokio::task::spawn_blocking(move || {
            conn.with_conn(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT key_hash, model, template_hash, problem_hash, content_hash, visual_hash, \
                            final_score, score_category, result_json, created_at, updated_at, hit_count \
                     FROM evaluation_cache ORDER BY updated_at DESC",
                )?;
                let mut rows = stmt.query([])?;
                let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
                let mut written = 0usize;
                while let Some(row) = rows.next()? {
                    let result_json: String = row.get(8)?;
                    let record = CacheExportRow {
                        key_hash: row.get(0)?,
                        model: row.get(1)?,
                        template_hash: row.get(2)?,
                        problem_hash: row.get(3)?,
                        content_hash: row.get(4)?,
                        visual_hash: row.get(5)?,
                        final_score: row.get(6)?,
                        score_category: row.get(7)?,
                        result: serde_json::from_str(&result_json)
                            .map_err(|e| CacheError::Serde(e.to_string()))?,
                        created_at: row.get(9)?,
                        updated_at: row.get(10)?,
                        hit_count: row.get(11)?,
                    };
                    let line = serde_json::to_string(&record)
                        .map_err(|e| CacheError::Serde(e.to_string()))?;
                    writeln!(file, "{line}")?;
                    written += 1;
                }
                file.flush()?;
                Ok(written)
            })
        })
        .await
        .map_err(|e| CacheError::Join(e.to_string()))?
    }

    pub async fn prune(
        &self,
        max_age_days: Option<u64>,
        max_rows: Option<usize>,
    ) -> Result<CachePruneStats, CacheError> {
        let conn = self.clone();
        tokio::task::spawn_blocking(move || {
            conn.with_conn(|conn| {
                let mut deleted: usize = 0;
                if let Some(days) = max_age_days {
                    let cutoff = now_epoch().saturating_sub((days as i64).saturating_mul(86_400));
                    let removed = conn.execute(
                        "DELETE FROM evaluation_cache WHERE updated_at < ?1",
                        params![cutoff],
                    )?;
                    deleted = deleted.saturating_add(removed);
                }

                if let Some(max_rows) = max_rows {
                    let count: i64 =
                        conn.query_row("SELECT COUNT(*) FROM evaluation_cache", [], |row| {
                            row.get(0)
                        })?;
                    let keep = max_rows as i64;
                    if count > keep {
                        let removed = conn.execute(
                            "DELETE FROM evaluation_cache WHERE key_hash IN ( \
                                SELECT key_hash FROM evaluation_cache \
                                ORDER BY updated_at DESC LIMIT -1 OFFSET ?1 \
                             )",
                            params![keep],
                        )?;
                        deleted = deleted.saturating_add(removed);
                    }
                }

                let remaining: i64 =
                    conn.query_row("SELECT COUNT(*) FROM evaluation_cache", [], |row| row.get(0))?;
                Ok(CachePruneStats {
                    deleted,
                    remaining: remaining.max(0) as usize,
                })
            })
        })
        .await
        .map_err(|e| CacheError::Join(e.to_string()))?
    }
}

fn hash_text(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

fn hash_fields(fields: &[&str]) -> String {
    let mut hasher = blake3::Hasher::new();
    for (idx, field) in fields.iter().enumerate() {
        if idx > 0 {
            hasher.update(b"|");
        }
        hasher.update(field.as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

fn now_epoch() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

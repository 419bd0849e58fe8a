//! C2: durable, per-subdir cache of extracted metadata and file-stat
//! fingerprints. Both supported backends (an embedded sqlite file and a
//! shared relational server) are reached through one [`sqlx::Any`] pool so
//! the rest of the crate deals with a single `Handle` type and one SQL
//! dialect; only connection setup differs between them.

mod lock;
mod schema;

use std::path::{Path, PathBuf};
use std::sync::Once;

use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::Row;

use crate::error::CacheError;

pub use lock::CacheLock;

/// Which relational backend a [`Handle`] talks to.
#[derive(Debug, Clone)]
pub enum Backend {
    /// A file-backed sqlite database colocated with the subdir being
    /// indexed, at `<subdir>/.cache/cache.db`.
    Embedded,
    /// A shared server (in practice, postgresql) holding every subdir of
    /// every channel, disambiguated by a random per-channel prefix.
    Server { db_url: String },
}

/// The (mtime, size) + advisory hash fields tracked for one (stage, path).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Fingerprint {
    pub mtime: i64,
    pub size: i64,
    pub sha256: Option<String>,
    pub md5: Option<String>,
    pub last_modified: Option<String>,
    pub etag: Option<String>,
}

/// The payload rows written for one newly-extracted archive.
#[derive(Debug, Clone, Default)]
pub struct PayloadMap {
    pub index_json: Vec<u8>,
    pub about: Option<Vec<u8>>,
    pub recipe: Option<Vec<u8>>,
    pub recipe_log: Option<Vec<u8>>,
    pub run_exports: Option<Vec<u8>>,
    pub post_install: Option<Vec<u8>>,
    pub icon: Option<Vec<u8>>,
}

/// Per-path inputs to channeldata aggregation.
#[derive(Debug, Clone)]
pub struct ChanneldataInput {
    pub path: String,
    pub index_json: Vec<u8>,
    pub about: Option<Vec<u8>>,
    pub post_install: Option<Vec<u8>>,
    pub icon: Option<Vec<u8>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheSidecar {
    channel_prefix: String,
}

const STAGE_FS: &str = "fs";
const STAGE_INDEXED: &str = "indexed";

static INSTALL_DRIVERS: Once = Once::new();

/// A handle to one subdir's slice of the cache. Cheap to clone (wraps a
/// pooled connection); `key_prefix` is the `(channel_prefix/subdir/)`
/// string prepended to every basename when using the shared backend, and
/// empty for the embedded backend (whose database file is already scoped
/// to one subdir).
#[derive(Clone)]
pub struct Handle {
    pool: sqlx::AnyPool,
    key_prefix: String,
    _lock: Option<std::sync::Arc<CacheLock>>,
}

impl Handle {
    /// Open (creating if missing) the cache for `subdir_path`, which is
    /// named `subdir` within its channel rooted at `channel_root`.
    pub async fn open(
        subdir_path: &Path,
        channel_root: &Path,
        subdir: &str,
        backend: &Backend,
    ) -> Result<Self, CacheError> {
        INSTALL_DRIVERS.call_once(|| {
            sqlx::any::install_default_drivers();
        });

        match backend {
            Backend::Embedded => Self::open_embedded(subdir_path).await,
            Backend::Server { db_url } => {
                Self::open_server(channel_root, subdir, db_url).await
            }
        }
    }

    async fn open_embedded(subdir_path: &Path) -> Result<Self, CacheError> {
        let cache_dir = subdir_path.join(".cache");
        fs_err::create_dir_all(&cache_dir)?;

        let lock = CacheLock::acquire(&cache_dir.join(".lock"))?;

        let db_path = cache_dir.join("cache.db");
        if !db_path.exists() && schema::legacy_cache_present(&cache_dir) {
            schema::migrate_legacy(&cache_dir, &db_path).await?;
        }

        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        let pool = AnyPoolOptions::new().max_connections(1).connect(&url).await?;

        sqlx::query("PRAGMA journal_mode=DELETE")
            .execute(&pool)
            .await?;

        schema::bootstrap(&pool).await?;

        Ok(Handle {
            pool,
            key_prefix: String::new(),
            _lock: Some(std::sync::Arc::new(lock)),
        })
    }

    async fn open_server(
        channel_root: &Path,
        subdir: &str,
        db_url: &str,
    ) -> Result<Self, CacheError> {
        let cache_dir = channel_root.join(".cache");
        fs_err::create_dir_all(&cache_dir)?;
        let sidecar_path = cache_dir.join("cache.json");

        let channel_prefix = if sidecar_path.exists() {
            let raw = fs_err::read_to_string(&sidecar_path)?;
            serde_json::from_str::<CacheSidecar>(&raw)?.channel_prefix
        } else {
            let prefix = random_prefix();
            let sidecar = CacheSidecar {
                channel_prefix: prefix.clone(),
            };
            fs_err::write(&sidecar_path, serde_json::to_string_pretty(&sidecar)?)?;
            prefix
        };

        let pool = AnyPoolOptions::new().max_connections(8).connect(db_url).await?;
        schema::bootstrap(&pool).await?;

        Ok(Handle {
            pool,
            key_prefix: format!("{channel_prefix}/{subdir}/"),
            _lock: None,
        })
    }

    fn full_path(&self, basename: &str) -> String {
        format!("{}{}", self.key_prefix, basename)
    }

    fn strip_prefix<'a>(&self, full_path: &'a str) -> &'a str {
        full_path.strip_prefix(&self.key_prefix).unwrap_or(full_path)
    }

    /// Replace the entire `fs` stage for this subdir with `entries`, in one
    /// transaction: rows absent from `entries` are deleted, present rows
    /// are upserted.
    pub async fn save_fs_state(
        &self,
        entries: &[(String, Fingerprint)],
    ) -> Result<(), CacheError> {
        let mut tx = self.pool.begin().await?;

        let keep: Vec<String> = entries.iter().map(|(p, _)| self.full_path(p)).collect();
        let existing: Vec<String> = sqlx::query("SELECT path FROM stat WHERE stage = ? AND path LIKE ?")
            .bind(STAGE_FS)
            .bind(format!("{}%", self.key_prefix))
            .fetch_all(&mut *tx)
            .await?
            .into_iter()
            .map(|row: AnyRow| row.get::<String, _>("path"))
            .collect();

        for stale in existing.iter().filter(|p| !keep.contains(p)) {
            sqlx::query("DELETE FROM stat WHERE stage = ? AND path = ?")
                .bind(STAGE_FS)
                .bind(stale)
                .execute(&mut *tx)
                .await?;
        }

        for (basename, fp) in entries {
            upsert_stat(&mut tx, STAGE_FS, &self.full_path(basename), fp).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Basenames whose `fs` fingerprint differs from `indexed` on
    /// (mtime, size), or which have no `indexed` row at all.
    pub async fn changed_paths(&self) -> Result<Vec<String>, CacheError> {
        let rows = sqlx::query(
            "SELECT f.path, f.mtime, f.size, i.mtime as i_mtime, i.size as i_size \
             FROM stat f \
             LEFT JOIN stat i ON i.stage = ? AND i.path = f.path \
             WHERE f.stage = ? AND f.path LIKE ?",
        )
        .bind(STAGE_INDEXED)
        .bind(STAGE_FS)
        .bind(format!("{}%", self.key_prefix))
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::new();
        for row in rows {
            let path: String = row.get("path");
            let mtime: i64 = row.get("mtime");
            let size: i64 = row.get("size");
            let i_mtime: Option<i64> = row.get("i_mtime");
            let i_size: Option<i64> = row.get("i_size");

            let fresh = i_mtime == Some(mtime) && i_size == Some(size);
            if !fresh {
                out.push(self.strip_prefix(&path).to_string());
            }
        }
        Ok(out)
    }

    /// Insert/replace payload rows for `basename`, then upsert its
    /// `indexed` stat row with `fingerprint`, all in one transaction.
    pub async fn store(
        &self,
        basename: &str,
        fingerprint: &Fingerprint,
        payload: &PayloadMap,
    ) -> Result<(), CacheError> {
        let path = self.full_path(basename);
        let mut tx = self.pool.begin().await?;

        upsert_payload(&mut tx, "index_json", &path, Some(&payload.index_json)).await?;
        upsert_payload(&mut tx, "about", &path, payload.about.as_deref()).await?;
        upsert_payload(&mut tx, "recipe", &path, payload.recipe.as_deref()).await?;
        upsert_payload(&mut tx, "recipe_log", &path, payload.recipe_log.as_deref()).await?;
        upsert_payload(&mut tx, "run_exports", &path, payload.run_exports.as_deref()).await?;
        upsert_payload(&mut tx, "post_install", &path, payload.post_install.as_deref()).await?;
        upsert_payload(&mut tx, "icon", &path, payload.icon.as_deref()).await?;

        upsert_stat(&mut tx, STAGE_INDEXED, &path, fingerprint).await?;
        tx.commit().await?;
        Ok(())
    }

    /// `(basename, index_json bytes)` for every path present in both `fs`
    /// and `index_json` (the set contributing to `repodata.json`).
    pub async fn indexed_packages(&self) -> Result<Vec<(String, Vec<u8>)>, CacheError> {
        let rows = sqlx::query(
            "SELECT f.path, j.data FROM stat f \
             JOIN index_json j ON j.path = f.path \
             WHERE f.stage = ? AND f.path LIKE ?",
        )
        .bind(STAGE_FS)
        .bind(format!("{}%", self.key_prefix))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let path: String = row.get("path");
                let data: Vec<u8> = row.get("data");
                (self.strip_prefix(&path).to_string(), data)
            })
            .collect())
    }

    pub async fn run_exports_raw(&self, basename: &str) -> Result<Option<Vec<u8>>, CacheError> {
        fetch_payload(&self.pool, "run_exports", &self.full_path(basename)).await
    }

    /// Inputs to channeldata for every indexed path in this subdir.
    pub async fn channeldata_inputs(&self) -> Result<Vec<ChanneldataInput>, CacheError> {
        let rows = sqlx::query(
            "SELECT j.path, j.data as index_json, a.data as about, \
                    p.data as post_install, ic.data as icon \
             FROM index_json j \
             LEFT JOIN about a ON a.path = j.path \
             LEFT JOIN post_install p ON p.path = j.path \
             LEFT JOIN icon ic ON ic.path = j.path \
             WHERE j.path LIKE ?",
        )
        .bind(format!("{}%", self.key_prefix))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let path: String = row.get("path");
                ChanneldataInput {
                    path: self.strip_prefix(&path).to_string(),
                    index_json: row.get("index_json"),
                    about: row.get("about"),
                    post_install: row.get("post_install"),
                    icon: row.get("icon"),
                }
            })
            .collect())
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

async fn upsert_stat(
    tx: &mut sqlx::Transaction<'_, sqlx::Any>,
    stage: &str,
    path: &str,
    fp: &Fingerprint,
) -> Result<(), CacheError> {
    sqlx::query(
        "INSERT INTO stat (stage, path, mtime, size, sha256, md5, last_modified, etag) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT (stage, path) DO UPDATE SET \
           mtime = excluded.mtime, size = excluded.size, sha256 = excluded.sha256, \
           md5 = excluded.md5, last_modified = excluded.last_modified, etag = excluded.etag",
    )
    .bind(stage)
    .bind(path)
    .bind(fp.mtime)
    .bind(fp.size)
    .bind(&fp.sha256)
    .bind(&fp.md5)
    .bind(&fp.last_modified)
    .bind(&fp.etag)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn upsert_payload(
    tx: &mut sqlx::Transaction<'_, sqlx::Any>,
    table: &'static str,
    path: &str,
    data: Option<&[u8]>,
) -> Result<(), CacheError> {
    let Some(data) = data else {
        sqlx::query(&format!("DELETE FROM {table} WHERE path = ?"))
            .bind(path)
            .execute(&mut **tx)
            .await?;
        return Ok(());
    };

    sqlx::query(&format!(
        "INSERT INTO {table} (path, data) VALUES (?, ?) \
         ON CONFLICT (path) DO UPDATE SET data = excluded.data"
    ))
    .bind(path)
    .bind(data)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn fetch_payload(
    pool: &sqlx::AnyPool,
    table: &'static str,
    path: &str,
) -> Result<Option<Vec<u8>>, CacheError> {
    let row = sqlx::query(&format!("SELECT data FROM {table} WHERE path = ?"))
        .bind(path)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|r| r.get::<Vec<u8>, _>("data")))
}

fn random_prefix() -> String {
    let mut rng = rand::rng();
    (0..16)
        .map(|_| {
            let c: u8 = rng.random_range(0..36);
            std::char::from_digit(c as u32, 36).unwrap()
        })
        .collect()
}

/// Where the embedded cache file lives for a given subdir path. Exposed for
/// callers (the scheduler) that need to know the path without opening it,
/// e.g. to decide whether `--no-update-cache` has anything to read.
pub fn embedded_db_path(subdir_path: &Path) -> PathBuf {
    subdir_path.join(".cache").join("cache.db")
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open_handle(subdir_path: &Path) -> Handle {
        Handle::open(subdir_path, subdir_path.parent().unwrap(), "noarch", &Backend::Embedded)
            .await
            .unwrap()
    }

    fn sample_payload() -> PayloadMap {
        PayloadMap {
            index_json: b"{\"name\":\"a\"}".to_vec(),
            about: Some(b"{\"home\":\"x\"}".to_vec()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn store_then_indexed_packages_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let handle = open_handle(dir.path()).await;

        let fp = Fingerprint { mtime: 1, size: 2, ..Default::default() };
        handle.store("a-1.0-0.tar.bz2", &fp, &sample_payload()).await.unwrap();
        handle
            .save_fs_state(&[("a-1.0-0.tar.bz2".to_string(), fp)])
            .await
            .unwrap();

        let indexed = handle.indexed_packages().await.unwrap();
        assert_eq!(indexed.len(), 1);
        assert_eq!(indexed[0].0, "a-1.0-0.tar.bz2");
        assert_eq!(indexed[0].1, b"{\"name\":\"a\"}");

        let about = handle.run_exports_raw("a-1.0-0.tar.bz2").await.unwrap();
        assert!(about.is_none(), "run_exports was never stored for this basename");
    }

    #[tokio::test]
    async fn changed_paths_flags_new_and_modified_files_only() {
        let dir = tempfile::tempdir().unwrap();
        let handle = open_handle(dir.path()).await;

        let fp_a = Fingerprint { mtime: 1, size: 10, ..Default::default() };
        handle.store("a-1.0-0.tar.bz2", &fp_a, &sample_payload()).await.unwrap();
        handle
            .save_fs_state(&[("a-1.0-0.tar.bz2".to_string(), fp_a.clone())])
            .await
            .unwrap();

        // Unchanged: nothing to report.
        assert!(handle.changed_paths().await.unwrap().is_empty());

        // "a" is touched (size changes) and "b" appears fresh.
        let fp_a_touched = Fingerprint { mtime: 1, size: 99, ..Default::default() };
        let fp_b = Fingerprint { mtime: 5, size: 20, ..Default::default() };
        handle
            .save_fs_state(&[
                ("a-1.0-0.tar.bz2".to_string(), fp_a_touched),
                ("b-1.0-0.tar.bz2".to_string(), fp_b),
            ])
            .await
            .unwrap();

        let mut changed = handle.changed_paths().await.unwrap();
        changed.sort();
        assert_eq!(changed, vec!["a-1.0-0.tar.bz2".to_string(), "b-1.0-0.tar.bz2".to_string()]);
    }

    #[tokio::test]
    async fn save_fs_state_drops_rows_for_removed_files() {
        let dir = tempfile::tempdir().unwrap();
        let handle = open_handle(dir.path()).await;

        let fp = Fingerprint { mtime: 1, size: 10, ..Default::default() };
        handle
            .save_fs_state(&[("a-1.0-0.tar.bz2".to_string(), fp.clone())])
            .await
            .unwrap();
        handle.save_fs_state(&[]).await.unwrap();

        // With no `fs` row left for "a", it no longer shows up as changed
        // (there's nothing to index), and a later reappearance is fresh.
        handle
            .save_fs_state(&[("a-1.0-0.tar.bz2".to_string(), fp)])
            .await
            .unwrap();
        assert_eq!(handle.changed_paths().await.unwrap(), vec!["a-1.0-0.tar.bz2".to_string()]);
    }

    #[tokio::test]
    async fn legacy_cache_is_migrated_into_stat_and_payload_tables() {
        let dir = tempfile::tempdir().unwrap();
        let subdir_path = dir.path().join("noarch");
        let cache_dir = subdir_path.join(".cache");
        fs_err::create_dir_all(cache_dir.join("index_json")).unwrap();

        fs_err::write(
            cache_dir.join("stat.json"),
            serde_json::json!({"a-1.0-0.tar.bz2": {"mtime": 42, "size": 7}}).to_string(),
        )
        .unwrap();
        fs_err::write(cache_dir.join("index_json").join("a-1.0-0.tar.bz2"), b"{\"name\":\"a\"}").unwrap();

        assert!(schema::legacy_cache_present(&cache_dir));
        let handle = open_handle(&subdir_path).await;

        let indexed = handle.indexed_packages().await.unwrap();
        assert_eq!(indexed.len(), 1);
        assert_eq!(indexed[0].0, "a-1.0-0.tar.bz2");
        assert_eq!(indexed[0].1, b"{\"name\":\"a\"}");
        assert!(embedded_db_path(&subdir_path).exists());
    }

    #[tokio::test]
    async fn failed_legacy_migration_leaves_cache_db_absent() {
        let dir = tempfile::tempdir().unwrap();
        let subdir_path = dir.path().join("noarch");
        let cache_dir = subdir_path.join(".cache");
        fs_err::create_dir_all(&cache_dir).unwrap();
        fs_err::write(cache_dir.join("stat.json"), b"not valid json").unwrap();

        let db_path = embedded_db_path(&subdir_path);
        let result = schema::migrate_legacy(&cache_dir, &db_path).await;
        assert!(result.is_err());
        assert!(!db_path.exists());
        assert!(!db_path.with_extension("db.migrating").exists());
    }
}

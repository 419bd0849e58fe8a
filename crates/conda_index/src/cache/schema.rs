use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use sqlx::any::AnyPoolOptions;

use super::{upsert_payload, upsert_stat, Fingerprint, STAGE_INDEXED};
use crate::error::CacheError;

/// Current schema version. Bumping this only ever adds columns/tables;
/// see SPEC_FULL.md §3 "Schema migrations".
const SCHEMA_VERSION: &str = "1";

const PAYLOAD_TABLES: &[&str] = &[
    "index_json",
    "about",
    "recipe",
    "recipe_log",
    "run_exports",
    "post_install",
    "icon",
];

/// Idempotent `CREATE TABLE IF NOT EXISTS` bootstrap, run on every `open()`.
pub async fn bootstrap(pool: &sqlx::AnyPool) -> Result<(), CacheError> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS stat ( \
            stage TEXT NOT NULL, \
            path TEXT NOT NULL, \
            mtime BIGINT NOT NULL, \
            size BIGINT NOT NULL, \
            sha256 TEXT, \
            md5 TEXT, \
            last_modified TEXT, \
            etag TEXT, \
            PRIMARY KEY (stage, path) \
        )",
    )
    .execute(pool)
    .await?;

    // `path` always scans as `stage = ? AND path LIKE '<prefix>%'` to scope a
    // query to one channel/subdir on the shared backend; the primary key's
    // leading `stage` column doesn't help that, so index `path` directly.
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_stat_path ON stat (path)")
        .execute(pool)
        .await?;

    for table in PAYLOAD_TABLES {
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {table} ( \
                path TEXT PRIMARY KEY, \
                data BLOB NOT NULL \
            )"
        ))
        .execute(pool)
        .await?;
    }

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_meta ( \
            key TEXT PRIMARY KEY, \
            value TEXT NOT NULL \
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "INSERT INTO schema_meta (key, value) VALUES ('schema_version', ?) \
         ON CONFLICT (key) DO NOTHING",
    )
    .bind(SCHEMA_VERSION)
    .execute(pool)
    .await?;

    Ok(())
}

/// One entry of a legacy cache's `stat.json`: `{"<basename>": {"mtime": ..,
/// "size": ..}}`.
#[derive(Debug, Deserialize)]
struct LegacyStat {
    mtime: i64,
    size: i64,
}

/// Whether `cache_dir` holds a pre-`cache.db` cache: a `stat.json` file plus
/// one directory per payload kind, each containing a raw blob file named
/// after the basename it belongs to.
pub fn legacy_cache_present(cache_dir: &Path) -> bool {
    cache_dir.join("stat.json").is_file()
}

/// One-shot conversion of a legacy `.cache` tree into a fresh embedded
/// database at `db_path`. Builds the new database at a sibling temp path and
/// renames it into place only on success; any failure removes the temp file
/// and propagates the error, leaving `db_path` absent so the next run
/// retries the migration from scratch (SPEC_FULL.md §3 "Migration").
pub async fn migrate_legacy(cache_dir: &Path, db_path: &Path) -> Result<(), CacheError> {
    let tmp_path = db_path.with_extension("db.migrating");
    if tmp_path.exists() {
        fs_err::remove_file(&tmp_path)?;
    }

    match migrate_legacy_into(cache_dir, &tmp_path).await {
        Ok(()) => {
            fs_err::rename(&tmp_path, db_path)?;
            tracing::info!("migrated legacy cache at {} into {}", cache_dir.display(), db_path.display());
            Ok(())
        }
        Err(err) => {
            let _ = fs_err::remove_file(&tmp_path);
            tracing::warn!(
                "legacy cache migration for {} failed, leaving cache.db absent for retry: {err}",
                cache_dir.display()
            );
            Err(err)
        }
    }
}

async fn migrate_legacy_into(cache_dir: &Path, tmp_path: &Path) -> Result<(), CacheError> {
    let raw = fs_err::read_to_string(cache_dir.join("stat.json"))?;
    let legacy_stats: BTreeMap<String, LegacyStat> = serde_json::from_str(&raw)?;

    let url = format!("sqlite://{}?mode=rwc", tmp_path.display());
    let pool = AnyPoolOptions::new().max_connections(1).connect(&url).await?;
    bootstrap(&pool).await?;

    for (basename, stat) in &legacy_stats {
        let mut tx = pool.begin().await?;
        let fingerprint = Fingerprint {
            mtime: stat.mtime,
            size: stat.size,
            ..Default::default()
        };
        upsert_stat(&mut tx, STAGE_INDEXED, basename, &fingerprint).await?;

        for table in PAYLOAD_TABLES {
            let payload_path = cache_dir.join(table).join(basename);
            if payload_path.is_file() {
                let bytes = fs_err::read(&payload_path)?;
                upsert_payload(&mut tx, table, basename, Some(&bytes)).await?;
            }
        }
        tx.commit().await?;
    }

    pool.close().await;
    Ok(())
}

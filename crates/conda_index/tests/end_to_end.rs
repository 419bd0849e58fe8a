//! End-to-end coverage of the scheduler against a tiny on-disk channel: a
//! couple of `.tar.bz2` archives go in, `repodata.json` /
//! `current_repodata.json` come out.

use std::path::Path;

use conda_index::cache::Backend;
use conda_index::scheduler::{self, RunOptions};
use tokio_util::sync::CancellationToken;

fn write_tar_bz2(path: &Path, index_json: &serde_json::Value) {
    let file = std::fs::File::create(path).unwrap();
    let encoder = bzip2::write::BzEncoder::new(file, bzip2::Compression::default());
    let mut builder = tar::Builder::new(encoder);

    let bytes = serde_json::to_vec(index_json).unwrap();
    let mut header = tar::Header::new_gnu();
    header.set_size(bytes.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(&mut header, "info/index.json", bytes.as_slice())
        .unwrap();
    builder.into_inner().unwrap().finish().unwrap();
}

fn write_conda(path: &Path, index_json: &serde_json::Value) {
    use std::io::Write;

    let bytes = serde_json::to_vec(index_json).unwrap();
    let mut inner_tar = Vec::new();
    {
        let mut builder = tar::Builder::new(&mut inner_tar);
        let mut header = tar::Header::new_gnu();
        header.set_size(bytes.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, "info/index.json", bytes.as_slice()).unwrap();
        builder.finish().unwrap();
    }
    let compressed_inner = zstd::stream::encode_all(std::io::Cursor::new(inner_tar), 0).unwrap();

    let mut zip_bytes = Vec::new();
    {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(&mut zip_bytes));
        let options: zip::write::FileOptions<()> =
            zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);
        writer.start_file("info-0.tar.zst", options).unwrap();
        writer.write_all(&compressed_inner).unwrap();
        writer.finish().unwrap();
    }
    std::fs::write(path, zip_bytes).unwrap();
}

fn sample_index_json(name: &str, version: &str, depends: Vec<&str>) -> serde_json::Value {
    serde_json::json!({
        "name": name,
        "version": version,
        "build": "0",
        "build_number": 0,
        "subdir": "noarch",
        "depends": depends,
    })
}

/// Verifies that a fresh channel with two archives produces a
/// `repodata.json` listing both packages and a `current_repodata.json`
/// whose dependency closure keeps the relevant transitive package.
#[tokio::test]
async fn indexes_a_fresh_subdir() {
    let channel = tempfile::tempdir().unwrap();
    let subdir_path = channel.path().join("noarch");
    std::fs::create_dir_all(&subdir_path).unwrap();

    write_tar_bz2(
        &subdir_path.join("a-1.0-0.tar.bz2"),
        &sample_index_json("a", "1.0", vec!["b"]),
    );
    write_tar_bz2(
        &subdir_path.join("b-1.0-0.tar.bz2"),
        &sample_index_json("b", "1.0", vec![]),
    );

    let options = RunOptions {
        channel_root: channel.path().to_path_buf(),
        output_root: channel.path().to_path_buf(),
        subdirs: vec!["noarch".to_string()],
        worker_count: 2,
        backend: Backend::Embedded,
        base_url: None,
        patch_generator: None,
        no_update_cache: false,
        emit_current_index: true,
        emit_channeldata: true,
        emit_run_exports: false,
        emit_monolithic: true,
        emit_shards: false,
        emit_html: false,
        emit_rss: false,
    };

    let outcome = scheduler::run(options, CancellationToken::new()).await.unwrap();
    assert_eq!(outcome.succeeded, vec!["noarch".to_string()]);
    assert!(outcome.failed.is_empty());

    let repodata: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(subdir_path.join("repodata.json")).unwrap()).unwrap();
    assert!(repodata["packages"]["a-1.0-0.tar.bz2"].is_object());
    assert!(repodata["packages"]["b-1.0-0.tar.bz2"].is_object());

    let current: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(subdir_path.join("current_repodata.json")).unwrap()).unwrap();
    assert!(current["packages"]["a-1.0-0.tar.bz2"].is_object());
    assert!(current["packages"]["b-1.0-0.tar.bz2"].is_object());

    assert!(channel.path().join("channeldata.json").exists());
}

/// A second run over an unchanged channel must not re-extract any archive;
/// the emitted `repodata.json` should be byte-identical across both runs.
#[tokio::test]
async fn rerun_over_unchanged_channel_is_stable() {
    let channel = tempfile::tempdir().unwrap();
    let subdir_path = channel.path().join("noarch");
    std::fs::create_dir_all(&subdir_path).unwrap();
    write_tar_bz2(
        &subdir_path.join("a-1.0-0.tar.bz2"),
        &sample_index_json("a", "1.0", vec![]),
    );

    let make_options = || RunOptions {
        channel_root: channel.path().to_path_buf(),
        output_root: channel.path().to_path_buf(),
        subdirs: vec!["noarch".to_string()],
        worker_count: 1,
        backend: Backend::Embedded,
        base_url: None,
        patch_generator: None,
        no_update_cache: false,
        emit_current_index: false,
        emit_channeldata: false,
        emit_run_exports: false,
        emit_monolithic: true,
        emit_shards: false,
        emit_html: false,
        emit_rss: false,
    };

    scheduler::run(make_options(), CancellationToken::new()).await.unwrap();
    let first = std::fs::read(subdir_path.join("repodata.json")).unwrap();

    scheduler::run(make_options(), CancellationToken::new()).await.unwrap();
    let second = std::fs::read(subdir_path.join("repodata.json")).unwrap();

    assert_eq!(first, second);
}

/// A subdir named on `--subdir` but absent from disk is skipped rather than
/// failing the whole run.
#[tokio::test]
async fn missing_subdir_is_skipped_not_failed() {
    let channel = tempfile::tempdir().unwrap();

    let options = RunOptions {
        channel_root: channel.path().to_path_buf(),
        output_root: channel.path().to_path_buf(),
        subdirs: vec!["linux-64".to_string()],
        worker_count: 1,
        backend: Backend::Embedded,
        base_url: None,
        patch_generator: None,
        no_update_cache: false,
        emit_current_index: false,
        emit_channeldata: false,
        emit_run_exports: false,
        emit_monolithic: true,
        emit_shards: false,
        emit_html: false,
        emit_rss: false,
    };

    let outcome = scheduler::run(options, CancellationToken::new()).await.unwrap();
    assert_eq!(outcome.succeeded, vec!["linux-64".to_string()]);
    assert!(outcome.failed.is_empty());
}

fn base_options(channel: &Path) -> RunOptions {
    RunOptions {
        channel_root: channel.to_path_buf(),
        output_root: channel.to_path_buf(),
        subdirs: vec!["noarch".to_string()],
        worker_count: 2,
        backend: Backend::Embedded,
        base_url: None,
        patch_generator: None,
        no_update_cache: false,
        emit_current_index: false,
        emit_channeldata: false,
        emit_run_exports: false,
        emit_monolithic: true,
        emit_shards: false,
        emit_html: false,
        emit_rss: false,
    }
}

fn write_patch_file(path: &Path, noarch: &serde_json::Value) {
    let doc = serde_json::json!({ "noarch": noarch });
    std::fs::write(path, serde_json::to_vec(&doc).unwrap()).unwrap();
}

/// S2: a patch generator's `remove` and `revoke` instructions are honored
/// through the full scheduler, not just at the `patches::apply_patches`
/// unit level.
#[tokio::test]
async fn patch_generator_removes_and_revokes_through_full_scheduler() {
    let channel = tempfile::tempdir().unwrap();
    let subdir_path = channel.path().join("noarch");
    std::fs::create_dir_all(&subdir_path).unwrap();

    write_tar_bz2(
        &subdir_path.join("a-1.0-0.tar.bz2"),
        &sample_index_json("a", "1.0", vec![]),
    );
    write_tar_bz2(
        &subdir_path.join("b-1.0-0.tar.bz2"),
        &sample_index_json("b", "1.0", vec![]),
    );
    write_tar_bz2(
        &subdir_path.join("c-1.0-0.tar.bz2"),
        &sample_index_json("c", "1.0", vec![]),
    );

    let patch_path = channel.path().join("patch_instructions.json");
    write_patch_file(
        &patch_path,
        &serde_json::json!({
            "remove": ["a-1.0-0.tar.bz2"],
            "revoke": ["b-1.0-0.tar.bz2"],
        }),
    );

    let mut options = base_options(channel.path());
    options.emit_monolithic = true;
    options.patch_generator = Some(patch_path);

    scheduler::run(options, CancellationToken::new()).await.unwrap();

    let repodata: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(subdir_path.join("repodata.json")).unwrap()).unwrap();
    assert!(repodata["packages"]["a-1.0-0.tar.bz2"].is_null(), "removed package must be absent");
    assert!(repodata["removed"].as_array().unwrap().iter().any(|v| v == "a-1.0-0.tar.bz2"));

    let revoked = &repodata["packages"]["b-1.0-0.tar.bz2"];
    assert!(revoked.is_object(), "revoked package stays in packages");
    assert!(revoked["package_has_been_revoked"].is_string());
    let marker = revoked["package_has_been_revoked"].as_str().unwrap();
    assert!(revoked["depends"].as_array().unwrap().iter().any(|d| d == marker));

    assert!(repodata["packages"]["c-1.0-0.tar.bz2"].is_object());
}

/// S3: a subdir mixing legacy `.tar.bz2` and `.conda` archives indexes both
/// extension families into the same `repodata.json`/`repodata.json
/// "packages.conda"` split.
#[tokio::test]
async fn mixed_tar_bz2_and_conda_extensions_both_index() {
    let channel = tempfile::tempdir().unwrap();
    let subdir_path = channel.path().join("noarch");
    std::fs::create_dir_all(&subdir_path).unwrap();

    write_tar_bz2(
        &subdir_path.join("a-1.0-0.tar.bz2"),
        &sample_index_json("a", "1.0", vec![]),
    );
    write_conda(
        &subdir_path.join("b-1.0-0.conda"),
        &sample_index_json("b", "1.0", vec![]),
    );

    let mut options = base_options(channel.path());
    options.emit_monolithic = true;

    scheduler::run(options, CancellationToken::new()).await.unwrap();

    let repodata: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(subdir_path.join("repodata.json")).unwrap()).unwrap();
    assert!(repodata["packages"]["a-1.0-0.tar.bz2"].is_object());
    assert!(repodata["packages.conda"]["b-1.0-0.conda"].is_object());
}

/// S4: a second run that adds one new archive to an otherwise-unchanged
/// subdir must fold it in without disturbing the already-indexed entries.
#[tokio::test]
async fn incremental_run_indexes_only_the_new_archive() {
    let channel = tempfile::tempdir().unwrap();
    let subdir_path = channel.path().join("noarch");
    std::fs::create_dir_all(&subdir_path).unwrap();
    write_tar_bz2(
        &subdir_path.join("a-1.0-0.tar.bz2"),
        &sample_index_json("a", "1.0", vec![]),
    );

    let mut options = base_options(channel.path());
    options.emit_monolithic = true;
    scheduler::run(options, CancellationToken::new()).await.unwrap();

    let first: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(subdir_path.join("repodata.json")).unwrap()).unwrap();
    assert_eq!(first["packages"].as_object().unwrap().len(), 1);

    write_tar_bz2(
        &subdir_path.join("b-1.0-0.tar.bz2"),
        &sample_index_json("b", "1.0", vec![]),
    );

    let mut options = base_options(channel.path());
    options.emit_monolithic = true;
    scheduler::run(options, CancellationToken::new()).await.unwrap();

    let second: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(subdir_path.join("repodata.json")).unwrap()).unwrap();
    assert!(second["packages"]["a-1.0-0.tar.bz2"].is_object());
    assert!(second["packages"]["b-1.0-0.tar.bz2"].is_object());
    assert_eq!(
        first["packages"]["a-1.0-0.tar.bz2"], second["packages"]["a-1.0-0.tar.bz2"],
        "the untouched archive's record must be unaffected by the incremental run"
    );
}

/// S5: two channels sharing one Server-backend database stay isolated from
/// each other via the per-channel key prefix — one channel's repodata never
/// picks up another channel's packages.
#[tokio::test]
async fn shared_server_backend_keeps_channels_isolated() {
    let db_dir = tempfile::tempdir().unwrap();
    let db_url = format!("sqlite://{}/shared.db?mode=rwc", db_dir.path().display());

    let channel_a = tempfile::tempdir().unwrap();
    let channel_b = tempfile::tempdir().unwrap();
    for (channel, name) in [(&channel_a, "a"), (&channel_b, "b")] {
        let subdir_path = channel.path().join("noarch");
        std::fs::create_dir_all(&subdir_path).unwrap();
        write_tar_bz2(
            &subdir_path.join(format!("{name}-1.0-0.tar.bz2")),
            &sample_index_json(name, "1.0", vec![]),
        );
    }

    for channel in [&channel_a, &channel_b] {
        let mut options = base_options(channel.path());
        options.backend = Backend::Server { db_url: db_url.clone() };
        options.emit_monolithic = true;
        scheduler::run(options, CancellationToken::new()).await.unwrap();
    }

    let repodata_a: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(channel_a.path().join("noarch").join("repodata.json")).unwrap(),
    )
    .unwrap();
    let repodata_b: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(channel_b.path().join("noarch").join("repodata.json")).unwrap(),
    )
    .unwrap();

    assert!(repodata_a["packages"]["a-1.0-0.tar.bz2"].is_object());
    assert!(repodata_a["packages"]["b-1.0-0.tar.bz2"].is_null());
    assert!(repodata_b["packages"]["b-1.0-0.tar.bz2"].is_object());
    assert!(repodata_b["packages"]["a-1.0-0.tar.bz2"].is_null());
}

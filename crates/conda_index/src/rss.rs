//! Renders the optional `rss.xml` feed: one `<item>` per package *version*
//! that wasn't already emitted by a prior run, newest first (SPEC_FULL.md
//! §4.5 "RSS/HTML rendering"). Hand-built with `std::fmt::Write`, same
//! rationale as [`crate::html`].
//!
//! A feed that re-emitted every package on every run would be useless as an
//! actual subscription feed, so the set of `name@version` pairs already seen
//! is persisted as a JSON sidecar (`rss_emitted.json`, channel-wide since
//! `channeldata.json` itself is channel-wide) and consulted on each render.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::Path;

use chrono::{DateTime, Utc};
use conda_index_types::ChannelData;

use crate::assembler::write_atomic_bytes;
use crate::error::AssembleError;

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn rfc822(timestamp: i64) -> String {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .unwrap_or_else(Utc::now)
        .to_rfc2822()
}

fn emitted_key(name: &str, version: &str) -> String {
    format!("{name}@{version}")
}

/// Loads the set of `name@version` pairs emitted by prior runs. Absent or
/// unreadable state is treated as empty, so a first run (or a corrupt
/// sidecar) just emits everything once rather than failing the whole index.
pub fn load_emitted(path: &Path) -> BTreeSet<String> {
    fs_err::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str(&raw).ok())
        .unwrap_or_default()
}

/// Persists the updated emitted set next to `rss.xml` via the same
/// temp-file + rename path every other channel-wide output uses.
pub fn save_emitted(path: &Path, emitted: &BTreeSet<String>) -> Result<(), AssembleError> {
    let bytes = serde_json::to_vec_pretty(emitted).expect("emitted set always serializes");
    write_atomic_bytes(path, &bytes)
}

/// Renders only the entries of `data` whose `name@version` isn't already in
/// `previously_emitted`, then adds them to it so the caller can persist the
/// updated set. Entries without both a timestamp and a version are never
/// eligible (there's nothing to date or key them by).
pub fn render_rss(
    channel_name: &str,
    channel_url: &str,
    data: &ChannelData,
    previously_emitted: &mut BTreeSet<String>,
) -> String {
    let mut entries: Vec<(&String, &conda_index_types::ChannelDataPackage, String)> = data
        .packages
        .iter()
        .filter_map(|(name, pkg)| {
            let version = pkg.version.as_ref()?.to_string();
            pkg.timestamp?;
            let key = emitted_key(name, &version);
            if previously_emitted.contains(&key) {
                None
            } else {
                Some((name, pkg, key))
            }
        })
        .collect();
    entries.sort_by(|a, b| b.1.timestamp.cmp(&a.1.timestamp).then(a.0.cmp(b.0)));

    let mut out = String::new();
    let _ = writeln!(out, "<?xml version=\"1.0\" encoding=\"UTF-8\"?>");
    let _ = writeln!(out, "<rss version=\"2.0\"><channel>");
    let _ = writeln!(out, "<title>{}</title>", escape_xml(channel_name));
    let _ = writeln!(out, "<link>{}</link>", escape_xml(channel_url));
    let _ = writeln!(
        out,
        "<description>Recent package updates for {}</description>",
        escape_xml(channel_name)
    );

    for (name, pkg, key) in entries {
        let version = pkg.version.as_ref().map(ToString::to_string).unwrap_or_default();
        let _ = writeln!(out, "<item>");
        let _ = writeln!(out, "<title>{} {}</title>", escape_xml(name), escape_xml(&version));
        let _ = writeln!(out, "<link>{}/{}</link>", escape_xml(channel_url), escape_xml(name));
        let _ = writeln!(out, "<guid isPermaLink=\"false\">{}-{}</guid>", escape_xml(name), escape_xml(&version));
        if let Some(summary) = &pkg.summary {
            let _ = writeln!(out, "<description>{}</description>", escape_xml(summary));
        }
        if let Some(timestamp) = pkg.timestamp {
            let _ = writeln!(out, "<pubDate>{}</pubDate>", rfc822(timestamp));
        }
        let _ = writeln!(out, "</item>");
        previously_emitted.insert(key);
    }

    let _ = writeln!(out, "</channel></rss>");
    out
}

//! Renders the optional, human-readable `index.html` listings: one per
//! subdir (basename/size/sha256 table) and one at the channel root linking
//! every subdir. Hand-built with `std::fmt::Write` rather than a
//! templating crate — the surface is a single static table and not worth a
//! new dependency (see SPEC_FULL.md §4.5).

use std::fmt::Write as _;

use conda_index_types::RepoData;

pub fn render_subdir_index(subdir: &str, repo: &RepoData) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "<!DOCTYPE html>");
    let _ = writeln!(out, "<html><head><meta charset=\"utf-8\"><title>{subdir}</title></head><body>");
    let _ = writeln!(out, "<h1>{subdir}</h1>");
    let _ = writeln!(out, "<table><thead><tr><th>package</th><th>size</th><th>sha256</th></tr></thead><tbody>");

    let mut rows: Vec<(&str, u64, &str)> = repo
        .iter()
        .map(|(basename, record)| (basename, record.size, record.sha256.as_deref().unwrap_or("")))
        .collect();
    rows.sort_by(|a, b| a.0.cmp(b.0));

    for (basename, size, sha256) in rows {
        let _ = writeln!(
            out,
            "<tr><td><a href=\"{basename}\">{basename}</a></td><td>{size}</td><td>{sha256}</td></tr>"
        );
    }

    let _ = writeln!(out, "</tbody></table></body></html>");
    out
}

pub fn render_channel_index(subdirs: &[String]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "<!DOCTYPE html>");
    let _ = writeln!(out, "<html><head><meta charset=\"utf-8\"><title>channel index</title></head><body>");
    let _ = writeln!(out, "<h1>channel</h1><ul>");
    let mut subdirs = subdirs.to_vec();
    subdirs.sort();
    for subdir in subdirs {
        let _ = writeln!(out, "<li><a href=\"{subdir}/index.html\">{subdir}</a></li>");
    }
    let _ = writeln!(out, "</ul></body></html>");
    out
}

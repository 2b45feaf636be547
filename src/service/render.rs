//! Plain-text tables for the terminal.

use chrono::{DateTime, Utc};
use std::fmt::Write;

use crate::format::{format_bytes, relative_time};
use crate::registry::{Source, SourceStatus};
use crate::store::{RepositoryDetail, RepositoryMeta, StatusCodes};

fn when(time: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    time.map(|t| relative_time(t, now))
        .unwrap_or_else(|| "-".to_string())
}

fn short_digest(digest: &str) -> &str {
    let end = "sha256:".len() + 12;
    digest.get(..end).unwrap_or(digest)
}

fn status_label(status: &SourceStatus) -> String {
    match status {
        SourceStatus::Unknown => "unknown".to_string(),
        SourceStatus::Reachable(code) => code.to_string(),
        SourceStatus::TimedOut => "timeout".to_string(),
        SourceStatus::Unreachable => "unreachable".to_string(),
    }
}

pub fn sources(sources: &[Source], status_codes: &StatusCodes) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:<16} {:<36} {:<12} DETAILS", "NAME", "HOST", "STATUS");
    for source in sources {
        let details = source
            .status
            .code()
            .and_then(|code| status_codes.get(&code.to_string()))
            .map(String::as_str)
            .unwrap_or("");
        let _ = writeln!(
            out,
            "{:<16} {:<36} {:<12} {}",
            source.name,
            source.display_host(),
            status_label(&source.status),
            details
        );
    }
    out
}

pub fn repositories(metas: &[RepositoryMeta], now: DateTime<Utc>) -> String {
    if metas.is_empty() {
        return "No repositories found\n".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<40} {:<12} {:>5} {:>10}  {:<20} UPDATED",
        "REPOSITORY", "SOURCE", "TAGS", "SIZE", "ARCHITECTURES"
    );
    for meta in metas {
        let (size, architectures) = if meta.is_untagged() {
            ("-".to_string(), "untagged".to_string())
        } else {
            (meta.formatted_size(), meta.architectures.join(","))
        };
        let _ = writeln!(
            out,
            "{:<40} {:<12} {:>5} {:>10}  {:<20} {}",
            meta.full_name(),
            meta.source,
            meta.tag_count,
            size,
            architectures,
            when(meta.last_updated, now)
        );
    }
    let _ = writeln!(out, "{} repositories", metas.len());
    out
}

pub fn repository_detail(detail: &RepositoryDetail, now: DateTime<Utc>) -> String {
    let meta = &detail.meta;
    let mut out = String::new();
    let _ = writeln!(out, "{} ({})", meta.full_name(), meta.source);
    let _ = writeln!(
        out,
        "Tags: {}  Size: {}  Architectures: {}",
        meta.tag_count,
        format_bytes(meta.total_size),
        if meta.architectures.is_empty() {
            "-".to_string()
        } else {
            meta.architectures.join(", ")
        }
    );
    if detail.tags.is_empty() {
        return out;
    }

    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "{:<24} {:<20} {:>10}  {:<22} PLATFORMS",
        "TAG", "DIGEST", "SIZE", "UPDATED"
    );
    for tag in &detail.tags {
        let platforms: Vec<String> = tag.architectures.iter().map(|a| a.platform()).collect();
        let _ = writeln!(
            out,
            "{:<24} {:<20} {:>10}  {:<22} {}",
            tag.name,
            short_digest(&tag.digest),
            tag.formatted_size(),
            when(tag.last_updated, now),
            platforms.join(", ")
        );
    }
    out
}

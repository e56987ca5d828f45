//! Chat log command functions
//!
//! This module contains the operations behind the command line tool:
//! dumping records, listing logs in a profile, showing log information and
//! exporting to JSON.

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, info_span};

use crate::{
    dbb::is_chat_log,
    utils::{collect_files, create_glob_matcher, format_size, format_timestamp, matches_filter},
    DbbFile, DecodedRecord, ScanDiagnostic, ScanOptions,
};

/// Output format for dumped records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// `<time>: <caller> <-> <recipients>: <line>`, one line per message line
    #[default]
    Text,
    /// One JSON object per record
    JsonLines,
}

/// Options for dumping records
#[derive(Debug, Clone, Copy, Default)]
pub struct DumpOptions {
    pub format: OutputFormat,
    /// Format timestamps in UTC instead of local time
    pub utc: bool,
    pub scan: ScanOptions,
}

/// Totals of a multi-file command
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DumpSummary {
    pub files: usize,
    pub records: usize,
    pub failed: usize,
    pub diagnostics: usize,
}

#[derive(Serialize)]
struct FileRecord<'a> {
    file: &'a str,
    #[serde(flatten)]
    record: &'a DecodedRecord,
}

/// Open a path as a log, `-` meaning stdin
pub fn open_log(path: &Path) -> Result<DbbFile> {
    if path.as_os_str() == "-" {
        return DbbFile::from_reader("-", io::stdin().lock()).context("Failed to read stdin");
    }
    DbbFile::open(path).with_context(|| format!("Failed to open {}", path.display()))
}

/// Find chat logs in a profile directory
///
/// Without a pattern every `chat*.dbb` file is a log.
pub fn find_logs(dir: &Path, pattern: Option<&str>, recursive: bool) -> Result<Vec<PathBuf>> {
    let files = collect_files(dir, recursive)?.into_iter();
    let logs = match pattern {
        Some(pattern) => {
            let matcher = create_glob_matcher(pattern)?;
            files
                .filter(|path| matches_filter(&path.to_string_lossy(), Some(&matcher)))
                .collect()
        }
        None => files.filter(|path| is_chat_log(path)).collect(),
    };
    Ok(logs)
}

/// Write the records of one log
///
/// Scan diagnostics are logged as warnings within a span naming the log and
/// counted in the returned summary.
pub fn dump_log<W: Write>(
    log: &DbbFile,
    options: &DumpOptions,
    out: &mut W,
) -> Result<DumpSummary> {
    let _span = info_span!("log", file = log.name()).entered();
    let mut scanner = log.records_with(options.scan);
    let mut summary = DumpSummary {
        files: 1,
        ..DumpSummary::default()
    };

    for record in scanner.by_ref() {
        write_record(log.name(), &record, options, out)?;
        summary.records += 1;
    }
    summary.diagnostics = scanner.diagnostics().len();

    Ok(summary)
}

fn write_record<W: Write>(
    file: &str,
    record: &DecodedRecord,
    options: &DumpOptions,
    out: &mut W,
) -> Result<()> {
    match options.format {
        OutputFormat::Text => {
            let time = format_timestamp(record.timestamp, options.utc);
            for line in record.message_lines() {
                writeln!(
                    out,
                    "{}: {} <-> {}: {}",
                    time, record.caller, record.recipients, line
                )?;
            }
        }
        OutputFormat::JsonLines => {
            serde_json::to_writer(&mut *out, &FileRecord { file, record })?;
            writeln!(out)?;
        }
    }
    Ok(())
}

/// Dump every given log to stdout
///
/// Files that fail to open are reported and skipped.
pub fn dump_logs(paths: &[PathBuf], options: &DumpOptions) -> Result<DumpSummary> {
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut summary = DumpSummary::default();

    for path in paths {
        let log = match open_log(path) {
            Ok(log) => log,
            Err(e) => {
                eprintln!("Error: {:#}", e);
                summary.failed += 1;
                continue;
            }
        };

        info!("Scanning {} ({})", log.name(), format_size(log.len() as u64));
        let dumped = dump_log(&log, options, &mut out)?;
        summary.files += dumped.files;
        summary.records += dumped.records;
        summary.diagnostics += dumped.diagnostics;
    }

    out.flush()?;
    Ok(summary)
}

/// Dump all chat logs of a profile directory
pub fn dump_profile(
    dir: &Path,
    pattern: Option<&str>,
    recursive: bool,
    options: &DumpOptions,
) -> Result<DumpSummary> {
    let logs = find_logs(dir, pattern, recursive)?;
    if logs.is_empty() {
        eprintln!("No chat logs found in {}", dir.display());
    }
    dump_logs(&logs, options)
}

/// List chat logs in a profile directory
pub fn list_logs(dir: &Path, pattern: Option<&str>, recursive: bool) -> Result<()> {
    let logs = find_logs(dir, pattern, recursive)?;
    let mut total_size = 0u64;

    for path in &logs {
        let size = path.metadata().map(|m| m.len()).unwrap_or(0);
        println!("{:>10} {}", format_size(size), path.display());
        total_size += size;
    }

    println!();
    println!("Total: {} logs, {}", logs.len(), format_size(total_size));

    Ok(())
}

/// Summary information about one log
#[derive(Debug, Clone, Default)]
pub struct LogInfo {
    pub size: usize,
    pub records: usize,
    /// Distinct caller/recipients pairs
    pub participants: BTreeSet<(String, String)>,
    pub first_timestamp: Option<i32>,
    pub last_timestamp: Option<i32>,
    pub resyncs: usize,
    pub diagnostics: Vec<ScanDiagnostic>,
}

/// Compute summary information for a log
pub fn log_info(log: &DbbFile, options: ScanOptions) -> LogInfo {
    let report = log.scan_report(options);
    let timestamps = report.records.iter().map(|r| r.timestamp);

    LogInfo {
        size: log.len(),
        records: report.records.len(),
        participants: report
            .records
            .iter()
            .map(|r| (r.caller.clone(), r.recipients.clone()))
            .collect(),
        first_timestamp: timestamps.clone().min(),
        last_timestamp: timestamps.max(),
        resyncs: report.resyncs,
        diagnostics: report.diagnostics,
    }
}

/// Show information about a log
pub fn show_info(path: &Path, options: ScanOptions, utc: bool) -> Result<()> {
    println!("Opening {}...", path.display());
    let log = open_log(path)?;
    let info = log_info(&log, options);

    println!();
    println!("Log Information:");
    println!("  File: {}", log.name());
    println!("  Size: {}", format_size(info.size as u64));
    println!("  Records: {}", info.records);
    println!("  Rejected alignments: {}", info.resyncs);
    if let (Some(first), Some(last)) = (info.first_timestamp, info.last_timestamp) {
        println!(
            "  Time range: {} .. {}",
            format_timestamp(first, utc),
            format_timestamp(last, utc)
        );
    }

    println!();
    println!("Participants:");
    if info.participants.is_empty() {
        println!("  (none)");
    }
    for (caller, recipients) in &info.participants {
        println!("  {} <-> {}", caller, recipients);
    }

    if !info.diagnostics.is_empty() {
        println!();
        println!("Diagnostics:");
        for diagnostic in &info.diagnostics {
            println!("  {}", diagnostic);
        }
    }

    Ok(())
}

/// Export the records of all given logs into one JSON array
pub fn export_json(paths: &[PathBuf], output: &Path, options: ScanOptions) -> Result<DumpSummary> {
    let pb = ProgressBar::new(paths.len() as u64);
    pb.set_style(ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
    )?);

    let mut logs = Vec::new();
    let mut summary = DumpSummary::default();

    for path in paths {
        pb.set_message(path.display().to_string());
        match open_log(path) {
            Ok(log) => {
                let report = info_span!("log", file = log.name())
                    .in_scope(|| log.scan_report(options));
                summary.files += 1;
                summary.records += report.records.len();
                summary.diagnostics += report.diagnostics.len();
                logs.push((log.name().to_string(), report.records));
            }
            Err(e) => {
                pb.println(format!("Error: {:#}", e));
                summary.failed += 1;
            }
        }
        pb.inc(1);
    }

    pb.finish_with_message("Done");

    let entries: Vec<FileRecord<'_>> = logs
        .iter()
        .flat_map(|(file, records)| records.iter().map(move |record| FileRecord { file, record }))
        .collect();

    let file = File::create(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &entries)?;
    writer.flush()?;

    println!();
    println!(
        "Exported: {} records from {} logs to {}",
        summary.records,
        summary.files,
        output.display()
    );
    if summary.failed > 0 {
        println!("Failed: {} logs", summary.failed);
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::{encode_entries, DbbWriteEntry};
    use std::fs;

    fn sample_log() -> DbbFile {
        let data = encode_entries(&[
            DbbWriteEntry::new("alice", "bob", "first\nsecond")
                .with_timestamp(1_234_567_890),
            DbbWriteEntry::new("bob", "alice", "reply").with_timestamp(1_234_567_900),
        ])
        .unwrap();
        DbbFile::from_bytes("chat512.dbb", data)
    }

    #[test]
    fn test_dump_text_splits_lines() {
        let options = DumpOptions {
            utc: true,
            ..DumpOptions::default()
        };
        let mut out = Vec::new();
        let summary = dump_log(&sample_log(), &options, &mut out).unwrap();

        assert_eq!(summary.records, 2);
        assert_eq!(summary.diagnostics, 0);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "2009-02-13.233130: alice <-> bob: first\n\
             2009-02-13.233130: alice <-> bob: second\n\
             2009-02-13.233140: bob <-> alice: reply\n"
        );
    }

    #[test]
    fn test_dump_json_lines() {
        let options = DumpOptions {
            format: OutputFormat::JsonLines,
            ..DumpOptions::default()
        };
        let mut out = Vec::new();
        dump_log(&sample_log(), &options, &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let value: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(value["file"], "chat512.dbb");
        assert_eq!(value["caller"], "bob");
        assert_eq!(value["timestamp"], 1_234_567_900);
        assert!(value.get("sender_display_name").is_none());
    }

    #[test]
    fn test_dump_counts_diagnostics() {
        let mut data = sample_log().data().to_vec();
        data.extend_from_slice(b"l33l\0\0");
        let log = DbbFile::from_bytes("chat512.dbb", data);

        let mut out = Vec::new();
        let summary = dump_log(&log, &DumpOptions::default(), &mut out).unwrap();
        assert_eq!(summary.records, 2);
        assert_eq!(summary.diagnostics, 1);
    }

    #[test]
    fn test_log_info() {
        let info = log_info(&sample_log(), ScanOptions::default());
        assert_eq!(info.records, 2);
        assert_eq!(info.participants.len(), 2);
        assert_eq!(info.first_timestamp, Some(1_234_567_890));
        assert_eq!(info.last_timestamp, Some(1_234_567_900));
        assert!(info.diagnostics.is_empty());
    }

    #[test]
    fn test_find_logs_uses_profile_pattern() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("chat512.dbb"), b"").unwrap();
        fs::write(dir.path().join("chat256.dbb"), b"").unwrap();
        fs::write(dir.path().join("call256.dbb"), b"").unwrap();
        fs::write(dir.path().join("chat.txt"), b"").unwrap();
        fs::write(dir.path().join("notes.txt"), b"").unwrap();

        let logs = find_logs(dir.path(), None, false).unwrap();
        assert_eq!(logs.len(), 2);
        assert!(logs[0].ends_with("chat256.dbb"));

        let all = find_logs(dir.path(), Some("*.dbb"), false).unwrap();
        assert_eq!(all.len(), 3);

        let text = find_logs(dir.path(), Some("*.txt"), false).unwrap();
        assert_eq!(text.len(), 2);
    }

    #[test]
    fn test_export_json() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("chat512.dbb");
        fs::write(&log_path, sample_log().data()).unwrap();
        let output = dir.path().join("out.json");

        let summary = export_json(
            &[log_path, dir.path().join("missing.dbb")],
            &output,
            ScanOptions::default(),
        )
        .unwrap();
        assert_eq!(summary.records, 2);
        assert_eq!(summary.failed, 1);

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 2);
        assert_eq!(value[0]["message"], "first\nsecond");
    }
}

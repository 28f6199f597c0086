use std::fs::{self, File};
use std::io::{BufRead, BufWriter, Write};
use std::path::Path;
use serde_json::Value;
use crate::{
    console::{progress_bar, Console},
    error::RunError,
    record::Record,
};

/// Parsed values plus the 1-based numbers of the lines that were not valid JSON.
#[derive(Debug, Default, PartialEq)]
pub struct JsonLines {
    pub values: Vec<Value>,
    pub skipped_lines: Vec<usize>,
}

/// Parses newline-delimited JSON. Blank lines are skipped; malformed lines are
/// reported with their 1-based line number and skipped.
pub fn parse_lines<R: BufRead>(reader: R, console: &Console) -> std::io::Result<JsonLines> {
    let mut parsed = JsonLines::default();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        console.tick();
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(value) => parsed.values.push(value),
            Err(e) => {
                console.warn(format!(
                    "Warning: line {} is not valid JSON ({}). Skipping.",
                    idx + 1,
                    e
                ));
                parsed.skipped_lines.push(idx + 1);
            }
        }
    }
    Ok(parsed)
}

pub fn read_jsonl(path: &Path) -> Result<Vec<Value>, RunError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(RunError::InputNotFound(path.to_path_buf()))
        }
        Err(source) => return Err(RunError::InputRead { path: path.to_path_buf(), source }),
    };

    let bar = progress_bar(content.lines().count() as u64, "reading input");
    let parsed = parse_lines(content.as_bytes(), &Console::with_bar(bar.clone()));
    bar.finish_and_clear();
    parsed
        .map(|parsed| parsed.values)
        .map_err(|source| RunError::InputRead { path: path.to_path_buf(), source })
}

/// Writes one JSON object per line, overwriting `path`. Non-ASCII text is kept as is.
pub fn write_jsonl(path: &Path, records: &[Record], fields: &[String]) -> Result<(), RunError> {
    let bar = progress_bar(records.len() as u64, "saving results");
    let write = || -> std::io::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut out = BufWriter::new(File::create(path)?);
        for record in records {
            serde_json::to_writer(&mut out, &record.project(fields))?;
            out.write_all(b"\n")?;
            bar.inc(1);
        }
        out.flush()
    };
    let written = write();
    bar.finish_and_clear();
    written.map_err(|source| RunError::OutputWrite { path: path.to_path_buf(), source })
}

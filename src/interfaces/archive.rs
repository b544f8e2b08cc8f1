//! Uploaded source archives
//!
//! Reads a zip archive in memory and runs the scanner over every typed source
//! entry. Entries that cannot be used (directories, other extensions,
//! oversized or non-UTF-8 files) are skipped; only an unreadable archive is an
//! error.

use super::scanner::{is_typed_source, scan_source};
use crate::model::InterfaceDef;
use std::io::{Cursor, Read};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Archive could not be read: {0}")]
    Unreadable(#[from] zip::result::ZipError),

    #[error("Archive is empty")]
    Empty,
}

/// Scan every typed source entry of a zip archive, in archive order
pub fn scan_archive(bytes: &[u8], max_file_bytes: u64) -> Result<Vec<InterfaceDef>, ArchiveError> {
    if bytes.is_empty() {
        return Err(ArchiveError::Empty);
    }
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    let mut found = Vec::new();
    let mut scanned = 0usize;

    for index in 0..archive.len() {
        let mut entry = match archive.by_index(index) {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Skipping archive entry {}: {}", index, e);
                continue;
            }
        };
        if entry.is_dir() {
            continue;
        }

        let path = entry.name().trim_start_matches("./").to_string();
        if !is_typed_source(&path) {
            continue;
        }
        if entry.size() > max_file_bytes {
            debug!("Skipping {} ({} bytes exceeds limit)", path, entry.size());
            continue;
        }

        let mut raw = Vec::new();
        if let Err(e) = (&mut entry).take(max_file_bytes + 1).read_to_end(&mut raw) {
            debug!("Skipping {}: {}", path, e);
            continue;
        }
        if raw.len() as u64 > max_file_bytes {
            debug!("Skipping {} (inflated size exceeds limit)", path);
            continue;
        }
        let Ok(text) = String::from_utf8(raw) else {
            debug!("Skipping {} (not UTF-8)", path);
            continue;
        };

        scanned += 1;
        found.extend(scan_source(&path, &text));
    }

    info!(
        "Scanned {} source files from archive, found {} interfaces",
        scanned,
        found.len()
    );
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        writer.add_directory("src/", options).unwrap();
        for (name, body) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(body).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_scans_only_typed_sources() {
        let bytes = build_zip(&[
            ("src/user.ts", b"export interface User {\n  id: string;\n}\n"),
            ("src/user.js", b"export interface Ignored { id: string }"),
            ("README.md", b"export interface Nope { id: string }"),
            ("src/order.tsx", b"\n\nexport type Order = { total: number }"),
        ]);

        let found = scan_archive(&bytes, 1024).unwrap();
        let names: Vec<&str> = found.iter().map(|i| i.name.as_str()).collect();

        assert_eq!(names, vec!["User", "Order"]);
        assert_eq!(found[0].source, "src/user.ts:1");
        assert_eq!(found[1].source, "src/order.tsx:3");
    }

    #[test]
    fn test_skips_oversized_and_binary_entries() {
        let big = format!("export interface Big {{ {} }}", "a: string;".repeat(50));
        let bytes = build_zip(&[
            ("big.ts", big.as_bytes()),
            ("binary.ts", &[0xff, 0xfe, 0x00, 0x7b]),
            ("ok.ts", b"export interface Ok { id: number }"),
        ]);

        let found = scan_archive(&bytes, 128).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Ok");
    }

    #[test]
    fn test_garbage_is_an_error() {
        assert!(matches!(
            scan_archive(b"definitely not a zip", 1024),
            Err(ArchiveError::Unreadable(_))
        ));
        assert!(matches!(scan_archive(&[], 1024), Err(ArchiveError::Empty)));
    }
}

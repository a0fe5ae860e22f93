//! Package Scanner: enumerate ZIP entries and compute stable identity
//! (size, content hash) per part. Never parses XML.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::{Result, TriageError};

/// Identity and size metadata for a single named blob inside a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartInfo {
    pub name: String,
    pub size: u64,
    pub compressed_size: u64,
    pub sha256: String,
    pub is_xml: bool,
}

/// The result of scanning one package: one `PartInfo` per ZIP entry plus a
/// name -> info lookup.
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    pub path: Option<PathBuf>,
    pub parts: Vec<PartInfo>,
    by_name: BTreeMap<String, usize>,
}

impl ScanResult {
    pub fn by_name(&self, name: &str) -> Option<&PartInfo> {
        self.by_name.get(name).map(|&i| &self.parts[i])
    }

    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().map(|p| p.name.as_str())
    }

    pub fn xml_parts(&self) -> impl Iterator<Item = &PartInfo> {
        self.parts.iter().filter(|p| p.is_xml)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }
}

fn is_xml_name(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(".xml")
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn scan_archive<R: Read + std::io::Seek>(mut archive: zip::ZipArchive<R>) -> std::io::Result<ScanResult> {
    let mut result = ScanResult::default();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let name = entry.name().to_string();
        let compressed_size = entry.compressed_size();
        let mut raw = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut raw)?;
        let info = PartInfo {
            size: raw.len() as u64,
            compressed_size,
            sha256: sha256_hex(&raw),
            is_xml: is_xml_name(&name),
            name: name.clone(),
        };
        result.by_name.insert(name, result.parts.len());
        result.parts.push(info);
    }
    Ok(result)
}

/// Scan a package from a filesystem path.
pub fn scan(path: impl AsRef<Path>) -> Result<ScanResult> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|source| TriageError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let archive = zip::ZipArchive::new(file).map_err(|source| TriageError::InvalidPackage {
        path: path.to_path_buf(),
        source,
    })?;
    let mut result = scan_archive(archive).map_err(|source| TriageError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    result.path = Some(path.to_path_buf());
    log::debug!("scanned {} parts from {}", result.parts.len(), path.display());
    Ok(result)
}

/// Scan a package already held in memory.
pub fn scan_bytes(bytes: &[u8]) -> Result<ScanResult> {
    let cursor = std::io::Cursor::new(bytes);
    let archive = zip::ZipArchive::new(cursor).map_err(|source| TriageError::InvalidPackage {
        path: PathBuf::from("<in-memory>"),
        source,
    })?;
    scan_archive(archive).map_err(|source| TriageError::Io {
        path: PathBuf::from("<in-memory>"),
        source,
    })
}

/// Read a single part's raw decompressed bytes from a package on disk.
pub fn read_part_bytes(path: impl AsRef<Path>, part: &str) -> Result<Vec<u8>> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|source| TriageError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut archive = zip::ZipArchive::new(file).map_err(|source| TriageError::InvalidPackage {
        path: path.to_path_buf(),
        source,
    })?;
    let mut entry = archive.by_name(part).map_err(|source| TriageError::InvalidPackage {
        path: path.to_path_buf(),
        source,
    })?;
    let mut raw = Vec::with_capacity(entry.size() as usize);
    entry
        .read_to_end(&mut raw)
        .map_err(|source| TriageError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(raw)
}

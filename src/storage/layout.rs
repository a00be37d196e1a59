//! On-disk layout of an archive root
//!
//! ```text
//! {root}/
//! ├── progress.json
//! ├── completed-sections.json
//! ├── raw-html/subforum-<ID>/topic-<ID>/page-<N>.html
//! ├── structured-json/subforum-<ID>/topic-<ID>.json
//! └── metadata/subforum-<ID>/index.json
//! ```
//!
//! Identifiers are percent-escaped into a single path component, so an ID
//! taken from a remote link can never name a parent or nested directory.
//! Construction and parsing are inverse functions: parsing a constructed path
//! yields back the same root, identifiers and page number.

use crate::storage::traits::{StorageError, StorageResult};
use std::path::{Path, PathBuf};

pub const RAW_DIR: &str = "raw-html";
pub const STRUCTURED_DIR: &str = "structured-json";
pub const METADATA_DIR: &str = "metadata";
pub const PROGRESS_FILE: &str = "progress.json";
pub const COMPLETION_FILE: &str = "completed-sections.json";
pub const INDEX_FILE: &str = "index.json";

const SECTION_PREFIX: &str = "subforum-";
const TOPIC_PREFIX: &str = "topic-";
const PAGE_PREFIX: &str = "page-";

/// Location of one raw topic page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPageLocation {
    pub root: PathBuf,
    pub section_id: String,
    pub topic_id: String,
    pub page: u32,
}

/// Location of one structured topic record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicLocation {
    pub root: PathBuf,
    pub section_id: String,
    pub topic_id: String,
}

/// Location of one section index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataLocation {
    pub root: PathBuf,
    pub section_id: String,
}

/// Longest directory or file name the layout produces, in bytes
///
/// Kept below the common 255-byte filesystem limit so the `.tmp` sibling of
/// an atomic write still fits.
pub const MAX_NAME_BYTES: usize = 240;

/// Directory name of a section, with the identifier escaped
pub fn section_dir_name(section_id: &str) -> StorageResult<String> {
    component_name(Path::new(METADATA_DIR), SECTION_PREFIX, section_id, "", "section")
}

pub fn progress_path(root: &Path) -> PathBuf {
    root.join(PROGRESS_FILE)
}

pub fn completion_path(root: &Path) -> PathBuf {
    root.join(COMPLETION_FILE)
}

pub fn raw_page_path(
    root: &Path,
    section_id: &str,
    topic_id: &str,
    page: u32,
) -> StorageResult<PathBuf> {
    let base = root.join(RAW_DIR);
    let section = component_name(&base, SECTION_PREFIX, section_id, "", "section")?;
    let topic = component_name(&base, TOPIC_PREFIX, topic_id, "", "topic")?;
    Ok(base
        .join(section)
        .join(topic)
        .join(format!("{PAGE_PREFIX}{page}.html")))
}

pub fn structured_path(root: &Path, section_id: &str, topic_id: &str) -> StorageResult<PathBuf> {
    let base = root.join(STRUCTURED_DIR);
    let section = component_name(&base, SECTION_PREFIX, section_id, "", "section")?;
    let file = component_name(&base, TOPIC_PREFIX, topic_id, ".json", "topic")?;
    Ok(base.join(section).join(file))
}

pub fn metadata_path(root: &Path, section_id: &str) -> StorageResult<PathBuf> {
    let base = root.join(METADATA_DIR);
    let section = component_name(&base, SECTION_PREFIX, section_id, "", "section")?;
    Ok(base.join(section).join(INDEX_FILE))
}

/// Builds `<prefix><escaped id><suffix>` as a single path component
///
/// Every byte outside `[A-Za-z0-9._~-]` is written as `%XX`, so separators,
/// NUL and `%` itself never reach the filesystem unescaped.
fn component_name(
    base: &Path,
    prefix: &str,
    id: &str,
    suffix: &str,
    what: &'static str,
) -> StorageResult<String> {
    if id.is_empty() {
        return Err(StorageError::EmptyIdentifier {
            path: base.to_path_buf(),
            component: what,
        });
    }

    let mut name = String::with_capacity(prefix.len() + id.len() + suffix.len());
    name.push_str(prefix);
    for byte in id.bytes() {
        if is_plain(byte) {
            name.push(char::from(byte));
        } else {
            name.push_str(&format!("%{:02X}", byte));
        }
    }
    name.push_str(suffix);

    if name.len() > MAX_NAME_BYTES {
        return Err(wrong_shape(
            base,
            format!("{} identifier is too long ({} bytes escaped)", what, name.len()),
        ));
    }
    Ok(name)
}

fn is_plain(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~')
}

/// Reverses the escaping of `component_name`
///
/// Only the exact form `component_name` produces is accepted: uppercase
/// escapes, and no escape for a byte that is written plainly.
fn unescape(path: &Path, escaped: &str) -> StorageResult<String> {
    let bytes = escaped.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let byte = bytes
                    .get(i + 1..i + 3)
                    .and_then(|hex| std::str::from_utf8(hex).ok())
                    .filter(|hex| hex.bytes().all(|b| b.is_ascii_digit() || b.is_ascii_uppercase()))
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                    .filter(|byte| !is_plain(*byte))
                    .ok_or_else(|| wrong_shape(path, format!("bad escape in '{}'", escaped)))?;
                decoded.push(byte);
                i += 3;
            }
            byte if is_plain(byte) => {
                decoded.push(byte);
                i += 1;
            }
            _ => {
                return Err(wrong_shape(
                    path,
                    format!("unescaped character in '{}'", escaped),
                ))
            }
        }
    }

    String::from_utf8(decoded)
        .map_err(|_| wrong_shape(path, format!("'{}' is not valid UTF-8", escaped)))
}

/// Parses `{root}/raw-html/subforum-<ID>/topic-<ID>/page-<N>.html`
pub fn parse_raw_page_path(path: &Path) -> StorageResult<RawPageLocation> {
    let [root, kind, section, topic, file] = split_tail::<5>(path)?;
    expect_name(path, &kind, RAW_DIR)?;

    let page_str = strip_affixes(path, &file, PAGE_PREFIX, ".html")?;
    if page_str.is_empty() {
        return Err(StorageError::EmptyIdentifier {
            path: path.to_path_buf(),
            component: "page",
        });
    }
    let page = parse_page_number(path, page_str)?;

    Ok(RawPageLocation {
        root,
        section_id: identifier(path, &section, SECTION_PREFIX, "", "section")?,
        topic_id: identifier(path, &topic, TOPIC_PREFIX, "", "topic")?,
        page,
    })
}

/// Parses `{root}/structured-json/subforum-<ID>/topic-<ID>.json`
pub fn parse_structured_path(path: &Path) -> StorageResult<TopicLocation> {
    let [root, kind, section, file] = split_tail::<4>(path)?;
    expect_name(path, &kind, STRUCTURED_DIR)?;

    Ok(TopicLocation {
        root,
        section_id: identifier(path, &section, SECTION_PREFIX, "", "section")?,
        topic_id: identifier(path, &file, TOPIC_PREFIX, ".json", "topic")?,
    })
}

/// Parses `{root}/metadata/subforum-<ID>/index.json`
pub fn parse_metadata_path(path: &Path) -> StorageResult<MetadataLocation> {
    let [root, kind, section, file] = split_tail::<4>(path)?;
    expect_name(path, &kind, METADATA_DIR)?;
    expect_name(path, &file, INDEX_FILE)?;

    Ok(MetadataLocation {
        root,
        section_id: identifier(path, &section, SECTION_PREFIX, "", "section")?,
    })
}

/// Splits `path` into its root and last `N - 1` components
fn split_tail<const N: usize>(path: &Path) -> StorageResult<[PathBuf; N]> {
    let mut parts: Vec<PathBuf> = Vec::with_capacity(N);
    let mut current = path;

    for _ in 0..N - 1 {
        let name = current
            .file_name()
            .ok_or_else(|| wrong_shape(path, "too few path components"))?;
        parts.push(PathBuf::from(name));
        current = current
            .parent()
            .ok_or_else(|| wrong_shape(path, "too few path components"))?;
    }
    parts.push(current.to_path_buf());
    parts.reverse();

    parts
        .try_into()
        .map_err(|_| wrong_shape(path, "too few path components"))
}

fn expect_name(path: &Path, component: &Path, expected: &str) -> StorageResult<()> {
    if component.as_os_str() == expected {
        Ok(())
    } else {
        Err(wrong_shape(
            path,
            format!("expected '{}', found '{}'", expected, component.display()),
        ))
    }
}

/// Strips a fixed prefix and suffix from a single component
fn strip_affixes<'a>(
    path: &Path,
    component: &'a Path,
    prefix: &str,
    suffix: &str,
) -> StorageResult<&'a str> {
    let name = component
        .to_str()
        .ok_or_else(|| wrong_shape(path, "component is not valid UTF-8"))?;

    name.strip_prefix(prefix)
        .and_then(|rest| rest.strip_suffix(suffix))
        .ok_or_else(|| {
            wrong_shape(
                path,
                format!("'{}' does not match '{}<ID>{}'", name, prefix, suffix),
            )
        })
}

fn identifier(
    path: &Path,
    component: &Path,
    prefix: &str,
    suffix: &str,
    what: &'static str,
) -> StorageResult<String> {
    let id = strip_affixes(path, component, prefix, suffix)?;
    if id.is_empty() {
        return Err(StorageError::EmptyIdentifier {
            path: path.to_path_buf(),
            component: what,
        });
    }
    unescape(path, id)
}

fn parse_page_number(path: &Path, raw: &str) -> StorageResult<u32> {
    // Leading zeros or signs would break the round trip with `raw_page_path`
    if !raw.bytes().all(|b| b.is_ascii_digit()) || (raw.len() > 1 && raw.starts_with('0')) {
        return Err(wrong_shape(path, format!("'{}' is not a page number", raw)));
    }
    raw.parse()
        .map_err(|_| wrong_shape(path, format!("'{}' is not a page number", raw)))
}

fn wrong_shape(path: &Path, message: impl Into<String>) -> StorageError {
    StorageError::invalid_format(path, message)
}

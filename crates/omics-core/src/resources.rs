//! File resources backing a database
//!
//! A database is described by a base path and a map of resource names to
//! file paths. This module resolves those entries against the base path,
//! expands `~`, recognises remote URLs and transparently decompresses gzip
//! files. Downloading remote files is left to the caller.

use crate::error::{Error, Result};
use flate2::read::MultiGzDecoder;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Cursor, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use url::Url;
use walkdir::WalkDir;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// A single resolved resource
#[derive(Debug, Clone)]
pub enum Resource {
    /// A file on local disk
    Path(PathBuf),
    /// Decompressed content held in memory
    Bytes { origin: PathBuf, data: Vec<u8> },
    /// A remote file that has not been fetched
    Remote(Url),
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resource::Path(p) => write!(f, "{}", p.display()),
            Resource::Bytes { origin, data } => {
                write!(f, "<{} bytes from {}>", data.len(), origin.display())
            }
            Resource::Remote(url) => write!(f, "{}", url),
        }
    }
}

/// Named resources, ordered by name
#[derive(Debug, Clone, Default)]
pub struct FileResources {
    entries: BTreeMap<String, Resource>,
}

impl FileResources {
    /// Create an empty set of resources
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource under a name
    pub fn insert(&mut self, name: impl Into<String>, resource: Resource) {
        self.entries.insert(name.into(), resource);
    }

    /// Look up a resource
    pub fn get(&self, name: &str) -> Option<&Resource> {
        self.entries.get(name)
    }

    /// Local path of a resource, if it has one
    pub fn path(&self, name: &str) -> Option<&Path> {
        match self.entries.get(name) {
            Some(Resource::Path(p)) => Some(p),
            _ => None,
        }
    }

    /// All registered names
    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// Number of resources
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Open a resource for reading
    pub fn open(&self, name: &str) -> Result<Box<dyn BufRead>> {
        match self.entries.get(name) {
            Some(Resource::Path(path)) => open_local(path),
            Some(Resource::Bytes { data, .. }) => Ok(Box::new(Cursor::new(data.clone()))),
            Some(Resource::Remote(url)) => Err(Error::RemoteResource {
                name: name.to_string(),
                url: url.to_string(),
            }),
            None => Err(Error::ResourceNotFound(name.to_string())),
        }
    }

    /// Drop in-memory buffers, keeping paths and urls
    pub fn close(&mut self) {
        self.entries
            .retain(|_, r| !matches!(r, Resource::Bytes { .. }));
    }

    /// Iterate over name/resource pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Resource)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Expand a leading `~` to the user's home directory
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest.trim_start_matches('/'));
        }
    }
    PathBuf::from(path)
}

/// Parse `entry` as a remote url, on its own or joined onto `base_path`
fn as_remote(base_path: &str, entry: &str) -> Option<Url> {
    let is_remote = |u: &Url| matches!(u.scheme(), "http" | "https" | "ftp");
    if let Ok(url) = Url::parse(entry) {
        if is_remote(&url) {
            return Some(url);
        }
    }
    let base = Url::parse(base_path).ok().filter(is_remote)?;
    let base = if base.path().ends_with('/') {
        base
    } else {
        Url::parse(&format!("{}/", base)).ok()?
    };
    base.join(entry).ok()
}

/// Resolve every entry of `file_resources` against `base_path`
///
/// Gzip files are decompressed and registered a second time under the name
/// without the `.gz` suffix. With `write_uncompressed` the decompressed
/// content is written beside the source file; otherwise it stays in memory.
pub fn load_file_resources(
    base_path: &str,
    file_resources: &BTreeMap<String, String>,
    write_uncompressed: bool,
) -> Result<FileResources> {
    let base_dir = expand_home(base_path);
    let mut resources = FileResources::new();

    for (name, entry) in file_resources {
        if let Some(url) = as_remote(base_path, entry) {
            debug!(name = %name, url = %url, "registered remote resource");
            resources.insert(name.clone(), Resource::Remote(url));
            continue;
        }

        let candidate = expand_home(entry);
        let path = if candidate.exists() {
            candidate
        } else if base_dir.join(&candidate).exists() {
            base_dir.join(&candidate)
        } else {
            warn!(
                name = %name,
                entry = %entry,
                base_path = %base_dir.display(),
                "file resource does not exist, skipping"
            );
            continue;
        };

        resources.insert(name.clone(), Resource::Path(path.clone()));

        // The decompressed content wins when the names coincide
        if is_gzip(&path)? {
            let uncompressed_name = name.strip_suffix(".gz").unwrap_or(name).to_string();
            let data = decompress(&path)?;
            let resource = if write_uncompressed {
                let target = uncompressed_target(&path);
                fs::write(&target, &data)?;
                Resource::Path(target)
            } else {
                Resource::Bytes {
                    origin: path.clone(),
                    data,
                }
            };
            resources.insert(uncompressed_name, resource);
        }
    }

    info!(
        resources = ?resources.iter().map(|(n, r)| format!("{}={}", n, r)).collect::<Vec<_>>(),
        "loaded file resources"
    );
    Ok(resources)
}

/// Register every file under `dir` by file name
pub fn discover_file_resources<P: AsRef<Path>>(dir: P) -> Result<BTreeMap<String, String>> {
    let mut found = BTreeMap::new();
    for entry in WalkDir::new(dir.as_ref()).follow_links(true) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(file_name) = entry.file_name().to_str() {
            found
                .entry(file_name.to_string())
                .or_insert_with(|| entry.path().to_string_lossy().into_owned());
        }
    }
    Ok(found)
}

/// Where the decompressed copy of `path` is written
///
/// `x.tsv.gz` becomes `x.tsv`; a name without `.gz` gets `.uncompressed`
/// appended so the source is never overwritten.
fn uncompressed_target(path: &Path) -> PathBuf {
    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    match file_name.strip_suffix(".gz") {
        Some(stem) if !stem.is_empty() => path.with_file_name(stem),
        _ => path.with_file_name(format!("{}.uncompressed", file_name)),
    }
}

/// Open a local file for reading, decompressing it when it is gzipped
pub fn open_local(path: &Path) -> Result<Box<dyn BufRead>> {
    let gzipped = is_gzip(path)?;
    let file = File::open(path).map_err(|e| Error::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    if gzipped {
        debug!(path = %path.display(), "reading gzipped file");
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(BufReader::new(file)))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

fn is_gzip(path: &Path) -> Result<bool> {
    let mut file = File::open(path).map_err(|e| Error::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut magic = [0u8; 2];
    match file.read_exact(&mut magic) {
        Ok(()) => Ok(magic == GZIP_MAGIC),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(Error::FileRead {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

fn decompress(path: &Path) -> Result<Vec<u8>> {
    let file = File::open(path).map_err(|e| Error::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut data = Vec::new();
    MultiGzDecoder::new(BufReader::new(file))
        .read_to_end(&mut data)
        .map_err(|e| Error::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::TempDir;

    fn entries(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_local_resources_resolved_against_base() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("genes.tsv"), "gene\nTP53\n").unwrap();

        let resources = load_file_resources(
            &dir.path().to_string_lossy(),
            &entries(&[("genes.tsv", "genes.tsv"), ("missing.tsv", "missing.tsv")]),
            false,
        )
        .unwrap();

        assert_eq!(resources.names(), vec!["genes.tsv"]);
        assert_eq!(resources.path("genes.tsv"), Some(dir.path().join("genes.tsv").as_path()));
    }

    #[test]
    fn test_gzip_resource_in_memory() {
        let dir = TempDir::new().unwrap();
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"gene\nTP53\n").unwrap();
        fs::write(dir.path().join("genes.tsv.gz"), encoder.finish().unwrap()).unwrap();

        let mut resources = load_file_resources(
            &dir.path().to_string_lossy(),
            &entries(&[("genes.tsv.gz", "genes.tsv.gz")]),
            false,
        )
        .unwrap();

        let mut content = String::new();
        resources
            .open("genes.tsv")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "gene\nTP53\n");

        // The compressed entry is decompressed on open too
        let mut raw = String::new();
        resources
            .open("genes.tsv.gz")
            .unwrap()
            .read_to_string(&mut raw)
            .unwrap();
        assert_eq!(raw, "gene\nTP53\n");

        resources.close();
        assert!(resources.get("genes.tsv").is_none());
        assert!(resources.get("genes.tsv.gz").is_some());
    }

    #[test]
    fn test_gzip_resource_written_uncompressed() {
        let dir = TempDir::new().unwrap();
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"a,b\n1,2\n").unwrap();
        fs::write(dir.path().join("t.csv.gz"), encoder.finish().unwrap()).unwrap();

        let resources = load_file_resources(
            &dir.path().to_string_lossy(),
            &entries(&[("t.csv.gz", "t.csv.gz")]),
            true,
        )
        .unwrap();

        let written = dir.path().join("t.csv");
        assert_eq!(resources.path("t.csv"), Some(written.as_path()));
        assert_eq!(fs::read_to_string(written).unwrap(), "a,b\n1,2\n");
    }

    #[test]
    fn test_gzip_without_suffix_keeps_source() {
        let dir = TempDir::new().unwrap();
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"a,b\n1,2\n").unwrap();
        let compressed = encoder.finish().unwrap();
        let source = dir.path().join("table");
        fs::write(&source, &compressed).unwrap();

        let resources = load_file_resources(
            &dir.path().to_string_lossy(),
            &entries(&[("table", "table")]),
            true,
        )
        .unwrap();

        let written = dir.path().join("table.uncompressed");
        assert_eq!(resources.path("table"), Some(written.as_path()));
        assert_eq!(fs::read_to_string(written).unwrap(), "a,b\n1,2\n");
        assert_eq!(fs::read(&source).unwrap(), compressed);
    }

    #[test]
    fn test_remote_resources_not_opened() {
        let resources = load_file_resources(
            "https://example.org/data",
            &entries(&[("genes.txt", "genes.txt")]),
            false,
        )
        .unwrap();

        match resources.get("genes.txt") {
            Some(Resource::Remote(url)) => {
                assert_eq!(url.as_str(), "https://example.org/data/genes.txt")
            }
            other => panic!("expected remote resource, got {:?}", other),
        }
        assert!(matches!(
            resources.open("genes.txt"),
            Err(Error::RemoteResource { .. })
        ));
    }

    #[test]
    fn test_discover_file_resources() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("a.csv"), "x\n").unwrap();
        fs::write(dir.path().join("sub").join("b.csv"), "y\n").unwrap();

        let found = discover_file_resources(dir.path()).unwrap();
        assert_eq!(found.keys().collect::<Vec<_>>(), vec!["a.csv", "b.csv"]);
    }

    #[test]
    fn test_expand_home() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/data"), home.join("data"));
        }
        assert_eq!(expand_home("/tmp/x"), PathBuf::from("/tmp/x"));
    }
}

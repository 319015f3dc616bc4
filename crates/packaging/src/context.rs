use polio_models::PolioError;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

pub const DOCKERIGNORE: &str = ".dockerignore";

#[derive(Debug, Clone, PartialEq, Eq)]
struct IgnoreRule {
    pattern: String,
    negate: bool,
}

/// `.dockerignore` rules: exact paths, directory prefixes, `*`/`?` wildcards
/// within a path component, `**` for any number of directories, and `!` to
/// re-include. Later rules win.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnoreRules {
    rules: Vec<IgnoreRule>,
}

impl IgnoreRules {
    pub fn parse(text: &str) -> Self {
        let rules = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| {
                let (negate, pattern) = match line.strip_prefix('!') {
                    Some(rest) => (true, rest.trim()),
                    None => (false, line),
                };
                let pattern = pattern.trim_start_matches("./").trim_matches('/');
                (!pattern.is_empty()).then(|| IgnoreRule { pattern: pattern.to_string(), negate })
            })
            .collect();
        Self { rules }
    }

    pub fn is_ignored(&self, rel_path: &str) -> bool {
        let mut ignored = false;
        for rule in &self.rules {
            if rule_matches(&rule.pattern, rel_path) {
                ignored = !rule.negate;
            }
        }
        ignored
    }
}

fn rule_matches(pattern: &str, rel_path: &str) -> bool {
    let components: Vec<&str> = rel_path.split('/').collect();
    let pattern_parts: Vec<&str> = pattern.split('/').collect();
    components_match(&pattern_parts, &components)
}

/// True when the pattern matches the path or one of its parent directories.
/// `**` stands for zero or more whole components.
fn components_match(pattern: &[&str], components: &[&str]) -> bool {
    match pattern.split_first() {
        None => true,
        Some((&"**", rest)) => (0..=components.len()).any(|skip| components_match(rest, &components[skip..])),
        Some((part, rest)) => match components.split_first() {
            Some((component, tail)) => {
                wildcard(part.as_bytes(), component.as_bytes()) && components_match(rest, tail)
            }
            None => false,
        },
    }
}

fn wildcard(pattern: &[u8], text: &[u8]) -> bool {
    match (pattern.first(), text.first()) {
        (None, None) => true,
        (Some(b'*'), _) => wildcard(&pattern[1..], text) || (!text.is_empty() && wildcard(pattern, &text[1..])),
        (Some(b'?'), Some(_)) => wildcard(&pattern[1..], &text[1..]),
        (Some(p), Some(t)) if p == t => wildcard(&pattern[1..], &text[1..]),
        _ => false,
    }
}

/// The files a build would send to the daemon, in a stable order.
#[derive(Debug, Clone)]
pub struct BuildContext {
    root: PathBuf,
    files: Vec<String>,
    fingerprint: String,
}

impl BuildContext {
    pub fn scan(root: impl AsRef<Path>) -> Result<Self, PolioError> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(PolioError::InvalidContext {
                reason: format!("{} is not a directory", root.display()),
            });
        }

        let rules = match fs::read_to_string(root.join(DOCKERIGNORE)) {
            Ok(text) => IgnoreRules::parse(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => IgnoreRules::default(),
            Err(e) => return Err(PolioError::InvalidContext { reason: e.to_string() }),
        };

        let mut files = Vec::new();
        for entry in WalkDir::new(root).follow_links(false) {
            let entry = entry.map_err(|e| PolioError::InvalidContext { reason: e.to_string() })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(root)
                .map_err(|e| PolioError::InternalError { reason: e.to_string() })?;
            let rel = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if !rules.is_ignored(&rel) {
                files.push(rel);
            }
        }
        files.sort();

        let fingerprint = fingerprint(root, &files)?;
        debug!(root = %root.display(), files = files.len(), fingerprint = %fingerprint, "Scanned build context");

        Ok(Self {
            root: root.to_path_buf(),
            files,
            fingerprint,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn files(&self) -> &[String] {
        &self.files
    }

    pub fn contains(&self, rel_path: &str) -> bool {
        self.files.binary_search_by(|f| f.as_str().cmp(rel_path)).is_ok()
    }

    /// Hex SHA-256 over every path and its contents. Equal fingerprints mean
    /// the copy step, and everything after it, can come from the layer cache.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

fn fingerprint(root: &Path, files: &[String]) -> Result<String, PolioError> {
    let mut hasher = Sha256::new();
    for rel in files {
        let contents = fs::read(root.join(rel)).map_err(|e| PolioError::InvalidContext {
            reason: format!("{rel}: {e}"),
        })?;
        hasher.update((rel.len() as u64).to_le_bytes());
        hasher.update(rel.as_bytes());
        hasher.update((contents.len() as u64).to_le_bytes());
        hasher.update(&contents);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

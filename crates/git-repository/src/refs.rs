//! Minimal on-disk reference resolution: loose refs, `packed-refs`, and the
//! symbolic chain starting at `HEAD`.
//!
//! This does not implement ref *writes*, reflogs, or transactions — those
//! belong to a staging/porcelain layer this crate stays below. It exists so
//! [`crate::Repository`] has something concrete to hand `git-revwalk` and
//! `git-diff` as a [`RefResolver`].

use std::fs;
use std::path::{Path, PathBuf};

use git_hash::{HashAlgorithm, ObjectId};
use git_revwalk::RefResolver;

use crate::RepoError;

const MAX_SYMBOLIC_HOPS: usize = 5;

/// What a single ref file or `packed-refs` line points at.
#[derive(Debug, Clone)]
enum RefTarget {
    Direct(ObjectId),
    Symbolic(String),
}

/// Reads refs directly out of a repository's common directory.
pub struct RefReader {
    common_dir: PathBuf,
    hash_algo: HashAlgorithm,
}

impl RefReader {
    pub fn new(common_dir: impl Into<PathBuf>, hash_algo: HashAlgorithm) -> Self {
        Self {
            common_dir: common_dir.into(),
            hash_algo,
        }
    }

    /// Read a single ref (loose file, falling back to `packed-refs`) without
    /// following symbolic targets.
    fn read_one(&self, name: &str) -> Result<Option<RefTarget>, RepoError> {
        let loose_path = self.loose_path(name);
        if let Ok(content) = fs::read_to_string(&loose_path) {
            return Ok(Some(self.parse_ref_content(name, &content)?));
        }

        for (packed_name, oid) in self.packed_refs()? {
            if packed_name == name {
                return Ok(Some(RefTarget::Direct(oid)));
            }
        }

        Ok(None)
    }

    fn parse_ref_content(&self, name: &str, content: &str) -> Result<RefTarget, RepoError> {
        let content = content.trim();
        if let Some(target) = content.strip_prefix("ref: ") {
            return Ok(RefTarget::Symbolic(target.trim().to_string()));
        }
        let oid = ObjectId::from_hex(content).map_err(|_| RepoError::InvalidRef {
            name: name.to_string(),
            reason: format!("not a valid object id or symbolic ref: {content}"),
        })?;
        if oid.algorithm() != self.hash_algo {
            return Err(RepoError::InvalidRef {
                name: name.to_string(),
                reason: format!("oid uses {:?}, repository uses {:?}", oid.algorithm(), self.hash_algo),
            });
        }
        Ok(RefTarget::Direct(oid))
    }

    fn loose_path(&self, name: &str) -> PathBuf {
        self.common_dir.join(name)
    }

    fn packed_refs(&self) -> Result<Vec<(String, ObjectId)>, RepoError> {
        let path = self.common_dir.join("packed-refs");
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(_) => return Ok(Vec::new()),
        };

        let mut refs = Vec::new();
        for line in content.lines() {
            // `^` lines annotate the previous entry with the tag's peeled
            // commit; we only track direct oid -> name mappings.
            if line.starts_with('#') || line.starts_with('^') || line.is_empty() {
                continue;
            }
            let mut parts = line.splitn(2, ' ');
            let (oid_str, name) = match (parts.next(), parts.next()) {
                (Some(o), Some(n)) => (o, n),
                _ => continue,
            };
            if let Ok(oid) = ObjectId::from_hex(oid_str) {
                refs.push((name.to_string(), oid));
            }
        }
        Ok(refs)
    }

    /// Resolve a ref name to the object it ultimately points at, following
    /// symbolic refs up to [`MAX_SYMBOLIC_HOPS`] times.
    pub fn resolve_to_oid(&self, name: &str) -> Result<Option<ObjectId>, RepoError> {
        let mut current = name.to_string();
        for _ in 0..MAX_SYMBOLIC_HOPS {
            match self.read_one(&current)? {
                Some(RefTarget::Direct(oid)) => return Ok(Some(oid)),
                Some(RefTarget::Symbolic(target)) => current = target,
                None => return Ok(None),
            }
        }
        Err(RepoError::InvalidRef {
            name: name.to_string(),
            reason: "symbolic ref chain too deep".to_string(),
        })
    }

    /// The name `HEAD` points at if it's symbolic, `None` if HEAD is detached
    /// or doesn't exist yet.
    pub fn head_target(&self) -> Result<Option<String>, RepoError> {
        match self.read_one("HEAD")? {
            Some(RefTarget::Symbolic(target)) => Ok(Some(target)),
            _ => Ok(None),
        }
    }

    /// `true` if HEAD is symbolic but its target doesn't resolve to anything
    /// yet (a freshly initialized branch with no commits).
    pub fn is_unborn(&self) -> Result<bool, RepoError> {
        match self.read_one("HEAD")? {
            Some(RefTarget::Symbolic(target)) => Ok(self.resolve_to_oid(&target)?.is_none()),
            Some(RefTarget::Direct(_)) => Ok(false),
            None => Ok(true),
        }
    }

    /// Every ref under one of the standard namespaces (`refs/heads`,
    /// `refs/tags`, `refs/remotes`), deduplicated against `packed-refs` and
    /// filtered by a glob where `*` matches any suffix.
    fn list_matching(&self, pattern: &str) -> Vec<(String, ObjectId)> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();

        for (name, oid) in self.packed_refs().unwrap_or_default() {
            if glob_match(pattern, &name) && seen.insert(name.clone()) {
                out.push((name, oid));
            }
        }

        for base in ["refs/heads", "refs/tags", "refs/remotes"] {
            let dir = self.common_dir.join(base);
            walk_loose_refs(&dir, base, &mut |name| {
                if glob_match(pattern, name) && seen.insert(name.to_string()) {
                    if let Ok(Some(RefTarget::Direct(oid))) = self.read_one(name) {
                        out.push((name.to_string(), oid));
                    } else if let Ok(Some(oid)) = self.resolve_to_oid(name) {
                        out.push((name.to_string(), oid));
                    }
                }
            });
        }

        out
    }
}

fn walk_loose_refs(dir: &Path, prefix: &str, visit: &mut impl FnMut(&str)) {
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return,
    };
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        let file_name = entry.file_name();
        let name = format!("{prefix}/{}", file_name.to_string_lossy());
        if path.is_dir() {
            walk_loose_refs(&path, &name, visit);
        } else {
            visit(&name);
        }
    }
}

/// A pattern's trailing `*` matches any suffix; without one, it's an exact
/// match. Good enough for `refs/heads/*`-style globs without pulling in a
/// full glob crate for a single wildcard position.
fn glob_match(pattern: &str, candidate: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => candidate.starts_with(prefix),
        None => pattern == candidate,
    }
}

impl RefResolver for RefReader {
    fn resolve(&self, name: &str) -> Option<ObjectId> {
        self.resolve_to_oid(name).ok().flatten()
    }

    fn iter_matching(&self, pattern: &str) -> Vec<ObjectId> {
        self.list_matching(pattern)
            .into_iter()
            .map(|(_, oid)| oid)
            .collect()
    }
}

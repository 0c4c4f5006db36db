//! Pathspec filtering over a computed diff result.
//!
//! The upstream diffcore pipeline this is modeled on also runs break,
//! rename, and pickaxe passes; those require content similarity scoring
//! and an index/workdir view this core does not have, so only the
//! pathspec-restriction step survives here (see invariant 10: diffing
//! under a pathspec must equal filtering the unrestricted diff by it).

use bstr::BString;

use crate::DiffResult;

/// Filter diff results by pathspec.
pub fn filter_pathspec(result: &mut DiffResult, pathspecs: &[BString]) {
    if pathspecs.is_empty() {
        return;
    }
    result.files.retain(|f| {
        let path = f.path();
        pathspecs
            .iter()
            .any(|spec| path.starts_with(spec.as_slice()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FileDiff, FileStatus};
    use git_object::FileMode;

    fn file(path: &str) -> FileDiff {
        FileDiff {
            status: FileStatus::Modified,
            old_path: Some(BString::from(path)),
            new_path: Some(BString::from(path)),
            old_mode: Some(FileMode::Regular),
            new_mode: Some(FileMode::Regular),
            old_oid: None,
            new_oid: None,
            hunks: Vec::new(),
            is_binary: false,
            similarity: None,
        }
    }

    #[test]
    fn empty_pathspec_keeps_everything() {
        let mut result = DiffResult {
            files: vec![file("a.txt"), file("b/c.txt")],
        };
        filter_pathspec(&mut result, &[]);
        assert_eq!(result.files.len(), 2);
    }

    #[test]
    fn pathspec_restricts_to_prefix() {
        let mut result = DiffResult {
            files: vec![file("a.txt"), file("b/c.txt")],
        };
        filter_pathspec(&mut result, &[BString::from("b/")]);
        assert_eq!(result.files.len(), 1);
        assert_eq!(result.files[0].path(), &BString::from("b/c.txt"));
    }
}

//! Repository discovery, initialization, and the thin composition root that
//! ties the object database, reference resolution, and the window-manager
//! handle together for the rest of this implementation.

mod discover;
mod env;
mod error;
mod init;
mod refs;
mod worktree;

pub use error::RepoError;
pub use refs::RefReader;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use git_diff::{DiffOptions, DiffResult};
use git_hash::{HashAlgorithm, ObjectId};
use git_odb::ObjectDatabase;
use git_pack::window::WindowManager;
use git_revwalk::RevWalk;

/// Type of repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryKind {
    /// Normal repo with a working tree.
    Normal,
    /// Bare repo (no working tree).
    Bare,
    /// Linked worktree sharing objects/refs with a main repo.
    LinkedWorktree,
}

/// Result of repository discovery before full opening.
#[derive(Debug)]
pub struct DiscoveredRepo {
    pub git_dir: PathBuf,
    pub work_tree: Option<PathBuf>,
    pub common_dir: PathBuf,
    pub kind: RepositoryKind,
}

/// Options for repository initialization.
pub struct InitOptions {
    pub bare: bool,
    pub default_branch: Option<String>,
    pub template_dir: Option<PathBuf>,
    pub hash_algorithm: HashAlgorithm,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            bare: false,
            default_branch: None,
            template_dir: None,
            hash_algorithm: HashAlgorithm::Sha1,
        }
    }
}

/// The composition root for a single git repository: a hash algorithm
/// choice, an [`ObjectDatabase`], and a [`RefReader`] to turn ref names into
/// object ids. Config files, the staging area, working-tree checkout, and
/// hooks live above this and are out of scope here.
pub struct Repository {
    /// Path to the .git directory.
    git_dir: PathBuf,
    /// Path to the working tree (None for bare repos).
    work_tree: Option<PathBuf>,
    /// Path to the common dir (for worktrees; same as git_dir for normal repos).
    common_dir: PathBuf,
    /// Object database.
    odb: ObjectDatabase,
    /// Reference reader (HEAD, loose refs, packed-refs).
    refs: RefReader,
    /// Hash algorithm.
    hash_algo: HashAlgorithm,
    /// Repository kind.
    kind: RepositoryKind,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("git_dir", &self.git_dir)
            .field("work_tree", &self.work_tree)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl Repository {
    /// Open an existing repository at the given path.
    ///
    /// `path` should point to either the `.git` directory or the working tree root.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RepoError> {
        let path = path.as_ref();
        let discovered = if path.join("HEAD").is_file() && path.join("objects").is_dir() {
            // Path is a git dir (bare repo or .git directory)
            discover::open_git_dir(path)?
        } else if path.join(".git").exists() {
            // Path is a working tree root
            discover::open_git_dir_from_work_tree(path)?
        } else {
            return Err(RepoError::NotFound(path.to_path_buf()));
        };
        Self::from_discovered(discovered)
    }

    /// Discover a repository starting from the given directory, walking up.
    pub fn discover(start: impl AsRef<Path>) -> Result<Self, RepoError> {
        let discovered = discover::discover_git_dir(start.as_ref())?;
        Self::from_discovered(discovered)
    }

    /// Initialize a new repository at the given path.
    pub fn init(path: impl AsRef<Path>) -> Result<Self, RepoError> {
        let opts = InitOptions::default();
        let discovered = init::init_repository(path.as_ref(), &opts)?;
        Self::from_discovered(discovered)
    }

    /// Initialize a new bare repository at the given path.
    pub fn init_bare(path: impl AsRef<Path>) -> Result<Self, RepoError> {
        let opts = InitOptions {
            bare: true,
            ..Default::default()
        };
        let discovered = init::init_repository(path.as_ref(), &opts)?;
        Self::from_discovered(discovered)
    }

    /// Initialize a new repository with custom options.
    pub fn init_opts(path: impl AsRef<Path>, opts: &InitOptions) -> Result<Self, RepoError> {
        let discovered = init::init_repository(path.as_ref(), opts)?;
        Self::from_discovered(discovered)
    }

    /// Build a Repository from a DiscoveredRepo.
    fn from_discovered(discovered: DiscoveredRepo) -> Result<Self, RepoError> {
        let env_overrides = env::EnvOverrides::from_env();
        Self::from_discovered_with_env(discovered, &env_overrides)
    }

    /// Build a Repository from a DiscoveredRepo with explicit environment overrides.
    fn from_discovered_with_env(
        discovered: DiscoveredRepo,
        env_overrides: &env::EnvOverrides,
    ) -> Result<Self, RepoError> {
        let DiscoveredRepo {
            git_dir,
            work_tree,
            common_dir,
            kind,
        } = discovered;

        // Apply env overrides for work tree
        let work_tree = if let Some(ref wt) = env_overrides.work_tree {
            Some(wt.clone())
        } else {
            work_tree
        };

        // Apply env override for common dir
        let common_dir = if let Some(ref cd) = env_overrides.common_dir {
            cd.clone()
        } else {
            common_dir
        };

        // Determine objects directory
        let objects_dir = if let Some(ref od) = env_overrides.object_directory {
            od.clone()
        } else {
            common_dir.join("objects")
        };

        // Hash algorithm comes from `extensions.objectformat` in the repo
        // config. Parsing the full INI format is out of scope here, so we
        // scan for just that one key the same way `init_repository` writes
        // `core.repositoryformatversion` — a single targeted line read.
        let hash_algo = read_object_format(&git_dir).unwrap_or(HashAlgorithm::Sha1);

        let odb = ObjectDatabase::open_with_algo(&objects_dir, hash_algo)?;
        let refs = RefReader::new(&common_dir, hash_algo);

        Ok(Repository {
            git_dir,
            work_tree,
            common_dir,
            odb,
            refs,
            hash_algo,
            kind,
        })
    }

    // --- Path accessors ---

    /// Path to the .git directory.
    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    /// Path to the working tree (None for bare repos).
    pub fn work_tree(&self) -> Option<&Path> {
        self.work_tree.as_deref()
    }

    /// Path to the common directory (shared in worktrees).
    pub fn common_dir(&self) -> &Path {
        &self.common_dir
    }

    /// Repository kind.
    pub fn kind(&self) -> RepositoryKind {
        self.kind
    }

    /// Is this a bare repository?
    pub fn is_bare(&self) -> bool {
        self.kind == RepositoryKind::Bare
    }

    // --- Subsystem accessors ---

    /// Access the object database.
    pub fn odb(&self) -> &ObjectDatabase {
        &self.odb
    }

    /// Access reference resolution (HEAD, loose refs, packed-refs).
    pub fn refs(&self) -> &RefReader {
        &self.refs
    }

    /// The shared window-manager handle every pack this repository's object
    /// database has open maps through.
    pub fn window_manager(&self) -> &Arc<WindowManager> {
        self.odb.window_manager()
    }

    /// Hash algorithm in use.
    pub fn hash_algo(&self) -> HashAlgorithm {
        self.hash_algo
    }

    // --- Entry points onto the other core subsystems ---

    /// Start a revision walk over this repository's object database. Use
    /// [`Repository::refs`] as the resolver for `push_ref`/`push_glob` and
    /// their `hide_*` counterparts.
    pub fn revwalk(&self) -> RevWalk<'_> {
        RevWalk::new(&self.odb)
    }

    /// Diff two trees (either side `None` for an empty tree).
    pub fn diff_tree_to_tree(
        &self,
        old_tree: Option<&ObjectId>,
        new_tree: Option<&ObjectId>,
        options: &DiffOptions,
    ) -> Result<DiffResult, RepoError> {
        Ok(git_diff::tree::diff_trees(&self.odb, old_tree, new_tree, options)?)
    }

    // --- Convenience methods ---

    /// Resolve HEAD to an OID.
    pub fn head_oid(&self) -> Result<Option<ObjectId>, RepoError> {
        self.refs.resolve_to_oid("HEAD")
    }

    /// Get the current branch name (None if detached HEAD).
    pub fn current_branch(&self) -> Result<Option<String>, RepoError> {
        match self.refs.head_target()? {
            Some(target) => Ok(Some(
                target.strip_prefix("refs/heads/").unwrap_or(&target).to_string(),
            )),
            None => Ok(None),
        }
    }

    /// Check if this is on an unborn branch (no commits yet).
    pub fn is_unborn(&self) -> Result<bool, RepoError> {
        self.refs.is_unborn()
    }
}

/// Scan `git_dir/config` for `extensions.objectformat` without a full INI
/// parser. Not a general config reader — just enough to pick the hash
/// algorithm a repository was initialized with.
fn read_object_format(git_dir: &Path) -> Option<HashAlgorithm> {
    let content = std::fs::read_to_string(git_dir.join("config")).ok()?;
    let mut in_extensions = false;
    for line in content.lines() {
        let line = line.trim();
        if let Some(section) = line.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            in_extensions = section.eq_ignore_ascii_case("extensions");
            continue;
        }
        if !in_extensions {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            if key.trim().eq_ignore_ascii_case("objectformat") {
                return HashAlgorithm::from_name(value.trim());
            }
        }
    }
    None
}

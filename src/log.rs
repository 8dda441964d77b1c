//! Read-only access to the external commit log.
//!
//! Workers commit journal entries into a shared git repository; the
//! reconciler only ever reads from it. `list_since` is the watermark query:
//! given the last consumed commit id it returns the commits strictly after
//! it, oldest first, so the reconciler can scan for the earliest parseable
//! journal entry.

use anyhow::{Context, Result};
use git2::{ErrorCode, Oid, Repository, Sort};
use std::path::Path;

/// One position in the commit log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogPosition {
    /// Hex commit id
    pub commit_id: String,
    /// First line of the commit message, for logging only
    pub summary: String,
}

pub struct CommitLog {
    repo: Repository,
}

impl CommitLog {
    pub fn open(repo_dir: &Path) -> Result<Self> {
        let repo = Repository::open(repo_dir).context("Failed to open commit log repository")?;
        Ok(Self { repo })
    }

    /// List commits strictly after the watermark, oldest first.
    ///
    /// A `None` watermark means nothing has been consumed yet and the whole
    /// history qualifies. An unborn branch (repository with no commits)
    /// yields an empty list, not an error.
    pub fn list_since(&self, watermark: Option<&str>) -> Result<Vec<LogPosition>> {
        if self.head_commit().is_none() {
            return Ok(Vec::new());
        }

        let mut revwalk = self.repo.revwalk()?;
        revwalk.set_sorting(Sort::TOPOLOGICAL | Sort::REVERSE)?;
        revwalk.push_head()?;

        if let Some(mark) = watermark {
            let oid = Oid::from_str(mark)
                .with_context(|| format!("Invalid watermark commit id: {}", mark))?;
            revwalk
                .hide(oid)
                .with_context(|| format!("Watermark commit {} not found in log", mark))?;
        }

        let mut positions = Vec::new();
        for oid in revwalk {
            let oid = oid?;
            let commit = self.repo.find_commit(oid)?;
            positions.push(LogPosition {
                commit_id: oid.to_string(),
                summary: commit.summary().unwrap_or_default().to_string(),
            });
        }

        Ok(positions)
    }

    /// Read the file at `path` from the tree of the given commit.
    ///
    /// Returns `None` if the path does not exist at that commit.
    pub fn read_blob(&self, commit_id: &str, path: &Path) -> Result<Option<Vec<u8>>> {
        let oid = Oid::from_str(commit_id)
            .with_context(|| format!("Invalid commit id: {}", commit_id))?;
        let commit = self
            .repo
            .find_commit(oid)
            .with_context(|| format!("Commit {} not found in log", commit_id))?;
        let tree = commit.tree()?;

        let entry = match tree.get_path(path) {
            Ok(entry) => entry,
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let object = entry.to_object(&self.repo)?;
        let blob = object
            .as_blob()
            .with_context(|| format!("{} at {} is not a blob", path.display(), commit_id))?;

        Ok(Some(blob.content().to_vec()))
    }

    fn head_commit(&self) -> Option<git2::Commit<'_>> {
        self.repo
            .head()
            .ok()
            .and_then(|head| head.peel_to_commit().ok())
    }
}

//! Local checkout of the stack's source repository.

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::runner::{CommandRunner, CommandSpec};

/// Derives the directory `git clone` creates for `remote`.
///
/// `git@github.com:okteto/stacks-getting-started.git` and
/// `https://github.com/okteto/stacks-getting-started` both yield
/// `stacks-getting-started`.
pub fn checkout_dir_name(remote: &str) -> Option<String> {
    let trimmed = remote.trim().trim_end_matches('/');
    let base = trimmed.rsplit(['/', ':']).next()?;
    let base = base.strip_suffix(".git").unwrap_or(base);
    if base.is_empty() {
        None
    } else {
        Some(base.to_string())
    }
}

/// A repository checkout that is removed when the scenario ends.
///
/// The guard is created before `git clone` runs, so a clone that fails or
/// is killed part way still has its directory removed. A directory that
/// already existed beforehand is never touched.
///
/// Call [`RepoCheckout::remove`] to observe cleanup failures. If the guard
/// is dropped without an explicit removal, it removes the directory itself
/// and only logs failures.
pub struct RepoCheckout {
    /// Remote the checkout is cloned from.
    remote: String,
    /// Local path to the checkout.
    path: PathBuf,
    /// Whether there is nothing left for this guard to remove.
    removed: bool,
}

impl RepoCheckout {
    /// Claims the directory `git clone <remote>` will create inside `parent`.
    pub fn prepare(remote: &str, parent: &Path) -> Result<Self> {
        let dir_name = checkout_dir_name(remote).ok_or_else(|| Error::CloneFailed {
            remote: remote.to_string(),
            output: String::new(),
            cause: "cannot derive a directory name from the remote".to_string(),
        })?;

        let path = parent.join(dir_name);
        let preexisting = path.exists();
        if preexisting {
            tracing::warn!(path = ?path, "checkout directory already exists, leaving it in place");
        }

        Ok(Self {
            remote: remote.to_string(),
            path,
            removed: preexisting,
        })
    }

    /// Runs `git clone <remote>` inside the parent directory.
    pub async fn fetch(
        &mut self,
        runner: &dyn CommandRunner,
        git: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        tracing::info!(remote = %self.remote, parent = ?parent, "cloning git repo");

        let spec = CommandSpec::new(git)
            .args(["clone", self.remote.as_str()])
            .current_dir(parent);

        runner.run(&spec, cancel).await.map_err(|e| {
            e.wrap_command(|output, cause| Error::CloneFailed {
                remote: self.remote.clone(),
                output,
                cause,
            })
        })?;

        self.removed = false;
        tracing::info!(remote = %self.remote, path = ?self.path, "clone git repo success");
        Ok(())
    }

    /// Returns the local path to the checkout.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Recursively deletes the checkout. Idempotent.
    pub fn remove(&mut self) -> Result<()> {
        if self.removed {
            return Ok(());
        }

        tracing::info!(path = ?self.path, "delete git repo");

        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(Error::CleanupFailed {
                    path: self.path.clone(),
                    source,
                })
            }
        }

        self.removed = true;
        tracing::info!(path = ?self.path, "deleted git repo");
        Ok(())
    }
}

impl Drop for RepoCheckout {
    fn drop(&mut self) {
        if !self.removed {
            if let Err(e) = self.remove() {
                tracing::error!(error = %e, path = ?self.path, "failed to remove checkout on drop");
            }
        }
    }
}

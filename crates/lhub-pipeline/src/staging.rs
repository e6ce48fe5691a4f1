//! Per-job staging directories with a cleanup manifest.
//!
//! Every path handed out by a [`JobWorkspace`] is recorded in its manifest
//! before anything is written to it, so cleanup covers artifacts from stages
//! that failed half-way.

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};

use lhub_models::{ArtifactRole, JobId, StagedArtifact, ValidationError};

use crate::error::{PipelineError, PipelineResult};

const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Root of all job staging directories.
#[derive(Debug, Clone)]
pub struct StagingStore {
    root: PathBuf,
}

impl StagingStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Allocate a fresh directory for `job_id`.
    pub async fn workspace(&self, job_id: &JobId) -> PipelineResult<JobWorkspace> {
        let safe_id: String = job_id
            .as_str()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
            .collect();
        let dir = self
            .root
            .join(format!("{}-{}", Utc::now().timestamp_millis(), safe_id));

        fs::create_dir_all(&self.root).await?;
        fs::create_dir(&dir).await.map_err(|e| {
            PipelineError::staging(format!("create {}: {}", dir.display(), e))
        })?;

        debug!(job_id = %job_id, dir = %dir.display(), "Staging directory created");
        Ok(JobWorkspace {
            job_id: job_id.clone(),
            dir,
            manifest: Vec::new(),
            cleaned: false,
        })
    }

    /// Remove job directories older than `max_age`, left behind by a crash.
    pub async fn sweep_stale(&self, max_age: Duration) -> PipelineResult<usize> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let meta = entry.metadata().await?;
            if !meta.is_dir() {
                continue;
            }
            let stale = meta
                .modified()
                .ok()
                .and_then(|m| m.elapsed().ok())
                .map(|age| age > max_age)
                .unwrap_or(false);
            if stale {
                match fs::remove_dir_all(entry.path()).await {
                    Ok(()) => removed += 1,
                    Err(e) => warn!("Failed to sweep {}: {}", entry.path().display(), e),
                }
            }
        }

        if removed > 0 {
            info!(removed, root = %self.root.display(), "Swept stale staging directories");
        }
        Ok(removed)
    }
}

/// A path allocated for a stage that has not yet produced its output.
#[derive(Debug)]
pub struct PendingArtifact {
    role: ArtifactRole,
    path: PathBuf,
}

impl PendingArtifact {
    pub fn role(&self) -> ArtifactRole {
        self.role
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// One manifest line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub role: ArtifactRole,
    pub path: PathBuf,
    /// Whether the producing stage completed
    pub committed: bool,
}

/// Outcome of a cleanup pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed: Vec<PathBuf>,
    /// Never created, or already gone
    pub missing: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
    pub dir_removed: bool,
}

impl CleanupReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.dir_removed
    }
}

/// A job's staging directory and the manifest of everything placed in it.
///
/// Dropping a workspace that was never cleaned up removes its directory.
#[derive(Debug)]
pub struct JobWorkspace {
    job_id: JobId,
    dir: PathBuf,
    manifest: Vec<ManifestEntry>,
    cleaned: bool,
}

impl JobWorkspace {
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn manifest(&self) -> &[ManifestEntry] {
        &self.manifest
    }

    /// Stream the upload into `raw.<extension>`, enforcing `max_bytes`.
    ///
    /// An oversize or empty stream leaves no file behind and is reported as a
    /// [`ValidationError`].
    pub async fn stage<R>(
        &mut self,
        reader: &mut R,
        extension: &str,
        max_bytes: u64,
    ) -> PipelineResult<StagedArtifact>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let pending = self.derive(ArtifactRole::Raw, extension);
        let mut file = fs::File::create(&pending.path).await?;
        let mut buf = vec![0u8; COPY_BUFFER_SIZE];
        let mut total: u64 = 0;

        loop {
            let n = match reader.read(&mut buf).await {
                Ok(n) => n,
                Err(e) => {
                    drop(file);
                    remove_quietly(&pending.path).await;
                    return Err(PipelineError::staging(format!("read upload: {e}")));
                }
            };
            if n == 0 {
                break;
            }

            total += n as u64;
            if total > max_bytes {
                drop(file);
                remove_quietly(&pending.path).await;
                return Err(ValidationError::TooLarge {
                    size: total,
                    max: max_bytes,
                }
                .into());
            }
            file.write_all(&buf[..n]).await?;
        }

        file.flush().await?;
        drop(file);

        if total == 0 {
            remove_quietly(&pending.path).await;
            return Err(ValidationError::MissingFile.into());
        }

        self.commit(pending).await
    }

    /// Allocate a collision-free path for `role` and record it in the manifest.
    pub fn derive(&mut self, role: ArtifactRole, extension: &str) -> PendingArtifact {
        let stem = role.file_stem();
        let mut path = self.dir.join(format!("{}.{}", stem, extension));
        let mut n = 1;
        while self.manifest.iter().any(|e| e.path == path) {
            n += 1;
            path = self.dir.join(format!("{}-{}.{}", stem, n, extension));
        }

        self.manifest.push(ManifestEntry {
            role,
            path: path.clone(),
            committed: false,
        });
        PendingArtifact { role, path }
    }

    /// Mark a stage's output as complete.
    pub async fn commit(&mut self, pending: PendingArtifact) -> PipelineResult<StagedArtifact> {
        let meta = fs::metadata(&pending.path).await.map_err(|e| {
            PipelineError::staging(format!("{} missing after stage: {}", pending.role, e))
        })?;

        if let Some(entry) = self.manifest.iter_mut().find(|e| e.path == pending.path) {
            entry.committed = true;
        }

        Ok(StagedArtifact {
            role: pending.role,
            path: pending.path,
            size_bytes: meta.len(),
        })
    }

    /// Record sampled frames written directly into the job directory.
    ///
    /// Paths already allocated with [`derive`](Self::derive) are marked
    /// committed in place.
    pub async fn register_frames(&mut self, frames: &[PathBuf]) -> PipelineResult<Vec<StagedArtifact>> {
        let mut staged = Vec::with_capacity(frames.len());

        for (i, path) in frames.iter().enumerate() {
            if !path.starts_with(&self.dir) {
                return Err(PipelineError::staging(format!(
                    "frame outside staging directory: {}",
                    path.display()
                )));
            }
            let role = ArtifactRole::Frame(i as u32 + 1);
            match self.manifest.iter_mut().find(|e| &e.path == path) {
                Some(entry) => entry.committed = true,
                None => self.manifest.push(ManifestEntry {
                    role,
                    path: path.clone(),
                    committed: true,
                }),
            }
            let size_bytes = fs::metadata(path).await.map(|m| m.len()).unwrap_or(0);
            staged.push(StagedArtifact {
                role,
                path: path.clone(),
                size_bytes,
            });
        }

        Ok(staged)
    }

    /// Delete every manifest entry, then the directory itself.
    ///
    /// Missing files are expected; individual failures are logged and do not
    /// stop the pass. Safe to call more than once.
    pub async fn cleanup(&mut self) -> CleanupReport {
        let mut report = CleanupReport::default();

        for entry in &self.manifest {
            match fs::remove_file(&entry.path).await {
                Ok(()) => report.removed.push(entry.path.clone()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    report.missing.push(entry.path.clone())
                }
                Err(e) => {
                    warn!(
                        job_id = %self.job_id,
                        role = %entry.role,
                        "Failed to delete {}: {}",
                        entry.path.display(),
                        e
                    );
                    report.failed.push((entry.path.clone(), e.to_string()));
                }
            }
        }

        match fs::remove_dir_all(&self.dir).await {
            Ok(()) => report.dir_removed = true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => report.dir_removed = true,
            Err(e) => {
                warn!(job_id = %self.job_id, "Failed to remove {}: {}", self.dir.display(), e);
                report.failed.push((self.dir.clone(), e.to_string()));
            }
        }

        self.cleaned = true;
        debug!(
            job_id = %self.job_id,
            removed = report.removed.len(),
            missing = report.missing.len(),
            failed = report.failed.len(),
            "Staging cleanup finished"
        );
        report
    }
}

impl Drop for JobWorkspace {
    fn drop(&mut self) {
        if self.cleaned {
            return;
        }
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => warn!(job_id = %self.job_id, "Staging directory removed on drop"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(job_id = %self.job_id, "Failed to remove {} on drop: {}", self.dir.display(), e),
        }
    }
}

/// File extension for the raw upload, from its name or declared type.
pub fn raw_extension(filename: &str, mimetype: &str) -> String {
    let from_name = Path::new(filename)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .filter(|e| !e.is_empty() && e.len() <= 8 && e.chars().all(|c| c.is_ascii_alphanumeric()));
    if let Some(ext) = from_name {
        return ext;
    }

    let essence = mimetype.split(';').next().unwrap_or_default().trim();
    match essence {
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "video/quicktime" => "mov",
        "video/x-msvideo" => "avi",
        _ => "bin",
    }
    .to_string()
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}

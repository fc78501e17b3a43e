//! Portable job archives.
//!
//! [`Packer::pack`] writes a job's ticket and backing assets into a zip
//! archive and returns a packed job pointing at it. [`Packer::unpack`]
//! reverses that at a fresh scratch location, keeping the original id,
//! properties and lifecycle.

mod ticket;

pub use ticket::{ASSET_PREFIX, TICKET_ENTRY, Ticket};

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use uuid::Uuid;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::environment::{Environment, LogLevel};
use crate::error::{PackError, StageError};
use crate::job::{ArchiveFormat, Job, JobKind, JobProperty, Payload};
use crate::nest::NestRef;
use crate::tunnel::SyncStage;

const PACKED_MARKER: &str = "antpack";

#[derive(Debug, Clone)]
pub struct Packer {
    env: Environment,
    scratch: PathBuf,
    format: ArchiveFormat,
}

impl Packer {
    pub fn new(env: Environment) -> Self {
        let scratch = env.options().scratch_dir.clone();
        Self {
            env,
            scratch,
            format: ArchiveFormat::default(),
        }
    }

    /// Uses `dir` instead of the configured `scratch_dir`.
    pub fn with_scratch(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch = dir.into();
        self
    }

    pub fn scratch(&self) -> &Path {
        &self.scratch
    }

    /// File name of the archive produced for `job`.
    ///
    /// Path separators in the name become `_`; a name that is empty or only
    /// dots falls back to the job id.
    pub fn packed_name(&self, job: &Job) -> String {
        let stem: String = job
            .name()
            .chars()
            .map(|c| if matches!(c, '/' | '\\') || c.is_control() { '_' } else { c })
            .collect();
        let stem = match stem.as_str() {
            "" | "." | ".." => job.id().to_owned(),
            _ => stem,
        };
        format!("{stem}.{PACKED_MARKER}.{}", self.format.extension())
    }

    /// Serializes `job` into a new archive. The job itself is left as is.
    pub fn pack(&self, job: &Job) -> Result<Job, PackError> {
        let dir = self.fresh_dir()?;
        let archive = dir.join(self.packed_name(job));

        if let Err(err) = self.write_archive(job, &archive) {
            discard(&dir);
            return Err(err);
        }

        self.env.log(
            LogLevel::Info,
            format!("Packed \"{}\" into {}", job.name(), archive.display()),
            Some("packer"),
            &[job.id()],
        );
        Ok(Job::packed(archive, self.format))
    }

    fn write_archive(&self, job: &Job, archive: &Path) -> Result<(), PackError> {
        let assets = collect_assets(job)?;
        let ticket = Ticket::from_job(job);

        let mut zip = ZipWriter::new(File::create(archive)?);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        zip.start_file(TICKET_ENTRY, options)?;
        zip.write_all(&serde_json::to_vec_pretty(&ticket)?)?;

        for (entry, source) in &assets {
            zip.start_file(entry.as_str(), options)?;
            let mut file = File::open(source)?;
            io::copy(&mut file, &mut zip)?;
        }
        zip.finish()?;

        self.env.debug(
            format!("Wrote ticket and {} asset(s) for \"{}\"", assets.len(), job.name()),
            "packer",
        );
        Ok(())
    }

    /// Rebuilds the job archived in `packed`.
    ///
    /// Any job backed by an archive file is accepted, so a `.antpack.zip`
    /// picked up by a folder nest as a plain file unpacks as well.
    pub fn unpack(&self, packed: &Job) -> Result<Job, PackError> {
        let archive = packed
            .path()
            .filter(|p| p.is_file())
            .ok_or_else(|| PackError::NotPacked(packed.name().to_owned()))?;

        let dir = self.fresh_dir()?;
        match self.extract(packed, archive, &dir) {
            Ok(job) => {
                self.env.log(
                    LogLevel::Info,
                    format!("Unpacked \"{}\" from {}", job.name(), archive.display()),
                    Some("packer"),
                    &[job.id()],
                );
                Ok(job)
            }
            Err(err) => {
                discard(&dir);
                Err(err)
            }
        }
    }

    fn extract(&self, packed: &Job, archive: &Path, dir: &Path) -> Result<Job, PackError> {
        let mut zip = ZipArchive::new(File::open(archive)?)?;
        let ticket = read_ticket_entry(&mut zip)?;
        let kind = ticket.kind()?;

        // Only kinds with an asset put the name on disk.
        let (path, payload) = match kind {
            JobKind::Webhook => (None, Payload::Webhook),
            JobKind::File | JobKind::Packed => {
                let name = safe_component(&ticket.name)?;
                let target = dir.join(name);
                if !extract_single(&mut zip, &target)? {
                    return Err(PackError::MissingAsset(format!("{ASSET_PREFIX}{name}")));
                }
                let payload = match kind {
                    JobKind::Packed => Payload::Packed { format: self.format },
                    _ => Payload::File,
                };
                (Some(target), payload)
            }
            JobKind::Folder => {
                let root = dir.join(safe_component(&ticket.name)?);
                fs::create_dir_all(&root)?;
                extract_tree(&mut zip, &root)?;
                let restored = Job::folder(&root)?;
                (Some(root), restored.payload().clone())
            }
        };

        let properties = self.check_properties(ticket.properties);
        let mut job = Job::restore(
            ticket.id,
            packed.name().to_owned(),
            path,
            payload,
            ticket.life_cycle,
            properties,
        );
        job.rename(ticket.name);
        Ok(job)
    }

    /// Re-infers each property's type, warning where the archive disagrees.
    fn check_properties(&self, properties: Vec<JobProperty>) -> Vec<JobProperty> {
        properties
            .into_iter()
            .map(|recorded| {
                let fresh = JobProperty::new(recorded.key(), recorded.value().clone());
                if fresh.inferred_type() != recorded.inferred_type() {
                    self.env.warning(
                        format!(
                            "Property \"{}\" was archived as {} but holds {}",
                            recorded.key(),
                            recorded.inferred_type(),
                            fresh.inferred_type()
                        ),
                        "packer",
                    );
                }
                fresh
            })
            .collect()
    }

    fn fresh_dir(&self) -> Result<PathBuf, PackError> {
        let dir = self.scratch.join(Uuid::new_v4().to_string());
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

/// Reads only the ticket of the archive at `path`.
pub fn read_ticket(path: &Path) -> Result<Ticket, PackError> {
    let mut zip = ZipArchive::new(File::open(path)?)?;
    read_ticket_entry(&mut zip)
}

fn read_ticket_entry<R: Read + io::Seek>(zip: &mut ZipArchive<R>) -> Result<Ticket, PackError> {
    let mut entry = match zip.by_name(TICKET_ENTRY) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Err(PackError::MissingTicket),
        Err(err) => return Err(err.into()),
    };
    let mut text = String::new();
    entry
        .read_to_string(&mut text)
        .map_err(|e| PackError::InvalidTicket(e.to_string()))?;
    Ticket::parse(&text)
}

/// Archive entries for a job's backing storage, paired with their sources.
fn collect_assets(job: &Job) -> Result<Vec<(String, PathBuf)>, PackError> {
    let missing = || PackError::MissingAsset(job.name().to_owned());
    match job.payload() {
        Payload::Webhook => Ok(Vec::new()),
        Payload::File | Payload::Packed { .. } => {
            let path = job.path().ok_or_else(missing)?;
            if !path.is_file() {
                return Err(PackError::MissingAsset(path.display().to_string()));
            }
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(missing)?;
            Ok(vec![(format!("{ASSET_PREFIX}{file_name}"), path.to_path_buf())])
        }
        Payload::Folder { children } => {
            let root = job.path().filter(|p| p.is_dir()).ok_or_else(missing)?;
            children
                .iter()
                .map(|child| {
                    let source = root.join(child.relative_path());
                    if !source.is_file() {
                        return Err(PackError::MissingAsset(source.display().to_string()));
                    }
                    Ok((asset_entry(child.relative_path()), source))
                })
                .collect()
        }
    }
}

/// `assets/` plus the relative path with `/` separators on every platform.
fn asset_entry(relative: &Path) -> String {
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    format!("{ASSET_PREFIX}{}", parts.join("/"))
}

fn safe_component(name: &str) -> Result<&str, PackError> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(name),
        _ => Err(PackError::UnsafeEntry(name.to_owned())),
    }
}

/// The path below `assets/` of an asset entry, or `None` for other entries.
fn asset_path(entry: &str) -> Result<Option<PathBuf>, PackError> {
    let Some(relative) = entry.strip_prefix(ASSET_PREFIX) else {
        return Ok(None);
    };
    let path = Path::new(relative);
    let safe = !relative.is_empty()
        && path.components().all(|c| matches!(c, Component::Normal(_)));
    if !safe {
        return Err(PackError::UnsafeEntry(entry.to_owned()));
    }
    Ok(Some(path.to_path_buf()))
}

/// Extracts the first asset file to `target`. Returns false if there is none.
fn extract_single<R: Read + io::Seek>(zip: &mut ZipArchive<R>, target: &Path) -> Result<bool, PackError> {
    for index in 0..zip.len() {
        let mut entry = zip.by_index(index)?;
        if entry.is_dir() || asset_path(entry.name())?.is_none() {
            continue;
        }
        let mut out = File::create(target)?;
        io::copy(&mut entry, &mut out)?;
        return Ok(true);
    }
    Ok(false)
}

fn extract_tree<R: Read + io::Seek>(zip: &mut ZipArchive<R>, root: &Path) -> Result<(), PackError> {
    for index in 0..zip.len() {
        let mut entry = zip.by_index(index)?;
        let Some(relative) = asset_path(entry.name())? else {
            continue;
        };
        let target = root.join(relative);
        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;
        io::copy(&mut entry, &mut out)?;
    }
    Ok(())
}

fn discard(dir: &Path) {
    if let Err(err) = fs::remove_dir_all(dir) {
        tracing::warn!(dir = %dir.display(), error = %err, "failed to remove scratch directory");
    }
}

/// Sync stage that replaces the job with its packed form.
#[derive(Debug, Clone)]
pub struct PackStage {
    packer: Packer,
}

impl PackStage {
    pub fn new(packer: Packer) -> Self {
        Self { packer }
    }
}

#[async_trait]
impl SyncStage for PackStage {
    async fn run(&self, job: &mut Job, _nest: &NestRef) -> Result<(), StageError> {
        let packer = self.packer.clone();
        let snapshot = job.clone();
        let packed = tokio::task::spawn_blocking(move || packer.pack(&snapshot))
            .await
            .map_err(|e| StageError::new(e.to_string()))??;
        job.adopt(packed);
        Ok(())
    }
}

/// Sync stage that replaces a packed job with the job it carries.
#[derive(Debug, Clone)]
pub struct UnpackStage {
    packer: Packer,
}

impl UnpackStage {
    pub fn new(packer: Packer) -> Self {
        Self { packer }
    }
}

#[async_trait]
impl SyncStage for UnpackStage {
    async fn run(&self, job: &mut Job, _nest: &NestRef) -> Result<(), StageError> {
        let packer = self.packer.clone();
        let snapshot = job.clone();
        let unpacked = tokio::task::spawn_blocking(move || packer.unpack(&snapshot))
            .await
            .map_err(|e| StageError::new(e.to_string()))??;
        job.adopt(unpacked);
        Ok(())
    }
}

//! The unit of work flowing through tunnels.
//!
//! A [`Job`] is optionally backed by a file or folder, carries a typed
//! property bag, and keeps an append-only lifecycle of [`LifeEvent`]s.

mod life_event;
mod payload;
mod property;

pub use life_event::LifeEvent;
pub use payload::{ArchiveFormat, FileEntry, JobKind, Payload};
pub use property::{JobProperty, PropertyType};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::Value;
use uuid::Uuid;

use crate::environment::{Environment, LogLevel};
use crate::error::JobError;
use crate::nest::NestRef;
use crate::tunnel::{Tunnel, TunnelRef};

const NONE_STATE: &str = "none";

#[derive(Debug, Clone)]
pub struct Job {
    id: String,
    name: String,
    path: Option<PathBuf>,
    payload: Payload,
    life_cycle: Vec<LifeEvent>,
    properties: BTreeMap<String, JobProperty>,
    tunnel: Option<TunnelRef>,
    nest: Option<NestRef>,
    failure: Option<String>,
    /// Set by the first nest or tunnel that handles the job.
    env: Option<Environment>,
}

impl Job {
    /// Creates a job and records its "created" event.
    pub fn new(name: impl Into<String>, path: Option<PathBuf>, payload: Payload) -> Self {
        let name = name.into();
        let created = LifeEvent::new("created", NONE_STATE, name.clone());
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            path,
            payload,
            life_cycle: vec![created],
            properties: BTreeMap::new(),
            tunnel: None,
            nest: None,
            failure: None,
            env: None,
        }
    }

    /// A job backed by a single file, named after it.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = file_name(&path);
        Self::new(name, Some(path), Payload::File)
    }

    /// A job backed by a directory. Children are scanned now.
    pub fn folder(path: impl Into<PathBuf>) -> Result<Self, JobError> {
        let path = path.into();
        let children = payload::scan_children(&path)?;
        let name = file_name(&path);
        Ok(Self::new(name, Some(path), Payload::Folder { children }))
    }

    /// A synthetic job with no backing storage.
    pub fn webhook(name: impl Into<String>) -> Self {
        Self::new(name, None, Payload::Webhook)
    }

    /// A job backed by an archive produced by the packer.
    pub fn packed(path: impl Into<PathBuf>, format: ArchiveFormat) -> Self {
        let path = path.into();
        let name = file_name(&path);
        Self::new(name, Some(path), Payload::Packed { format })
    }

    /// Rebuilds a job from archived state. The lifecycle is taken as-is.
    pub(crate) fn restore(
        id: String,
        name: String,
        path: Option<PathBuf>,
        payload: Payload,
        life_cycle: Vec<LifeEvent>,
        properties: Vec<JobProperty>,
    ) -> Self {
        let properties = properties
            .into_iter()
            .map(|p| (p.key().to_owned(), p))
            .collect();
        Self {
            id,
            name,
            path,
            payload,
            life_cycle,
            properties,
            tunnel: None,
            nest: None,
            failure: None,
            env: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn kind(&self) -> JobKind {
        self.payload.kind()
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn life_cycle(&self) -> &[LifeEvent] {
        &self.life_cycle
    }

    pub fn properties(&self) -> impl Iterator<Item = &JobProperty> {
        self.properties.values()
    }

    pub fn tunnel(&self) -> Option<&TunnelRef> {
        self.tunnel.as_ref()
    }

    pub fn tunnel_name(&self) -> Option<&str> {
        self.tunnel.as_ref().map(TunnelRef::name)
    }

    pub fn nest(&self) -> Option<&NestRef> {
        self.nest.as_ref()
    }

    /// The reason this job was failed with, if it has been.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    pub fn rename(&mut self, new_name: impl Into<String>) {
        let new_name = new_name.into();
        let old = std::mem::replace(&mut self.name, new_name.clone());
        self.push_event("set name", old, new_name);
    }

    pub fn set_property_value(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        let to = property::render(&value);
        let from = match self.properties.get_mut(&key) {
            Some(prop) => {
                let from = property::render(prop.value());
                prop.set_value(value);
                from
            }
            None => {
                self.properties
                    .insert(key.clone(), JobProperty::new(key.clone(), value));
                NONE_STATE.to_owned()
            }
        };
        self.push_event(format!("set {key}"), from, to);
    }

    pub fn property_value(&self, key: &str) -> Option<&Value> {
        self.properties.get(key).map(JobProperty::value)
    }

    pub fn property_type(&self, key: &str) -> Option<PropertyType> {
        self.properties.get(key).map(JobProperty::inferred_type)
    }

    /// Fails the job through its tunnel's failure handler.
    ///
    /// Without a live tunnel the failure is logged and returned as
    /// [`JobError::NoTunnel`].
    pub fn fail(&mut self, reason: &str) -> Result<(), JobError> {
        self.mark_failed(reason);
        match self.tunnel.as_ref().and_then(TunnelRef::upgrade) {
            Some(tunnel) => {
                let nest = self.nest.clone().unwrap_or_else(NestRef::detached);
                tunnel.execute_fail(self.clone(), nest, reason);
                Ok(())
            }
            None => {
                let message = format!("Job \"{}\" failed without a tunnel: {reason}", self.name);
                match &self.env {
                    Some(env) => env.log(LogLevel::Error, message, Some("job"), &[&self.id]),
                    None => tracing::error!(job = %self.id, "{message}"),
                }
                Err(JobError::NoTunnel {
                    job: self.name.clone(),
                    reason: reason.to_owned(),
                })
            }
        }
    }

    /// Hands the job to another tunnel, which processes it as a fresh arrival.
    pub async fn transfer(mut self, target: &Tunnel) {
        let from = self.tunnel_name().unwrap_or(NONE_STATE).to_owned();
        self.push_event("transfer", from, target.name());
        self.tunnel = Some(target.downgrade());
        let nest = self.nest.clone().unwrap_or_else(NestRef::detached);
        target.arrive(self, nest).await;
    }

    /// Points the job at its new backing location after a sink moved it.
    pub fn relocate(&mut self, new_path: impl Into<PathBuf>) {
        let new_path = new_path.into();
        let from = self
            .path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| NONE_STATE.to_owned());
        let to = new_path.display().to_string();
        self.path = Some(new_path);
        self.push_event("move", from, to);
    }

    pub(crate) fn assign_tunnel(&mut self, tunnel: TunnelRef) {
        self.tunnel = Some(tunnel);
    }

    pub(crate) fn assign_nest(&mut self, nest: NestRef) {
        self.nest = Some(nest);
    }

    pub(crate) fn assign_env(&mut self, env: Environment) {
        self.env = Some(env);
    }

    pub(crate) fn clear_failure(&mut self) {
        self.failure = None;
    }

    pub(crate) fn mark_failed(&mut self, reason: &str) {
        self.failure = Some(reason.to_owned());
    }

    /// Becomes `other` in place while staying bound to the current tunnel,
    /// nest and environment.
    pub(crate) fn adopt(&mut self, other: Job) {
        let tunnel = self.tunnel.take();
        let nest = self.nest.take();
        let env = self.env.take();
        *self = other;
        self.tunnel = tunnel;
        self.nest = nest;
        self.env = env;
    }

    /// The job's name, which doubles as the file name of its backing asset.
    pub fn basename(&self) -> &str {
        &self.name
    }

    pub fn dirname(&self) -> Option<&Path> {
        self.path.as_deref().and_then(Path::parent)
    }

    pub fn extension(&self) -> Option<String> {
        match self.payload {
            Payload::Folder { .. } | Payload::Webhook => None,
            Payload::File | Payload::Packed { .. } => Path::new(&self.name)
                .extension()
                .map(|e| e.to_string_lossy().into_owned()),
        }
    }

    pub fn content_type(&self) -> Option<String> {
        match self.payload {
            Payload::File | Payload::Packed { .. } => Some(
                mime_guess::from_path(&self.name)
                    .first_or_octet_stream()
                    .to_string(),
            ),
            Payload::Folder { .. } => Some("inode/directory".to_owned()),
            Payload::Webhook => None,
        }
    }

    /// Children of a folder job; empty for every other kind.
    pub fn children(&self) -> &[FileEntry] {
        match &self.payload {
            Payload::Folder { children } => children,
            _ => &[],
        }
    }

    pub fn count(&self) -> usize {
        self.children().len()
    }

    fn push_event(&mut self, verb: impl Into<String>, from: impl Into<String>, to: impl Into<String>) {
        self.life_cycle.push(LifeEvent::new(verb, from, to));
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

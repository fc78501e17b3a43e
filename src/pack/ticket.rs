use serde::{Deserialize, Serialize};

use crate::error::PackError;
use crate::job::{Job, JobKind, JobProperty, LifeEvent};

/// Reserved archive path of the ticket.
pub const TICKET_ENTRY: &str = "ticket.json";
/// Every asset entry lives under this prefix.
pub const ASSET_PREFIX: &str = "assets/";

/// The serialized identity of a packed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: String,
    /// Kept as a string so unknown kinds surface as [`PackError::UnknownKind`]
    /// rather than a parse error.
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub properties: Vec<JobProperty>,
    #[serde(default)]
    pub life_cycle: Vec<LifeEvent>,
}

impl Ticket {
    pub fn from_job(job: &Job) -> Self {
        Self {
            id: job.id().to_owned(),
            kind: job.kind().as_str().to_owned(),
            name: job.name().to_owned(),
            properties: job.properties().cloned().collect(),
            life_cycle: job.life_cycle().to_vec(),
        }
    }

    pub fn parse(text: &str) -> Result<Self, PackError> {
        serde_json::from_str(text).map_err(|e| PackError::InvalidTicket(e.to_string()))
    }

    pub fn kind(&self) -> Result<JobKind, PackError> {
        JobKind::parse(&self.kind).ok_or_else(|| PackError::UnknownKind(self.kind.clone()))
    }
}

//! Identity of this process when it acts as a vantage point, and the task
//! exchange a coordinator uses to run one probe on it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cli::Cli;
use crate::error::AppError;
use crate::models::{CheckKind, NodeInfo, ProbeOutcome, VantagePoint};

/// Who this agent is, as reported by `/info` and stamped on task results
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentIdentity {
    pub name: String,
    /// Free-form location label
    pub location: Option<String>,
    pub vantage: VantagePoint,
}

impl AgentIdentity {
    pub fn new(
        agent_id: &str,
        node_domain: &str,
        name: &str,
        location: Option<String>,
        info: NodeInfo,
    ) -> Self {
        Self {
            name: name.to_string(),
            location,
            vantage: VantagePoint::new(agent_id, node_domain, info),
        }
    }

    /// `None` unless an agent id is configured
    pub fn from_cli(cli: &Cli) -> Option<Self> {
        let agent_id = cli.agent_id.as_deref().map(str::trim).filter(|id| !id.is_empty())?;
        Some(Self::new(
            agent_id,
            &cli.node_domain,
            &cli.agent_name,
            cli.agent_location.clone(),
            NodeInfo {
                country_code: cli.agent_country_code.clone(),
                country: cli.agent_country.clone(),
                city: cli.agent_city.clone(),
                ip: cli.agent_ip.clone(),
                asn: cli.agent_asn.clone(),
            },
        ))
    }

    pub fn agent_id(&self) -> &str {
        &self.vantage.id
    }

    pub fn node_id(&self) -> &str {
        self.vantage.key()
    }

    pub fn info(&self) -> AgentInfo {
        AgentInfo {
            agent_id: self.agent_id().to_string(),
            name: self.name.clone(),
            location: self.location.clone(),
            country_code: self.vantage.info.country_code.clone(),
            country: self.vantage.info.country.clone(),
            city: self.vantage.info.city.clone(),
            ip: self.vantage.info.ip.clone(),
            asn: self.vantage.info.asn.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentInfo {
    pub agent_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub country_code: String,
    pub country: String,
    pub city: String,
    pub ip: String,
    pub asn: String,
    pub version: String,
}

/// A single probe a coordinator asks this agent to run
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRequest {
    pub task_id: Option<String>,
    pub check_type: Option<String>,
    pub host: Option<String>,
}

/// A task with every field present and a known check type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidTask {
    pub task_id: String,
    pub kind: CheckKind,
    pub host: String,
}

fn required(field: &Option<String>) -> Option<String> {
    field
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

impl TaskRequest {
    pub fn validate(&self) -> Result<ValidTask, AppError> {
        let (Some(task_id), Some(check_type), Some(host)) = (
            required(&self.task_id),
            required(&self.check_type),
            required(&self.host),
        ) else {
            return Err(AppError::ValidationError(
                "Missing required fields: taskId, checkType, host".to_string(),
            ));
        };

        let kind = check_type.parse::<CheckKind>().map_err(|_| {
            AppError::ValidationError(format!("Unsupported check type: {}", check_type))
        })?;

        Ok(ValidTask {
            task_id,
            kind,
            host,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResponse {
    pub success: bool,
    pub task_id: String,
    pub check_type: CheckKind,
    pub host: String,
    pub agent_id: String,
    pub node_id: String,
    pub result: Vec<ProbeOutcome>,
    pub timestamp: DateTime<Utc>,
}

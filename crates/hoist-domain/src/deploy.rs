use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::ids::ExecutionId;

// ── Enums ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn parse(s: &str) -> Result<Self, DomainError> {
        match s {
            "development" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "production" => Ok(Environment::Production),
            other => Err(DomainError::InvalidEnvironment(other.to_string())),
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Staging => write!(f, "staging"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Which stage engine rolls the module across the fleet.
///
/// The `Display` strings are stable and exposed in telemetry and results;
/// do not change them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    BlueGreen,
    Rolling,
    Canary,
    Direct,
}

impl StrategyKind {
    pub fn parse(s: &str) -> Result<Self, DomainError> {
        match s {
            "blue-green" => Ok(StrategyKind::BlueGreen),
            "rolling" => Ok(StrategyKind::Rolling),
            "canary" => Ok(StrategyKind::Canary),
            "direct" => Ok(StrategyKind::Direct),
            other => Err(DomainError::InvalidStrategy(other.to_string())),
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrategyKind::BlueGreen => write!(f, "blue-green"),
            StrategyKind::Rolling => write!(f, "rolling"),
            StrategyKind::Canary => write!(f, "canary"),
            StrategyKind::Direct => write!(f, "direct"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    #[default]
    Idle,
    Deploying,
    Healthy,
    Unhealthy,
    Failed,
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeState::Idle => write!(f, "idle"),
            NodeState::Deploying => write!(f, "deploying"),
            NodeState::Healthy => write!(f, "healthy"),
            NodeState::Unhealthy => write!(f, "unhealthy"),
            NodeState::Failed => write!(f, "failed"),
        }
    }
}

// ── Module ────────────────────────────────────────────────────────────────────

/// Semantic version of a module artifact, `major.minor.patch`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ModuleVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ModuleVersion {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }

    /// Strict `major.minor.patch` parse; every component numeric, no
    /// pre-release or build suffixes.
    pub fn parse(s: &str) -> Result<Self, DomainError> {
        let mut parts = s.split('.');
        let (Some(major), Some(minor), Some(patch), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(DomainError::InvalidVersion(s.to_string()));
        };
        let parse = |p: &str| {
            p.parse::<u32>()
                .map_err(|_| DomainError::InvalidVersion(s.to_string()))
        };
        Ok(Self {
            major: parse(major)?,
            minor: parse(minor)?,
            patch: parse(patch)?,
        })
    }
}

impl std::fmt::Display for ModuleVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// A versioned, hot-swappable software module. Immutable after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    pub version: ModuleVersion,
    pub description: String,
    pub metadata: HashMap<String, String>,
}

impl Module {
    pub fn new(name: impl Into<String>, version: ModuleVersion) -> Result<Self, DomainError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::EmptyModuleName);
        }
        Ok(Self {
            name,
            version,
            description: String::new(),
            metadata: HashMap::new(),
        })
    }
}

// ── DeploymentRequest ─────────────────────────────────────────────────────────

/// A request to roll `module` across `target_environment` using `strategy`.
///
/// Owned by the orchestrator once submitted; terminal when a pipeline
/// execution result exists for `execution_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentRequest {
    pub execution_id: ExecutionId,
    pub module: Module,
    pub target_environment: Environment,
    pub strategy: StrategyKind,
    pub requester_email: String,
    pub require_approval: bool,
    pub created_at: DateTime<Utc>,
    pub metadata: HashMap<String, String>,
}

impl DeploymentRequest {
    pub fn new(
        module: Module,
        target_environment: Environment,
        strategy: StrategyKind,
        requester_email: impl Into<String>,
    ) -> Self {
        Self {
            execution_id: ExecutionId::new(),
            module,
            target_environment,
            strategy,
            requester_email: requester_email.into(),
            require_approval: false,
            created_at: Utc::now(),
            metadata: HashMap::new(),
        }
    }
}

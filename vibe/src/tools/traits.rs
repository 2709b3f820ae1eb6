//! Tool trait definition

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

use super::context::ToolContext;

/// Tool category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    Filesystem,
    Shell,
    Git,
    Web,
    Memory,
    Project,
    Analysis,
}

/// Estimated risk of running a tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(format!("Unknown risk level: {other}")),
        }
    }
}

/// A side-effecting capability exposed to the engine and the LLM
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (matches LLM tool_use name)
    fn name(&self) -> &'static str;

    /// Human-readable description
    fn description(&self) -> &'static str;

    /// Category for listing and policy
    fn category(&self) -> ToolCategory;

    /// Estimated risk of one invocation
    fn risk(&self) -> RiskLevel {
        RiskLevel::Low
    }

    /// Whether the approval policy must be consulted even below the
    /// auto-approve threshold
    fn requires_approval(&self) -> bool {
        self.risk() >= RiskLevel::High
    }

    /// JSON Schema for input parameters
    fn input_schema(&self) -> Value;

    /// Execute the tool
    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult;
}

/// Shared result type for every tool invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    pub files_mutated: Vec<PathBuf>,
}

impl ToolResult {
    /// Create a successful result
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
            exit_code: None,
            duration_ms: 0,
            files_mutated: Vec::new(),
        }
    }

    /// Create an error result
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(message.into()),
            exit_code: None,
            duration_ms: 0,
            files_mutated: Vec::new(),
        }
    }

    /// Attach mutated file paths
    pub fn with_files(mut self, files: Vec<PathBuf>) -> Self {
        self.files_mutated = files;
        self
    }

    /// Attach an exit code
    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_ordering() {
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::Medium < RiskLevel::High);
        assert!(RiskLevel::High < RiskLevel::Critical);
    }

    #[test]
    fn test_risk_roundtrip() {
        for risk in [RiskLevel::Low, RiskLevel::Medium, RiskLevel::High, RiskLevel::Critical] {
            assert_eq!(risk.to_string().parse::<RiskLevel>().unwrap(), risk);
        }
    }

    #[test]
    fn test_result_constructors() {
        let ok = ToolResult::success("done").with_files(vec![PathBuf::from("a.rs")]);
        assert!(ok.success);
        assert_eq!(ok.files_mutated.len(), 1);

        let err = ToolResult::error("nope").with_exit_code(1);
        assert!(!err.success);
        assert_eq!(err.exit_code, Some(1));
    }
}

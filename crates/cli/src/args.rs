use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use delve_core::{JobId, ResearchDepth, ResearchRequest};
use delve_observability::LogFormat;
use delve_polling::PollingConfig;
use serde_json::Value;

/// Run a deep research query and wait for the answer.
#[derive(Debug, Parser)]
#[command(name = "delve", version)]
pub struct Args {
    /// The research question.
    #[arg(required_unless_present = "resume")]
    pub query: Option<String>,

    /// quick, standard or deep.
    #[arg(long)]
    pub depth: Option<ResearchDepth>,

    /// Tool configuration as a JSON object, forwarded as-is. Repeatable.
    #[arg(long = "tool", value_name = "JSON", value_parser = parse_tool)]
    pub tools: Vec<Value>,

    /// Extra instructions for the research agent.
    #[arg(long)]
    pub instructions: Option<String>,

    /// Poll an existing job instead of submitting a new one.
    #[arg(long, value_name = "JOB_ID", conflicts_with = "query")]
    pub resume: Option<JobId>,

    #[arg(long, value_name = "MS")]
    pub initial_interval_ms: Option<u64>,

    #[arg(long, value_name = "MS")]
    pub max_interval_ms: Option<u64>,

    #[arg(long, value_name = "MS")]
    pub max_duration_ms: Option<u64>,

    /// Do not print progress lines.
    #[arg(long, short)]
    pub quiet: bool,

    #[arg(long, env = "DELVE_LOG_FORMAT", default_value = "json")]
    pub log_format: LogFormat,
}

impl Args {
    pub fn request(&self) -> ResearchRequest {
        let mut request = ResearchRequest::new(self.query.clone().unwrap_or_default());
        if let Some(depth) = self.depth {
            request = request.with_depth(depth);
        }
        for tool in &self.tools {
            request = request.with_tool(tool.clone());
        }
        if let Some(instructions) = &self.instructions {
            request = request.with_developer_instructions(instructions.clone());
        }
        request
    }

    /// Environment overrides first, then flags.
    pub fn polling_config(&self) -> anyhow::Result<PollingConfig> {
        let mut config = PollingConfig::from_env().context("invalid polling environment")?;
        if let Some(ms) = self.initial_interval_ms {
            config = config.with_initial_interval(Duration::from_millis(ms));
        }
        if let Some(ms) = self.max_interval_ms {
            config = config.with_max_interval(Duration::from_millis(ms));
        }
        if let Some(ms) = self.max_duration_ms {
            config = config.with_max_duration(Duration::from_millis(ms));
        }
        config.validate().context("invalid polling options")?;
        Ok(config)
    }
}

fn parse_tool(raw: &str) -> Result<Value, String> {
    let value: Value = serde_json::from_str(raw).map_err(|e| format!("invalid JSON: {e}"))?;
    if value.is_object() {
        Ok(value)
    } else {
        Err("tool must be a JSON object".to_string())
    }
}

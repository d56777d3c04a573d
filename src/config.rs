use crate::{
    approval::ApprovalPolicy,
    claim::OrchestratorConfig,
    confirmations::{
        ConfirmationPolicy,
        DEFAULT_CONFIRMATIONS,
        DEFAULT_READ_RETRIES,
    },
    detector::DetectorConfig,
    reveal::ClaimPolicy,
};
use alloy_primitives::{
    Address,
    U256,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    fs,
    path::PathBuf,
    time::Duration,
};

pub const DEFAULT_LOG_DIR: &str = "~/.scratch/logs";

/// Engine settings as stored in the JSON config file. Every field is optional
/// in the file and falls back to [`EngineConfig::default`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub signer_url: Option<String>,
    pub persistence_url: Option<String>,
    pub notifier_url: Option<String>,
    pub contract: Address,
    pub payment_token: Option<Address>,
    pub standard_claim_cost: U256,
    pub bonus_claim_cost: U256,
    pub approval: ApprovalPolicy,
    pub claim_policy: ClaimPolicy,
    pub confirmations: u64,
    pub read_retries: u32,
    pub retry_backoff_ms: u64,
    pub poll_interval_ms: u64,
    pub confirmation_timeout_secs: u64,
    pub fullscreen: bool,
    pub brush_radius: f32,
    pub log_dir: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let confirmations = ConfirmationPolicy::default();
        Self {
            signer_url: None,
            persistence_url: None,
            notifier_url: None,
            contract: Address::ZERO,
            payment_token: None,
            standard_claim_cost: U256::ZERO,
            bonus_claim_cost: U256::ZERO,
            approval: ApprovalPolicy::default(),
            claim_policy: ClaimPolicy::default(),
            confirmations: DEFAULT_CONFIRMATIONS,
            read_retries: DEFAULT_READ_RETRIES,
            retry_backoff_ms: millis(confirmations.retry_backoff),
            poll_interval_ms: millis(confirmations.poll_interval),
            confirmation_timeout_secs: confirmations.timeout.as_secs(),
            fullscreen: false,
            brush_radius: DetectorConfig::default().brush_radius,
            log_dir: DEFAULT_LOG_DIR.to_string(),
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

pub fn expand_path(path: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(path)
        .map_err(|err| eyre!("failed to expand path {path}: {err}"))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

impl EngineConfig {
    /// Reads the config file at `path`, or the defaults when no path is given.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let path = expand_path(path)?;
        let data = fs::read(&path)
            .wrap_err_with(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::from_json(&data)
            .wrap_err_with(|| format!("Failed to parse config file {}", path.display()))?;
        tracing::info!(path = %path.display(), "loaded engine config");
        Ok(config)
    }

    pub fn from_json(data: &[u8]) -> Result<Self> {
        let config: Self = serde_json::from_slice(data).wrap_err("invalid engine config JSON")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.confirmations == 0 {
            return Err(eyre!("confirmations must be at least 1"));
        }
        if self.read_retries == 0 {
            return Err(eyre!("read_retries must be at least 1"));
        }
        if !(self.brush_radius > 0.0) {
            return Err(eyre!("brush_radius must be positive"));
        }
        Ok(())
    }

    pub fn log_dir(&self) -> Result<PathBuf> {
        expand_path(&self.log_dir)
    }

    pub fn confirmation_policy(&self) -> ConfirmationPolicy {
        ConfirmationPolicy {
            confirmations: self.confirmations,
            read_retries: self.read_retries,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            timeout: Duration::from_secs(self.confirmation_timeout_secs),
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            contract: self.contract,
            confirmations: self.confirmation_policy(),
            approval: self.approval,
            payment_token: self.payment_token,
            standard_claim_cost: self.standard_claim_cost,
            bonus_claim_cost: self.bonus_claim_cost,
        }
    }

    pub fn detector_config(&self) -> DetectorConfig {
        let preset = if self.fullscreen {
            DetectorConfig::fullscreen()
        } else {
            DetectorConfig::inline()
        };
        DetectorConfig {
            brush_radius: self.brush_radius,
            ..preset
        }
    }
}

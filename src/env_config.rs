use std::time::Duration;

use certsync_destinations::{AwsParams, DEFAULT_INCAPSULA_API_URL};
use figment::{
    providers::{Env, Serialized},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Variables read without the `CERTSYNC_` prefix, for existing deployments.
const UNPREFIXED_VARS: &[&str] = &[
    "OPERATOR_NAME",
    "SECRETS_NAMESPACE",
    "AWS_REGION",
    "AWS_STS_ROLE_NAME",
    "AWS_STS_SESSION_NAME",
];

#[derive(thiserror::Error, Debug)]
pub enum ConfigurationError {
    #[error("invalid configuration: {0}")]
    Extract(#[from] Box<figment::Error>),

    #[error("OPERATOR_NAME not set")]
    MissingOperatorName,

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
}

#[derive(Serialize, Deserialize, Debug)]
pub struct EnvConfig {
    /// Prefix of every annotation key
    pub operator_name: String,

    /// Comma separated namespaces to watch. Empty means all namespaces.
    pub secrets_namespace: String,

    pub sync_interval_secs: u64,

    /// Upper bound for every call to the Kubernetes API or a destination
    pub remote_timeout_secs: u64,

    /// Port of the plain http readiness endpoint
    pub health_port: u16,

    pub incapsula_api_url: String,

    pub aws_region: Option<String>,
    pub aws_sts_role_name: Option<String>,
    pub aws_sts_session_name: Option<String>,
}

impl EnvConfig {
    pub fn load() -> Result<Self, ConfigurationError> {
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Env::raw().only(UNPREFIXED_VARS))
            .merge(Env::prefixed("CERTSYNC_"))
            .extract()
            .map_err(Box::new)?;

        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        if self.operator_name.trim().is_empty() {
            return Err(ConfigurationError::MissingOperatorName);
        }
        if self.sync_interval_secs == 0 {
            return Err(ConfigurationError::ZeroDuration("sync_interval_secs"));
        }
        if self.remote_timeout_secs == 0 {
            return Err(ConfigurationError::ZeroDuration("remote_timeout_secs"));
        }

        Ok(())
    }

    pub fn namespaces(&self) -> Vec<String> {
        self.secrets_namespace
            .split(',')
            .map(str::trim)
            .filter(|ns| !ns.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs)
    }

    pub fn aws_params(&self) -> AwsParams {
        AwsParams {
            region: self.aws_region.clone(),
            sts_role_name: self.aws_sts_role_name.clone(),
            sts_session_name: self.aws_sts_session_name.clone(),
        }
    }
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            operator_name: String::new(),
            secrets_namespace: String::new(),

            sync_interval_secs: 60,
            remote_timeout_secs: 30,
            health_port: 5555,

            incapsula_api_url: DEFAULT_INCAPSULA_API_URL.to_string(),

            aws_region: None,
            aws_sts_role_name: None,
            aws_sts_session_name: None,
        }
    }
}

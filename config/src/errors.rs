// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Type for configuration failures

use std::path::PathBuf;
use thiserror::Error;

/// The reasons why a configuration may be rejected
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Cannot parse ACL rules: {0}")]
    Parse(#[from] serde_yaml_ng::Error),
    #[error("Bad ACL rule '{name}': {reason}")]
    BadRule { name: String, reason: String },
}

/// Result-like type for configurations
pub type ConfigResult<T> = Result<T, ConfigError>;

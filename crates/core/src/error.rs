use thiserror::Error;

/// Errors raised while reading lab configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    pub fn invalid(key: &str, value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.to_string(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_error_names_the_offending_key() {
        let err = ConfigError::invalid("RUNLAB_POOL_SIZE", "0", "must be greater than zero");
        // Exhaustive on purpose: a new variant has to say which key it is about.
        let key = match &err {
            ConfigError::Invalid { key, .. } => key,
        };
        assert_eq!(key, "RUNLAB_POOL_SIZE");
        assert_eq!(
            err.to_string(),
            "invalid value \"0\" for RUNLAB_POOL_SIZE: must be greater than zero"
        );
    }
}

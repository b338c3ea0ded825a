//! Share password resolution.
//!
//! Resolution order:
//! 1. Environment variable (`NIGHTLIGHT_DEXCOM_PASSWORD`)
//! 2. Config file (with warning at load time)

use crate::DexcomConfig;

/// Environment variable holding the Share password.
pub const DEXCOM_PASSWORD_ENV: &str = "NIGHTLIGHT_DEXCOM_PASSWORD";

/// Result of secret resolution with provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSecret {
    /// The secret value.
    pub value: String,
    /// Where the secret was found.
    pub source: SecretSource,
}

/// Where a secret was resolved from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretSource {
    /// Environment variable.
    EnvVar(String),
    /// Config file (plaintext, not recommended).
    ConfigFile,
}

impl std::fmt::Display for SecretSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecretSource::EnvVar(var) => write!(f, "env var {}", var),
            SecretSource::ConfigFile => write!(f, "config file (plaintext)"),
        }
    }
}

/// Resolve the Share password: env var first, then the config value.
pub fn resolve_dexcom_password(config: Option<&DexcomConfig>) -> Option<ResolvedSecret> {
    resolve_with(std::env::var(DEXCOM_PASSWORD_ENV).ok(), config)
}

fn resolve_with(env_value: Option<String>, config: Option<&DexcomConfig>) -> Option<ResolvedSecret> {
    if let Some(value) = env_value
        && !value.is_empty()
    {
        return Some(ResolvedSecret {
            value,
            source: SecretSource::EnvVar(DEXCOM_PASSWORD_ENV.to_string()),
        });
    }

    config
        .and_then(|c| c.password.clone())
        .filter(|p| !p.is_empty())
        .map(|value| ResolvedSecret {
            value,
            source: SecretSource::ConfigFile,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dexcom(password: Option<&str>) -> DexcomConfig {
        DexcomConfig {
            username: Some("me".to_string()),
            password: password.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_env_takes_priority() {
        let config = dexcom(Some("from-file"));
        let secret = resolve_with(Some("from-env".to_string()), Some(&config)).unwrap();
        assert_eq!(secret.value, "from-env");
        assert_eq!(
            secret.source,
            SecretSource::EnvVar(DEXCOM_PASSWORD_ENV.to_string())
        );
    }

    #[test]
    fn test_falls_back_to_config() {
        let config = dexcom(Some("from-file"));
        let secret = resolve_with(Some(String::new()), Some(&config)).unwrap();
        assert_eq!(secret.value, "from-file");
        assert_eq!(secret.source, SecretSource::ConfigFile);
    }

    #[test]
    fn test_nothing_configured() {
        assert!(resolve_with(None, Some(&dexcom(None))).is_none());
        assert!(resolve_with(None, None).is_none());
    }
}

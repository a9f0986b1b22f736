use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing credential: set the {env_var} environment variable")]
    MissingCredential { env_var: String },

    #[error("Configuration error: {0}")]
    Other(#[from] config::ConfigError),
}

/// The environment variable that overrides a dotted configuration key
pub fn to_env_var(field: &str) -> String {
    let mut parts = field.split('.');
    let section = parts.next().unwrap_or_default().to_uppercase();
    let rest: Vec<String> = parts.map(|part| part.to_uppercase()).collect();
    if rest.is_empty() {
        format!("DEVGATE_{}", section)
    } else {
        format!("DEVGATE_{}__{}", section, rest.join("__"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_names() {
        assert_eq!(to_env_var("provider.api_key"), "DEVGATE_PROVIDER__API_KEY");
        assert_eq!(to_env_var("approval"), "DEVGATE_APPROVAL");
    }

    #[test]
    fn test_missing_credential_message() {
        let error = ConfigError::MissingCredential {
            env_var: "GROQ_API_KEY".into(),
        };
        assert!(error.to_string().contains("GROQ_API_KEY"));
    }
}

//! Registry configuration
//!
//! Env-driven defaults in the same style as [`crate::database::DatabaseConfig`].
//! Load a `.env` file first with `dotenvy::dotenv()` if the deployment uses one.

/// Behavior toggles for the registry services
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// When false, the location-based visibility filter is disabled and
    /// every authenticated query sees all rows.
    pub row_security: bool,
    /// When true, enrollment confirmations are recorded for second-approver
    /// review instead of being applied immediately.
    pub enable_maker_checker_enrollment: bool,
    /// Json-extension attribute names allowed in custom-filter expressions.
    pub filter_json_fields: Vec<String>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            row_security: env_flag("ROW_SECURITY", true),
            enable_maker_checker_enrollment: env_flag("ENROLLMENT_MAKER_CHECKER", false),
            filter_json_fields: std::env::var("ENROLLMENT_FILTER_FIELDS")
                .map(|raw| {
                    raw.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_else(|_| {
                    vec![
                        "number_of_children".to_string(),
                        "able_bodied".to_string(),
                    ]
                }),
        }
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(value) => matches!(value.as_str(), "1" | "true" | "True" | "TRUE"),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_fields_present() {
        let config = RegistryConfig::default();
        assert!(config
            .filter_json_fields
            .iter()
            .any(|f| f == "number_of_children"));
    }
}

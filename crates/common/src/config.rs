use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }

    /// Reads `ENVIRONMENT`; anything other than `production`/`prod` is development.
    pub fn from_env() -> Self {
        Self::parse_lenient(&env::var("ENVIRONMENT").unwrap_or_default())
    }

    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_parse_lenient() {
        assert_eq!(Environment::parse_lenient("prod"), Environment::Production);
        assert_eq!(
            Environment::parse_lenient(" Production "),
            Environment::Production
        );
        assert_eq!(Environment::parse_lenient("staging"), Environment::Development);
        assert_eq!(Environment::parse_lenient(""), Environment::Development);
    }

    #[test]
    #[serial]
    fn test_from_env_reads_variable() {
        // SAFETY: serialized with the other env-mutating tests
        unsafe { env::set_var("ENVIRONMENT", "production") };
        assert_eq!(Environment::from_env(), Environment::Production);

        unsafe { env::remove_var("ENVIRONMENT") };
        assert_eq!(Environment::from_env(), Environment::Development);
    }

    #[test]
    fn test_as_str_round_trips_through_parse() {
        for environment in [Environment::Development, Environment::Production] {
            assert_eq!(Environment::parse_lenient(environment.as_str()), environment);
        }
    }
}

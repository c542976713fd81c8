use std::fmt;
use std::io::Error;

/// Name of the environment variable holding the environment name.
const APP_ENVIRONMENT_ENV_NAME: &str = "APP_ENVIRONMENT";

const DEV_ENV_NAME: &str = "dev";

const PROD_ENV_NAME: &str = "prod";

/// Runtime environment of the runner.
///
/// Selects the environment-specific configuration file and the log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Local development, human readable logs.
    Dev,
    /// Production, JSON logs.
    Prod,
}

impl Environment {
    /// Loads the environment from `APP_ENVIRONMENT`, defaulting to [`Environment::Dev`].
    pub fn load() -> Result<Environment, Error> {
        match std::env::var(APP_ENVIRONMENT_ENV_NAME) {
            Ok(value) => value.try_into(),
            Err(_) => Ok(Environment::Dev),
        }
    }

    /// Returns the name used for the environment configuration file stem.
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Dev => DEV_ENV_NAME,
            Environment::Prod => PROD_ENV_NAME,
        }
    }

    /// Returns `true` when running in production.
    pub fn is_prod(&self) -> bool {
        matches!(self, Environment::Prod)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Environment {
    type Error = Error;

    /// Parses an environment name case-insensitively.
    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.trim().to_lowercase().as_str() {
            DEV_ENV_NAME => Ok(Self::Dev),
            PROD_ENV_NAME => Ok(Self::Prod),
            other => Err(Error::other(format!(
                "{other} is not a supported environment, use either `{DEV_ENV_NAME}` or `{PROD_ENV_NAME}`",
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_environments_case_insensitively() {
        assert_eq!(
            Environment::try_from("PROD".to_string()).unwrap(),
            Environment::Prod
        );
        assert_eq!(
            Environment::try_from(" dev ".to_string()).unwrap(),
            Environment::Dev
        );
    }

    #[test]
    fn rejects_unknown_environment() {
        let err = Environment::try_from("staging".to_string()).unwrap_err();
        assert!(err.to_string().contains("staging"));
    }
}

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai";
const DEFAULT_MODEL: &str = "llama3-8b-8192";
const DEFAULT_SUMMARY_PROMPT: &str = "Summarize the input text below. \
     Limit the summary to 1 paragraph and use a 1st grade reading level.";
const DEFAULT_MAX_CHUNK_SIZE: usize = 4000;
const DEFAULT_RETRY_LIMIT: u32 = 3;
const DEFAULT_RETRY_DELAY_SECS: u64 = 5;
const DEFAULT_MAX_RETRY_DELAY_SECS: u64 = 60;
const DEFAULT_MAX_SPLIT_DEPTH: usize = 8;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for one summarization run.
#[derive(Debug, Clone)]
pub struct Config {
    /// Credential sent as a bearer token to the remote summarizer.
    pub api_key: String,
    /// Base URL of the OpenAI-compatible endpoint (without `/v1`).
    pub base_url: String,
    /// Model identifier passed to the remote summarizer.
    pub model: String,
    /// Instruction sent as the system message of every request.
    pub summary_prompt: String,
    /// Upper bound on the size of a chunk, measured in `size_unit`.
    pub max_chunk_size: usize,
    /// Unit used for every size comparison in the run.
    pub size_unit: SizeUnit,
    /// Total submissions of the same text before giving up.
    pub retry_limit: u32,
    /// First backoff delay; later waits double up to `max_retry_delay`.
    pub retry_delay: Duration,
    /// Ceiling applied to every backoff wait.
    pub max_retry_delay: Duration,
    /// How many times a rejected request may be subdivided along one chain.
    pub max_split_depth: usize,
    /// Timeout applied to each HTTP request.
    pub request_timeout: Duration,
}

/// Measure used by the chunker and the subdivision bound.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SizeUnit {
    /// Unicode scalar values.
    #[default]
    Characters,
    /// Whitespace-delimited words.
    Words,
    /// `cl100k_base` BPE tokens.
    Tokens,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_source<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let config = Self {
            api_key: optional("GROQ_API_KEY")
                .ok_or_else(|| ConfigError::MissingVariable("GROQ_API_KEY".to_string()))?,
            base_url: optional("GROQ_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: optional("DOCSUM_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            summary_prompt: optional("DOCSUM_SUMMARY_PROMPT")
                .unwrap_or_else(|| DEFAULT_SUMMARY_PROMPT.to_string()),
            max_chunk_size: parse_or("DOCSUM_MAX_CHUNK_SIZE", optional("DOCSUM_MAX_CHUNK_SIZE"))?
                .unwrap_or(DEFAULT_MAX_CHUNK_SIZE),
            size_unit: parse_or("DOCSUM_SIZE_UNIT", optional("DOCSUM_SIZE_UNIT"))?
                .unwrap_or_default(),
            retry_limit: parse_or("DOCSUM_RETRY_LIMIT", optional("DOCSUM_RETRY_LIMIT"))?
                .unwrap_or(DEFAULT_RETRY_LIMIT),
            retry_delay: Duration::from_secs(
                parse_or("DOCSUM_RETRY_DELAY_SECS", optional("DOCSUM_RETRY_DELAY_SECS"))?
                    .unwrap_or(DEFAULT_RETRY_DELAY_SECS),
            ),
            max_retry_delay: Duration::from_secs(
                parse_or(
                    "DOCSUM_MAX_RETRY_DELAY_SECS",
                    optional("DOCSUM_MAX_RETRY_DELAY_SECS"),
                )?
                .unwrap_or(DEFAULT_MAX_RETRY_DELAY_SECS),
            ),
            max_split_depth: parse_or("DOCSUM_MAX_SPLIT_DEPTH", optional("DOCSUM_MAX_SPLIT_DEPTH"))?
                .unwrap_or(DEFAULT_MAX_SPLIT_DEPTH),
            request_timeout: Duration::from_secs(
                parse_or(
                    "DOCSUM_REQUEST_TIMEOUT_SECS",
                    optional("DOCSUM_REQUEST_TIMEOUT_SECS"),
                )?
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            ),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_chunk_size == 0 {
            return Err(ConfigError::InvalidValue("DOCSUM_MAX_CHUNK_SIZE".into()));
        }
        if self.retry_limit == 0 {
            return Err(ConfigError::InvalidValue("DOCSUM_RETRY_LIMIT".into()));
        }
        Ok(())
    }
}

fn parse_or<T: FromStr>(key: &str, value: Option<String>) -> Result<Option<T>, ConfigError> {
    value
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

impl FromStr for SizeUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "characters" | "chars" => Ok(Self::Characters),
            "words" => Ok(Self::Words),
            "tokens" => Ok(Self::Tokens),
            other => Err(format!(
                "unknown size unit '{other}' (expected characters, words or tokens)"
            )),
        }
    }
}

impl fmt::Display for SizeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Characters => "characters",
            Self::Words => "words",
            Self::Tokens => "tokens",
        };
        f.write_str(name)
    }
}

/// Load configuration from the environment and log the effective settings.
///
/// Callers load `.env` first so the logging layer sees the same variables.
pub fn load_config() -> Result<Config, ConfigError> {
    let config = Config::from_env()?;
    tracing::debug!(
        base_url = %config.base_url,
        model = %config.model,
        max_chunk_size = config.max_chunk_size,
        size_unit = %config.size_unit,
        retry_limit = config.retry_limit,
        max_split_depth = config.max_split_depth,
        "Loaded configuration"
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn source(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn applies_defaults_when_only_credential_is_set() {
        let config = Config::from_source(source(&[("GROQ_API_KEY", "secret")])).expect("config");
        assert_eq!(config.api_key, "secret");
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.max_chunk_size, 4000);
        assert_eq!(config.size_unit, SizeUnit::Characters);
        assert_eq!(config.retry_limit, 3);
        assert_eq!(config.retry_delay, Duration::from_secs(5));
        assert_eq!(config.max_split_depth, 8);
    }

    #[test]
    fn missing_credential_is_reported() {
        let error = Config::from_source(source(&[("GROQ_API_KEY", "  ")])).unwrap_err();
        assert!(matches!(error, ConfigError::MissingVariable(key) if key == "GROQ_API_KEY"));
    }

    #[test]
    fn parses_overrides() {
        let config = Config::from_source(source(&[
            ("GROQ_API_KEY", "secret"),
            ("DOCSUM_MAX_CHUNK_SIZE", "1200"),
            ("DOCSUM_SIZE_UNIT", "Tokens"),
            ("DOCSUM_RETRY_LIMIT", "7"),
            ("DOCSUM_RETRY_DELAY_SECS", "2"),
        ]))
        .expect("config");
        assert_eq!(config.max_chunk_size, 1200);
        assert_eq!(config.size_unit, SizeUnit::Tokens);
        assert_eq!(config.retry_limit, 7);
        assert_eq!(config.retry_delay, Duration::from_secs(2));
    }

    #[test]
    fn rejects_unparseable_and_zero_values() {
        let error = Config::from_source(source(&[
            ("GROQ_API_KEY", "secret"),
            ("DOCSUM_MAX_CHUNK_SIZE", "lots"),
        ]))
        .unwrap_err();
        assert!(matches!(error, ConfigError::InvalidValue(key) if key == "DOCSUM_MAX_CHUNK_SIZE"));

        let error = Config::from_source(source(&[
            ("GROQ_API_KEY", "secret"),
            ("DOCSUM_RETRY_LIMIT", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(error, ConfigError::InvalidValue(key) if key == "DOCSUM_RETRY_LIMIT"));
    }

    #[test]
    fn size_unit_parses_known_names() {
        assert_eq!("chars".parse::<SizeUnit>(), Ok(SizeUnit::Characters));
        assert_eq!("WORDS".parse::<SizeUnit>(), Ok(SizeUnit::Words));
        assert!("pages".parse::<SizeUnit>().is_err());
        assert_eq!(SizeUnit::Tokens.to_string(), "tokens");
    }
}

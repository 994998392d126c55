//! Table configuration: option sources and typed binding.
//!
//! A [`ConfigSource`] resolves named string options. [`CfFile`] reads the
//! Postfix `name = value` format with `${VAR}` environment substitution;
//! [`DictConfig::from_source`] turns any source into a validated table
//! configuration.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use crate::error::ConfigError;
use crate::store::{ConnectOptions, Credentials, Endpoint, Namespace};

/// Default server host when neither `host` nor `uri` is set.
pub const DEFAULT_HOST: &str = "localhost";
/// Default server port.
pub const DEFAULT_PORT: u16 = 27017;
/// Default operation timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;

// A leading `$$` escapes the reference.
static ENV_VAR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$(\$)?\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env var regex")
});

/// A named set of string options.
pub trait ConfigSource {
    /// Raw value of option `name`, if set.
    fn get(&self, name: &str) -> Option<&str>;

    /// Where the options came from, for diagnostics (usually a file path).
    fn origin(&self) -> &str;
}

/// Options parsed from a Postfix-style configuration file.
///
/// ```text
/// # /etc/postfix/mongodb-aliases.cf
/// host = db1.example.com
/// dbname = mail
/// collection = aliases
/// key = email
/// value = uid
/// password = ${MONGODB_PASSWORD}
/// ```
///
/// `${NAME}` is replaced by the environment variable `NAME` before parsing.
/// Write `$${NAME}` for a literal `${NAME}`, e.g. in a password.
#[derive(Debug, Clone, Default)]
pub struct CfFile {
    origin: String,
    options: BTreeMap<String, String>,
}

impl CfFile {
    /// Read and parse a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file cannot be read, or any error
    /// from [`CfFile::parse`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let origin = path.display().to_string();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: origin.clone(),
            source,
        })?;
        Self::parse(&origin, &content)
    }

    /// Parse configuration text.
    ///
    /// Blank lines and lines starting with `#` are skipped. A line starting
    /// with whitespace continues the previous value. A later assignment to
    /// the same name wins.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Syntax`] for a line without `=` and
    /// [`ConfigError::MissingEnv`] for unset `${VAR}` references.
    pub fn parse(origin: &str, content: &str) -> Result<Self, ConfigError> {
        let substituted = substitute_env_vars(origin, content)?;
        let mut options = BTreeMap::new();
        let mut last: Option<String> = None;

        for (idx, line) in substituted.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            if line.starts_with(char::is_whitespace) {
                let previous = match last.as_deref() {
                    Some(name) => options.get_mut(name),
                    None => None,
                };
                if let Some(value) = previous {
                    append_continuation(value, trimmed);
                    continue;
                }
            }
            let Some((name, value)) = trimmed.split_once('=') else {
                return Err(ConfigError::Syntax {
                    origin: origin.to_string(),
                    line: idx + 1,
                    text: trimmed.to_string(),
                });
            };
            let name = name.trim().to_string();
            options.insert(name.clone(), value.trim().to_string());
            last = Some(name);
        }

        Ok(Self {
            origin: origin.to_string(),
            options,
        })
    }

    /// Build a source from explicit pairs.
    #[must_use]
    pub fn from_pairs<'a>(origin: &str, pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            origin: origin.to_string(),
            options: pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

impl ConfigSource for CfFile {
    fn get(&self, name: &str) -> Option<&str> {
        self.options.get(name).map(String::as_str)
    }

    fn origin(&self) -> &str {
        &self.origin
    }
}

fn append_continuation(value: &mut String, more: &str) {
    if !value.is_empty() {
        value.push(' ');
    }
    value.push_str(more);
}

/// Substitute `${VAR_NAME}` patterns with environment variable values.
/// `$${VAR_NAME}` yields the literal text `${VAR_NAME}`.
///
/// # Errors
///
/// Returns [`ConfigError::MissingEnv`] listing every unset variable once, in
/// order of first use.
pub fn substitute_env_vars(origin: &str, input: &str) -> Result<String, ConfigError> {
    let mut missing: Vec<String> = Vec::new();
    let result = ENV_VAR_RE.replace_all(input, |cap: &regex::Captures<'_>| {
        let name = &cap[2];
        if cap.get(1).is_some() {
            return format!("${{{name}}}");
        }
        std::env::var(name).unwrap_or_else(|_| {
            if !missing.iter().any(|var| var == name) {
                missing.push(name.to_string());
            }
            String::new()
        })
    });

    if !missing.is_empty() {
        return Err(ConfigError::MissingEnv {
            origin: origin.to_string(),
            vars: missing,
        });
    }
    Ok(result.into_owned())
}

/// Validated configuration of one lookup table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DictConfig {
    pub endpoint: Endpoint,
    /// Present only when `auth` is enabled.
    pub credentials: Option<Credentials>,
    pub namespace: Namespace,
    /// Field matched against the lookup key.
    pub key_field: String,
    /// Field returned from the matched document. Defaults to `key_field`.
    pub value_field: String,
    pub timeout: Duration,
}

impl DictConfig {
    /// Bind and validate options from `source`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] when `dbname`, `collection` or `key`
    /// is absent (or `user` when `auth` is on), and [`ConfigError::Invalid`]
    /// for values that do not parse.
    pub fn from_source(source: &dyn ConfigSource) -> Result<Self, ConfigError> {
        let binder = Binder { source };

        let endpoint = match binder.optional("uri") {
            Some(uri) => {
                if !uri.starts_with("mongodb://") && !uri.starts_with("mongodb+srv://") {
                    return Err(binder.invalid("uri", uri, "expected a mongodb:// or mongodb+srv:// URI"));
                }
                Endpoint::Uri(uri.to_string())
            }
            None => Endpoint::HostPort {
                host: binder.optional("host").unwrap_or(DEFAULT_HOST).to_string(),
                port: binder.port("port")?,
            },
        };

        let credentials = if binder.flag("auth")? {
            Some(Credentials {
                user: binder.required("user")?.to_string(),
                password: binder.optional("password").unwrap_or_default().to_string(),
            })
        } else {
            None
        };

        let namespace = Namespace::new(binder.required("dbname")?, binder.required("collection")?);
        let key_field = binder.required("key")?.to_string();
        let value_field = binder.optional("value").unwrap_or(&key_field).to_string();
        let timeout = binder.millis("timeout")?;

        Ok(Self {
            endpoint,
            credentials,
            namespace,
            key_field,
            value_field,
            timeout,
        })
    }

    /// Connection parameters derived from this configuration.
    #[must_use]
    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            endpoint: self.endpoint.clone(),
            timeout: self.timeout,
        }
    }
}

/// Typed access to a [`ConfigSource`]; empty values count as unset.
struct Binder<'a> {
    source: &'a dyn ConfigSource,
}

impl Binder<'_> {
    fn optional(&self, name: &str) -> Option<&str> {
        self.source.get(name).filter(|v| !v.is_empty())
    }

    fn required(&self, name: &'static str) -> Result<&str, ConfigError> {
        self.optional(name).ok_or_else(|| ConfigError::Missing {
            origin: self.source.origin().to_string(),
            name,
        })
    }

    fn flag(&self, name: &'static str) -> Result<bool, ConfigError> {
        match self.optional(name) {
            None => Ok(false),
            Some(raw) => match raw.to_ascii_lowercase().as_str() {
                "yes" | "true" | "on" | "1" => Ok(true),
                "no" | "false" | "off" | "0" => Ok(false),
                _ => Err(self.invalid(name, raw, "expected yes or no")),
            },
        }
    }

    fn port(&self, name: &'static str) -> Result<u16, ConfigError> {
        match self.optional(name) {
            None => Ok(DEFAULT_PORT),
            Some(raw) => match raw.parse::<u16>() {
                Ok(port) if port > 0 => Ok(port),
                _ => Err(self.invalid(name, raw, "expected a port number between 1 and 65535")),
            },
        }
    }

    fn millis(&self, name: &'static str) -> Result<Duration, ConfigError> {
        match self.optional(name) {
            None => Ok(Duration::from_millis(DEFAULT_TIMEOUT_MS)),
            Some(raw) => match raw.parse::<u64>() {
                Ok(ms) if ms > 0 => Ok(Duration::from_millis(ms)),
                _ => Err(self.invalid(name, raw, "expected a positive number of milliseconds")),
            },
        }
    }

    fn invalid(&self, name: &'static str, value: &str, reason: &str) -> ConfigError {
        ConfigError::Invalid {
            origin: self.source.origin().to_string(),
            name,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn minimal<'a>(extra: &[(&'a str, &'a str)]) -> CfFile {
        let mut pairs = vec![("dbname", "mail"), ("collection", "aliases"), ("key", "email")];
        pairs.extend_from_slice(extra);
        CfFile::from_pairs("test.cf", pairs)
    }

    #[test]
    fn defaults_apply() {
        let cfg = DictConfig::from_source(&minimal(&[])).unwrap();
        assert_eq!(
            cfg.endpoint,
            Endpoint::HostPort {
                host: "localhost".into(),
                port: 27017
            }
        );
        assert!(cfg.credentials.is_none());
        assert_eq!(cfg.namespace, Namespace::new("mail", "aliases"));
        assert_eq!(cfg.key_field, "email");
        assert_eq!(cfg.value_field, "email");
        assert_eq!(cfg.timeout, Duration::from_millis(1000));
    }

    #[test]
    fn full_config_binds() {
        let cfg = DictConfig::from_source(&minimal(&[
            ("host", "db1.example.com"),
            ("port", "27018"),
            ("auth", "yes"),
            ("user", "postfix"),
            ("password", "s3cret"),
            ("value", "uid"),
            ("timeout", "250"),
        ]))
        .unwrap();
        assert_eq!(cfg.endpoint.to_string(), "db1.example.com:27018");
        let creds = cfg.credentials.unwrap();
        assert_eq!(creds.user, "postfix");
        assert_eq!(creds.password, "s3cret");
        assert_eq!(cfg.value_field, "uid");
        assert_eq!(cfg.timeout, Duration::from_millis(250));
    }

    #[test]
    fn uri_overrides_host_and_port() {
        let cfg = DictConfig::from_source(&minimal(&[
            ("uri", "mongodb://db1,db2/?replicaSet=rs0"),
            ("host", "ignored"),
        ]))
        .unwrap();
        assert_eq!(cfg.endpoint, Endpoint::Uri("mongodb://db1,db2/?replicaSet=rs0".into()));
    }

    #[test]
    fn rejects_non_mongodb_uri() {
        let err = DictConfig::from_source(&minimal(&[("uri", "http://db1")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "uri", .. }), "got: {err}");
    }

    #[test]
    fn required_options_are_enforced() {
        for missing in ["dbname", "collection", "key"] {
            let pairs: Vec<_> = [("dbname", "mail"), ("collection", "aliases"), ("key", "email")]
                .into_iter()
                .filter(|(k, _)| *k != missing)
                .collect();
            let err = DictConfig::from_source(&CfFile::from_pairs("t.cf", pairs)).unwrap_err();
            match err {
                ConfigError::Missing { name, .. } => assert_eq!(name, missing),
                other => panic!("expected Missing, got {other}"),
            }
        }
    }

    #[test]
    fn empty_required_value_counts_as_missing() {
        let err = DictConfig::from_source(&minimal(&[("key", "")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing { name: "key", .. }));
    }

    #[test]
    fn auth_requires_user() {
        let err = DictConfig::from_source(&minimal(&[("auth", "yes")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing { name: "user", .. }));
    }

    #[test]
    fn credentials_ignored_without_auth() {
        let cfg = DictConfig::from_source(&minimal(&[("user", "postfix"), ("password", "x")])).unwrap();
        assert!(cfg.credentials.is_none());
    }

    #[test]
    fn bad_values_are_rejected() {
        let cases = [("port", "abc"), ("port", "0"), ("port", "70000"), ("auth", "maybe"), ("timeout", "0")];
        for (name, value) in cases {
            let err = DictConfig::from_source(&minimal(&[(name, value)])).unwrap_err();
            assert!(
                matches!(err, ConfigError::Invalid { .. }),
                "{name}={value} should be invalid, got: {err}"
            );
        }
    }

    #[test]
    fn parses_cf_text() {
        let text = "\
# comment
host = db1

dbname=mail
collection = aliases
key = email
value = first
value = uid
query_filter = a
  b
";
        let cf = CfFile::parse("t.cf", text).unwrap();
        assert_eq!(cf.get("host"), Some("db1"));
        assert_eq!(cf.get("dbname"), Some("mail"));
        assert_eq!(cf.get("value"), Some("uid"));
        assert_eq!(cf.get("query_filter"), Some("a b"));
        assert_eq!(cf.get("missing"), None);
        assert_eq!(cf.origin(), "t.cf");
    }

    #[test]
    fn syntax_error_reports_line() {
        let err = CfFile::parse("t.cf", "host = db1\nnot an option\n").unwrap_err();
        match err {
            ConfigError::Syntax { line, text, .. } => {
                assert_eq!(line, 2);
                assert_eq!(text, "not an option");
            }
            other => panic!("expected Syntax, got {other}"),
        }
    }

    #[test]
    fn env_vars_substitute() {
        std::env::set_var("MONGODICT_TEST_PASSWORD", "s3cret");
        let cf = CfFile::parse("t.cf", "password = ${MONGODICT_TEST_PASSWORD}\n").unwrap();
        assert_eq!(cf.get("password"), Some("s3cret"));
        std::env::remove_var("MONGODICT_TEST_PASSWORD");
    }

    #[test]
    fn missing_env_vars_all_reported() {
        let err = CfFile::parse("t.cf", "user = ${MONGODICT_MISSING_X}\npassword = ${MONGODICT_MISSING_Y}\n")
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("MONGODICT_MISSING_X"), "got: {msg}");
        assert!(msg.contains("MONGODICT_MISSING_Y"), "got: {msg}");
    }

    #[test]
    fn repeated_missing_env_var_reported_once() {
        let err = substitute_env_vars("t.cf", "${MONGODICT_NOPE_A} ${MONGODICT_NOPE_B} ${MONGODICT_NOPE_A}")
            .unwrap_err();
        match err {
            ConfigError::MissingEnv { vars, .. } => {
                assert_eq!(vars, vec!["MONGODICT_NOPE_A", "MONGODICT_NOPE_B"]);
            }
            other => panic!("expected MissingEnv, got {other}"),
        }
    }

    #[test]
    fn double_dollar_escapes_reference() {
        let cf = CfFile::parse("t.cf", "password = pa$${ss}word
").unwrap();
        assert_eq!(cf.get("password"), Some("pa${ss}word"));
    }

    #[test]
    fn loads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "dbname = mail\ncollection = aliases\nkey = email").unwrap();
        let cf = CfFile::load(file.path()).unwrap();
        let cfg = DictConfig::from_source(&cf).unwrap();
        assert_eq!(cfg.namespace.to_string(), "mail.aliases");
    }

    #[test]
    fn missing_file_errors() {
        let err = CfFile::load(Path::new("/nonexistent/mongodb.cf")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
        assert!(err.to_string().contains("/nonexistent/mongodb.cf"));
    }
}

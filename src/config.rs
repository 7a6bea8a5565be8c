use crate::error::Error;
use serde::Deserialize;
use std::env;
use std::str::FromStr;

/// Prefix of the environment variables read by [`RuntimeConfig::load_merge_with_env`].
pub const ENV_PREFIX: &str = "CALI";

pub const DEFAULT_SNAPSHOT_CAPACITY: usize = 128;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RuntimeConfig {
    /// Names of the services to start. Empty starts every registered service.
    pub services: Vec<String>,

    /// Maximum number of entries in one snapshot record.
    pub snapshot_capacity: usize,

    /// Fail the whole capture when a pre-flush callback fails, instead of
    /// dropping that snapshot's enrichment.
    pub fatal_callback_errors: bool,

    pub symbollookup: SymbolLookupConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            services: Vec::new(),
            snapshot_capacity: DEFAULT_SNAPSHOT_CAPACITY,
            fatal_callback_errors: false,
            symbollookup: SymbolLookupConfig::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SymbolLookupConfig {
    /// Address attributes for which to perform symbol lookup
    pub attributes: Vec<String>,
}

impl RuntimeConfig {
    /// Overlays `CALI_*` environment variables onto `base`.
    ///
    /// * `CALI_SERVICES_ENABLE`
    /// * `CALI_SNAPSHOT_CAPACITY`
    /// * `CALI_FATAL_CALLBACK_ERRORS`
    /// * `CALI_SYMBOLLOOKUP_ATTRIBUTES`
    pub fn load_merge_with_env(base: RuntimeConfig) -> Result<Self, Error> {
        Self::merge_with(base, |key| env::var(key).ok())
    }

    /// Overlays values from `lookup`, keyed like the environment variables.
    pub fn merge_with<F>(base: RuntimeConfig, lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}_{name}"));
        let mut cfg = base;

        if let Some(v) = var("SERVICES_ENABLE") {
            cfg.services = split_list(&v);
        }
        if let Some(v) = var("SNAPSHOT_CAPACITY") {
            cfg.snapshot_capacity = parse_value("CALI_SNAPSHOT_CAPACITY", &v)?;
        }
        if let Some(v) = var("FATAL_CALLBACK_ERRORS") {
            cfg.fatal_callback_errors = parse_value("CALI_FATAL_CALLBACK_ERRORS", &v)?;
        }
        if let Some(v) = var("SYMBOLLOOKUP_ATTRIBUTES") {
            cfg.symbollookup.attributes = split_list(&v);
        }

        Ok(cfg)
    }

    pub fn service_enabled(&self, name: &str) -> bool {
        self.services.is_empty() || self.services.iter().any(|s| s == name)
    }
}

fn split_list(s: &str) -> Vec<String> {
    s.split(|c| c == ':' || c == ',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, Error> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{key} has an invalid value '{value}'")))
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    const RUNTIME_CONFIG: &str = r#"
services = ['symbollookup']
snapshot-capacity = 64
fatal-callback-errors = true

[symbollookup]
attributes = ['cali.sampler.pc', 'callpath.address']
"#;

    #[test]
    fn deserialize_cfg() {
        let cfg: RuntimeConfig = toml::from_str(RUNTIME_CONFIG).unwrap();
        assert_eq!(
            cfg,
            RuntimeConfig {
                services: vec!["symbollookup".to_owned()],
                snapshot_capacity: 64,
                fatal_callback_errors: true,
                symbollookup: SymbolLookupConfig {
                    attributes: vec![
                        "cali.sampler.pc".to_owned(),
                        "callpath.address".to_owned()
                    ],
                },
            }
        );

        let empty: RuntimeConfig = toml::from_str("").unwrap();
        assert_eq!(empty, RuntimeConfig::default());
        assert_eq!(empty.snapshot_capacity, DEFAULT_SNAPSHOT_CAPACITY);
    }

    #[test]
    fn merge_overrides() {
        let vars: HashMap<&str, &str> = [
            ("CALI_SERVICES_ENABLE", "symbollookup:other"),
            ("CALI_SNAPSHOT_CAPACITY", " 32 "),
            ("CALI_SYMBOLLOOKUP_ATTRIBUTES", "a, b:c"),
        ]
        .into_iter()
        .collect();

        let cfg = RuntimeConfig::merge_with(RuntimeConfig::default(), |k| {
            vars.get(k).map(|v| v.to_string())
        })
        .unwrap();
        assert_eq!(cfg.services, vec!["symbollookup", "other"]);
        assert_eq!(cfg.snapshot_capacity, 32);
        assert!(!cfg.fatal_callback_errors);
        assert_eq!(cfg.symbollookup.attributes, vec!["a", "b", "c"]);
        assert!(cfg.service_enabled("other"));
        assert!(!cfg.service_enabled("csv"));
        assert!(RuntimeConfig::default().service_enabled("csv"));
    }

    #[test]
    fn merge_rejects_malformed_values() {
        let err = RuntimeConfig::merge_with(RuntimeConfig::default(), |k| {
            (k == "CALI_FATAL_CALLBACK_ERRORS").then(|| "sometimes".to_owned())
        })
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid configuration. CALI_FATAL_CALLBACK_ERRORS has an invalid value 'sometimes'"
        );
    }

    #[test]
    fn env_cfg() {
        env::set_var("CALI_SNAPSHOT_CAPACITY", "7");
        let cfg = RuntimeConfig::load_merge_with_env(Default::default()).unwrap();
        env::remove_var("CALI_SNAPSHOT_CAPACITY");
        assert_eq!(cfg.snapshot_capacity, 7);
    }
}

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::PolioError;

pub const DEFAULT_CONFIG_PATH: &str = "configs/default.toml";
pub const CONFIG_PATH_ENV: &str = "POLIO_CONFIG";

const SECTIONS: [&str; 4] = ["server", "service", "sources", "refresh"];

pub const DEFAULT_WP_JSON_URL: &str = "https://revamp.gpei.acw.website/wp-json/wp/v2/country";
pub const DEFAULT_GEOJSON_URL: &str = "https://services.arcgis.com/5T5nSi527N4F7luB/arcgis/rest/services/Detailed_Boundary_ADM0/FeatureServer/0/query?where=1%3D1&outFields=ADM0_NAME,ISO_3_CODE,CENTER_LAT,CENTER_LON&outSR=4326&f=geojson";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub server: ServerConfig,
    pub service: ServiceConfig,
    pub sources: SourcesConfig,
    pub refresh: RefreshConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SourcesConfig {
    pub wp_json_url: String,
    pub geojson_url: String,
    pub per_page: u32,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RefreshConfig {
    /// Load the dataset before accepting requests instead of on first `GET /polio`.
    pub on_startup: bool,
    /// Background refresh period; 0 disables it.
    pub interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind: "0.0.0.0".to_string(),
                port: 8001,
            },
            service: ServiceConfig {
                name: "PolioAPI".to_string(),
            },
            sources: SourcesConfig {
                wp_json_url: DEFAULT_WP_JSON_URL.to_string(),
                geojson_url: DEFAULT_GEOJSON_URL.to_string(),
                per_page: 100,
                timeout_secs: 30,
            },
            refresh: RefreshConfig {
                on_startup: false,
                interval_secs: 0,
            },
        }
    }
}

impl Config {
    /// Defaults, then the TOML file, then `POLIO_<SECTION>__<KEY>` variables,
    /// then the bare `PORT`/`NAME`/`WP_JSON_URL`/`GEOJSON_URL` variables the
    /// container sets. Other `POLIO_*` variables (`POLIO_CONFIG`, or the
    /// `POLIO_PORT=tcp://...` a Kubernetes service injects) are not config keys.
    pub fn figment(path: impl AsRef<Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(
                Env::prefixed("POLIO_")
                    .filter(|key| {
                        key.as_str()
                            .split_once("__")
                            .map_or(false, |(section, _)| SECTIONS.iter().any(|s| section.eq_ignore_ascii_case(s)))
                    })
                    .split("__"),
            );

        // taken verbatim; figment's value parsing would turn NAME=2024 into an integer
        for (var, key) in [
            ("NAME", "service.name"),
            ("WP_JSON_URL", "sources.wp_json_url"),
            ("GEOJSON_URL", "sources.geojson_url"),
        ] {
            if let Ok(value) = std::env::var(var) {
                figment = figment.merge(Serialized::default(key, value));
            }
        }
        if let Ok(port) = std::env::var("PORT") {
            figment = match port.trim().parse::<u16>() {
                Ok(port) => figment.merge(Serialized::default("server.port", port)),
                // extraction reports the bad value against server.port
                Err(_) => figment.merge(Serialized::default("server.port", port)),
            };
        }
        figment
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, PolioError> {
        let config: Config = Self::figment(path)
            .extract()
            .map_err(|e| PolioError::ConfigError { reason: e.to_string() })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads from `$POLIO_CONFIG`, falling back to `configs/default.toml`.
    /// A missing file is not an error; the defaults apply.
    pub fn load() -> Result<Self, PolioError> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(path)
    }

    pub fn validate(&self) -> Result<(), PolioError> {
        if self.sources.per_page == 0 {
            return Err(PolioError::ConfigError {
                reason: "sources.per_page must be greater than zero".to_string(),
            });
        }
        if self.sources.wp_json_url.trim().is_empty() || self.sources.geojson_url.trim().is_empty() {
            return Err(PolioError::ConfigError {
                reason: "source URLs must not be empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.bind, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_match_container_contract() {
        let config = Config::default();
        assert_eq!(config.server.port, 8001);
        assert_eq!(config.server.bind, "0.0.0.0");
        assert_eq!(config.service.name, "PolioAPI");
        assert_eq!(config.sources.per_page, 100);
        assert_eq!(config.bind_addr(), "0.0.0.0:8001");
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            let config = Config::load_from("does-not-exist.toml").unwrap();
            assert_eq!(config, Config::default());
            Ok(())
        });
    }

    #[test]
    fn file_then_env_layering() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            jail.create_file(
                "polio.toml",
                r#"
                [server]
                port = 9000

                [sources]
                per_page = 25
                "#,
            )?;
            jail.set_env("POLIO_SOURCES__TIMEOUT_SECS", "5");

            let config = Config::load_from("polio.toml").unwrap();
            assert_eq!(config.server.port, 9000);
            assert_eq!(config.sources.per_page, 25);
            assert_eq!(config.sources.timeout_secs, 5);
            assert_eq!(config.sources.wp_json_url, DEFAULT_WP_JSON_URL);
            Ok(())
        });
    }

    #[test]
    fn bare_container_variables_override() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            jail.set_env("PORT", "8123");
            jail.set_env("NAME", "PolioStaging");
            jail.set_env("WP_JSON_URL", "http://wp.local/countries");

            let config = Config::load_from("missing.toml").unwrap();
            assert_eq!(config.server.port, 8123);
            assert_eq!(config.service.name, "PolioStaging");
            assert_eq!(config.sources.wp_json_url, "http://wp.local/countries");
            assert_eq!(config.sources.geojson_url, DEFAULT_GEOJSON_URL);
            Ok(())
        });
    }

    #[test]
    fn numeric_name_stays_a_string() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            jail.set_env("NAME", "2024");

            let config = Config::load_from("missing.toml").unwrap();
            assert_eq!(config.service.name, "2024");
            Ok(())
        });
    }

    #[test]
    fn unrelated_polio_variables_are_ignored() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            jail.set_env("POLIO_PORT", "tcp://10.0.0.7:8001");
            jail.set_env("POLIO_SERVICE_HOST", "10.0.0.7");
            jail.set_env("POLIO_CONFIG", "elsewhere.toml");
            jail.set_env("POLIO_SERVER__PORT", "9100");

            let config = Config::load_from("missing.toml").unwrap();
            assert_eq!(config.server.port, 9100);
            Ok(())
        });
    }

    #[test]
    fn invalid_port_is_a_config_error() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            jail.set_env("PORT", "http");

            let err = Config::load_from("missing.toml").unwrap_err();
            assert!(matches!(err, PolioError::ConfigError { .. }));
            Ok(())
        });
    }

    #[test]
    fn unknown_keys_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("bad.toml", "[server]\nport = 8001\nworkers = 4\n")?;
            let err = Config::load_from("bad.toml").unwrap_err();
            assert!(matches!(err, PolioError::ConfigError { .. }));
            Ok(())
        });
    }

    #[test]
    fn zero_page_size_rejected() {
        let mut config = Config::default();
        config.sources.per_page = 0;
        assert!(config.validate().is_err());
    }
}

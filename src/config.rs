use serde::Deserialize;

use crate::ledger::PointRules;
use crate::ledger::rules::{DEFAULT_APPROVAL_POINTS, DEFAULT_REFERRAL_POINTS};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
    /// Points credited to a member when their request is approved.
    pub approval_points: i64,
    /// Points credited to the referrer of an approved request.
    pub referral_points: i64,
    pub platform_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::from_source(config::Environment::default())
    }

    pub fn from_source(env: config::Environment) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .set_default("server_port", 8000)?
            .set_default("database_max_connections", 8)?
            .set_default("approval_points", DEFAULT_APPROVAL_POINTS)?
            .set_default("referral_points", DEFAULT_REFERRAL_POINTS)?
            .set_default("platform_url", "")?
            .add_source(env.try_parsing(true))
            .build()?;
        config.try_deserialize()
    }

    pub fn point_rules(&self) -> PointRules {
        PointRules {
            approval_points: self.approval_points,
            referral_points: self.referral_points,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(vars: &[(&str, &str)]) -> config::Environment {
        let mut map = config::Map::new();
        for (k, v) in vars {
            map.insert(k.to_string(), v.to_string());
        }
        config::Environment::default().source(Some(map))
    }

    #[test]
    fn defaults_fill_everything_but_database_url() {
        let cfg = Config::from_source(env(&[("DATABASE_URL", "postgres://localhost/ledger")]))
            .unwrap();
        assert_eq!(cfg.server_port, 8000);
        assert_eq!(cfg.database_max_connections, 8);
        assert_eq!(cfg.point_rules(), PointRules::default());
        assert_eq!(cfg.platform_url, "");
    }

    #[test]
    fn environment_overrides_point_amounts() {
        let cfg = Config::from_source(env(&[
            ("DATABASE_URL", "postgres://localhost/ledger"),
            ("APPROVAL_POINTS", "150"),
            ("REFERRAL_POINTS", "25"),
            ("SERVER_PORT", "9090"),
        ]))
        .unwrap();
        assert_eq!(cfg.server_port, 9090);
        assert_eq!(
            cfg.point_rules(),
            PointRules {
                approval_points: 150,
                referral_points: 25
            }
        );
    }

    #[test]
    fn database_url_is_required() {
        assert!(Config::from_source(env(&[])).is_err());
    }
}

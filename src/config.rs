// ⚙️ Configuration - Roster and runtime settings
//
// Roster: which stores belong to which agency (ground truth for matching).
// Runtime: database path and portal access, read from the environment.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_DB_PATH: &str = "data/rankings.db";
pub const DEFAULT_TRENDS_URL: &str = "https://admin.magnet.tokyo/dashboard/trends";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

// ============================================================================
// ROSTER
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgencyConfig {
    pub name: String,

    /// Roster sheet this agency maintains (informational)
    #[serde(default)]
    pub spreadsheet_id: Option<String>,

    pub stores: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterConfig {
    pub agencies: Vec<AgencyConfig>,
}

impl RosterConfig {
    /// Load a roster from a TOML file:
    ///
    /// ```toml
    /// [[agencies]]
    /// name = "ネクサス"
    /// stores = ["Belle E", "D-SPA"]
    /// ```
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let roster: RosterConfig = toml::from_str(text)?;
        roster.validate()?;
        Ok(roster)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();

        for agency in &self.agencies {
            if agency.name.trim().is_empty() {
                return Err(ConfigError::Invalid("agency with empty name".to_string()));
            }
            if !seen.insert(agency.name.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate agency: {}", agency.name)));
            }
            if let Some(store) = agency.stores.iter().find(|s| s.trim().is_empty()) {
                return Err(ConfigError::Invalid(format!(
                    "empty store name in agency {} ({:?})",
                    agency.name, store
                )));
            }
        }

        Ok(())
    }

    /// Every configured store name across all agencies, in roster order
    pub fn target_names(&self) -> Vec<String> {
        self.agencies
            .iter()
            .flat_map(|a| a.stores.iter().cloned())
            .collect()
    }

    pub fn agency(&self, name: &str) -> Option<&AgencyConfig> {
        self.agencies.iter().find(|a| a.name == name)
    }

    pub fn store_count(&self) -> usize {
        self.agencies.iter().map(|a| a.stores.len()).sum()
    }
}

impl Default for RosterConfig {
    fn default() -> Self {
        default_roster()
    }
}

fn agency(name: &str, spreadsheet_id: &str, stores: &[&str]) -> AgencyConfig {
    AgencyConfig {
        name: name.to_string(),
        spreadsheet_id: Some(spreadsheet_id.to_string()),
        stores: stores.iter().map(|s| s.to_string()).collect(),
    }
}

/// Built-in roster used when no roster file is configured
pub fn default_roster() -> RosterConfig {
    RosterConfig {
        agencies: vec![
            agency(
                "関西 株式会社Baddet",
                "1wtwD9L21gh31pY2eb6RSClBGreJTLHGOQCvBLVVQGFo",
                &[
                    "TORIHADA SPA金山ルーム",
                    "五反田 Esthe Spa",
                    "belle femme",
                    "Karen",
                    "sirena（シレーナ）",
                    "TORIHADA SPA名駅ルーム",
                    "PRINCE（プリンス）",
                ],
            ),
            agency(
                "ネクサス",
                "1yU9qceWBv1vA66a-hgdTfdi02Wh1pX4lDoXfad5JFQQ",
                &[
                    "Wonder Spa～ワンダースパ～銀座ルーム",
                    "ALFARD（アルファード）",
                    "Belle E",
                    "D-SPA",
                    "Aroma Levante（アロマレバンテ）新宿店",
                    "NAOMI SPA（ナオミスパ）恵比寿店",
                    "Nocturne Spa〜ノクターンスパ〜",
                    "Gran CoCo",
                    "AROMA MIREIA",
                    "椿～oil～ 下北沢ルーム",
                    "REMIS",
                ],
            ),
            agency(
                "ウーバー",
                "1NRh5N51RFGW_litOddswm44imL7CJ0oZpjiFvjI9qsc",
                &[
                    "神のエステ 新宿ルーム",
                    "神のエステ 葛西店",
                    "神のエステ 日暮里・鶯谷店",
                    "神のエステ 五反田店",
                    "神のエステ 赤羽・王子・板橋",
                    "神のエステ 赤坂店",
                    "小悪魔Spa Tokyo",
                    "小悪魔Spa Tokyo 蒲田ルーム",
                ],
            ),
            agency(
                "東海インターベル",
                "1oa4YLEdEzTUVPV6nE-S4JhE9zpqFHC3HDwuijhuq-j0",
                &["Platinum", "アロマダイヤモンド"],
            ),
            agency(
                "KGエンタープライズ",
                "1hrbs97c36XBvlkD17sUvmKKvgBSf6ZwTDz7hL7zhYq4",
                &[
                    "CREST SPA（クレストスパ）FC赤羽店",
                    "CREST SPA（クレストスパ）吉祥寺",
                ],
            ),
        ],
    }
}

// ============================================================================
// RUNTIME SETTINGS
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct PortalConfig {
    pub trends_url: String,
    /// Raw `Cookie` header value of a logged-in portal session
    pub session_cookie: Option<String>,
    pub timeout_secs: u64,
}

impl Default for PortalConfig {
    fn default() -> Self {
        PortalConfig {
            trends_url: DEFAULT_TRENDS_URL.to_string(),
            session_cookie: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub roster_path: Option<PathBuf>,
    pub portal: PortalConfig,
}

impl AppConfig {
    /// Read settings from the process environment
    ///
    /// - `RANK_TRACKER_DB`          database file (default `data/rankings.db`)
    /// - `RANK_TRACKER_ROSTER`      roster TOML file (default: built-in roster)
    /// - `MAGNET_TRENDS_URL`        trends page URL
    /// - `MAGNET_SESSION_COOKIE`    cookie header of a logged-in session
    /// - `MAGNET_HTTP_TIMEOUT_SECS` request timeout in seconds (default 60)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`AppConfig::from_env`] with an injectable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let timeout_secs = match non_empty("MAGNET_HTTP_TIMEOUT_SECS") {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                key: "MAGNET_HTTP_TIMEOUT_SECS".to_string(),
                value: raw.clone(),
            })?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        Ok(AppConfig {
            db_path: non_empty("RANK_TRACKER_DB")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH)),
            roster_path: non_empty("RANK_TRACKER_ROSTER").map(PathBuf::from),
            portal: PortalConfig {
                trends_url: non_empty("MAGNET_TRENDS_URL").unwrap_or_else(|| DEFAULT_TRENDS_URL.to_string()),
                session_cookie: non_empty("MAGNET_SESSION_COOKIE"),
                timeout_secs,
            },
        })
    }

    /// Roster from the configured file, or the built-in one
    pub fn load_roster(&self) -> Result<RosterConfig, ConfigError> {
        match &self.roster_path {
            Some(path) => RosterConfig::load(path),
            None => Ok(default_roster()),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_roster_is_valid() {
        let roster = default_roster();
        assert!(roster.validate().is_ok());
        assert_eq!(roster.agencies.len(), 5);
        assert_eq!(roster.store_count(), 30);
        assert_eq!(roster.target_names().len(), 30);
        assert_eq!(roster.target_names()[0], "TORIHADA SPA金山ルーム");
    }

    #[test]
    fn test_roster_from_toml() {
        let text = r#"
            [[agencies]]
            name = "ネクサス"
            stores = ["Belle E", "D-SPA"]

            [[agencies]]
            name = "東海インターベル"
            spreadsheet_id = "abc"
            stores = ["Platinum"]
        "#;

        let roster = RosterConfig::from_toml(text).unwrap();
        assert_eq!(roster.agencies.len(), 2);
        assert_eq!(roster.agencies[0].spreadsheet_id, None);
        assert_eq!(roster.agency("東海インターベル").unwrap().stores, vec!["Platinum"]);
        assert_eq!(roster.target_names(), vec!["Belle E", "D-SPA", "Platinum"]);
    }

    #[test]
    fn test_roster_rejects_duplicate_agency() {
        let text = r#"
            [[agencies]]
            name = "A"
            stores = []

            [[agencies]]
            name = "A"
            stores = []
        "#;

        let err = RosterConfig::from_toml(text).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_roster_rejects_blank_store() {
        let text = r#"
            [[agencies]]
            name = "A"
            stores = ["ok", "  "]
        "#;

        assert!(RosterConfig::from_toml(text).is_err());
    }

    #[test]
    fn test_roster_parse_error() {
        let err = RosterConfig::from_toml("agencies = 3").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_app_config_defaults() {
        let config = AppConfig::from_lookup(|_| None).unwrap();

        assert_eq!(config.db_path, PathBuf::from(DEFAULT_DB_PATH));
        assert_eq!(config.roster_path, None);
        assert_eq!(config.portal, PortalConfig::default());
    }

    #[test]
    fn test_app_config_from_vars() {
        let vars: HashMap<&str, &str> = [
            ("RANK_TRACKER_DB", "/tmp/r.db"),
            ("MAGNET_SESSION_COOKIE", "sid=abc"),
            ("MAGNET_HTTP_TIMEOUT_SECS", "15"),
            ("MAGNET_TRENDS_URL", ""),
        ]
        .into_iter()
        .collect();

        let config = AppConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(config.db_path, PathBuf::from("/tmp/r.db"));
        assert_eq!(config.portal.session_cookie.as_deref(), Some("sid=abc"));
        assert_eq!(config.portal.timeout_secs, 15);
        assert_eq!(config.portal.trends_url, DEFAULT_TRENDS_URL);
    }

    #[test]
    fn test_app_config_bad_timeout() {
        let err = AppConfig::from_lookup(|k| {
            (k == "MAGNET_HTTP_TIMEOUT_SECS").then(|| "soon".to_string())
        })
        .unwrap_err();

        assert!(matches!(err, ConfigError::InvalidEnv { .. }));
    }
}

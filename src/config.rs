// src/config.rs

//! Scanner configuration.
//!
//! Every knob has a default taken from the knowledge base, so an empty or missing
//! configuration file yields a fully working scanner.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::knowledge_base::{
    ANALYTICS_SIGNATURES, CDN_SIGNATURES, CMS_SIGNATURES, GRADE_THRESHOLDS, JS_SIGNATURES,
    PORT_CATALOGUE, SECURITY_HEADERS, SignatureRule,
};
use crate::core::models::Grade;
use crate::error::ConfigError;

const CONFIG_FILE: &str = "config.toml";

/// Main scanner configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Deadline applied to each probe individually.
    pub probe_timeout_seconds: u64,
    /// Deadline for each DNS query.
    pub dns_timeout_seconds: u64,
    /// Connect timeout for each port.
    pub port_timeout_seconds: u64,
    /// Deadline for the whole scan; probes still running are dropped from the result.
    pub overall_timeout_seconds: u64,
    pub max_redirects: usize,
    /// Upper bound on the response body handed to the fingerprinter.
    pub max_body_bytes: usize,
    pub port_concurrency: usize,
    pub user_agent: String,
    pub port_list: Vec<u16>,
    pub header_checklist: Vec<HeaderCheck>,
    /// Score floors per grade, highest first. Scores below the last floor are an F.
    pub grade_thresholds: Vec<GradeThreshold>,
    pub weights: ScoringWeights,
    pub signatures: SignatureTable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderCheck {
    pub name: String,
    pub recommendation: String,
    pub remediation: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeThreshold {
    pub min_score: u8,
    pub grade: Grade,
}

/// Component weights and the penalties used inside components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub tls: f64,
    pub headers: f64,
    pub ports: f64,
    pub https: f64,
    pub technology: f64,
    /// Subtracted from the ports component per risky open port.
    pub risky_port_penalty: f64,
    pub version_disclosure_penalty: f64,
    pub powered_by_penalty: f64,
    /// Credit given to a component whose probe produced no usable data.
    pub missing_data_credit: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    pub patterns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignatureTable {
    pub cms: Vec<Signature>,
    pub javascript: Vec<Signature>,
    pub cdn: Vec<Signature>,
    pub analytics: Vec<Signature>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            probe_timeout_seconds: 10,
            dns_timeout_seconds: 5,
            port_timeout_seconds: 2,
            overall_timeout_seconds: 30,
            max_redirects: 5,
            max_body_bytes: 512 * 1024,
            port_concurrency: 10,
            user_agent: format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            port_list: PORT_CATALOGUE.iter().map(|(port, _)| *port).collect(),
            header_checklist: SECURITY_HEADERS
                .iter()
                .map(|rule| HeaderCheck {
                    name: rule.name.to_string(),
                    recommendation: rule.recommendation.to_string(),
                    remediation: rule.remediation.to_string(),
                })
                .collect(),
            grade_thresholds: GRADE_THRESHOLDS
                .iter()
                .map(|(min_score, grade)| GradeThreshold {
                    min_score: *min_score,
                    grade: *grade,
                })
                .collect(),
            weights: ScoringWeights::default(),
            signatures: SignatureTable::default(),
        }
    }
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            tls: 35.0,
            headers: 25.0,
            ports: 15.0,
            https: 15.0,
            technology: 10.0,
            risky_port_penalty: 35.0,
            version_disclosure_penalty: 50.0,
            powered_by_penalty: 25.0,
            missing_data_credit: 20.0,
        }
    }
}

fn owned(rules: &[SignatureRule]) -> Vec<Signature> {
    rules
        .iter()
        .map(|rule| Signature {
            name: rule.name.to_string(),
            patterns: rule.patterns.iter().map(|p| p.to_string()).collect(),
        })
        .collect()
}

impl Default for SignatureTable {
    fn default() -> Self {
        Self {
            cms: owned(CMS_SIGNATURES),
            javascript: owned(JS_SIGNATURES),
            cdn: owned(CDN_SIGNATURES),
            analytics: owned(ANALYTICS_SIGNATURES),
        }
    }
}

impl ScanConfig {
    /// Loads configuration from `path`, or from the platform config directory when no
    /// path is given. A missing default file yields the defaults; a missing explicit file
    /// is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::default_config_path() {
                Some(p) if p.exists() => p,
                _ => {
                    info!("No configuration file found, using defaults.");
                    return Ok(Self::default());
                }
            },
        };

        let contents = std::fs::read_to_string(&config_path).map_err(|source| ConfigError::Read {
            path: config_path.clone(),
            source,
        })?;
        let config = Self::from_toml_str(&contents)?;
        info!(path = %config_path.display(), "Loaded configuration.");
        Ok(config)
    }

    /// Parses and validates a TOML document. Absent keys take their defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: ScanConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "vanguard-rs", env!("CARGO_PKG_NAME"))
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("probe_timeout_seconds", self.probe_timeout_seconds),
            ("dns_timeout_seconds", self.dns_timeout_seconds),
            ("port_timeout_seconds", self.port_timeout_seconds),
            ("overall_timeout_seconds", self.overall_timeout_seconds),
        ] {
            if value == 0 {
                return Err(ConfigError::invalid(field, "must be greater than zero"));
            }
        }
        if self.port_concurrency == 0 {
            return Err(ConfigError::invalid("port_concurrency", "must be at least 1"));
        }
        if self.max_body_bytes == 0 {
            return Err(ConfigError::invalid("max_body_bytes", "must be greater than zero"));
        }
        if self.port_list.is_empty() {
            return Err(ConfigError::invalid("port_list", "must not be empty"));
        }
        if self.header_checklist.is_empty() {
            return Err(ConfigError::invalid("header_checklist", "must not be empty"));
        }
        if !self
            .grade_thresholds
            .windows(2)
            .all(|pair| pair[0].min_score > pair[1].min_score)
        {
            return Err(ConfigError::invalid(
                "grade_thresholds",
                "minimum scores must be strictly descending",
            ));
        }
        if self.grade_thresholds.iter().any(|t| t.min_score > 100) {
            return Err(ConfigError::invalid("grade_thresholds", "scores cannot exceed 100"));
        }

        let w = &self.weights;
        let all = [
            w.tls,
            w.headers,
            w.ports,
            w.https,
            w.technology,
            w.risky_port_penalty,
            w.version_disclosure_penalty,
            w.powered_by_penalty,
            w.missing_data_credit,
        ];
        if all.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(ConfigError::invalid("weights", "values must be finite and non-negative"));
        }
        if w.tls + w.headers + w.ports + w.https + w.technology <= 0.0 {
            return Err(ConfigError::invalid("weights", "component weights must sum above zero"));
        }
        if w.missing_data_credit > 100.0 {
            return Err(ConfigError::invalid("weights.missing_data_credit", "cannot exceed 100"));
        }

        debug!("Configuration validated.");
        Ok(())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_seconds)
    }

    pub fn dns_timeout(&self) -> Duration {
        Duration::from_secs(self.dns_timeout_seconds)
    }

    pub fn port_timeout(&self) -> Duration {
        Duration::from_secs(self.port_timeout_seconds)
    }

    pub fn overall_timeout(&self) -> Duration {
        Duration::from_secs(self.overall_timeout_seconds)
    }
}

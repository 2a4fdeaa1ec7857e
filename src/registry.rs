use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::AppError;
use crate::models::{NodeInfo, VantagePoint};

#[derive(Debug, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    nodes: BTreeMap<String, NodeInfo>,
}

fn node(country_code: &str, country: &str, city: &str, ip: &str, asn: &str) -> NodeInfo {
    NodeInfo {
        country_code: country_code.to_string(),
        country: country.to_string(),
        city: city.to_string(),
        ip: ip.to_string(),
        asn: asn.to_string(),
    }
}

fn default_nodes() -> BTreeMap<String, NodeInfo> {
    BTreeMap::from([
        (
            "us1".to_string(),
            node("us", "USA", "Los Angeles", "5.253.30.82", "AS18978"),
        ),
        (
            "ir1".to_string(),
            node("ir", "Iran", "Tehran", "2.147.76.51", "AS58224"),
        ),
        (
            "de1".to_string(),
            node("de", "Germany", "Frankfurt", "46.4.143.48", "AS24940"),
        ),
    ])
}

/// The vantage points checks can be run from, ordered by id
#[derive(Debug, Clone)]
pub struct Registry {
    node_domain: String,
    nodes: BTreeMap<String, NodeInfo>,
}

impl Registry {
    pub fn new(node_domain: &str, nodes: BTreeMap<String, NodeInfo>) -> Self {
        Self {
            node_domain: node_domain.to_string(),
            nodes,
        }
    }

    pub fn with_defaults(node_domain: &str) -> Self {
        Self::new(node_domain, default_nodes())
    }

    /// Read `{"nodes": {"<id>": {...}}}` from `path`
    pub fn from_file(path: &Path, node_domain: &str) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let file: RegistryFile = serde_json::from_str(&raw).map_err(|e| {
            AppError::ConfigError(format!("Invalid registry file {}: {}", path.display(), e))
        })?;
        Ok(Self::new(node_domain, file.nodes))
    }

    /// Load from `path` when given; any problem, or an empty file, falls back
    /// to the built-in vantage points
    pub fn load(path: Option<&Path>, node_domain: &str) -> Self {
        let Some(path) = path else {
            tracing::info!("No registry file configured, using built-in vantage points");
            return Self::with_defaults(node_domain);
        };

        match Self::from_file(path, node_domain) {
            Ok(registry) if registry.is_empty() => {
                tracing::warn!(
                    "Registry file {} lists no vantage points, using built-in ones",
                    path.display()
                );
                Self::with_defaults(node_domain)
            }
            Ok(registry) => {
                tracing::info!(
                    "Loaded {} vantage points from {}",
                    registry.len(),
                    path.display()
                );
                registry
            }
            Err(e) => {
                tracing::warn!("{}; using built-in vantage points", e);
                Self::with_defaults(node_domain)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn vantage(&self, id: &str, info: &NodeInfo) -> VantagePoint {
        VantagePoint::new(id, &self.node_domain, info.clone())
    }

    pub fn get(&self, id: &str) -> Option<VantagePoint> {
        self.nodes.get(id).map(|info| self.vantage(id, info))
    }

    pub fn all(&self) -> Vec<VantagePoint> {
        self.nodes
            .iter()
            .map(|(id, info)| self.vantage(id, info))
            .collect()
    }

    /// Pick vantage points for a check.
    ///
    /// An explicit id list wins (unknown ids are skipped, duplicates
    /// dropped); otherwise the first `max_nodes` in id order, or all of them
    /// when no positive limit is given.
    pub fn select(&self, max_nodes: Option<usize>, ids: &[String]) -> Vec<VantagePoint> {
        if !ids.is_empty() {
            let mut selected: Vec<VantagePoint> = Vec::new();
            for id in ids {
                let id = id.trim();
                if selected.iter().any(|vp| vp.id == id) {
                    continue;
                }
                match self.get(id) {
                    Some(vp) => selected.push(vp),
                    None => tracing::debug!("Ignoring unknown vantage point {}", id),
                }
            }
            return selected;
        }

        let limit = match max_nodes {
            Some(n) if n > 0 => n,
            _ => self.nodes.len(),
        };
        self.nodes
            .iter()
            .take(limit)
            .map(|(id, info)| self.vantage(id, info))
            .collect()
    }

    /// Render vantage points as `hostname -> [cc, country, city, ip, asn]`
    pub fn nodes_for_api(vantage_points: &[VantagePoint]) -> BTreeMap<String, Vec<String>> {
        vantage_points
            .iter()
            .map(|vp| {
                let info = &vp.info;
                (
                    vp.key().to_string(),
                    vec![
                        info.country_code.clone(),
                        info.country.clone(),
                        info.city.clone(),
                        info.ip.clone(),
                        info.asn.clone(),
                    ],
                )
            })
            .collect()
    }
}

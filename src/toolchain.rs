//! Range-keyed compatibility tables for backend versions
//!
//! Which support runtime a backend version pairs with, which API generation
//! it speaks, and which auxiliary libraries it needs are all data, not code:
//! the tables below are the single place new backend releases get wired in.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use semver::Version;

use crate::dispatch::ApiGeneration;
use crate::error::Result;
use crate::table::VersionTable;
use crate::version::{parse_version, release_cmp};

/// The compatibility tables consulted during planning
#[derive(Debug, Clone)]
pub struct Toolchains {
    /// target version -> default support-runtime version
    default_runtime: VersionTable<String>,
    /// platform version -> runtime major line -> minimum runtime version
    runtime_floor: VersionTable<BTreeMap<String, String>>,
    /// target version -> API generation
    api_generation: VersionTable<ApiGeneration>,
    /// target version -> auxiliary library names (union across matches)
    aux_libraries: VersionTable<Vec<String>>,
}

impl Toolchains {
    /// The built-in tables covering every supported backend release line
    pub fn builtin() -> Result<Self> {
        let default_runtime = VersionTable::from_entries(
            "runtime",
            vec![
                (">=3.2.0 <3.4.0", "2.12.15".to_string()),
                (">=3.4.0 <3.6.0", "2.12.17".to_string()),
                (">=3.6.0 <3.9.0", "2.12.18".to_string()),
                (">=3.9.0 <4.0.0", "2.12.20".to_string()),
            ],
        )?;

        let runtime_floor = VersionTable::from_entries(
            "runtime floor",
            vec![
                (
                    "<0.2.0",
                    BTreeMap::from([
                        ("2.12".to_string(), "2.12.15".to_string()),
                        ("2.13".to_string(), "2.13.8".to_string()),
                    ]),
                ),
                (
                    ">=0.2.0",
                    BTreeMap::from([
                        ("2.12".to_string(), "2.12.18".to_string()),
                        ("2.13".to_string(), "2.13.12".to_string()),
                    ]),
                ),
            ],
        )?;

        let api_generation = VersionTable::from_entries(
            "API generation",
            vec![
                (">=3.0.0 <3.9.0", ApiGeneration::Gen1),
                (">=3.9.0", ApiGeneration::Gen2),
            ],
        )?;

        let aux_libraries = VersionTable::from_entries(
            "auxiliary libraries",
            vec![
                (">=3.5.0", vec!["daffodil-udf".to_string()]),
                (">=3.10.0", vec!["daffodil-layers".to_string()]),
            ],
        )?;

        Ok(Self {
            default_runtime,
            runtime_floor,
            api_generation,
            aux_libraries,
        })
    }

    /// The API generation a target backend version speaks
    pub fn api_generation(&self, target: &Version) -> Result<ApiGeneration> {
        Ok(*self.api_generation.resolve_one(target)?)
    }

    /// Every auxiliary library any matching entry contributes, concatenated
    /// in declaration order. A version matching nothing needs nothing.
    pub fn aux_libraries(&self, target: &Version) -> Vec<String> {
        self.aux_libraries
            .resolve_all(target)
            .into_iter()
            .flatten()
            .cloned()
            .collect()
    }

    /// Resolve the support-runtime version for a target backend version on
    /// the given platform.
    ///
    /// The target's default pairing is taken first; if the platform mandates
    /// a higher minimum for that runtime's major line, the minimum wins.
    /// Upgrade-only: the platform floor never downgrades a default.
    pub fn resolve_runtime(&self, target: &Version, platform: &Version) -> Result<String> {
        let default = self.default_runtime.resolve_one(target)?;
        let default_version = parse_version(default)?;
        let line = major_line(&default_version);

        let floor = self
            .runtime_floor
            .resolve_all(platform)
            .into_iter()
            .next()
            .and_then(|floors| floors.get(&line));

        if let Some(minimum) = floor {
            let minimum_version = parse_version(minimum)?;
            if release_cmp(&default_version, &minimum_version) == Ordering::Less {
                return Ok(minimum.clone());
            }
        }
        Ok(default.clone())
    }
}

/// The major release line of a runtime version, e.g. "2.12" for 2.12.15
fn major_line(version: &Version) -> String {
    format!("{}.{}", version.major, version.minor)
}

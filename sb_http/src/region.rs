use sb_ratelimit::CallBuckets;

use crate::errors::DispatchError;
use crate::errors::Result;

const DEFAULT_DOMAIN: &str = "api.riotgames.com";

/// Logical region, platform id, and the continental cluster it belongs to
const REGIONS: &[(&str, &str, &str)] = &[
    ("br", "br1", "americas"),
    ("eune", "eun1", "europe"),
    ("euw", "euw1", "europe"),
    ("jp", "jp1", "asia"),
    ("kr", "kr", "asia"),
    ("lan", "la1", "americas"),
    ("las", "la2", "americas"),
    ("na", "na1", "americas"),
    ("oce", "oc1", "sea"),
    ("tr", "tr1", "europe"),
    ("ru", "ru", "europe"),
    ("ph", "ph2", "sea"),
    ("sg", "sg2", "sea"),
    ("th", "th2", "sea"),
    ("tw", "tw2", "sea"),
    ("vn", "vn2", "sea"),
];

/// Where a call goes and which quota buckets govern it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub host: String,
    pub buckets: CallBuckets,
}

/// Maps logical regions to endpoint hosts and quota buckets
///
/// Platform calls (summoner, league, ...) go to the region's own platform host
/// and are bucketed per platform. Regional calls (account, match) go to the
/// continental cluster, and the server enforces their quota per cluster, so
/// every region of a cluster shares the same buckets.
#[derive(Debug, Clone)]
pub struct RegionRouter {
    domain: String,
}

impl Default for RegionRouter {
    fn default() -> Self {
        Self { domain: DEFAULT_DOMAIN.to_string() }
    }
}

impl RegionRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route under a different API domain
    pub fn with_domain(domain: impl Into<String>) -> Self {
        Self { domain: domain.into() }
    }

    /// Platform id for a region, e.g. `euw` → `euw1`
    pub fn platform(region: &str) -> Option<&'static str> {
        Self::lookup(region).map(|(_, platform, _)| platform)
    }

    /// Continental cluster for a region, e.g. `euw` → `europe`
    pub fn cluster(region: &str) -> Option<&'static str> {
        Self::lookup(region).map(|(_, _, cluster)| cluster)
    }

    pub fn resolve(&self, region: &str, is_regional: bool, method_key: &str) -> Result<Route> {
        let (_, platform, cluster) =
            Self::lookup(region).ok_or_else(|| DispatchError::Configuration(format!("unknown region {:?}", region)))?;
        let route = if is_regional { cluster } else { platform };

        Ok(Route { host: format!("{}.{}", route, self.domain), buckets: CallBuckets::new(route, method_key) })
    }

    fn lookup(region: &str) -> Option<(&'static str, &'static str, &'static str)> {
        REGIONS.iter().copied().find(|(name, _, _)| name.eq_ignore_ascii_case(region.trim()))
    }
}

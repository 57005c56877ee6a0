/// One call as described by a manager
///
/// Opaque to business meaning: the dispatcher only routes, meters and sends it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    /// Path and query, starting with `/`
    pub path: String,

    /// Per-call region override; the dispatcher's default region when `None`
    pub region: Option<String>,

    /// Route to the continental cluster (account, match) instead of the platform host
    pub is_regional: bool,

    /// Endpoint template the method quota is keyed by, e.g. `summoner-v4.by-puuid`
    pub method_key: String,

    /// Free-form text for logs
    pub debug_label: String,

    /// The caller is bypassing its cache for this call; carried for tracing only
    pub force: bool,
}

impl RequestDescriptor {
    /// A call routed to the region's platform host
    pub fn platform(method_key: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            region: None,
            is_regional: false,
            method_key: method_key.into(),
            debug_label: String::new(),
            force: false,
        }
    }

    /// A call routed to the region's continental cluster
    pub fn regional(method_key: impl Into<String>, path: impl Into<String>) -> Self {
        Self { is_regional: true, ..Self::platform(method_key, path) }
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.debug_label = label.into();
        self
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

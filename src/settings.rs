// Process-wide settings resolved once at startup
//
// The mirror selection decides which endpoint table is active. Everything
// downstream receives `&Settings` and never re-reads the environment.

use tracing::{debug, warn};

use crate::config::{env_var_non_empty, Config};

/// Environment variable selecting the regional endpoint set
pub const MIRROR_ENV: &str = "MIRROR";

/// Annotation/label namespace for metadata attached to built images
pub const LABEL_NAMESPACE: &str = "run.ssy.";

/// Regional endpoint set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mirror {
    Domestic,
    International,
}

impl Mirror {
    /// Interpret the raw value of `MIRROR`.
    ///
    /// Unset or empty means domestic. Unknown values fall back to the
    /// international set, matching what the registry operators deploy by
    /// default outside mainland China.
    pub fn from_env_value(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()) {
            None => Mirror::Domestic,
            Some(v) if v.is_empty() => Mirror::Domestic,
            Some(v) => match v.as_str() {
                "cn" | "domestic" => Mirror::Domestic,
                "global" | "intl" | "international" => Mirror::International,
                other => {
                    warn!(
                        "Unknown {} value '{}', using the international endpoints",
                        MIRROR_ENV, other
                    );
                    Mirror::International
                }
            },
        }
    }

    pub fn from_env() -> Self {
        Self::from_env_value(env_var_non_empty(MIRROR_ENV).as_deref())
    }

    /// Value sent to the auth API so it issues credentials for the right registry
    pub fn query_value(&self) -> &'static str {
        match self {
            Mirror::Domestic => "cn",
            Mirror::International => "global",
        }
    }
}

/// Hosting ecosystem behind a registry endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ecosystem {
    Shengsuan,
    Replicate,
}

impl Ecosystem {
    pub fn display_name(&self) -> &'static str {
        match self {
            Ecosystem::Shengsuan => "Shengsuan",
            Ecosystem::Replicate => "Replicate",
        }
    }

    /// First-party registries are subject to ownership verification and
    /// are the only valid targets for local-image pushes.
    pub fn is_first_party(&self) -> bool {
        matches!(self, Ecosystem::Shengsuan)
    }
}

impl std::fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// A well-known registry together with its public website and API hosts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEndpoint {
    pub ecosystem: Ecosystem,
    /// Registry host, possibly with a namespace path (e.g. `registry.example.com/org`)
    pub host: String,
    pub website_host: String,
    pub api_host: String,
}

impl RegistryEndpoint {
    fn new(ecosystem: Ecosystem, host: &str, website_host: &str, api_host: &str) -> Self {
        Self {
            ecosystem,
            host: host.to_string(),
            website_host: website_host.to_string(),
            api_host: api_host.to_string(),
        }
    }

    /// `host/` prefix used for matching fully-qualified references
    pub fn prefix(&self) -> String {
        format!("{}/", self.host)
    }
}

/// Immutable configuration for one command invocation
#[derive(Debug, Clone)]
pub struct Settings {
    mirror: Mirror,
    shengsuan: RegistryEndpoint,
    replicate: RegistryEndpoint,
    api_url: String,
    container_cli: String,
}

impl Settings {
    /// Build settings for a mirror. `api_url` overrides the default
    /// `https://<shengsuan api host>` base URL.
    pub fn new(mirror: Mirror, api_url: Option<String>, container_cli: String) -> Self {
        let (shengsuan, replicate) = match mirror {
            Mirror::Domestic => (
                RegistryEndpoint::new(
                    Ecosystem::Shengsuan,
                    "registry.shengsuanyun.com",
                    "www.shengsuanyun.com",
                    "api.shengsuanyun.com",
                ),
                RegistryEndpoint::new(
                    Ecosystem::Replicate,
                    "registry.cn-shanghai.aliyuncs.com/shengsuan",
                    "replicate.com",
                    "api.replicate.com",
                ),
            ),
            Mirror::International => (
                RegistryEndpoint::new(
                    Ecosystem::Shengsuan,
                    "150605664230.dkr.ecr.us-east-1.amazonaws.com",
                    "www.shengsuanyun.com",
                    "api.shengsuanyun.com",
                ),
                RegistryEndpoint::new(
                    Ecosystem::Replicate,
                    "r8.im",
                    "replicate.com",
                    "api.replicate.com",
                ),
            ),
        };

        let api_url = api_url
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| format!("https://{}", shengsuan.api_host));

        Self {
            mirror,
            shengsuan,
            replicate,
            api_url,
            container_cli,
        }
    }

    /// Read `MIRROR` and merge the user config; called once from `main`.
    pub fn from_env(config: &Config) -> Self {
        let settings = Self::new(
            Mirror::from_env(),
            config.get_api_url(),
            config.get_container_cli(),
        );
        debug!(
            mirror = ?settings.mirror,
            api_url = %settings.api_url,
            container_cli = %settings.container_cli,
            "Resolved settings"
        );
        settings
    }

    pub fn mirror(&self) -> Mirror {
        self.mirror
    }

    /// All statically registered endpoints
    pub fn endpoints(&self) -> [&RegistryEndpoint; 2] {
        [&self.shengsuan, &self.replicate]
    }

    pub fn endpoint(&self, ecosystem: Ecosystem) -> &RegistryEndpoint {
        match ecosystem {
            Ecosystem::Shengsuan => &self.shengsuan,
            Ecosystem::Replicate => &self.replicate,
        }
    }

    /// Endpoint that bare (unqualified) image references are routed to
    pub fn default_endpoint(&self) -> &RegistryEndpoint {
        match self.mirror {
            Mirror::Domestic => &self.shengsuan,
            Mirror::International => &self.replicate,
        }
    }

    /// Base URL of the account and model-registry API
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn container_cli(&self) -> &str {
        &self.container_cli
    }
}

// Image reference resolution against the well-known registry endpoints
//
// Pure string policy: no network access happens here.

use crate::error::CliError;
use crate::settings::{Ecosystem, RegistryEndpoint, Settings};

/// A fully-qualified image reference and the endpoint it belongs to, if any
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedImage {
    pub full_ref: String,
    pub endpoint: Option<RegistryEndpoint>,
}

/// Whether `reference` already names a registry host.
///
/// Requires a `/` and a first segment that looks like a domain (`.`), has an
/// explicit port (`:`), or is `localhost`. A tag colon in a bare
/// `namespace/name:tag` reference does not count.
pub fn is_fully_qualified(reference: &str) -> bool {
    match reference.split_once('/') {
        Some((first, _)) => first.contains('.') || first.contains(':') || first == "localhost",
        None => false,
    }
}

/// Find the registered endpoint whose host prefixes `full_ref`
pub fn match_endpoint<'a>(full_ref: &str, settings: &'a Settings) -> Option<&'a RegistryEndpoint> {
    settings
        .endpoints()
        .into_iter()
        .find(|endpoint| full_ref.starts_with(&endpoint.prefix()))
}

/// Expand `raw` into exactly one fully-qualified reference.
///
/// Qualified references are returned unchanged. Bare references get the host
/// of the mirror's default endpoint prepended.
pub fn resolve(raw: &str, settings: &Settings) -> ResolvedImage {
    let raw = raw.trim();
    let full_ref = if is_fully_qualified(raw) {
        raw.to_string()
    } else {
        format!("{}/{}", settings.default_endpoint().host, raw)
    };

    let endpoint = match_endpoint(&full_ref, settings).cloned();
    ResolvedImage { full_ref, endpoint }
}

/// Drop a `:tag` or `@digest` suffix from the last path segment
fn strip_tag(name: &str) -> &str {
    let name = name.split('@').next().unwrap_or(name);
    name.split(':').next().unwrap_or(name)
}

impl ResolvedImage {
    pub fn is_known_registry(&self) -> bool {
        self.endpoint.is_some()
    }

    pub fn ecosystem(&self) -> Option<Ecosystem> {
        self.endpoint.as_ref().map(|e| e.ecosystem)
    }

    pub fn is_first_party(&self) -> bool {
        self.ecosystem().is_some_and(|e| e.is_first_party())
    }

    /// Owner namespace and untagged model name below a known registry host.
    ///
    /// Only `host/owner/model[:tag]` is accepted; deeper or shallower paths
    /// are rejected instead of guessing which segment is the owner.
    pub fn owner_and_model(&self) -> Result<(String, String), CliError> {
        let endpoint = self.endpoint.as_ref().ok_or_else(|| {
            CliError::config(format!(
                "{} is not on a recognized registry",
                self.full_ref
            ))
        })?;

        let path = &self.full_ref[endpoint.prefix().len()..];
        let segments: Vec<&str> = path.split('/').collect();
        match segments.as_slice() {
            [owner, model] if !owner.is_empty() && !strip_tag(model).is_empty() => {
                Ok((owner.to_string(), strip_tag(model).to_string()))
            }
            _ => Err(CliError::config(format!(
                "Invalid image name '{}'. Expected {}/<username>/<model-name>[:tag]",
                self.full_ref, endpoint.host
            ))),
        }
    }

    /// Public page for a model pushed to a first-party registry
    pub fn website_url(&self) -> Option<String> {
        let endpoint = self.endpoint.as_ref().filter(|e| e.ecosystem.is_first_party())?;
        Some(format!(
            "https://{}",
            self.full_ref
                .replacen(&endpoint.host, &endpoint.website_host, 1)
        ))
    }
}

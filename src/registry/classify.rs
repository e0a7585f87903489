// Push failure classification
//
// The push collaborator reports a tagged `PushFailure`. Backends that only
// have free-form output (the container CLI) go through `from_output`, which
// sniffs for the registry's not-found markers.

use anyhow::anyhow;

use crate::error::CliError;
use crate::registry::ResolvedImage;
use crate::settings::Settings;

/// Markers the registry emits when the target repository does not exist
const NOT_FOUND_MARKERS: &[&str] = &["NAME_UNKNOWN", "404"];

/// Markers for failures that never reached the registry
const TRANSPORT_MARKERS: &[&str] = &[
    "connection refused",
    "no such host",
    "i/o timeout",
    "TLS handshake timeout",
    "network is unreachable",
    "Cannot connect to the Docker daemon",
];

/// Outcome of a failed push
#[derive(Debug)]
pub enum PushFailure {
    /// Repository unknown to the registry, or not visible to these credentials
    NotFound(String),
    /// Daemon or network failure before the registry answered
    Transport(anyhow::Error),
    Other(anyhow::Error),
}

impl PushFailure {
    /// Classify free-form push output.
    pub fn from_output(output: &str) -> Self {
        let message = output.trim().to_string();
        if NOT_FOUND_MARKERS.iter().any(|m| message.contains(m)) {
            PushFailure::NotFound(message)
        } else if TRANSPORT_MARKERS.iter().any(|m| message.contains(m)) {
            PushFailure::Transport(anyhow!(message))
        } else {
            PushFailure::Other(anyhow!(message))
        }
    }
}

impl From<anyhow::Error> for PushFailure {
    fn from(err: anyhow::Error) -> Self {
        PushFailure::Other(err)
    }
}

/// The remediation error shared by a negative ownership check and a
/// not-found push result.
///
/// Unrecognized hosts are reported under the mirror's default ecosystem.
pub fn not_found_error(target: &ResolvedImage, settings: &Settings) -> CliError {
    let endpoint = target
        .endpoint
        .as_ref()
        .unwrap_or_else(|| settings.default_endpoint());
    CliError::NotFoundOrNotOwned {
        ecosystem: endpoint.ecosystem,
        image: target.full_ref.clone(),
        website: endpoint.website_host.clone(),
    }
}

/// Rewrite a push failure into the error shown to the operator
pub fn classify(failure: PushFailure, target: &ResolvedImage, settings: &Settings) -> CliError {
    match failure {
        PushFailure::NotFound(_) => not_found_error(target, settings),
        PushFailure::Transport(err) | PushFailure::Other(err) => CliError::Push(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::resolve;
    use crate::settings::{Ecosystem, Mirror};

    fn settings() -> Settings {
        Settings::new(Mirror::Domestic, None, "docker".into())
    }

    #[test]
    fn test_name_unknown_is_not_found() {
        let failure = PushFailure::from_output(
            "denied: NAME_UNKNOWN: repository name not known to registry",
        );
        assert!(matches!(failure, PushFailure::NotFound(_)));
    }

    #[test]
    fn test_http_404_is_not_found() {
        let failure =
            PushFailure::from_output("unexpected status from HEAD request: 404 Not Found");
        assert!(matches!(failure, PushFailure::NotFound(_)));
    }

    #[test]
    fn test_transport_and_other() {
        let failure = PushFailure::from_output(
            "dial tcp: lookup registry.shengsuanyun.com: no such host",
        );
        assert!(matches!(failure, PushFailure::Transport(_)));

        let failure = PushFailure::from_output("unauthorized: authentication required");
        assert!(matches!(failure, PushFailure::Other(_)));
    }

    #[test]
    fn test_not_found_names_ecosystem_and_website() {
        let settings = settings();
        let target = resolve("user/model", &settings);
        let err = classify(PushFailure::NotFound("404".into()), &target, &settings);

        match &err {
            CliError::NotFoundOrNotOwned {
                ecosystem,
                image,
                website,
            } => {
                assert_eq!(*ecosystem, Ecosystem::Shengsuan);
                assert_eq!(image, "registry.shengsuanyun.com/user/model");
                assert_eq!(website, "www.shengsuanyun.com");
            }
            other => panic!("unexpected error: {:?}", other),
        }

        let message = err.to_string();
        assert!(message.contains("create a new model before pushing"));
        assert!(message.contains("sudo ssy login"));
    }

    #[test]
    fn test_not_found_on_replicate_host() {
        let settings = settings();
        let target = resolve("registry.cn-shanghai.aliyuncs.com/shengsuan/model", &settings);
        let err = classify(PushFailure::NotFound("NAME_UNKNOWN".into()), &target, &settings);
        assert!(err.to_string().contains("existing Replicate model"));
        assert!(err.to_string().contains("replicate.com"));
    }

    #[test]
    fn test_other_failures_keep_cause() {
        let settings = settings();
        let target = resolve("user/model", &settings);
        let err = classify(
            PushFailure::from_output("unauthorized: authentication required"),
            &target,
            &settings,
        );

        assert!(matches!(err, CliError::Push(_)));
        let chain = format!("{:#}", anyhow::Error::new(err));
        assert!(chain.starts_with("Failed to push image"));
        assert!(chain.contains("unauthorized: authentication required"));
    }
}

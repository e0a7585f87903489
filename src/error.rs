use thiserror::Error;

use crate::api::ApiError;
use crate::settings::Ecosystem;

/// Errors surfaced to the operator by `login` and `push`.
///
/// None of these are retried. Collaborator failures keep their cause as the
/// error source so the full chain is printed.
#[derive(Debug, Error)]
pub enum CliError {
    /// Missing image name, incompatible flags, unusable reference
    #[error("{0}")]
    Config(String),

    #[error("Failed to log in")]
    Auth(#[source] ApiError),

    #[error("Failed to verify model '{image}'")]
    Verification {
        image: String,
        #[source]
        source: ApiError,
    },

    #[error(
        "Unable to find existing {ecosystem} model for {image}. \
         Go to {website} and create a new model before pushing.\n\n\
         If the model already exists, you may be getting this error \
         because you're not logged in as owner of the model. \
         This can happen if you did `sudo ssy login` instead of `ssy login` \
         or `sudo ssy push` instead of `ssy push`, \
         which causes Docker to use the wrong Docker credentials."
    )]
    NotFoundOrNotOwned {
        ecosystem: Ecosystem,
        image: String,
        website: String,
    },

    #[error("Failed to build image")]
    Build(#[source] anyhow::Error),

    #[error("Failed to push image")]
    Push(#[source] anyhow::Error),
}

impl CliError {
    pub fn config(message: impl Into<String>) -> Self {
        CliError::Config(message.into())
    }
}

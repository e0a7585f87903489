use anyhow::{bail, Context, Result};
use reqwest::Client;
use std::io::{self, BufRead, Read, Write};
use tracing::debug;

use crate::api::{fetch_display_token_url, ApiClient};
use crate::error::CliError;
use crate::settings::Settings;

/// Where the login token comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    /// Piped stdin, read to EOF
    Stdin,
    /// One line typed at a prompt
    Prompt,
    /// Open the registry's token page in a browser, then read the pasted line
    Browser,
}

/// Persists registry credentials for the container daemon
pub trait CredentialStore {
    fn save_login_token(&self, registry_host: &str, identity: &str, secret: &str) -> Result<()>;
}

/// Name shown to the operator for a registry username.
///
/// `robot_<user>+<token>` becomes `<user>`; anything before a `+` is used
/// otherwise, and plain usernames are shown as-is.
pub fn display_name(username: &str) -> &str {
    match username.split_once('+') {
        Some((head, _)) => head.strip_prefix("robot_").unwrap_or(head),
        None => username,
    }
}

/// Log in to `registry_host` and persist the issued credential.
///
/// The token is read from `input` according to `source`. Returns the display
/// name of the authenticated user.
pub async fn handle_login(
    http_client: &Client,
    settings: &Settings,
    store: &dyn CredentialStore,
    registry_host: &str,
    source: TokenSource,
    input: &mut impl BufRead,
    open_browser: impl Fn(&str) -> io::Result<()>,
) -> Result<String> {
    let display_url = match source {
        TokenSource::Browser => Some(
            fetch_display_token_url(http_client, registry_host)
                .await
                .map_err(CliError::Auth)?,
        ),
        _ => None,
    };

    let token = match (source, display_url) {
        (TokenSource::Stdin, _) => read_token_from_stdin(input)?,
        (TokenSource::Browser, Some(url)) => {
            read_token_with_browser(&url, registry_host, input, open_browser)?
        }
        _ => prompt_token(input)?,
    };

    login_with_token(http_client, settings, store, registry_host, &token).await
}

/// Exchange `token` and save the credential under `registry_host`.
pub async fn login_with_token(
    http_client: &Client,
    settings: &Settings,
    store: &dyn CredentialStore,
    registry_host: &str,
    token: &str,
) -> Result<String> {
    let token = token.trim();
    if token.is_empty() {
        return Err(CliError::config("No login token provided").into());
    }

    let api = ApiClient::new(http_client.clone(), settings);
    let credential = api
        .exchange_token(token, settings.mirror())
        .await
        .map_err(CliError::Auth)?;
    debug!("Token exchanged for registry user {}", credential.identity);

    store
        .save_login_token(registry_host, &credential.identity, &credential.secret)
        .with_context(|| format!("Failed to save credentials for {}", registry_host))?;

    let name = display_name(&credential.identity).to_string();
    debug!("Logged in to {} as {}", registry_host, name);
    Ok(name)
}

fn read_token_from_stdin(input: &mut impl Read) -> Result<String> {
    let mut token = String::new();
    input
        .read_to_string(&mut token)
        .context("Failed to read token from stdin")?;
    Ok(token.trim().to_string())
}

fn read_line(input: &mut impl BufRead) -> Result<String> {
    let mut line = String::new();
    let read = input
        .read_line(&mut line)
        .context("Failed to read token from input")?;
    if read == 0 {
        bail!("Failed to read token from input: unexpected end of input");
    }
    Ok(line.trim().to_string())
}

fn prompt_token(input: &mut impl BufRead) -> Result<String> {
    println!("Please obtain your login token from https://console.shengsuanyun.com/user/keys");
    println!("After copying the token, paste it below and press Enter:");
    print!("Token: ");
    io::stdout().flush()?;
    read_line(input)
}

fn read_token_with_browser(
    url: &str,
    registry_host: &str,
    input: &mut impl BufRead,
    open_browser: impl Fn(&str) -> io::Result<()>,
) -> Result<String> {
    println!(
        "This command will authenticate Docker with the '{}' registry. You will need a Shengsuan account.",
        registry_host
    );
    println!();
    println!("Hit enter to get started. A browser will open with an authentication token that you need to paste here.");
    read_line(input)?;

    println!("If it didn't open automatically, open this URL in a web browser:");
    println!("{}", url);
    if let Err(e) = open_browser(url) {
        println!("Failed to open browser automatically: {}", e);
    }

    println!();
    println!("Once you've signed in, copy the authentication token from that web page, paste it here, then hit enter:");
    read_line(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::serve;
    use crate::settings::Mirror;
    use axum::{routing::get, Json, Router};
    use serde_json::json;
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingStore {
        saved: RefCell<Vec<(String, String, String)>>,
    }

    impl CredentialStore for RecordingStore {
        fn save_login_token(
            &self,
            registry_host: &str,
            identity: &str,
            secret: &str,
        ) -> Result<()> {
            self.saved.borrow_mut().push((
                registry_host.to_string(),
                identity.to_string(),
                secret.to_string(),
            ));
            Ok(())
        }
    }

    struct FailingStore;

    impl CredentialStore for FailingStore {
        fn save_login_token(&self, _: &str, _: &str, _: &str) -> Result<()> {
            bail!("docker login failed with status: exit status: 1")
        }
    }

    fn login_routes(code: i64) -> Router {
        Router::new().route(
            "/v2/user/login",
            get(move || async move {
                Json(json!({
                    "code": code,
                    "data": {"user_name": "robot_svc+tok123", "access_token": "s3cret"}
                }))
            }),
        )
    }

    async fn settings_with_api(code: i64) -> Settings {
        let base = serve(login_routes(code)).await;
        Settings::new(Mirror::Domestic, Some(base), "docker".into())
    }

    fn no_browser(url: &str) -> io::Result<()> {
        panic!("browser opened for {}", url)
    }

    #[tokio::test]
    async fn test_handle_login_reads_piped_token() {
        let settings = settings_with_api(0).await;
        let store = RecordingStore::default();
        let mut input = io::Cursor::new("tok\n");

        let name = handle_login(
            &Client::new(),
            &settings,
            &store,
            "registry.shengsuanyun.com",
            TokenSource::Stdin,
            &mut input,
            no_browser,
        )
        .await
        .unwrap();

        assert_eq!(name, "svc");
        assert_eq!(store.saved.borrow().len(), 1);
    }

    #[tokio::test]
    async fn test_handle_login_prompt_reads_one_line() {
        let settings = settings_with_api(0).await;
        let store = RecordingStore::default();
        let mut input = io::Cursor::new("tok\nleftover\n");

        handle_login(
            &Client::new(),
            &settings,
            &store,
            "registry.shengsuanyun.com",
            TokenSource::Prompt,
            &mut input,
            no_browser,
        )
        .await
        .unwrap();

        assert_eq!(input.position(), 4);
        assert_eq!(store.saved.borrow()[0].0, "registry.shengsuanyun.com");
    }

    #[tokio::test]
    async fn test_handle_login_browser_opens_token_page() {
        let app = login_routes(0).route(
            "/get/token",
            get(|| async { Json(json!({"url": "https://www.shengsuanyun.com/auth/token"})) }),
        );
        let base = serve(app).await;
        let settings = Settings::new(Mirror::Domestic, Some(base.clone()), "docker".into());
        let store = RecordingStore::default();
        let opened = RefCell::new(Vec::new());
        let mut input = io::Cursor::new("\npasted-token\n");

        let name = handle_login(
            &Client::new(),
            &settings,
            &store,
            &base,
            TokenSource::Browser,
            &mut input,
            |url| {
                opened.borrow_mut().push(url.to_string());
                Ok(())
            },
        )
        .await
        .unwrap();

        assert_eq!(name, "svc");
        assert_eq!(
            opened.borrow().as_slice(),
            ["https://www.shengsuanyun.com/auth/token"]
        );
        assert_eq!(store.saved.borrow()[0].0, base);
    }

    #[tokio::test]
    async fn test_handle_login_browser_rejects_foreign_registry() {
        let base = serve(Router::new()).await;
        let settings = Settings::new(Mirror::Domestic, Some(base.clone()), "docker".into());
        let store = RecordingStore::default();
        let mut input = io::Cursor::new("\npasted-token\n");

        let err = handle_login(
            &Client::new(),
            &settings,
            &store,
            &base,
            TokenSource::Browser,
            &mut input,
            no_browser,
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<CliError>(),
            Some(CliError::Auth(_))
        ));
        assert_eq!(input.position(), 0);
        assert!(store.saved.borrow().is_empty());
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("robot_svc+tok123"), "svc");
        assert_eq!(display_name("alice+tok"), "alice");
        assert_eq!(display_name("bob"), "bob");
        assert_eq!(display_name("robot_carol"), "robot_carol");
    }

    #[test]
    fn test_stdin_token_is_trimmed() {
        let mut input = io::Cursor::new("  abc123\n\n");
        assert_eq!(read_token_from_stdin(&mut input).unwrap(), "abc123");
    }

    #[test]
    fn test_prompt_reads_single_line() {
        let mut input = io::Cursor::new("abc123\nignored\n");
        assert_eq!(prompt_token(&mut input).unwrap(), "abc123");
    }

    #[test]
    fn test_prompt_eof_is_an_error() {
        let mut input = io::Cursor::new("");
        assert!(prompt_token(&mut input).is_err());
    }

    #[test]
    fn test_browser_launch_failure_is_not_fatal() {
        let mut input = io::Cursor::new("\npasted-token\n");
        let opened = RefCell::new(Vec::new());
        let token = read_token_with_browser(
            "https://www.shengsuanyun.com/auth/token",
            "registry.shengsuanyun.com",
            &mut input,
            |url| {
                opened.borrow_mut().push(url.to_string());
                Err(io::Error::new(io::ErrorKind::NotFound, "no browser"))
            },
        )
        .unwrap();

        assert_eq!(token, "pasted-token");
        assert_eq!(
            opened.borrow().as_slice(),
            ["https://www.shengsuanyun.com/auth/token"]
        );
    }

    #[tokio::test]
    async fn test_login_saves_full_identity() {
        let settings = settings_with_api(0).await;
        let store = RecordingStore::default();

        let name = login_with_token(
            &Client::new(),
            &settings,
            &store,
            "registry.shengsuanyun.com",
            " tok \n",
        )
        .await
        .unwrap();

        assert_eq!(name, "svc");
        assert_eq!(
            store.saved.borrow().as_slice(),
            [(
                "registry.shengsuanyun.com".to_string(),
                "robot_svc+tok123".to_string(),
                "s3cret".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_login_rejected_code_does_not_save() {
        let settings = settings_with_api(10001).await;
        let store = RecordingStore::default();

        let err = login_with_token(
            &Client::new(),
            &settings,
            &store,
            "registry.shengsuanyun.com",
            "tok",
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<CliError>(),
            Some(CliError::Auth(_))
        ));
        assert!(store.saved.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_login_surfaces_store_failure() {
        let settings = settings_with_api(0).await;
        let err = login_with_token(
            &Client::new(),
            &settings,
            &FailingStore,
            "registry.shengsuanyun.com",
            "tok",
        )
        .await
        .unwrap_err();

        let chain = format!("{:#}", err);
        assert!(chain.contains("Failed to save credentials for registry.shengsuanyun.com"));
        assert!(chain.contains("docker login failed"));
    }

    #[tokio::test]
    async fn test_empty_token_is_rejected() {
        let settings = Settings::new(Mirror::Domestic, None, "docker".into());
        let err = login_with_token(
            &Client::new(),
            &settings,
            &RecordingStore::default(),
            "registry.shengsuanyun.com",
            "   ",
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CliError>(),
            Some(CliError::Config(_))
        ));
    }
}

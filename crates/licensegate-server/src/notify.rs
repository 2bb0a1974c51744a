use std::time::Duration;

use licensegate_config::{Notify, SecretSource};
use licensegate_kernel::is_valid_principal;
use reqwest::{Client, StatusCode, Url};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

pub const TOPIC_LABEL: &str = "License Request";

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("invalid user principal: {0:?}")]
    InvalidPrincipal(String),
    #[error("missing configuration secret: {0}")]
    MissingSecret(&'static str),
    #[error("{stage} request failed: {message}")]
    Transport {
        stage: &'static str,
        message: String,
    },
    #[error("token endpoint returned {status}: {body}")]
    TokenRejected { status: u16, body: String },
    #[error("token response did not include an access_token")]
    TokenMissing,
    #[error("notification endpoint returned {status}: {body}")]
    DispatchRejected { status: u16, body: String },
}

impl NotifyError {
    /// True when the caller supplied bad input and nothing was sent upstream.
    pub fn is_client_error(&self) -> bool {
        matches!(self, NotifyError::InvalidPrincipal(_))
    }
}

/// Sends activity notifications through the messaging API using a client-credentials token.
/// No retries; each failure is reported once.
pub struct Notifier {
    client: Client,
    authority_url: Url,
    graph_url: Url,
    scope: String,
    deep_link_prefix: String,
    fallback_deep_link: String,
    secrets: SecretSource,
}

impl Notifier {
    pub fn new(cfg: &Notify, secrets: SecretSource) -> Result<Self, String> {
        let client = Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(|e| e.to_string())?;
        Ok(Self {
            client,
            authority_url: Url::parse(&cfg.authority_url)
                .map_err(|e| format!("invalid notify.authority_url: {e}"))?,
            graph_url: Url::parse(&cfg.graph_url)
                .map_err(|e| format!("invalid notify.graph_url: {e}"))?,
            scope: cfg.scope.clone(),
            deep_link_prefix: cfg.deep_link_prefix.clone(),
            fallback_deep_link: cfg.fallback_deep_link.clone(),
            secrets,
        })
    }

    /// The override when it carries the required prefix, the fallback otherwise.
    pub fn deep_link(&self, override_link: Option<&str>) -> String {
        match override_link.map(str::trim) {
            Some(link) if link.starts_with(&self.deep_link_prefix) => link.to_string(),
            Some(link) => {
                warn!(deep_link = link, "deep link override ignored: prefix mismatch");
                self.fallback_deep_link.clone()
            }
            None => self.fallback_deep_link.clone(),
        }
    }

    pub async fn notify(&self, principal: &str, message: &str) -> Result<(), NotifyError> {
        let principal = principal.trim();
        if !is_valid_principal(principal) {
            return Err(NotifyError::InvalidPrincipal(principal.to_string()));
        }

        let secrets = self.secrets.resolve();
        let tenant_id = secrets
            .tenant_id
            .as_deref()
            .ok_or(NotifyError::MissingSecret("tenant id"))?;
        let client_id = secrets
            .client_id
            .as_deref()
            .ok_or(NotifyError::MissingSecret("client id"))?;
        let client_secret = secrets
            .client_secret
            .as_deref()
            .ok_or(NotifyError::MissingSecret("client secret"))?;

        let token = self
            .acquire_token(tenant_id, client_id, client_secret)
            .await?;
        let web_url = self.deep_link(secrets.deep_link.as_deref());
        self.send_activity(&token, principal, message, &web_url)
            .await
    }

    async fn acquire_token(
        &self,
        tenant_id: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<String, NotifyError> {
        let url = join_segments(
            &self.authority_url,
            &[tenant_id, "oauth2", "v2.0", "token"],
        )?;
        let response = self
            .client
            .post(url)
            .form(&[
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("scope", self.scope.as_str()),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await
            .map_err(|e| NotifyError::Transport {
                stage: "token",
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::TokenRejected {
                status: status.as_u16(),
                body,
            });
        }

        let payload: Value = response.json().await.map_err(|_| NotifyError::TokenMissing)?;
        payload
            .get("access_token")
            .and_then(Value::as_str)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .ok_or(NotifyError::TokenMissing)
    }

    async fn send_activity(
        &self,
        token: &str,
        principal: &str,
        message: &str,
        web_url: &str,
    ) -> Result<(), NotifyError> {
        let url = join_segments(
            &self.graph_url,
            &["users", principal, "teamwork", "sendActivityNotification"],
        )?;
        let body = json!({
            "topic": {
                "source": "text",
                "value": TOPIC_LABEL,
                "webUrl": web_url,
            },
            "activityType": "systemDefault",
            "previewText": { "content": message },
            "templateParameters": [
                { "name": "systemDefaultText", "value": message }
            ],
        });

        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| NotifyError::Transport {
                stage: "notification",
                message: e.to_string(),
            })?;

        let status = response.status();
        if status != StatusCode::NO_CONTENT {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::DispatchRejected {
                status: status.as_u16(),
                body,
            });
        }
        debug!(principal, "activity notification delivered");
        Ok(())
    }
}

fn join_segments(base: &Url, segments: &[&str]) -> Result<Url, NotifyError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| NotifyError::Transport {
            stage: "url",
            message: format!("{base} cannot be a base url"),
        })?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use licensegate_config::Secrets;

    fn notify_cfg() -> Notify {
        Notify {
            authority_url: "http://127.0.0.1:9/login".to_string(),
            graph_url: "http://127.0.0.1:9/graph/v1.0/".to_string(),
            scope: "https://graph.microsoft.com/.default".to_string(),
            timeout_ms: 500,
            deep_link_prefix: "https://teams.microsoft.com/l/".to_string(),
            fallback_deep_link: "https://teams.microsoft.com/l/entity/fallback".to_string(),
        }
    }

    fn notifier(secrets: Secrets) -> Notifier {
        Notifier::new(&notify_cfg(), SecretSource::Fixed(secrets)).unwrap()
    }

    #[test]
    fn deep_link_override_must_carry_prefix() {
        let n = notifier(Secrets::default());
        assert_eq!(
            n.deep_link(Some("https://teams.microsoft.com/l/entity/custom")),
            "https://teams.microsoft.com/l/entity/custom"
        );
        assert_eq!(
            n.deep_link(Some("https://evil.example.com/phish")),
            "https://teams.microsoft.com/l/entity/fallback"
        );
        assert_eq!(n.deep_link(None), "https://teams.microsoft.com/l/entity/fallback");
    }

    #[test]
    fn join_segments_escapes_and_trims_trailing_slash() {
        let base = Url::parse("http://localhost/graph/v1.0/").unwrap();
        let url = join_segments(&base, &["users", "a/b@c.com", "teamwork"]).unwrap();
        assert_eq!(url.path(), "/graph/v1.0/users/a%2Fb@c.com/teamwork");
    }

    #[tokio::test]
    async fn invalid_principal_fails_before_secrets_are_checked() {
        let n = notifier(Secrets::default());
        let err = n.notify("not-an-email", "hello").await.unwrap_err();
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn missing_secret_is_reported_at_call_time() {
        let n = notifier(Secrets {
            tenant_id: Some("tenant".to_string()),
            client_id: None,
            client_secret: Some("secret".to_string()),
            deep_link: None,
        });
        let err = n.notify("a@b.com", "hello").await.unwrap_err();
        assert!(matches!(err, NotifyError::MissingSecret("client id")));
        assert!(!err.is_client_error());
    }
}

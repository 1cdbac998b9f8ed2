use app_config::{MailConfig, MailProvider, SmtpConfig};
use app_error::{AppError, AppResult};
use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use reqwest::{Client, header};
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tracing::{debug, error, info};

/// An outgoing email.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub text: String,
}

impl MailMessage {
    /// The account verification email, linking to `{base_url}?token={token}`.
    pub fn verification(from: &str, to: &str, name: &str, base_url: &str, token: &str) -> Self {
        let link = format!("{}?token={}", base_url, token);
        Self {
            from: from.to_string(),
            to: to.to_string(),
            subject: "Verify your MovieVerse account".to_string(),
            text: format!(
                "Hello {},\n\nPlease confirm your email address by opening the link below:\n\n{}\n\nIf you did not sign up, ignore this message.",
                name, link
            ),
        }
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &MailMessage) -> AppResult<()>;
}

/// Writes messages to the log instead of delivering them.
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &MailMessage) -> AppResult<()> {
        info!(
            to = %message.to,
            subject = %message.subject,
            body = %message.text,
            "Email (log provider)"
        );
        Ok(())
    }
}

/// Delivers messages by POSTing them as JSON to an HTTP mail relay.
#[derive(Clone)]
pub struct HttpMailer {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl HttpMailer {
    pub fn new(endpoint: &str, api_key: &str) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, message: &MailMessage) -> AppResult<()> {
        let mut request = self.client.post(&self.endpoint).json(message);
        if !self.api_key.is_empty() {
            request = request.header(header::AUTHORIZATION, format!("Bearer {}", self.api_key));
        }

        let response = request.send().await.map_err(|e| {
            error!("Failed to reach mail relay: {}", e);
            AppError::NetworkError(format!("Failed to connect to mail relay: {}", e))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            error!("Mail relay rejected message with status {}: {}", status, text);
            return Err(AppError::NetworkError(format!(
                "Mail relay returned HTTP {}",
                status
            )));
        }

        debug!(to = %message.to, "Email handed to relay");
        Ok(())
    }
}

/// Delivers messages through an SMTP relay, upgrading with STARTTLS unless
/// the relay is configured for plain connections.
#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> AppResult<Self> {
        let builder = if config.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host).map_err(|e| {
                AppError::ConfigError(anyhow::anyhow!("Invalid SMTP relay '{}': {}", config.host, e))
            })?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };

        let mut builder = builder
            .port(config.port)
            .timeout(Some(Duration::from_secs(config.timeout_secs)));
        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
        })
    }
}

fn mailbox(field: &str, address: &str) -> AppResult<Mailbox> {
    address
        .parse()
        .map_err(|e| AppError::validation(field, &format!("Invalid email address: {}", e)))
}

/// Plain-text RFC 5322 message for `message`.
pub fn build_smtp_message(message: &MailMessage) -> AppResult<Message> {
    Message::builder()
        .from(mailbox("from", &message.from)?)
        .to(mailbox("to", &message.to)?)
        .subject(message.subject.clone())
        .header(ContentType::TEXT_PLAIN)
        .body(message.text.clone())
        .map_err(|e| AppError::ServerError(anyhow::anyhow!("Failed to build email: {}", e)))
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, message: &MailMessage) -> AppResult<()> {
        let email = build_smtp_message(message)?;

        let response = self.transport.send(email).await.map_err(|e| {
            error!("SMTP delivery failed: {}", e);
            AppError::NetworkError(format!("Failed to deliver email over SMTP: {}", e))
        })?;

        debug!(to = %message.to, code = %response.code(), "Email accepted by SMTP relay");
        Ok(())
    }
}

pub fn mailer_from_config(config: &MailConfig) -> AppResult<Arc<dyn Mailer>> {
    Ok(match config.provider {
        MailProvider::Log => Arc::new(LogMailer),
        MailProvider::Http => Arc::new(HttpMailer::new(&config.endpoint, &config.api_key)),
        MailProvider::Smtp => Arc::new(SmtpMailer::new(&config.smtp)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header as header_eq, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn message() -> MailMessage {
        MailMessage::verification(
            "no-reply@movieverse.test",
            "ada@example.com",
            "Ada",
            "http://localhost:8080/verify-email",
            "abc123",
        )
    }

    #[test]
    fn test_verification_message_links_token() {
        let msg = message();
        assert!(msg.text.contains("http://localhost:8080/verify-email?token=abc123"));
        assert!(msg.text.contains("Hello Ada"));
        assert_eq!(msg.to, "ada@example.com");
    }

    #[tokio::test]
    async fn test_http_mailer_posts_json() -> Result<(), anyhow::Error> {
        let mock_server = MockServer::start().await;
        let msg = message();

        Mock::given(method("POST"))
            .and(path("/send"))
            .and(header_eq("authorization", "Bearer relay-key"))
            .and(body_json(json!({
                "from": msg.from,
                "to": msg.to,
                "subject": msg.subject,
                "text": msg.text,
            })))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&mock_server)
            .await;

        let mailer = HttpMailer::new(&format!("{}/send", mock_server.uri()), "relay-key");
        mailer.send(&msg).await?;

        Ok(())
    }

    #[tokio::test]
    async fn test_http_mailer_relay_failure() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&mock_server)
            .await;

        let mailer = HttpMailer::new(&mock_server.uri(), "");
        match mailer.send(&message()).await {
            Err(AppError::NetworkError(msg)) => assert!(msg.contains("500")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_log_mailer_always_succeeds() {
        assert!(LogMailer.send(&message()).await.is_ok());
    }

    #[test]
    fn test_smtp_message_headers() {
        let email = build_smtp_message(&message()).unwrap();
        let raw = String::from_utf8(email.formatted()).unwrap();
        assert!(raw.contains("From: no-reply@movieverse.test"));
        assert!(raw.contains("To: ada@example.com"));
        assert!(raw.contains("Subject: Verify your MovieVerse account"));
        assert!(raw.contains("text/plain"));
    }

    #[test]
    fn test_smtp_message_rejects_bad_address() {
        let mut msg = message();
        msg.to = "not an address".to_string();
        match build_smtp_message(&msg) {
            Err(AppError::ValidationError(err)) => assert!(err.contains("'to'")),
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_smtp_mailer_unreachable_relay() {
        // Grab a free port, then release it so nothing is listening.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let config = SmtpConfig {
            host: "127.0.0.1".to_string(),
            port,
            starttls: false,
            timeout_secs: 2,
            ..SmtpConfig::default()
        };

        let mailer = SmtpMailer::new(&config).unwrap();
        match mailer.send(&message()).await {
            Err(AppError::NetworkError(msg)) => assert!(msg.contains("SMTP")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_mailer_from_config_builds_smtp() {
        let config = MailConfig {
            provider: MailProvider::Smtp,
            smtp: SmtpConfig {
                host: "smtp.example.com".to_string(),
                username: "mailer".to_string(),
                password: "secret".to_string(),
                ..SmtpConfig::default()
            },
            ..MailConfig::default()
        };
        assert!(mailer_from_config(&config).is_ok());
    }
}

use crate::config::SmtpConfig;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

/// SMTP delivery of sign-in codes.
pub struct EmailService {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_email: String,
    from_name: String,
}

impl EmailService {
    pub fn new(config: &SmtpConfig) -> anyhow::Result<Self> {
        let creds = Credentials::new(config.username.clone(), config.password.clone());

        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?
            .port(config.port)
            .credentials(creds)
            .build();

        Ok(Self {
            transport,
            from_email: config.from_email.clone(),
            from_name: config.from_name.clone(),
        })
    }

    pub async fn send_login_code(&self, to_email: &str, code: &str) -> anyhow::Result<()> {
        let from = format!("{} <{}>", self.from_name, self.from_email)
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid from address: {}", e))?;

        let to = to_email
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid to address: {}", e))?;

        let email = Message::builder()
            .from(from)
            .to(to)
            .subject(format!("{} sign-in code", self.from_name))
            .header(ContentType::TEXT_PLAIN)
            .body(login_code_body(&self.from_name, code))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| anyhow::anyhow!("SMTP send failed: {}", e))?;

        Ok(())
    }
}

fn login_code_body(app_name: &str, code: &str) -> String {
    format!(
        "Your {app_name} sign-in code is:\n\n  {code}\n\nThis code expires in {} minutes.\nIf you did not request this, please ignore this email.",
        crate::auth::otp::OTP_TTL_MINUTES
    )
}

use anyhow::Result;
use lettre::message::{Mailbox, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

/// Outgoing account mail. Without SMTP settings messages are only logged.
pub enum Mailer {
    Smtp {
        transport: AsyncSmtpTransport<Tokio1Executor>,
        from: Mailbox,
    },
    Log,
}

impl Mailer {
    pub fn smtp(config: &SmtpConfig) -> Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
            .port(config.port)
            .credentials(Credentials::new(config.username.clone(), config.password.clone()))
            .build();
        let from: Mailbox = config.from.parse()?;
        info!("SMTP mailer configured for {}:{}", config.host, config.port);
        Ok(Self::Smtp { transport, from })
    }

    async fn send(&self, to: &str, subject: &str, html: String) -> Result<()> {
        match self {
            Self::Smtp { transport, from } => {
                let message = Message::builder()
                    .from(from.clone())
                    .to(to.parse()?)
                    .subject(subject)
                    .header(ContentType::TEXT_HTML)
                    .body(html)?;
                transport.send(message).await?;
                info!("Mail \"{}\" sent to {}", subject, to);
            }
            Self::Log => {
                info!("Mail disabled, would send \"{}\" to {}", subject, to);
            }
        }
        Ok(())
    }

    pub async fn send_password_reset(&self, to: &str, name: &str, reset_url: &str) -> Result<()> {
        let html = format!(
            "<h2>Şifre Sıfırlama</h2>\
             <p>Merhaba {name},</p>\
             <p>Şifrenizi sıfırlamak için aşağıdaki bağlantıya tıklayın. Bağlantı 10 dakika geçerlidir.</p>\
             <p><a href=\"{reset_url}\">{reset_url}</a></p>\
             <p>Bu isteği siz yapmadıysanız bu e-postayı dikkate almayın.</p>"
        );
        self.send(to, "Hal Kompleksi - Şifre Sıfırlama", html).await
    }

    pub async fn send_welcome(&self, to: &str, name: &str) -> Result<()> {
        let html = format!(
            "<h2>Hal Kompleksi'ne Hoş Geldiniz!</h2>\
             <p>Merhaba {name},</p>\
             <p>Hesabınız başarıyla oluşturuldu. Artık ürünleri inceleyebilir, satıcılarla iletişime geçebilirsiniz.</p>"
        );
        self.send(to, "Hal Kompleksi - Hoş Geldiniz!", html).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_mailer_never_fails() {
        let mailer = Mailer::Log;
        mailer.send_welcome("ali@example.com", "Ali").await.unwrap();
        mailer
            .send_password_reset("ali@example.com", "Ali", "http://localhost/reset-password?token=abc")
            .await
            .unwrap();
    }
}

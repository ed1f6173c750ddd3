use std::path::Path;

pub const DEFAULT_SMTP_HOST: &str = "localhost";
pub const DEFAULT_SMTP_PORT: u16 = 587;

/// Mail relay settings read from the credential file.
///
/// Layout, one value per line: user, password, host (optional), port
/// (optional).
#[derive(Clone, PartialEq)]
pub struct MailConfig {
    pub username: String,
    pub password: String,
    pub host: String,
    pub port: u16,
}

impl std::fmt::Debug for MailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("host", &self.host)
            .field("port", &self.port)
            .finish()
    }
}

impl MailConfig {
    /// Read the credential file. Any problem disables mail instead of failing
    /// startup; the reason is logged.
    pub fn load(path: &Path) -> Option<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("Mail disabled: cannot read {}: {}", path.display(), e);
                return None;
            }
        };
        match Self::parse(&content) {
            Ok(config) => Some(config),
            Err(reason) => {
                tracing::warn!("Mail disabled: {} ({})", reason, path.display());
                None
            }
        }
    }

    pub fn parse(content: &str) -> Result<Self, String> {
        let mut lines = content.lines().map(str::trim);
        let (Some(username), Some(password)) = (lines.next(), lines.next()) else {
            return Err("credential file must have at least 2 lines (user, password)".to_string());
        };
        if username.is_empty() {
            return Err("credential file has an empty user line".to_string());
        }

        let host = match lines.next() {
            Some(host) if !host.is_empty() => host.to_string(),
            _ => DEFAULT_SMTP_HOST.to_string(),
        };
        let port = match lines.next() {
            Some(port) if !port.is_empty() => port
                .parse()
                .map_err(|_| format!("invalid SMTP port '{}'", port))?,
            _ => DEFAULT_SMTP_PORT,
        };

        Ok(Self {
            username: username.to_string(),
            password: password.to_string(),
            host,
            port,
        })
    }
}

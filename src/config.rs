use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "bankcards-server")]
#[command(about = "Bank card management REST API")]
#[command(version)]
pub struct Config {
    /// Host address to bind to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value = "8080")]
    pub port: u16,

    /// SQLite database URL
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://bankcards.db")]
    pub database_url: String,

    /// Hex-encoded 16-byte AES key used to encrypt stored card numbers
    #[arg(long, env = "PAN_ENCRYPTION_KEY")]
    pub pan_encryption_key: String,

    /// Secret used to authenticate issued bearer tokens
    #[arg(long, env = "AUTH_SECRET")]
    pub auth_secret: String,

    /// Bearer token lifetime in minutes
    #[arg(long, env = "TOKEN_TTL_MINUTES", default_value = "60")]
    pub token_ttl_minutes: i64,

    /// Issuer prefix (BIN) for generated card numbers
    #[arg(long, env = "CARD_BIN", default_value = "4400")]
    pub card_bin: String,
}

impl Config {
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

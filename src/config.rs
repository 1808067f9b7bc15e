use secrecy::Secret;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: Secret<String>,
    pub db_max_connections: u32,

    // Photos are read from `<upload_dir>/photos`, artifacts written to `<upload_dir>/idcards`
    pub upload_dir: String,

    // Card branding
    pub organization_title: String,
    pub organization_subtitle: String,

    // Allocation and rendering
    pub allocation_max_attempts: u32,
    pub render_timeout_secs: u64,
    pub render_concurrency: usize,

    // Six-field cron, seconds first
    pub expiry_audit_schedule: String,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Load .env file if it exists (for local development)
        let _ = dotenvy::dotenv();

        let config = config::Config::builder()
            .add_source(config::Environment::default().separator("__"))
            .build()?;

        Ok(Self {
            database_url: Secret::new(config.get("database_url")?),
            db_max_connections: config.get("db_max_connections").unwrap_or(20),

            upload_dir: config
                .get("upload_dir")
                .unwrap_or_else(|_| "./uploads".to_string()),

            organization_title: config
                .get("organization_title")
                .unwrap_or_else(|_| "Digital Agristack Transaction Enterprises".to_string()),
            organization_subtitle: config
                .get("organization_subtitle")
                .unwrap_or_else(|_| "IDENTITY CARD".to_string()),

            allocation_max_attempts: config.get("allocation_max_attempts").unwrap_or(50),
            render_timeout_secs: config.get("render_timeout_secs").unwrap_or(15),
            render_concurrency: config.get("render_concurrency").unwrap_or(4),

            expiry_audit_schedule: config
                .get("expiry_audit_schedule")
                .unwrap_or_else(|_| "0 0 * * * *".to_string()),
        })
    }
}

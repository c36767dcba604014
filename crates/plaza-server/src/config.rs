use anyhow::Context;
use plaza_types::Environment;

/// Process configuration, read once at startup from `PLAZA_*` env vars.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub environment: Environment,
    pub geo_precision: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let host = std::env::var("PLAZA_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = std::env::var("PLAZA_PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .context("PLAZA_PORT must be a port number")?;
        let environment: Environment = std::env::var("PLAZA_ENVIRONMENT")
            .unwrap_or_else(|_| "development".into())
            .parse()
            .map_err(anyhow::Error::msg)?;
        let geo_precision: usize = std::env::var("PLAZA_GEO_PRECISION")
            .unwrap_or_else(|_| plaza_store::DEFAULT_GEO_PRECISION.to_string())
            .parse()
            .context("PLAZA_GEO_PRECISION must be a small integer")?;

        Ok(Self {
            host,
            port,
            environment,
            geo_precision,
        })
    }
}

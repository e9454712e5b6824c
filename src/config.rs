use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::BackfillError;
use crate::models::backfill::DEFAULT_LIMIT;
use crate::models::{BackfillRequest, ScanScope, SourceSelector};

/// 默认配置文件 (可选)
pub const CONFIG_FILE: &str = "canonical-backfill.toml";

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub backfill: BackfillConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    /// 启动时执行规范表迁移
    pub run_migrations: bool,
}

/// 单次回填目标
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackfillConfig {
    pub organisation_id: String,
    pub location_id: String,
    /// OCR / XERO / ALL，大小写不敏感
    pub source: String,
    pub limit: u32,
}

impl AppConfig {
    /// 从默认配置文件和环境变量加载配置
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Path::new(CONFIG_FILE))
    }

    /// 优先级：默认值 < 配置文件 < `CANONICAL__*` 环境变量 < `DATABASE_URL`
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        Config::builder()
            .set_default("database.url", "postgres://localhost/invoices")?
            .set_default("database.max_connections", 5)?
            .set_default("database.run_migrations", false)?
            .set_default("backfill.source", "ALL")?
            .set_default("backfill.limit", i64::from(DEFAULT_LIMIT))?
            .add_source(File::from(path).required(false))
            .add_source(Environment::with_prefix("CANONICAL").separator("__"))
            .set_override_option("database.url", std::env::var("DATABASE_URL").ok())?
            .build()?
            .try_deserialize()
    }
}

impl BackfillConfig {
    pub fn to_request(&self) -> Result<BackfillRequest, BackfillError> {
        let source: SourceSelector = self.source.parse()?;
        let request = BackfillRequest::new(
            ScanScope::new(self.organisation_id.clone(), self.location_id.clone()),
            source,
            Some(self.limit),
        )?;
        Ok(request)
    }
}

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::ReplicatorConfig;

/// 环境变量前缀
pub const ENV_PREFIX: &str = "REPLICATOR";

/// 连接参数的环境变量后缀与配置键
const STORE_ENV_KEYS: [(&str, &str); 6] = [
    ("HOST", "host"),
    ("PORT", "port"),
    ("PROTO", "protocol"),
    ("DATABASE", "database"),
    ("USERNAME", "username"),
    ("PASSWORD", "password"),
];

/// 配置加载器
///
/// 优先级从低到高：默认值、TOML 文件（可选）、环境变量。
/// 连接参数使用 `REPLICATOR_PRIMARY_HOST` 形式的变量名，
/// 其余配置使用 `REPLICATOR_SYNC__PAGE_SIZE` 形式（`__` 分隔层级）。
#[derive(Debug, Default)]
pub struct ConfigLoader {
    file: Option<PathBuf>,
    env: Option<HashMap<String, String>>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// 指定配置文件，文件不存在时使用默认值
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self
    }

    /// 使用给定的变量代替进程环境
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = Some(env);
        self
    }

    /// 加载并验证配置
    pub fn load(&self) -> Result<ReplicatorConfig> {
        let config = self.load_unvalidated()?;
        config.validate()?;
        Ok(config)
    }

    /// 加载配置但不验证
    pub fn load_unvalidated(&self) -> Result<ReplicatorConfig> {
        let env = self
            .env
            .clone()
            .unwrap_or_else(|| std::env::vars().collect());

        let defaults = Config::try_from(&ReplicatorConfig::default())
            .context("Failed to serialize default configuration")?;

        let mut builder = Config::builder().add_source(defaults);

        if let Some(path) = &self.file {
            builder = builder.add_source(
                File::from(path.as_path())
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(Some(env.clone().into_iter().collect())),
        );

        for side in ["primary", "secondary"] {
            for (suffix, key) in STORE_ENV_KEYS {
                let var = format!("{}_{}_{}", ENV_PREFIX, side.to_uppercase(), suffix);
                builder = builder
                    .set_override_option(format!("{}.{}", side, key), env.get(&var).cloned())?;
            }
        }

        let config = builder.build().context("Failed to build configuration")?;
        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HEGEMON__*` 覆盖（双下划线表示嵌套，
//! 如 `HEGEMON__ADVISOR__PROVIDER=claude`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub advisor: AdvisorSection,
    #[serde(default)]
    pub coordinator: CoordinatorSection,
    #[serde(default)]
    pub bridge: BridgeSection,
}

/// [advisor] 段：决策服务后端选择、模型与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdvisorSection {
    /// 后端：mock / claude
    pub provider: String,
    pub model: String,
    pub max_tokens: u32,
    pub base_url: String,
    /// 单次决策请求的 HTTP 超时（秒）
    pub request_timeout_secs: u64,
    /// 系统提示词文件；未设置时用内置回退提示词
    pub system_prompt_path: Option<PathBuf>,
}

impl Default for AdvisorSection {
    fn default() -> Self {
        Self {
            provider: "mock".to_string(),
            model: "claude-sonnet-4-5-20250929".to_string(),
            max_tokens: 4096,
            base_url: "https://api.anthropic.com".to_string(),
            request_timeout_secs: 120,
            system_prompt_path: None,
        }
    }
}

/// [coordinator] 段：决策墙钟预算
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CoordinatorSection {
    /// 超过此预算即取消在途请求并落定终结批次（秒）
    pub decision_timeout_secs: u64,
}

impl Default for CoordinatorSection {
    fn default() -> Self {
        Self {
            decision_timeout_secs: 90,
        }
    }
}

/// [bridge] 段：同步总线参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BridgeSection {
    /// 字符串槽位值超过此字节数即走二级溢出存储
    pub long_value_threshold: usize,
}

impl Default for BridgeSection {
    fn default() -> Self {
        Self {
            long_value_threshold: 400,
        }
    }
}

/// 从 config 目录加载配置，环境变量 HEGEMON__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HEGEMON__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HEGEMON")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

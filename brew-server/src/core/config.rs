use std::collections::BTreeMap;
use std::path::PathBuf;

use shared::ItemCategory;

/// 原料消耗时机
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsumptionPolicy {
    /// 下单即扣减（预占）
    #[default]
    OnCreate,
    /// 订单首次整体完成时扣减
    OnComplete,
}

impl ConsumptionPolicy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "on_create" | "create" => Some(Self::OnCreate),
            "on_complete" | "complete" => Some(Self::OnComplete),
            _ => None,
        }
    }
}

/// 服务器配置
///
/// # 环境变量
///
/// 所有配置项都可以通过环境变量覆盖：
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | WORK_DIR | ./data | 工作目录 (数据库、日志) |
/// | HTTP_PORT | 3000 | HTTP 服务端口 |
/// | ENVIRONMENT | development | 运行环境 |
/// | DATABASE_URL | sqlite:<WORK_DIR>/brew.db | `memory` 使用内存存储 |
/// | LOG_LEVEL | info | 默认日志级别 (RUST_LOG 优先) |
/// | LOG_JSON | false | JSON 日志 |
/// | DEFAULT_DEVICE_ID | device-01 | 未指定设备时的兜底设备 |
/// | CATEGORY_DEVICE_MAP | (空) | 分类路由，如 `1:coffee-01,2:tea-01` |
/// | CONSUMPTION_POLICY | on_create | on_create / on_complete |
/// | SNAPSHOT_MAX_AGE_SECS | 0 | 快照过期秒数 (0 = 永不过期) |
/// | REQUEST_TIMEOUT_MS | 30000 | 请求超时(毫秒) |
///
/// # 示例
///
/// ```ignore
/// WORK_DIR=/data/brew HTTP_PORT=8080 CONSUMPTION_POLICY=on_complete cargo run
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// 工作目录
    pub work_dir: String,
    /// HTTP API 服务端口
    pub http_port: u16,
    /// 运行环境: development | production
    pub environment: String,
    /// 数据库连接串
    pub database_url: String,
    pub log_level: String,
    pub log_json: bool,
    /// 兜底设备
    pub default_device_id: String,
    /// 饮品分类 → 设备
    pub category_devices: BTreeMap<ItemCategory, String>,
    pub consumption_policy: ConsumptionPolicy,
    /// 快照过期秒数，0 表示不过期
    pub snapshot_max_age_secs: u64,
    /// 请求超时时间 (毫秒)
    pub request_timeout_ms: u64,
}

impl Config {
    /// 从环境变量加载配置
    ///
    /// 如果环境变量未设置，使用默认值
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 从任意键值来源加载配置，测试时传入闭包而不是修改进程环境
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let work_dir = lookup("WORK_DIR").unwrap_or_else(|| "./data".into());
        let database_url = lookup("DATABASE_URL")
            .unwrap_or_else(|| format!("sqlite:{}/brew.db", work_dir.trim_end_matches('/')));

        let consumption_policy = match lookup("CONSUMPTION_POLICY") {
            Some(raw) => ConsumptionPolicy::parse(&raw).unwrap_or_else(|| {
                tracing::warn!(value = %raw, "Unknown CONSUMPTION_POLICY, falling back to on_create");
                ConsumptionPolicy::OnCreate
            }),
            None => ConsumptionPolicy::OnCreate,
        };

        Self {
            http_port: lookup("HTTP_PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            environment: lookup("ENVIRONMENT").unwrap_or_else(|| "development".into()),
            database_url,
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".into()),
            log_json: lookup("LOG_JSON")
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
            default_device_id: lookup("DEFAULT_DEVICE_ID").unwrap_or_else(|| "device-01".into()),
            category_devices: lookup("CATEGORY_DEVICE_MAP")
                .map(|raw| parse_category_devices(&raw))
                .unwrap_or_default(),
            consumption_policy,
            snapshot_max_age_secs: lookup("SNAPSHOT_MAX_AGE_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            request_timeout_ms: lookup("REQUEST_TIMEOUT_MS")
                .and_then(|p| p.parse().ok())
                .unwrap_or(30000),
            work_dir,
        }
    }

    /// 测试用配置：内存存储 + 默认值
    pub fn for_tests() -> Self {
        Self::from_lookup(|key| match key {
            "DATABASE_URL" => Some("memory".into()),
            _ => None,
        })
    }

    /// 日志目录 (work_dir/logs)
    pub fn log_dir(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("logs")
    }

    /// 确保工作目录结构存在
    pub fn ensure_work_dir_structure(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.work_dir)?;
        std::fs::create_dir_all(self.log_dir())?;
        Ok(())
    }

    /// 是否生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// 是否开发环境
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

/// `1:coffee-01, 2:tea-01` → {Coffee: coffee-01, MilkTea: tea-01}
///
/// 无法解析的片段记 warn 后跳过。
fn parse_category_devices(raw: &str) -> BTreeMap<ItemCategory, String> {
    let mut map = BTreeMap::new();
    for entry in shared::util::split_codes(raw) {
        let parsed = entry.split_once(':').and_then(|(code, device)| {
            let category = code.trim().parse::<u8>().ok().and_then(ItemCategory::from_code)?;
            let device = device.trim();
            (!device.is_empty()).then(|| (category, device.to_string()))
        });
        match parsed {
            Some((category, device)) => {
                map.insert(category, device);
            }
            None => tracing::warn!(entry = %entry, "Ignoring malformed CATEGORY_DEVICE_MAP entry"),
        }
    }
    map
}

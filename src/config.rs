//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `BRIDGE__*` 覆盖
//! （双下划线表示嵌套，如 `BRIDGE__GACHA__ENDPOINT=https://...`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerSection,
    pub data: DataSection,
    pub gacha: GachaSection,
    pub tasks: TasksSection,
}

/// [server] 段：HTTP 监听地址
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub bind: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3000".to_string(),
        }
    }
}

/// [data] 段：数据目录布局
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DataSection {
    /// 任务文件与图片目录的根
    pub dir: PathBuf,
    /// 本地静态表（gacha_table.json / character_table.json）所在目录
    pub gamedata_dir: PathBuf,
}

impl Default for DataSection {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data"),
            gamedata_dir: PathBuf::from("data/gamedata"),
        }
    }
}

impl DataSection {
    pub fn tasks_file(&self) -> PathBuf {
        self.dir.join("tasks.json")
    }

    pub fn images_dir(&self) -> PathBuf {
        self.dir.join("images")
    }
}

/// [gacha] 段：远端表端点与缓存策略
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GachaSection {
    /// 服务端表端点，拉取 `<endpoint>/gacha_table.json`
    pub endpoint: String,
    #[serde(default = "default_cache_ttl_hours")]
    pub cache_ttl_hours: u64,
    /// 模拟器闲置淘汰（小时）。不设置则与原行为一致：永不淘汰
    pub executor_idle_hours: Option<u64>,
}

impl Default for GachaSection {
    fn default() -> Self {
        Self {
            endpoint: "https://weedy.prts.wiki".to_string(),
            cache_ttl_hours: default_cache_ttl_hours(),
            executor_idle_hours: None,
        }
    }
}

fn default_cache_ttl_hours() -> u64 {
    24
}

/// [tasks] 段：等待超时与保留策略
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TasksSection {
    /// `await_completion` 的默认超时（秒）
    #[serde(default = "default_await_timeout_secs")]
    pub await_timeout_secs: u64,
    /// 终态任务保留（小时）。不设置则与原行为一致：只增不删
    pub retention_hours: Option<u64>,
}

impl Default for TasksSection {
    fn default() -> Self {
        Self {
            await_timeout_secs: default_await_timeout_secs(),
            retention_hours: None,
        }
    }
}

fn default_await_timeout_secs() -> u64 {
    300
}

/// 从 config 目录加载配置，环境变量 BRIDGE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 BRIDGE__*（双下划线表示嵌套键）
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
        config::Environment::with_prefix("BRIDGE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

/// 重新从磁盘与环境变量加载配置（配置热更新由调用方决定是否重建组件）
pub fn reload_config() -> Result<AppConfig, config::ConfigError> {
    load_config(None)
}

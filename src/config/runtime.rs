use std::path::PathBuf;

/// 进程级运行参数（来自环境变量 / .env）
#[derive(Clone, Debug)]
pub struct RuntimeSettings {
    /// 声明式配置文件路径
    pub config_path: PathBuf,
    /// sqlite 数据库文件
    pub database_url: String,
    /// Chrome 可执行文件（为空时由 chromiumoxide 自动查找）
    pub chrome_executable: Option<PathBuf>,
    /// 浏览器用户数据根目录，每个用户一个子目录
    pub profile_root: PathBuf,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("config/scraper_config.toml"),
            database_url: "group_harvester.db".to_string(),
            chrome_executable: None,
            profile_root: std::env::temp_dir().join("group_harvester_profiles"),
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.deepseek.com/v1".to_string(),
            llm_model_name: "deepseek-chat".to_string(),
        }
    }
}

impl RuntimeSettings {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            config_path: std::env::var("SCRAPER_CONFIG").map(PathBuf::from).unwrap_or(default.config_path),
            database_url: std::env::var("DATABASE_URL").unwrap_or(default.database_url),
            chrome_executable: std::env::var("CHROME_EXECUTABLE").ok().filter(|v| !v.is_empty()).map(PathBuf::from),
            profile_root: std::env::var("BROWSER_PROFILE_ROOT").map(PathBuf::from).unwrap_or(default.profile_root),
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or(default.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(default.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(default.llm_model_name),
        }
    }
}

use crate::core::pubsub::DEFAULT_SOCKET_PATH;
use crate::domain::ports::ConfigProvider;
use crate::utils::error::{Result, SimError};
use crate::utils::validation::{
    validate_host, validate_path, validate_port, validate_positive_number, validate_url, Validate,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub pubsub: PubSubConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub host: String,
    pub port: u16,
    /// 第一個 simulton 的埠, 之後依序遞增
    pub base_port: u16,
    pub health_timeout_seconds: u64,
    pub shutdown_timeout_seconds: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9000,
            base_port: 9500,
            health_timeout_seconds: 10,
            shutdown_timeout_seconds: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PubSubConfig {
    pub socket_path: PathBuf,
}

impl Default for PubSubConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub verbose: bool,
    pub json: bool,
}

impl SimConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        if !path.as_ref().exists() {
            return Err(SimError::MissingConfigError {
                field: path.as_ref().display().to_string(),
            });
        }
        let content = std::fs::read_to_string(&path).map_err(SimError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| SimError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${SIM_PORT}), 未設定的變數保留原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| SimError::ConfigError {
            message: format!("Bad substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    /// CLI flags win over the file.
    pub fn apply_overrides(
        &mut self,
        host: Option<&str>,
        port: Option<u16>,
        base_port: Option<u16>,
        socket_path: Option<&Path>,
    ) {
        if let Some(host) = host {
            self.simulation.host = host.to_string();
        }
        if let Some(port) = port {
            self.simulation.port = port;
        }
        if let Some(base_port) = base_port {
            self.simulation.base_port = base_port;
        }
        if let Some(path) = socket_path {
            self.pubsub.socket_path = path.to_path_buf();
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.simulation.host, self.simulation.port)
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        validate_host("simulation.host", &self.simulation.host)?;
        validate_port("simulation.port", self.simulation.port)?;
        validate_port("simulation.base_port", self.simulation.base_port)?;
        validate_url("simulation", &self.base_url())?;

        if self.simulation.base_port == self.simulation.port {
            return Err(SimError::InvalidConfigValueError {
                field: "simulation.base_port".to_string(),
                value: self.simulation.base_port.to_string(),
                reason: "Simultons cannot share the simulation port".to_string(),
            });
        }

        validate_positive_number(
            "simulation.health_timeout_seconds",
            self.simulation.health_timeout_seconds,
            1,
        )?;
        validate_positive_number(
            "simulation.shutdown_timeout_seconds",
            self.simulation.shutdown_timeout_seconds,
            1,
        )?;

        let socket = self.pubsub.socket_path.to_string_lossy();
        validate_path("pubsub.socket_path", &socket)?;

        Ok(())
    }
}

impl ConfigProvider for SimConfig {
    fn host(&self) -> &str {
        &self.simulation.host
    }

    fn port(&self) -> u16 {
        self.simulation.port
    }

    fn base_port(&self) -> u16 {
        self.simulation.base_port
    }

    fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.simulation.health_timeout_seconds)
    }

    fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.simulation.shutdown_timeout_seconds)
    }

    fn socket_path(&self) -> &Path {
        &self.pubsub.socket_path
    }
}

impl Validate for SimConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

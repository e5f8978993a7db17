//! 配置模块，负责加载JSON配置文件

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// 引擎配置错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("配置文件不存在: {0}")]
    NotFound(String),
    #[error("无法读取配置文件 {path}: {reason}")]
    Unreadable { path: String, reason: String },
    #[error("无法解析JSON配置文件 {path}: {reason}")]
    Malformed { path: String, reason: String },
    #[error("配置项 {field} 无效: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// 可以被管理员关闭的功能, 关闭后相关字段与函数不可用
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureToggles {
    pub time_tracking: bool,
    pub voting: bool,
    pub watching: bool,
    pub subtasks: bool,
    pub attachments: bool,
}

impl Default for FeatureToggles {
    fn default() -> Self {
        Self { time_tracking: true, voting: true, watching: true, subtasks: true, attachments: true }
    }
}

/// 查询计划的优化开关
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationConfig {
    /// 把同一字段上 OR 连接的等值条件合并为一个取值集合
    pub merge_or_terms: bool,
    /// 删除 AND/OR 下重复的子节点
    pub remove_duplicates: bool,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self { merge_or_terms: true, remove_duplicates: true }
    }
}

/// 引擎配置结构
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 校验阶段最多收集的错误条数
    pub max_validation_errors: usize,
    /// 复杂度上限: 所有叶子子句的展开项之和
    pub max_query_terms: usize,
    /// 时间跟踪换算: 1d = hours_per_day 小时
    pub hours_per_day: u32,
    /// 时间跟踪换算: 1w = days_per_week 天
    pub days_per_week: u32,
    pub features: FeatureToggles,
    pub optimization: OptimizationConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_validation_errors: 10,
            max_query_terms: 65_000,
            hours_per_day: 8,
            days_per_week: 5,
            features: FeatureToggles::default(),
            optimization: OptimizationConfig::default(),
        }
    }
}

impl EngineConfig {
    /// 从JSON文件加载配置, 缺省的配置项使用默认值
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let shown = path_ref.display().to_string();

        // 检查文件是否存在
        if !path_ref.exists() {
            return Err(ConfigError::NotFound(shown));
        }

        // 读取文件内容
        let content = fs::read_to_string(path_ref).map_err(|e| ConfigError::Unreadable {
            path: shown.clone(),
            reason: e.to_string(),
        })?;

        let config = Self::from_json_str(&content).map_err(|e| match e {
            ConfigError::Malformed { reason, .. } => ConfigError::Malformed { path: shown.clone(), reason },
            other => other,
        })?;
        info!(path = %shown, "loaded engine configuration");
        Ok(config)
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(content).map_err(|e| ConfigError::Malformed {
            path: "<inline>".to_string(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        debug!(?config, "parsed engine configuration");
        Ok(config)
    }

    /// 加载配置文件, 文件不存在时回退到默认配置
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        match Self::from_json_file(path) {
            Err(ConfigError::NotFound(path)) => {
                info!(%path, "configuration file not found, using defaults");
                Ok(Self::default())
            }
            other => other,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.hours_per_day == 0 || self.hours_per_day > 24 {
            return Err(ConfigError::Invalid {
                field: "hours_per_day",
                reason: format!("{} is not between 1 and 24", self.hours_per_day),
            });
        }
        if self.days_per_week == 0 || self.days_per_week > 7 {
            return Err(ConfigError::Invalid {
                field: "days_per_week",
                reason: format!("{} is not between 1 and 7", self.days_per_week),
            });
        }
        if self.max_query_terms == 0 {
            return Err(ConfigError::Invalid {
                field: "max_query_terms",
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// 一天的分钟数 (时间跟踪口径)
    pub fn minutes_per_day(&self) -> i64 {
        i64::from(self.hours_per_day) * 60
    }

    pub fn minutes_per_week(&self) -> i64 {
        self.minutes_per_day() * i64::from(self.days_per_week)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_valid_json_config() {
        // 创建临时配置文件
        let temp_file = std::env::temp_dir().join("jql_engine_test_config.json");
        let mut file = fs::File::create(&temp_file).unwrap();
        writeln!(
            file,
            r#"{{
            "max_validation_errors": 3,
            "hours_per_day": 6,
            "features": {{ "voting": false }}
        }}"#
        )
        .unwrap();

        let config = EngineConfig::from_json_file(&temp_file).unwrap();
        assert_eq!(config.max_validation_errors, 3);
        assert_eq!(config.hours_per_day, 6);
        assert_eq!(config.days_per_week, 5);
        assert!(!config.features.voting);
        assert!(config.features.time_tracking);
        assert_eq!(config.minutes_per_day(), 360);

        // 清理
        fs::remove_file(&temp_file).ok();
    }

    #[test]
    fn test_invalid_json_config() {
        let result = EngineConfig::from_json_str("invalid json");
        assert!(matches!(result, Err(ConfigError::Malformed { .. })));
    }

    #[test]
    fn test_out_of_range_values() {
        let result = EngineConfig::from_json_str(r#"{ "hours_per_day": 0 }"#);
        assert!(matches!(result, Err(ConfigError::Invalid { field: "hours_per_day", .. })));
        let result = EngineConfig::from_json_str(r#"{ "days_per_week": 8 }"#);
        assert!(matches!(result, Err(ConfigError::Invalid { field: "days_per_week", .. })));
    }

    #[test]
    fn test_missing_file() {
        let result = EngineConfig::from_json_file("non_existent_file.json");
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
        let config = EngineConfig::load_or_default("non_existent_file.json").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.max_validation_errors, 10);
        assert_eq!(config.max_query_terms, 65_000);
        assert_eq!(config.minutes_per_week(), 5 * 8 * 60);
        assert!(config.optimization.merge_or_terms);
    }
}

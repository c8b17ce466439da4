//! 入站消息的强类型表示
//!
//! 上游消息没有固定 schema，字段按需提取：缺失或类型不符的字段取零值
//! （空字符串、0、空映射），而不是让整条消息失败。
//! 转换只在边界处发生一次，渲染逻辑只面对已校验的结构体。

use std::collections::HashMap;

use serde_json::{Map, Value, json};

use crate::error::{NotifierError, Result};

/// 漏洞汇总消息的 `type` 取值
pub const VULN_SUMMARY: &str = "vuln_summary";
/// 依赖更新消息的 `type` 取值
pub const PACKAGE_UPDATE: &str = "package_update";

// ---------------------------------------------------------------------------
// 通知属性
// ---------------------------------------------------------------------------

/// 通知内容类型，对应 notification.content_type 列
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    VulnSummary,
    PackageUpdate,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VulnSummary => VULN_SUMMARY,
            Self::PackageUpdate => PACKAGE_UPDATE,
        }
    }

    /// 收件人为空时是否放弃写入
    ///
    /// 漏洞汇总即使没有收件人也落库，依赖更新则整条跳过
    pub fn requires_recipients(&self) -> bool {
        matches!(self, Self::PackageUpdate)
    }
}

/// 通知级别，对应 notification.type 列
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

impl NotificationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

// ---------------------------------------------------------------------------
// 严重程度
// ---------------------------------------------------------------------------

/// 漏洞严重程度词表
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    None,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
        Severity::None,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "CRITICAL",
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
            Self::None => "NONE",
        }
    }

    /// 按标签精确匹配（区分大小写），词表外的标签返回 None
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == label)
    }
}

/// 各严重程度的漏洞数量，词表外的键被忽略，缺失的键为 0
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeverityCounts {
    counts: [i64; 5],
}

impl SeverityCounts {
    /// 从消息中的 `severity_counts` 字段构造
    pub fn from_value(value: Option<&Value>) -> Self {
        let mut counts = Self::default();
        let Some(map) = value.and_then(Value::as_object) else {
            return counts;
        };

        for (label, count) in map {
            if let (Some(severity), Some(n)) = (Severity::from_label(label), count.as_f64()) {
                counts.counts[severity as usize] = n as i64;
            }
        }
        counts
    }

    pub fn get(&self, severity: Severity) -> i64 {
        self.counts[severity as usize]
    }

    /// 固定包含五个键的 JSON 对象
    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = Severity::ALL
            .into_iter()
            .map(|s| (s.as_str().to_string(), json!(self.get(s))))
            .collect();
        Value::Object(map)
    }
}

// ---------------------------------------------------------------------------
// 消息
// ---------------------------------------------------------------------------

/// 漏洞汇总
#[derive(Debug, Clone, PartialEq)]
pub struct VulnSummary {
    pub organization_id: String,
    pub analysis_id: String,
    pub project_id: String,
    pub project_name: String,
    pub severity_counts: SeverityCounts,
    /// 原样保留上游给出的标签，词表外的值按最低级别处理
    pub max_severity: String,
    pub total: i64,
    /// 上游给出的 top 列表，不解析，原样写入通知内容
    pub top: Value,
}

impl VulnSummary {
    pub fn from_map(map: &Map<String, Value>) -> Self {
        Self {
            organization_id: str_field(map, "organization_id"),
            analysis_id: str_field(map, "analysis_id"),
            project_id: str_field(map, "project_id"),
            project_name: str_field(map, "project_name"),
            severity_counts: SeverityCounts::from_value(map.get("severity_counts")),
            max_severity: str_field(map, "max_severity"),
            total: int_field(map, "total"),
            top: map.get("top").cloned().unwrap_or(Value::Null),
        }
    }

    pub fn max_severity(&self) -> Option<Severity> {
        Severity::from_label(&self.max_severity)
    }
}

/// 依赖类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyType {
    Production,
    Development,
    Other,
}

impl DependencyType {
    pub fn from_label(label: &str) -> Self {
        match label {
            "production" => Self::Production,
            "development" => Self::Development,
            _ => Self::Other,
        }
    }
}

/// 依赖更新
///
/// 构造成功意味着组织、包名和前后版本都非空
#[derive(Debug, Clone, PartialEq)]
pub struct PackageUpdate {
    pub organization_id: String,
    pub analysis_id: String,
    pub project_id: String,
    pub project_name: String,
    pub package_name: String,
    pub current_version: String,
    pub new_version: String,
    /// 原始标签，写入通知内容时保持不变
    pub dependency_type: String,
    pub release_notes_url: String,
    pub project_count: i64,
}

impl PackageUpdate {
    pub fn from_map(map: &Map<String, Value>) -> Result<Self> {
        let update = Self {
            organization_id: str_field(map, "organization_id"),
            analysis_id: str_field(map, "analysis_id"),
            project_id: str_field(map, "project_id"),
            project_name: str_field(map, "project_name"),
            package_name: str_field(map, "package_name"),
            current_version: str_field(map, "current_version"),
            new_version: str_field(map, "new_version"),
            dependency_type: str_field(map, "dependency_type"),
            release_notes_url: str_field(map, "release_notes_url"),
            project_count: int_field(map, "project_count"),
        };

        let required = [
            ("organization_id", &update.organization_id),
            ("package_name", &update.package_name),
            ("current_version", &update.current_version),
            ("new_version", &update.new_version),
        ];
        if let Some((field, _)) = required.iter().find(|(_, value)| value.is_empty()) {
            return Err(NotifierError::Validation { field: *field });
        }

        Ok(update)
    }

    pub fn dependency(&self) -> DependencyType {
        DependencyType::from_label(&self.dependency_type)
    }
}

/// 旧版 package/version 消息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LegacyRequest {
    pub package: String,
    pub version: String,
    pub key: String,
}

impl LegacyRequest {
    pub fn from_map(mut map: HashMap<String, String>) -> Self {
        Self {
            package: map.remove("package").unwrap_or_default(),
            version: map.remove("version").unwrap_or_default(),
            key: map.remove("key").unwrap_or_default(),
        }
    }
}

/// 分类后的入站消息
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    VulnSummary(VulnSummary),
    PackageUpdate(PackageUpdate),
    Legacy(LegacyRequest),
}

impl InboundMessage {
    /// 消息类别标签，用于日志与指标
    pub fn kind(&self) -> &'static str {
        match self {
            Self::VulnSummary(_) => VULN_SUMMARY,
            Self::PackageUpdate(_) => PACKAGE_UPDATE,
            Self::Legacy(_) => "legacy",
        }
    }
}

// ---------------------------------------------------------------------------
// 字段提取
// ---------------------------------------------------------------------------

/// 提取字符串字段，缺失或非字符串时为空
fn str_field(map: &Map<String, Value>, key: &str) -> String {
    map.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_default()
}

/// 提取数值字段并向零截断，缺失或非数值时为 0
fn int_field(map: &Map<String, Value>, key: &str) -> i64 {
    map.get(key)
        .and_then(Value::as_f64)
        .map(|n| n as i64)
        .unwrap_or(0)
}

//! 通知内容渲染
//!
//! 根据消息类型生成通知的标题、描述、级别和结构化内容。
//! 渲染是纯函数，不访问存储；文案和分级规则是与前端约定的固定格式。

use serde_json::{Value, json};

use crate::payload::{
    ContentType, DependencyType, NotificationLevel, PackageUpdate, Severity, VulnSummary,
};

const VULN_SUMMARY_TITLE: &str = "Vulnerability summary";
const NO_VULNERABILITIES: &str = "No vulnerabilities found";

/// 待写入的通知
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub title: String,
    pub description: String,
    pub level: NotificationLevel,
    pub content_type: ContentType,
    /// 写入 jsonb 列的结构化内容，形状随内容类型而定
    pub content: Value,
}

// ---------------------------------------------------------------------------
// 漏洞汇总
// ---------------------------------------------------------------------------

/// 渲染漏洞汇总通知
pub fn render_vuln_summary(summary: &VulnSummary) -> NewNotification {
    NewNotification {
        title: VULN_SUMMARY_TITLE.to_string(),
        description: describe_vulnerabilities(summary),
        level: severity_level(summary.max_severity()),
        content_type: ContentType::VulnSummary,
        content: json!({
            "analysis_id": summary.analysis_id,
            "organization_id": summary.organization_id,
            "project_id": summary.project_id,
            "project_name": summary.project_name,
            "total": summary.total,
            "max_severity": summary.max_severity,
            "severity_counts": summary.severity_counts.to_json(),
            "top": summary.top,
        }),
    }
}

/// 最高严重程度到通知级别的映射，未知或缺失时为 info
pub fn severity_level(max_severity: Option<Severity>) -> NotificationLevel {
    match max_severity {
        Some(Severity::Critical | Severity::High) => NotificationLevel::Error,
        Some(Severity::Medium) => NotificationLevel::Warning,
        _ => NotificationLevel::Info,
    }
}

/// 漏洞汇总描述
///
/// 总数不大于 0 时只输出固定文案，不看各级计数。
/// 文案中只列出 Critical/High/Medium/Low 四档，NONE 不出现，因此四档之和不必等于总数。
pub fn describe_vulnerabilities(summary: &VulnSummary) -> String {
    if summary.total <= 0 {
        return NO_VULNERABILITIES.to_string();
    }

    let counts = &summary.severity_counts;
    let advice = match summary.max_severity() {
        Some(Severity::Critical | Severity::High) => "Immediate attention recommended.",
        Some(Severity::Medium) => "Plan remediation soon.",
        _ => "Monitor as needed.",
    };

    format!(
        "{} vulnerabilities (Critical: {}, High: {}, Medium: {}, Low: {}). Max severity: {}. {}",
        summary.total,
        counts.get(Severity::Critical),
        counts.get(Severity::High),
        counts.get(Severity::Medium),
        counts.get(Severity::Low),
        summary.max_severity,
        advice,
    )
}

// ---------------------------------------------------------------------------
// 依赖更新
// ---------------------------------------------------------------------------

/// 渲染依赖更新通知
pub fn render_package_update(update: &PackageUpdate) -> NewNotification {
    let package = &update.package_name;
    let (title, level) = match update.dependency() {
        DependencyType::Production => (
            format!("🔴 Production Update: {package}"),
            NotificationLevel::Warning,
        ),
        DependencyType::Development => {
            (format!("🟡 Dev Update: {package}"), NotificationLevel::Info)
        }
        DependencyType::Other => (
            format!("Update available: {package}"),
            NotificationLevel::Info,
        ),
    };

    NewNotification {
        title,
        description: describe_package_update(update),
        level,
        content_type: ContentType::PackageUpdate,
        content: json!({
            "analysis_id": update.analysis_id,
            "organization_id": update.organization_id,
            "project_id": update.project_id,
            "project_name": update.project_name,
            "package_name": update.package_name,
            "current_version": update.current_version,
            "new_version": update.new_version,
            "dependency_type": update.dependency_type,
            "project_count": update.project_count,
            "release_notes_url": update.release_notes_url,
        }),
    }
}

/// 依赖更新描述
///
/// 有项目名时追加 " in {项目}"；涉及多个项目时改为 " in {n} projects"
pub fn describe_package_update(update: &PackageUpdate) -> String {
    let subject = match update.dependency() {
        DependencyType::Production => format!("Production dependency {}", update.package_name),
        DependencyType::Development => format!("Development dependency {}", update.package_name),
        DependencyType::Other => update.package_name.clone(),
    };

    let mut description = format!(
        "{subject} can be updated from {} to {}",
        update.current_version, update.new_version
    );

    if !update.project_name.is_empty() {
        if update.project_count > 1 {
            description.push_str(&format!(" in {} projects", update.project_count));
        } else {
            description.push_str(&format!(" in {}", update.project_name));
        }
    }

    description
}

//! 消息分类
//!
//! 先按通用 JSON 对象解析并读取 `type` 字段分派到已知类型；
//! 类型缺失或未知时回退到旧版格式（全部为字符串值的对象）。
//! 两种解析都失败的消息视为解析失败，由调用方记录日志后丢弃。

use std::collections::HashMap;

use serde_json::Value;

use crate::error::{NotifierError, Result};
use crate::payload::{
    InboundMessage, LegacyRequest, PACKAGE_UPDATE, PackageUpdate, VULN_SUMMARY, VulnSummary,
};

/// 将原始消息体分类为强类型消息
pub fn classify(payload: &[u8]) -> Result<InboundMessage> {
    if let Ok(Value::Object(map)) = serde_json::from_slice::<Value>(payload) {
        match map.get("type").and_then(Value::as_str) {
            Some(VULN_SUMMARY) => {
                return Ok(InboundMessage::VulnSummary(VulnSummary::from_map(&map)));
            }
            Some(PACKAGE_UPDATE) => {
                return PackageUpdate::from_map(&map).map(InboundMessage::PackageUpdate);
            }
            _ => {}
        }
    }

    let legacy: HashMap<String, String> =
        serde_json::from_slice(payload).map_err(|e| NotifierError::Parse(e.to_string()))?;

    Ok(InboundMessage::Legacy(LegacyRequest::from_map(legacy)))
}

//! 旧版 package/version 消息
//!
//! 早期分发器只发送 `{package, version, key}` 三个字符串字段。
//! 对应的依赖分析钩子已不再生成通知，这里只记录请求与耗时后确认消费，
//! 不访问存储。

use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::payload::LegacyRequest;

/// 处理旧版请求，返回处理耗时
pub fn process(request: &LegacyRequest) -> Duration {
    let started = Instant::now();

    if request.package.is_empty() || request.version.is_empty() {
        warn!(
            package = %request.package,
            version = %request.version,
            key = %request.key,
            "旧版请求缺少 package 或 version"
        );
    }

    let elapsed = started.elapsed();
    info!(
        package = %request.package,
        version = %request.version,
        key = %request.key,
        elapsed_ms = elapsed.as_millis() as u64,
        "旧版请求处理完成"
    );
    elapsed
}

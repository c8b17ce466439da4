//! 收件人解析
//!
//! 按组织查询成员关系，返回去重后的用户 ID 列表。
//! 每条消息都实时查询，不做缓存；查询失败时整条消息中止，不使用部分结果。

use std::collections::HashSet;

use sqlx::PgPool;
use tracing::debug;

use crate::error::{NotifierError, Result};

/// 查询组织下的全部成员
pub async fn fetch_organization_members(
    pool: &PgPool,
    organization_id: &str,
) -> Result<Vec<String>> {
    if organization_id.is_empty() {
        return Err(NotifierError::Resolution {
            organization_id: String::new(),
            reason: "organization_id 为空".to_string(),
        });
    }

    let rows: Vec<Option<String>> = sqlx::query_scalar(
        r#"
        SELECT m."userId"::text
        FROM organization_memberships m
        WHERE m."organizationId"::text = $1
        ORDER BY m."userId"
        "#,
    )
    .bind(organization_id)
    .fetch_all(pool)
    .await
    .map_err(|e| NotifierError::Resolution {
        organization_id: organization_id.to_string(),
        reason: e.to_string(),
    })?;

    let members = normalize_members(rows.into_iter().flatten());
    debug!(organization_id, members = members.len(), "组织成员查询完成");

    Ok(members)
}

/// 过滤空 ID 并按首次出现顺序去重
pub fn normalize_members<I>(user_ids: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    user_ids
        .into_iter()
        .filter(|id| !id.is_empty())
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

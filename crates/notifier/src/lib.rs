//! 通知分发服务
//!
//! 从消息队列消费结构化事件，按声明的类型分类并渲染通知内容，
//! 然后在单个事务内写入通知及其收件人关联。
//! 收件人范围固定为一个组织的全部成员。

pub mod classifier;
pub mod consumer;
pub mod error;
pub mod legacy;
pub mod payload;
pub mod pipeline;
pub mod recipients;
pub mod renderer;
pub mod store;
pub mod writer;

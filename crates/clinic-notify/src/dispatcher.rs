//! 通知分发器
//!
//! 将诊所事件分发给应用内接收者和已注册的Webhook订阅。
//! 所有投递都是尽力而为：失败只记录日志和投递记录，不向调用方传播。

use crate::events::{ClinicEvent, ClinicEventType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// 投递状态
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum DeliveryStatus {
    Sent,   // 已发送
    Failed, // 发送失败
}

/// 通知投递记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: Uuid,
    pub event_id: String,
    pub event_type: ClinicEventType,
    pub recipient_id: Uuid,
    pub sent_at: chrono::DateTime<chrono::Utc>,
    pub status: DeliveryStatus,
    pub error_message: Option<String>,
}

/// Webhook订阅配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookSubscription {
    pub id: String,
    pub url: String,
    pub events: Vec<ClinicEventType>,
    pub secret: Option<String>,
    pub active: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub last_success: Option<chrono::DateTime<chrono::Utc>>,
    pub last_failure: Option<chrono::DateTime<chrono::Utc>>,
}

impl WebhookSubscription {
    pub fn new(url: String, events: Vec<ClinicEventType>, secret: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            url,
            events,
            secret,
            active: true,
            created_at: chrono::Utc::now(),
            last_success: None,
            last_failure: None,
        }
    }

    /// 检查是否对指定事件感兴趣
    pub fn is_interested_in(&self, event_type: &ClinicEventType) -> bool {
        self.active && self.events.contains(event_type)
    }

    /// 生成签名
    pub fn generate_signature(&self, payload: &str) -> Option<String> {
        use sha2::{Digest, Sha256};

        if let Some(secret) = &self.secret {
            let mut hasher = Sha256::new();
            hasher.update(payload);
            hasher.update(secret);
            Some(format!("sha256={:x}", hasher.finalize()))
        } else {
            None
        }
    }
}

/// 通知分发器
pub struct NotificationDispatcher {
    subscriptions: RwLock<HashMap<String, WebhookSubscription>>,
    records: RwLock<Vec<NotificationRecord>>,
    client: reqwest::Client,
}

impl NotificationDispatcher {
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            records: RwLock::new(Vec::new()),
            client: reqwest::Client::new(),
        }
    }

    /// 注册Webhook订阅
    pub async fn subscribe(&self, subscription: WebhookSubscription) -> String {
        let id = subscription.id.clone();
        info!("Registered webhook subscription {} for {}", id, subscription.url);
        self.subscriptions.write().await.insert(id.clone(), subscription);
        id
    }

    /// 取消Webhook订阅
    pub async fn unsubscribe(&self, subscription_id: &str) -> bool {
        self.subscriptions.write().await.remove(subscription_id).is_some()
    }

    /// 分发事件
    ///
    /// 先为每个应用内接收者写入投递记录，再向感兴趣的Webhook推送。
    /// 该方法从不失败，任何投递错误都在此处被吸收。
    pub async fn dispatch(&self, event: ClinicEvent) {
        debug!("Dispatching event {} ({})", event.id, event.event_type.as_str());

        // 应用内通知记录
        {
            let mut records = self.records.write().await;
            for recipient in &event.recipients {
                records.push(NotificationRecord {
                    id: Uuid::new_v4(),
                    event_id: event.id.clone(),
                    event_type: event.event_type.clone(),
                    recipient_id: recipient.user_id,
                    sent_at: chrono::Utc::now(),
                    status: DeliveryStatus::Sent,
                    error_message: None,
                });
            }
        }

        // Webhook推送
        let interested: Vec<WebhookSubscription> = {
            let subscriptions = self.subscriptions.read().await;
            subscriptions
                .values()
                .filter(|s| s.is_interested_in(&event.event_type))
                .cloned()
                .collect()
        };

        for subscription in interested {
            if let Err(e) = self.deliver_webhook(&subscription, &event).await {
                warn!(
                    "Webhook delivery to {} failed for event {}: {}",
                    subscription.url, event.id, e
                );
                self.mark_failure(&subscription.id).await;
            } else {
                self.mark_success(&subscription.id).await;
            }
        }
    }

    /// 向单个订阅推送事件
    async fn deliver_webhook(
        &self,
        subscription: &WebhookSubscription,
        event: &ClinicEvent,
    ) -> anyhow::Result<()> {
        let payload = serde_json::to_string(event)?;

        let mut request = self
            .client
            .post(&subscription.url)
            .header("Content-Type", "application/json")
            .header("X-Clinic-Event", event.event_type.as_str());

        if let Some(signature) = subscription.generate_signature(&payload) {
            request = request.header("X-Clinic-Signature", signature);
        }

        let response = request.body(payload).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("Webhook returned status {}", response.status());
        }

        Ok(())
    }

    async fn mark_success(&self, subscription_id: &str) {
        let mut subscriptions = self.subscriptions.write().await;
        if let Some(subscription) = subscriptions.get_mut(subscription_id) {
            subscription.last_success = Some(chrono::Utc::now());
        }
    }

    async fn mark_failure(&self, subscription_id: &str) {
        let mut subscriptions = self.subscriptions.write().await;
        if let Some(subscription) = subscriptions.get_mut(subscription_id) {
            subscription.last_failure = Some(chrono::Utc::now());
        }
    }

    /// 查询某个接收者的通知记录
    pub async fn records_for(&self, recipient_id: Uuid) -> Vec<NotificationRecord> {
        self.records
            .read()
            .await
            .iter()
            .filter(|record| record.recipient_id == recipient_id)
            .cloned()
            .collect()
    }

    /// 通知记录总数
    pub async fn record_count(&self) -> usize {
        self.records.read().await.len()
    }
}

impl Default for NotificationDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

use crate::domain::notification::Notification;
use crate::domain::ports::PushTransport;
use crate::error::Result;
use async_trait::async_trait;

/// Push transport that only records deliveries in the log.
///
/// Stands in for a device push service when none is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPushTransport;

#[async_trait]
impl PushTransport for LogPushTransport {
    async fn deliver(&self, notification: &Notification) -> Result<()> {
        tracing::info!(
            user_id = %notification.user_id,
            notification_id = %notification.meta.id,
            title = %notification.title,
            "push delivered"
        );
        Ok(())
    }
}

use anyhow::{anyhow, bail, Result};
use lapin::{
    options::*, types::FieldTable, BasicProperties, Channel, Connection, ConnectionProperties,
    Consumer,
};
use lapin::publisher_confirm::Confirmation;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

struct Link {
    // Kept alive for as long as the channel is in use.
    _conn: Connection,
    channel: Channel,
}

/// Only a broker ack counts as delivered; `NotRequested` means confirms
/// were never enabled on the channel.
fn ensure_acked(confirmation: &Confirmation, queue: &str) -> Result<()> {
    match confirmation {
        Confirmation::Ack(_) => Ok(()),
        Confirmation::Nack(_) => bail!("Broker rejected the message for '{}'", queue),
        Confirmation::NotRequested => bail!("Publisher confirms are not enabled for '{}'", queue),
    }
}

#[derive(Clone)]
pub struct RabbitMqService {
    url: String,
    link: Arc<Mutex<Option<Link>>>,
}

impl RabbitMqService {
    async fn connect(url: &str) -> Result<Link> {
        info!("Connecting to RabbitMQ at {}", url);
        let conn = Connection::connect(url, ConnectionProperties::default())
            .await
            .map_err(|e| anyhow!("Failed to connect to RabbitMQ: {}", e))?;

        let channel = conn
            .create_channel()
            .await
            .map_err(|e| anyhow!("Failed to create channel: {}", e))?;

        // Publishes resolve once the broker has acked them.
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| anyhow!("Failed to enable publisher confirms: {}", e))?;

        info!("Connected to RabbitMQ");
        Ok(Link { _conn: conn, channel })
    }

    pub async fn new(url: &str) -> Result<Self> {
        let link = Self::connect(url).await?;

        Ok(Self {
            url: url.to_string(),
            link: Arc::new(Mutex::new(Some(link))),
        })
    }

    /// Service that connects on first publish or consume.
    #[cfg(test)]
    pub fn lazy(url: &str) -> Self {
        Self {
            url: url.to_string(),
            link: Arc::new(Mutex::new(None)),
        }
    }

    async fn channel(&self) -> Result<Channel> {
        let mut guard = self.link.lock().await;
        match guard.as_ref() {
            Some(link) if link.channel.status().connected() => Ok(link.channel.clone()),
            _ => {
                if guard.is_some() {
                    warn!("RabbitMQ connection dropped, reconnecting...");
                }
                let link = Self::connect(&self.url).await?;
                let channel = link.channel.clone();
                *guard = Some(link);
                Ok(channel)
            }
        }
    }

    async fn reset(&self) {
        *self.link.lock().await = None;
    }

    async fn declare_durable(channel: &Channel, queue: &str) -> Result<()> {
        channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| anyhow!("Failed to declare queue: {}", e))?;
        Ok(())
    }

    async fn publish_internal(&self, queue: &str, payload: &[u8]) -> Result<()> {
        let channel = self.channel().await?;
        Self::declare_durable(&channel, queue).await?;

        let confirmation = channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default().with_delivery_mode(2), // Persistent
            )
            .await
            .map_err(|e| anyhow!("Failed to publish message: {}", e))?
            .await
            .map_err(|e| anyhow!("Failed to confirm publication: {}", e))?;

        ensure_acked(&confirmation, queue)
    }

    pub async fn publish(&self, queue: &str, payload: &[u8]) -> Result<()> {
        if let Err(e) = self.publish_internal(queue, payload).await {
            warn!("RabbitMQ publish failed: {}. Retrying after reconnect.", e);
            self.reset().await;
            self.publish_internal(queue, payload).await?;
        }

        Ok(())
    }

    /// Durable consumer with manual acks and at most `prefetch` unacked deliveries.
    pub async fn consume(
        &self,
        queue: &str,
        consumer_tag: &str,
        prefetch: u16,
    ) -> Result<Consumer> {
        let channel = self.channel().await?;
        Self::declare_durable(&channel, queue).await?;

        channel
            .basic_qos(prefetch, BasicQosOptions::default())
            .await
            .map_err(|e| anyhow!("Failed to set prefetch: {}", e))?;

        channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| anyhow!("Failed to create consumer: {}", e))
    }
}

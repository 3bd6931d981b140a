pub mod webhook;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::models::delivery::{DeliveryRequest, DeliveryStatus, Priority};
use crate::models::driver::Driver;
use crate::models::tracking::format_timestamp;
use crate::observability::metrics::Metrics;

#[derive(Clone, Debug)]
pub struct NotificationEvent {
    pub title: String,
    pub tracking_id: String,
    pub timestamp: DateTime<Utc>,
    pub fields: Vec<(String, String)>,
}

impl NotificationEvent {
    fn for_delivery(title: impl Into<String>, delivery: &DeliveryRequest) -> Self {
        Self {
            title: title.into(),
            tracking_id: delivery.tracking_id.clone(),
            timestamp: Utc::now(),
            fields: Vec::new(),
        }
    }

    fn field(mut self, key: &str, value: impl Into<String>) -> Self {
        self.fields.push((key.to_string(), value.into()));
        self
    }

    pub fn request_created(delivery: &DeliveryRequest) -> Self {
        let title = match delivery.priority {
            Priority::Urgent => "URGENT delivery request",
            Priority::Normal => "New delivery request",
        };

        let mut event = Self::for_delivery(title, delivery)
            .field("Requester", delivery.requester_name.clone())
            .field("Package", delivery.package_type.clone())
            .field("Pickup", delivery.pickup_location.clone())
            .field("Delivery", delivery.delivery_location.clone())
            .field("Priority", delivery.priority.as_str());

        if let Some(company) = &delivery.company_name {
            event = event.field("Company", company.clone());
        }
        event
    }

    pub fn status_changed(delivery: &DeliveryRequest, from: DeliveryStatus) -> Self {
        let mut event = Self::for_delivery("Delivery status changed", delivery)
            .field("From", from.label())
            .field("To", delivery.status.label());

        if let Some(update) = delivery.latest_update() {
            event = event
                .field("Location", update.location.clone())
                .field("At", update.display_timestamp());
        }
        event
    }

    pub fn driver_assigned(delivery: &DeliveryRequest, driver: &Driver) -> Self {
        Self::for_delivery("Driver assigned", delivery)
            .field("Driver", driver.name.clone())
            .field("Pickup", delivery.pickup_location.clone())
    }

    pub fn proof_uploaded(delivery: &DeliveryRequest) -> Self {
        Self::for_delivery("Proof of delivery uploaded", delivery).field(
            "Photo",
            delivery.proof_photo_url.clone().unwrap_or_default(),
        )
    }

    pub fn display_timestamp(&self) -> String {
        format_timestamp(&self.timestamp)
    }
}

#[async_trait]
pub trait NotificationProvider: Send + Sync {
    async fn send(&self, event: &NotificationEvent) -> Result<()>;
    fn provider_name(&self) -> &'static str;
}

/// Best-effort fan-out. Events go through a bounded queue to a single worker
/// task; a full queue drops the event.
#[derive(Clone)]
pub struct Notifier {
    tx: Option<mpsc::Sender<NotificationEvent>>,
    metrics: Metrics,
}

impl Notifier {
    pub fn new(
        providers: Vec<Arc<dyn NotificationProvider>>,
        queue_size: usize,
        metrics: Metrics,
    ) -> Self {
        if providers.is_empty() {
            return Self::disabled(metrics);
        }

        let (tx, mut rx) = mpsc::channel::<NotificationEvent>(queue_size.max(1));
        let worker_metrics = metrics.clone();

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                for provider in &providers {
                    match provider.send(&event).await {
                        Ok(()) => {
                            worker_metrics
                                .notifications_total
                                .with_label_values(&["sent"])
                                .inc();
                        }
                        Err(error) => {
                            worker_metrics
                                .notifications_total
                                .with_label_values(&["failed"])
                                .inc();
                            warn!(
                                provider = provider.provider_name(),
                                tracking_id = %event.tracking_id,
                                error = %error,
                                "notification provider failed"
                            );
                        }
                    }
                }
            }
        });

        Self {
            tx: Some(tx),
            metrics,
        }
    }

    pub fn disabled(metrics: Metrics) -> Self {
        Self { tx: None, metrics }
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    pub fn try_notify(&self, event: NotificationEvent) {
        let Some(tx) = &self.tx else {
            debug!(tracking_id = %event.tracking_id, "notifications disabled; skipping event");
            return;
        };

        match tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.metrics
                    .notifications_total
                    .with_label_values(&["dropped"])
                    .inc();
                warn!("notification queue full; dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.metrics
                    .notifications_total
                    .with_label_values(&["dropped"])
                    .inc();
                warn!("notification queue closed; dropping event");
            }
        }
    }
}

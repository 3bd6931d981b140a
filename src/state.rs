use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::info;
use uuid::Uuid;

use crate::config::Config;
use crate::engine::simulation::SimulationHandle;
use crate::error::AppError;
use crate::models::delivery::DeliveryRequest;
use crate::models::driver::Driver;
use crate::models::tracking::TrackingEvent;
use crate::notify::webhook::ChatWebhookClient;
use crate::notify::{NotificationProvider, Notifier};
use crate::observability::metrics::Metrics;
use crate::payments::stripe::StripeClient;
use crate::payments::PaymentGateway;
use crate::storage::memory::MemoryPhotoStore;
use crate::storage::supabase::{SupabaseStorageClient, SupabaseStorageConfig};
use crate::storage::PhotoStore;

pub struct AppState {
    pub config: Config,
    pub deliveries: DashMap<Uuid, DeliveryRequest>,
    pub tracking_index: DashMap<String, Uuid>,
    pub drivers: DashMap<Uuid, Driver>,
    pub otp_secrets: DashMap<String, String>,
    pub simulations: DashMap<Uuid, SimulationHandle>,
    pub tracking_events_tx: broadcast::Sender<TrackingEvent>,
    pub notifier: Notifier,
    pub chat_webhook: Option<Arc<ChatWebhookClient>>,
    pub payments: Option<Arc<dyn PaymentGateway>>,
    pub photos: Arc<dyn PhotoStore>,
    pub metrics: Metrics,
}

pub struct Services {
    pub chat_webhook: Option<Arc<ChatWebhookClient>>,
    pub payments: Option<Arc<dyn PaymentGateway>>,
    pub photos: Arc<dyn PhotoStore>,
}

impl Services {
    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        let chat_webhook = match &config.chat_webhook_url {
            Some(url) => Some(Arc::new(ChatWebhookClient::new(url.clone()).map_err(
                |err| AppError::Internal(format!("chat webhook setup failed: {err}")),
            )?)),
            None => None,
        };

        let payments: Option<Arc<dyn PaymentGateway>> = match &config.stripe_secret_key {
            Some(key) => Some(Arc::new(
                StripeClient::new(key.clone(), config.stripe_api_base.clone())
                    .map_err(|err| AppError::Internal(format!("stripe setup failed: {err}")))?,
            )),
            None => None,
        };

        let photos: Arc<dyn PhotoStore> =
            match (&config.storage_url, &config.storage_service_key) {
                (Some(endpoint), Some(service_key)) => {
                    Arc::new(
                        SupabaseStorageClient::new(SupabaseStorageConfig {
                            endpoint: endpoint.clone(),
                            service_key: service_key.clone(),
                            bucket: config.storage_bucket.clone(),
                        })
                        .map_err(|err| {
                            AppError::Internal(format!("storage setup failed: {err}"))
                        })?,
                    )
                }
                _ => Arc::new(MemoryPhotoStore::new(config.storage_bucket.clone())),
            };

        Ok(Self {
            chat_webhook,
            payments,
            photos,
        })
    }
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, AppError> {
        let services = Services::from_config(&config)?;
        Ok(Self::with_services(config, services))
    }

    // The notifier spawns its worker, so this needs a tokio runtime.
    pub fn with_services(config: Config, services: Services) -> Self {
        let (tracking_events_tx, _unused_rx) = broadcast::channel(config.event_buffer_size.max(1));
        let metrics = Metrics::new();

        let providers: Vec<Arc<dyn NotificationProvider>> = services
            .chat_webhook
            .iter()
            .map(|client| client.clone() as Arc<dyn NotificationProvider>)
            .collect();
        let notifier = Notifier::new(providers, config.notification_queue_size, metrics.clone());

        info!(
            notifications = notifier.is_enabled(),
            payments = services.payments.is_some(),
            photo_store = services.photos.backend_name(),
            "application state initialised"
        );

        Self {
            config,
            deliveries: DashMap::new(),
            tracking_index: DashMap::new(),
            drivers: DashMap::new(),
            otp_secrets: DashMap::new(),
            simulations: DashMap::new(),
            tracking_events_tx,
            notifier,
            chat_webhook: services.chat_webhook,
            payments: services.payments,
            photos: services.photos,
            metrics,
        }
    }

    pub fn publish(&self, delivery: &DeliveryRequest) {
        let _ = self.tracking_events_tx.send(delivery.to_event());
    }
}

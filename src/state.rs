use crate::auth::{LogNotifier, OtpNotifier};
use crate::chat::{Responder, RuleBasedResponder};
use crate::config::{AppConfig, JwtConfig, StoreBackend};
use crate::store::{self, MemoryStore, Store};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Arc<AppConfig>,
    pub notifier: Arc<dyn OtpNotifier>,
    pub responder: Arc<dyn Responder>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);
        let store = store::open(&config.store).await?;

        Ok(Self {
            store,
            config,
            notifier: Arc::new(LogNotifier),
            responder: Arc::new(RuleBasedResponder),
        })
    }

    pub fn from_parts(
        store: Arc<dyn Store>,
        config: Arc<AppConfig>,
        notifier: Arc<dyn OtpNotifier>,
        responder: Arc<dyn Responder>,
    ) -> Self {
        Self {
            store,
            config,
            notifier,
            responder,
        }
    }

    /// In-memory state with fixed JWT settings.
    pub fn fake() -> Self {
        let config = Arc::new(AppConfig {
            store: StoreBackend::Memory,
            jwt: JwtConfig {
                secret: "test-secret".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_minutes: 60 * 24 * 7,
                reset_ttl_minutes: 15,
            },
            otp_ttl_minutes: 10,
        });

        Self::from_parts(
            Arc::new(MemoryStore::new()),
            config,
            Arc::new(LogNotifier),
            Arc::new(RuleBasedResponder),
        )
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn OtpNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_responder(mut self, responder: Arc<dyn Responder>) -> Self {
        self.responder = responder;
        self
    }
}

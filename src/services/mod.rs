pub mod boxes;
pub mod callbacks;
pub mod clients;
pub mod events;
pub mod gateway;
pub mod init;
pub mod publish;
pub mod push;
pub mod retry;

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted collaborators for service-level tests: a gateway whose
    //! outcomes are queued per call, and an events sink that records what it
    //! is asked to publish.

    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;

    use crate::config::Config;
    use crate::crypto::MessageCipher;
    use crate::error::{AppError, AppResult};
    use crate::services::events::{CallbackUrlUpdatedEvent, EventPublisher};
    use crate::services::gateway::{
        CallbackProbeOutcome, NotificationGateway, OutboundNotification, PushOutcome,
    };
    use crate::AppState;

    #[derive(Default)]
    pub(crate) struct ScriptedGateway {
        pub notify_outcomes: Mutex<VecDeque<PushOutcome>>,
        pub notify_calls: Mutex<Vec<OutboundNotification>>,
        pub probe_outcomes: Mutex<VecDeque<CallbackProbeOutcome>>,
        pub probe_calls: Mutex<Vec<String>>,
    }

    impl ScriptedGateway {
        /// A gateway that delivers everything and validates every URL.
        pub fn delivering() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn script_notify(self: &Arc<Self>, outcomes: impl IntoIterator<Item = PushOutcome>) {
            self.notify_outcomes.lock().unwrap().extend(outcomes);
        }

        pub fn script_probe(
            self: &Arc<Self>,
            outcomes: impl IntoIterator<Item = CallbackProbeOutcome>,
        ) {
            self.probe_outcomes.lock().unwrap().extend(outcomes);
        }

        pub fn notify_count(&self) -> usize {
            self.notify_calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl NotificationGateway for ScriptedGateway {
        async fn notify(&self, outbound: OutboundNotification) -> PushOutcome {
            self.notify_calls.lock().unwrap().push(outbound);
            self.notify_outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(PushOutcome::Delivered)
        }

        async fn validate_callback(&self, callback_url: &str) -> CallbackProbeOutcome {
            self.probe_calls.lock().unwrap().push(callback_url.to_string());
            self.probe_outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(CallbackProbeOutcome::Valid)
        }
    }

    #[derive(Default)]
    pub(crate) struct RecordingEvents {
        pub published: Mutex<Vec<CallbackUrlUpdatedEvent>>,
        pub fail: bool,
    }

    impl RecordingEvents {
        pub fn working() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn failing() -> Arc<Self> {
            Arc::new(Self {
                fail: true,
                ..Self::default()
            })
        }

        pub fn count(&self) -> usize {
            self.published.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl EventPublisher for RecordingEvents {
        async fn publish_callback_updated(
            &self,
            event: &CallbackUrlUpdatedEvent,
        ) -> AppResult<()> {
            self.published.lock().unwrap().push(event.clone());
            if self.fail {
                Err(AppError::Internal(anyhow::anyhow!("events sink is down")))
            } else {
                Ok(())
            }
        }
    }

    pub(crate) async fn test_state(
        gateway: Arc<dyn NotificationGateway>,
        events: Arc<dyn EventPublisher>,
    ) -> Arc<AppState> {
        test_state_with_config(Config::default(), gateway, events).await
    }

    pub(crate) async fn test_state_with_config(
        mut config: Config,
        gateway: Arc<dyn NotificationGateway>,
        events: Arc<dyn EventPublisher>,
    ) -> Arc<AppState> {
        config.notifications.encryption_key_base64 = BASE64.encode([7u8; 32]);
        let cipher = MessageCipher::from_base64_key(&config.notifications.encryption_key_base64)
            .unwrap();
        Arc::new(AppState {
            db: crate::db::repository::test_pool().await,
            config,
            cipher,
            gateway,
            events,
        })
    }
}

pub mod issued_items;
pub mod items;
pub mod logs;
pub mod notifications;
pub mod repairs;
pub mod requests;

use std::sync::Arc;

use crate::{
    config::AppConfig,
    db::DbPool,
    events::EventSender,
    notifications::{ChannelPublisher, FanoutPolicy, NotificationDispatcher},
    services::{
        ActivityLogService, IssuanceService, ItemService, NotificationService, RepairService,
        RequestService, SerialNumberAllocator,
    },
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub requests: Arc<RequestService>,
    pub repairs: Arc<RepairService>,
    pub issuance: Arc<IssuanceService>,
    pub notifications: Arc<NotificationService>,
    pub items: Arc<ItemService>,
    pub logs: Arc<ActivityLogService>,
    pub dispatcher: NotificationDispatcher,
}

impl AppServices {
    /// Wires every service against one pool, event channel and live publisher
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: EventSender,
        publisher: Arc<dyn ChannelPublisher>,
        config: &AppConfig,
    ) -> Self {
        let policy = Arc::new(FanoutPolicy::standard(&config.lifecycle));
        let dispatcher = NotificationDispatcher::new(db_pool.clone(), publisher, policy);

        let issuance = IssuanceService::new(
            db_pool.clone(),
            SerialNumberAllocator::new(&config.serial),
            dispatcher.clone(),
            event_sender.clone(),
        );
        let requests = RequestService::new(
            db_pool.clone(),
            issuance.clone(),
            dispatcher.clone(),
            event_sender.clone(),
            config.lifecycle.clone(),
        );
        let repairs = RepairService::new(
            db_pool.clone(),
            issuance.clone(),
            dispatcher.clone(),
            event_sender.clone(),
        );
        let notifications = NotificationService::new(db_pool.clone(), event_sender.clone());
        let items = ItemService::new(db_pool.clone(), dispatcher.clone(), event_sender);
        let logs = ActivityLogService::new(db_pool);

        Self {
            requests: Arc::new(requests),
            repairs: Arc::new(repairs),
            issuance: Arc::new(issuance),
            notifications: Arc::new(notifications),
            items: Arc::new(items),
            logs: Arc::new(logs),
            dispatcher,
        }
    }
}

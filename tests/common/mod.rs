#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Method, Request},
    middleware,
    response::Response,
    Router,
};
use chrono::Utc;
use equipment_tracker::{
    auth::{CurrentUser, Role, USER_ID_HEADER},
    config::AppConfig,
    db,
    entities::{item, user},
    events::{self, EventSender},
    handlers::AppServices,
    notifications::{ChannelPublisher, InMemoryChannelPublisher},
    AppState,
};
use sea_orm::{ActiveModelTrait, Set};
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

pub const UNIT: &str = "Alpha";

/// One seeded user per role
pub struct Users {
    pub unit_leader: user::Model,
    pub admin: user::Model,
    pub logistics_officer: user::Model,
    pub system_admin: user::Model,
}

/// Application harness backed by an in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub hub: Arc<InMemoryChannelPublisher>,
    pub users: Users,
    pub item: item::Model,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::build(|_| {}, None).await
    }

    /// Harness with a tweaked configuration
    pub async fn with_config(configure: impl FnOnce(&mut AppConfig)) -> Self {
        Self::build(configure, None).await
    }

    /// Harness whose live deliveries go through `publisher` instead of the hub
    pub async fn with_publisher(publisher: Arc<dyn ChannelPublisher>) -> Self {
        Self::build(|_| {}, Some(publisher)).await
    }

    async fn build(
        configure: impl FnOnce(&mut AppConfig),
        publisher: Option<Arc<dyn ChannelPublisher>>,
    ) -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        // A single connection keeps every query on the same in-memory database.
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        configure(&mut cfg);

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx, db_arc.clone()));

        let hub = Arc::new(InMemoryChannelPublisher::new());
        let publisher = publisher.unwrap_or_else(|| hub.clone() as Arc<dyn ChannelPublisher>);
        let services = AppServices::new(db_arc.clone(), event_sender.clone(), publisher, &cfg);

        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
        };

        let users = Users {
            unit_leader: seed_user(&state, "leader", Role::UnitLeader).await,
            admin: seed_user(&state, "admin", Role::Admin).await,
            logistics_officer: seed_user(&state, "logistics", Role::LogisticsOfficer).await,
            system_admin: seed_user(&state, "sysadmin", Role::SystemAdmin).await,
        };

        let item = seed_item(&state, "First Aid Kit", "Medical Supplies", 10).await;

        let router = equipment_tracker::app_router(state.clone()).layer(middleware::from_fn(
            equipment_tracker::tracing::request_id_middleware,
        ));

        Self {
            router,
            state,
            hub,
            users,
            item,
            _event_task: event_task,
        }
    }

    pub fn actor(&self, model: &user::Model) -> CurrentUser {
        CurrentUser::from(model)
    }

    pub fn leader(&self) -> CurrentUser {
        self.actor(&self.users.unit_leader)
    }

    pub fn admin(&self) -> CurrentUser {
        self.actor(&self.users.admin)
    }

    pub fn officer(&self) -> CurrentUser {
        self.actor(&self.users.logistics_officer)
    }

    pub fn sysadmin(&self) -> CurrentUser {
        self.actor(&self.users.system_admin)
    }

    pub async fn add_user(&self, username: &str, role: Role, unit: Option<&str>) -> user::Model {
        insert_user(&self.state, username, role, unit).await
    }

    pub async fn add_item(&self, name: &str, category: &str, quantity: i32) -> item::Model {
        seed_item(&self.state, name, category, quantity).await
    }

    /// Sends a request through the full router as `user_id`
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        user_id: Option<Uuid>,
        body: Option<Value>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user_id) = user_id {
            builder = builder.header(USER_ID_HEADER, user_id.to_string());
        }

        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .expect("request"),
            None => builder.body(Body::empty()).expect("request"),
        };

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router response")
    }
}

async fn seed_user(state: &AppState, username: &str, role: Role) -> user::Model {
    insert_user(state, username, role, Some(UNIT)).await
}

async fn insert_user(state: &AppState, username: &str, role: Role, unit: Option<&str>) -> user::Model {
    user::ActiveModel {
        id: Set(Uuid::new_v4()),
        username: Set(username.to_string()),
        role: Set(role),
        unit: Set(unit.map(str::to_string)),
        department: Set(None),
        created_at: Set(Utc::now()),
    }
    .insert(&*state.db)
    .await
    .expect("seed user")
}

async fn seed_item(state: &AppState, name: &str, category: &str, quantity: i32) -> item::Model {
    item::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        category: Set(category.to_string()),
        quantity: Set(quantity),
        status: Set(item::ItemStatus::Available),
        expiration_date: Set(None),
        assigned_to: Set(None),
        created_at: Set(Utc::now()),
        updated_at: Set(None),
    }
    .insert(&*state.db)
    .await
    .expect("seed item")
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

//! In-memory `AppState` for handler tests.

use std::sync::Arc;

use axum::http::{header::AUTHORIZATION, HeaderName, HeaderValue};
use axum_test::{TestRequest, TestServer};
use tokio::sync::mpsc;

use super::{
    auth::{issue_token, session_ttl, DEVICE_KEY_HEADER, SERVICE_KEY_HEADER},
    router, AppState,
};
use crate::{
    chat::{classifier::Classifier, client::CompletionClient, tests::FakeLlm, ChatGateway},
    commands::{memory::MemoryCommandStore, CommandQueue},
    config::AuthConfig,
    notify::MoistureAlert,
    reports::{memory::MemoryReportStore, ReportService},
    telemetry::{memory::MemoryTelemetryStore, tests::ChannelNotifier, IngestService},
    users::{memory::MemoryUserStore, Role, UserService},
};

pub(crate) const JWT_SECRET: &str = "test-jwt-secret";
pub(crate) const DEVICE_KEY: &str = "test-device-key";
pub(crate) const SERVICE_KEY: &str = "test-service-key";
pub(crate) const SERVICE_USER_ID: i64 = 0;

pub(crate) struct Harness {
    pub server: TestServer,
    pub commands: Arc<MemoryCommandStore>,
    pub telemetry: Arc<MemoryTelemetryStore>,
    pub users: UserService,
    pub user_store: Arc<MemoryUserStore>,
    pub llm: Arc<FakeLlm>,
    pub alerts: mpsc::UnboundedReceiver<MoistureAlert>,
}

impl Harness {
    pub fn new() -> Self {
        let auth = Arc::new(AuthConfig {
            jwt_secret: JWT_SECRET.into(),
            device_api_key: DEVICE_KEY.into(),
            service_api_key: SERVICE_KEY.into(),
            service_user_id: SERVICE_USER_ID,
            service_user_role: Role::User,
        });

        let commands = Arc::new(MemoryCommandStore::default());
        let telemetry = Arc::new(MemoryTelemetryStore::default());
        let user_store = Arc::new(MemoryUserStore::default());
        let llm = Arc::new(FakeLlm::default());
        let (tx, alerts) = mpsc::unbounded_channel();

        let queue = CommandQueue::new(commands.clone(), telemetry.clone());
        let users = UserService::new(user_store.clone());
        let ingest = IngestService::new(
            telemetry.clone(),
            Arc::new(ChannelNotifier(tx)),
            "gh-1",
            20.0,
        );
        let reports = ReportService::new(
            Arc::new(MemoryReportStore::new(
                telemetry.clone(),
                commands.clone(),
                user_store.clone(),
            )),
            0.24,
        );
        let chat = ChatGateway::new(
            Classifier::standard().unwrap(),
            telemetry.clone(),
            Some(llm.clone() as Arc<dyn CompletionClient>),
        );

        let state = AppState {
            auth,
            users: users.clone(),
            source: Arc::new(queue.clone()),
            queue,
            ingest,
            reports,
            chat,
        };

        Self {
            server: TestServer::new(router(state)).unwrap(),
            commands,
            telemetry,
            users,
            user_store,
            llm,
            alerts,
        }
    }

    pub fn token(&self, user_id: i64, role: Role) -> String {
        issue_token(JWT_SECRET, user_id, "tester", role, session_ttl(false)).unwrap()
    }

    /// Request as user 1 with `role`.
    pub fn as_user(&self, req: TestRequest, role: Role) -> TestRequest {
        with_bearer(req, &self.token(1, role))
    }
}

pub(crate) fn with_bearer(req: TestRequest, token: &str) -> TestRequest {
    req.add_header(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
    )
}

pub(crate) fn with_device_key(req: TestRequest, key: &'static str) -> TestRequest {
    req.add_header(
        HeaderName::from_static(DEVICE_KEY_HEADER),
        HeaderValue::from_static(key),
    )
}

pub(crate) fn with_service_key(req: TestRequest, key: &'static str) -> TestRequest {
    req.add_header(
        HeaderName::from_static(SERVICE_KEY_HEADER),
        HeaderValue::from_static(key),
    )
}

//! API routes

use axum::{
    http::HeaderValue,
    middleware,
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::auth::{auth_middleware, cron_guard};
use crate::handlers::{cron, health, inquiries, queue, settings, tickets};
use crate::openapi::create_openapi_routes;
use crate::state::AppState;

/// CORS for the configured origins; none configured means same-origin only
fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any),
    )
}

/// Create the API router
pub fn create_router(state: Arc<AppState>, cors_origins: &[String]) -> Router {
    // Health check routes (no auth required)
    let health_routes = Router::new()
        .route("/", get(health::health))
        .route("/live", get(health::liveness))
        .route("/ready", get(health::readiness))
        .route("/detailed", get(health::health_detailed))
        .with_state(state.clone());

    // Scheduled triggers, restricted by network and optional token
    let cron_routes = Router::new()
        .route(
            "/process-queue",
            get(cron::process_queue).post(cron::process_queue),
        )
        .route(
            "/fetch-emails",
            get(cron::fetch_emails).post(cron::fetch_emails),
        )
        .layer(middleware::from_fn_with_state(state.clone(), cron_guard))
        .with_state(state.clone());

    // Public contact form
    let public_routes = Router::new()
        .route("/inquiries", post(inquiries::create_inquiry))
        .with_state(state.clone());

    // Ticket routes
    let ticket_routes = Router::new()
        .route("/", get(tickets::list_tickets))
        .route(
            "/:id",
            get(tickets::get_ticket)
                .patch(tickets::update_ticket)
                .delete(tickets::delete_ticket),
        )
        .route("/:id/reply", post(tickets::reply_to_ticket));

    // Queue routes
    let queue_routes = Router::new().route("/", get(queue::list_queue)).route(
        "/:id",
        patch(queue::update_queue_item).delete(queue::delete_queue_item),
    );

    // Settings routes
    let settings_routes = Router::new()
        .route(
            "/email",
            get(settings::get_email_settings).put(settings::update_email_settings),
        )
        .route("/email/test", post(settings::test_email_settings));

    // Staff routes with authentication
    let staff_routes = Router::new()
        .nest("/tickets", ticket_routes)
        .nest("/queue", queue_routes)
        .nest("/settings", settings_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state);

    let api_v1 = public_routes.merge(staff_routes);

    let router = Router::new()
        .nest("/health", health_routes)
        .nest("/cron", cron_routes)
        .nest("/api/v1", api_v1)
        .merge(create_openapi_routes())
        .layer(TraceLayer::new_for_http());

    match cors_layer(cors_origins) {
        Some(cors) => router.layer(cors),
        None => router,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Repositories;
    use anfrage_common::types::{EmailType, QueueStatus, TicketCategory, TicketStatus};
    use anfrage_common::{Config, Error, Result};
    use anfrage_core::mail::{
        ConnectionCheck, InboundMailbox, MailTransport, MailboxSession, OutboundEmail, SendOutcome,
    };
    use anfrage_storage::memory::{
        InMemoryApiKeyRepository, InMemoryMailSettingsRepository, InMemoryQueueRepository,
        InMemoryStaffRepository, InMemoryTicketRepository,
    };
    use anfrage_storage::models::{CreateTicket, MailSettings, NewQueueItem, SmtpSecurity};
    use anfrage_storage::repository::{ApiKey, QueueRepository, TicketRepository};
    use async_trait::async_trait;
    use axum::extract::connect_info::MockConnectInfo;
    use axum::http::{HeaderName, HeaderValue, StatusCode};
    use axum_test::TestServer;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use sha2::{Digest, Sha256};
    use std::net::SocketAddr;
    use uuid::Uuid;

    const API_KEY: &str = "ak_test_0123456789abcdef";

    struct RefusingTransport;

    #[async_trait]
    impl MailTransport for RefusingTransport {
        async fn send(&self, _settings: &MailSettings, _email: &OutboundEmail) -> SendOutcome {
            SendOutcome::failed("connection refused")
        }

        async fn test_connection(&self, _settings: &MailSettings) -> ConnectionCheck {
            ConnectionCheck::failed("connection refused")
        }
    }

    struct UnreachableMailbox;

    #[async_trait]
    impl InboundMailbox for UnreachableMailbox {
        async fn open(&self, _settings: &MailSettings) -> Result<Box<dyn MailboxSession>> {
            Err(Error::Transport("IMAP connect: connection refused".to_string()))
        }

        async fn test_connection(&self, _settings: &MailSettings) -> ConnectionCheck {
            ConnectionCheck::failed("connection refused")
        }
    }

    fn mail_settings(active: bool) -> MailSettings {
        MailSettings {
            smtp_host: "smtp.makler.de".to_string(),
            smtp_port: 587,
            smtp_user: "info@makler.de".to_string(),
            smtp_password: "geheim".to_string(),
            smtp_security: SmtpSecurity::Starttls,
            imap_host: "imap.makler.de".to_string(),
            imap_port: 993,
            imap_user: "info@makler.de".to_string(),
            imap_password: "geheim".to_string(),
            imap_mailbox: "INBOX".to_string(),
            from_address: "info@makler.de".to_string(),
            from_name: "Makler Muster".to_string(),
            active,
            updated_at: Utc::now(),
        }
    }

    fn api_key(scopes: Value) -> ApiKey {
        ApiKey {
            id: Uuid::new_v4(),
            staff_user_id: None,
            name: "test".to_string(),
            key_hash: hex::encode(Sha256::digest(API_KEY.as_bytes())),
            key_prefix: API_KEY[..8].to_string(),
            scopes,
            expires_at: None,
            last_used_at: None,
            created_at: Utc::now(),
        }
    }

    struct TestApp {
        server: TestServer,
        tickets: Arc<InMemoryTicketRepository>,
        queue: Arc<InMemoryQueueRepository>,
        staff: Arc<InMemoryStaffRepository>,
    }

    struct Options {
        config: Config,
        peer: [u8; 4],
        settings_active: bool,
        scopes: Value,
    }

    impl Default for Options {
        fn default() -> Self {
            Self {
                config: Config::default(),
                peer: [127, 0, 0, 1],
                settings_active: true,
                scopes: json!(["*"]),
            }
        }
    }

    async fn app_with(options: Options) -> TestApp {
        let tickets = Arc::new(InMemoryTicketRepository::new());
        let queue = Arc::new(InMemoryQueueRepository::new());
        let staff = Arc::new(InMemoryStaffRepository::new());
        let api_keys = Arc::new(InMemoryApiKeyRepository::new());
        api_keys.insert(api_key(options.scopes)).await;

        let repos = Repositories {
            tickets: tickets.clone(),
            queue: queue.clone(),
            settings: Arc::new(InMemoryMailSettingsRepository::with_settings(
                mail_settings(options.settings_active),
            )),
            staff: staff.clone(),
            api_keys,
        };
        let state = AppState::new(
            &options.config,
            repos,
            Arc::new(RefusingTransport),
            Arc::new(UnreachableMailbox),
            None,
        )
        .unwrap();

        let router = create_router(Arc::new(state), &options.config.api.cors_origins)
            .layer(MockConnectInfo(SocketAddr::from((options.peer, 40000))));

        TestApp {
            server: TestServer::new(router).unwrap(),
            tickets,
            queue,
            staff,
        }
    }

    async fn app() -> TestApp {
        app_with(Options::default()).await
    }

    fn key_header() -> (HeaderName, HeaderValue) {
        (
            HeaderName::from_static("x-api-key"),
            HeaderValue::from_static(API_KEY),
        )
    }

    async fn ticket(app: &TestApp) -> anfrage_storage::models::Ticket {
        app.tickets
            .create_ticket(CreateTicket {
                category: TicketCategory::Viewing,
                name: "Erika Muster".to_string(),
                email: "erika@example.de".to_string(),
                phone: None,
                message: "Besichtigung möglich?".to_string(),
                metadata: json!({}),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let app = app().await;
        let response = app.server.get("/health").await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["status"], "healthy");

        app.server.get("/health/ready").await.assert_status_ok();

        let detailed = app.server.get("/health/detailed").await.json::<Value>();
        assert_eq!(detailed["checks"]["database"]["status"], "disabled");
        assert_eq!(detailed["checks"]["mail"]["status"], "healthy");
    }

    #[tokio::test]
    async fn test_openapi_document_is_served() {
        let app = app().await;
        let spec = app.server.get("/openapi.json").await.json::<Value>();
        assert_eq!(spec["openapi"], "3.0.3");
    }

    #[tokio::test]
    async fn test_staff_routes_require_api_key() {
        let app = app().await;
        app.server
            .get("/api/v1/tickets")
            .await
            .assert_status(StatusCode::UNAUTHORIZED);

        app.server
            .get("/api/v1/tickets")
            .add_header(
                HeaderName::from_static("x-api-key"),
                HeaderValue::from_static("ak_test_wrong"),
            )
            .await
            .assert_status(StatusCode::UNAUTHORIZED);

        let (name, value) = key_header();
        app.server
            .get("/api/v1/tickets")
            .add_header(name, value)
            .await
            .assert_status_ok();

        app.server
            .get("/api/v1/tickets")
            .add_header(
                HeaderName::from_static("authorization"),
                HeaderValue::from_str(&format!("Bearer {}", API_KEY)).unwrap(),
            )
            .await
            .assert_status_ok();
    }

    #[tokio::test]
    async fn test_scopes_limit_access() {
        let app = app_with(Options {
            scopes: json!(["tickets"]),
            ..Options::default()
        })
        .await;

        let (name, value) = key_header();
        app.server
            .get("/api/v1/settings/email")
            .add_header(name, value)
            .await
            .assert_status(StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_public_inquiry_opens_ticket() {
        let app = app().await;
        app.staff.add("Max Makler", "max@makler.de", true).await;

        let response = app
            .server
            .post("/api/v1/inquiries")
            .json(&json!({
                "category": "rental",
                "name": "Erika Muster",
                "email": "erika@example.de",
                "message": "Ist die Wohnung noch frei?"
            }))
            .await;
        response.assert_status(StatusCode::CREATED);
        let receipt = response.json::<Value>();
        assert_eq!(receipt["confirmation_queued"], true);
        assert_eq!(receipt["notifications_queued"], 1);

        let queued = app.queue.all().await;
        assert_eq!(queued.len(), 2);
        assert!(queued.iter().any(|q| q.email_type == EmailType::Confirmation));

        app.server
            .post("/api/v1/inquiries")
            .json(&json!({"category": "rental", "name": "X", "email": "nope"}))
            .await
            .assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_ticket_lifecycle() {
        let app = app().await;
        let ticket = ticket(&app).await;
        let (name, value) = key_header();

        let detail = app
            .server
            .get(&format!("/api/v1/tickets/{}", ticket.id))
            .add_header(name.clone(), value.clone())
            .await
            .json::<Value>();
        assert_eq!(detail["ticket"]["ticket_number"], ticket.ticket_number);

        let reply = app
            .server
            .post(&format!("/api/v1/tickets/{}/reply", ticket.id))
            .add_header(name.clone(), value.clone())
            .json(&json!({"message": "Samstag um 10 Uhr?"}))
            .await;
        reply.assert_status(StatusCode::ACCEPTED);
        let reply = reply.json::<Value>();
        assert_eq!(
            reply["subject"],
            format!("Re: Ihre Anfrage [ANFRAGE-{}]", ticket.ticket_number)
        );

        let stored = app.tickets.get_ticket(ticket.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TicketStatus::InProgress);

        let updated = app
            .server
            .patch(&format!("/api/v1/tickets/{}", ticket.id))
            .add_header(name.clone(), value.clone())
            .json(&json!({"status": "done", "notes": "Termin steht"}))
            .await
            .json::<Value>();
        assert_eq!(updated["status"], "done");
        assert_eq!(updated["notes"], "Termin steht");

        app.server
            .delete(&format!("/api/v1/tickets/{}", ticket.id))
            .add_header(name.clone(), value.clone())
            .await
            .assert_status(StatusCode::NO_CONTENT);
        app.server
            .get(&format!("/api/v1/tickets/{}", ticket.id))
            .add_header(name, value)
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_empty_reply_is_rejected() {
        let app = app().await;
        let ticket = ticket(&app).await;
        let (name, value) = key_header();

        app.server
            .post(&format!("/api/v1/tickets/{}/reply", ticket.id))
            .add_header(name, value)
            .json(&json!({"message": "   "}))
            .await
            .assert_status(StatusCode::UNPROCESSABLE_ENTITY);
        assert!(app.queue.all().await.is_empty());
    }

    #[tokio::test]
    async fn test_cron_drain_and_queue_retry() {
        let app = app().await;
        let item = app
            .queue
            .enqueue(NewQueueItem {
                ticket_id: None,
                to_address: "kunde@example.de".to_string(),
                to_name: None,
                subject: "Ihre Anfrage [ANFRAGE-1]".to_string(),
                html_body: "<p>Danke</p>".to_string(),
                text_body: None,
                reply_to: None,
                in_reply_to: None,
                email_type: EmailType::Confirmation,
                max_attempts: Some(1),
            })
            .await
            .unwrap();

        let summary = app.server.post("/cron/process-queue").await;
        summary.assert_status_ok();
        let summary = summary.json::<Value>();
        assert_eq!(summary["claimed"], 1);
        assert_eq!(summary["failed"], 1);
        // Only the count of internal errors leaves the process
        assert_eq!(summary["error_count"], 0);
        assert!(summary.get("errors").is_none());

        let (name, value) = key_header();
        let listing = app
            .server
            .get("/api/v1/queue")
            .add_query_param("status", "failed")
            .add_header(name.clone(), value.clone())
            .await
            .json::<Value>();
        assert_eq!(listing["items"].as_array().unwrap().len(), 1);
        assert_eq!(listing["stats"]["failed"], 1);

        let retried = app
            .server
            .patch(&format!("/api/v1/queue/{}", item.id))
            .add_header(name.clone(), value.clone())
            .json(&json!({"action": "retry"}))
            .await;
        retried.assert_status_ok();
        assert_eq!(
            app.queue.get(item.id).await.unwrap().unwrap().status,
            QueueStatus::Pending
        );

        // Pending items cannot be retried again
        app.server
            .patch(&format!("/api/v1/queue/{}", item.id))
            .add_header(name.clone(), value.clone())
            .json(&json!({"action": "retry"}))
            .await
            .assert_status(StatusCode::CONFLICT);

        app.server
            .delete(&format!("/api/v1/queue/{}", item.id))
            .add_header(name.clone(), value.clone())
            .await
            .assert_status(StatusCode::NO_CONTENT);
        app.server
            .delete(&format!("/api/v1/queue/{}", item.id))
            .add_header(name, value)
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_cron_rejects_outside_networks() {
        let app = app_with(Options {
            peer: [203, 0, 113, 7],
            ..Options::default()
        })
        .await;
        app.server
            .get("/cron/process-queue")
            .await
            .assert_status(StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_cron_token() {
        let mut config = Config::default();
        config.cron.token = Some("s3cret".to_string());
        let app = app_with(Options {
            config,
            ..Options::default()
        })
        .await;

        app.server
            .get("/cron/process-queue")
            .await
            .assert_status(StatusCode::FORBIDDEN);
        app.server
            .get("/cron/process-queue")
            .add_header(
                HeaderName::from_static("x-cron-token"),
                HeaderValue::from_static("s3cret"),
            )
            .await
            .assert_status_ok();
    }

    #[tokio::test]
    async fn test_cron_fetch_reports_unreachable_mailbox() {
        let app = app().await;
        let response = app.server.get("/cron/fetch-emails").await;
        response.assert_status(StatusCode::BAD_GATEWAY);
        assert_eq!(response.json::<Value>()["error"], "TRANSPORT_ERROR");

        let idle = app_with(Options {
            settings_active: false,
            ..Options::default()
        })
        .await;
        let summary = idle.server.post("/cron/fetch-emails").await.json::<Value>();
        assert_eq!(summary["skipped"], true);
    }

    #[tokio::test]
    async fn test_settings_are_masked_and_testable() {
        let app = app().await;
        let (name, value) = key_header();

        let view = app
            .server
            .get("/api/v1/settings/email")
            .add_header(name.clone(), value.clone())
            .await
            .json::<Value>();
        assert_eq!(view["smtp_password"], "********");
        assert_eq!(view["smtp_host"], "smtp.makler.de");

        let report = app
            .server
            .post("/api/v1/settings/email/test")
            .add_header(name, value)
            .await
            .json::<Value>();
        assert_eq!(report["smtp"]["success"], false);
        assert_eq!(report["imap"]["success"], false);
    }
}

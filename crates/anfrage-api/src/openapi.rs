//! OpenAPI documentation
//!
//! Provides the OpenAPI 3.0 document and a Swagger UI page for the Anfrage
//! Desk API.

use axum::{
    response::{Html, IntoResponse},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};

/// Create OpenAPI routes
pub fn create_openapi_routes() -> Router {
    Router::new()
        .route("/openapi.json", get(openapi_json))
        .route("/docs", get(swagger_ui))
}

/// OpenAPI JSON specification endpoint
async fn openapi_json() -> impl IntoResponse {
    Json(get_openapi_spec())
}

/// Swagger UI HTML endpoint
async fn swagger_ui() -> impl IntoResponse {
    Html(SWAGGER_UI_HTML)
}

fn uuid_path_param() -> Value {
    json!({"name": "id", "in": "path", "required": true, "schema": {"type": "string", "format": "uuid"}})
}

fn json_body(schema: &str) -> Value {
    json!({
        "content": {
            "application/json": {
                "schema": {"$ref": format!("#/components/schemas/{}", schema)}
            }
        }
    })
}

fn json_response(description: &str, schema: &str) -> Value {
    let mut response = json_body(schema);
    response["description"] = json!(description);
    response
}

fn error_response(description: &str) -> Value {
    json_response(description, "ErrorResponse")
}

fn staff_security() -> Value {
    json!([{"api_key": []}, {"bearer": []}])
}

fn cron_operation(summary: &str, operation_id: &str, schema: &str) -> Value {
    json!({
        "tags": ["cron"],
        "summary": summary,
        "operationId": operation_id,
        "parameters": [
            {"name": "X-Cron-Token", "in": "header", "required": false, "schema": {"type": "string"}}
        ],
        "responses": {
            "200": json_response("Pass summary", schema),
            "403": {"description": "Caller not allowed"},
            "502": error_response("Mail server unreachable"),
            "504": error_response("Pass exceeded its time limit")
        }
    })
}

/// Get the OpenAPI specification as JSON
fn get_openapi_spec() -> Value {
    json!({
        "openapi": "3.0.3",
        "info": {
            "title": "Anfrage Desk API",
            "description": "Contact requests, email replies and the outbound mail queue of a real-estate agency.\n\n## Authentication\n\nStaff endpoints require an API key.\n\n- **Header**: `X-API-Key: <your-api-key>`\n- **Bearer**: `Authorization: Bearer <your-api-key>`\n\nThe inquiry form is public. Scheduled triggers under `/cron` are limited to configured networks and an optional `X-Cron-Token`.",
            "version": "1.0.0",
            "license": {
                "name": "Apache-2.0",
                "url": "https://www.apache.org/licenses/LICENSE-2.0"
            }
        },
        "servers": [
            {"url": "/", "description": "Anfrage Desk"}
        ],
        "tags": [
            {"name": "health", "description": "Health check endpoints"},
            {"name": "inquiries", "description": "Public contact form"},
            {"name": "tickets", "description": "Ticket management and replies"},
            {"name": "queue", "description": "Outbound email queue"},
            {"name": "settings", "description": "Mail transport settings"},
            {"name": "cron", "description": "Scheduled worker triggers"}
        ],
        "paths": {
            "/health": {
                "get": {
                    "tags": ["health"],
                    "summary": "Basic health check",
                    "operationId": "health",
                    "responses": {"200": json_response("Service is healthy", "HealthResponse")}
                }
            },
            "/health/live": {
                "get": {
                    "tags": ["health"],
                    "summary": "Liveness probe",
                    "operationId": "liveness",
                    "responses": {"200": {"description": "Service is alive"}}
                }
            },
            "/health/ready": {
                "get": {
                    "tags": ["health"],
                    "summary": "Readiness probe",
                    "operationId": "readiness",
                    "responses": {
                        "200": {"description": "Service is ready"},
                        "503": {"description": "Database unreachable"}
                    }
                }
            },
            "/health/detailed": {
                "get": {
                    "tags": ["health"],
                    "summary": "Detailed health check",
                    "operationId": "healthDetailed",
                    "responses": {"200": json_response("Detailed health status", "DetailedHealthResponse")}
                }
            },
            "/api/v1/inquiries": {
                "post": {
                    "tags": ["inquiries"],
                    "summary": "Submit a contact request",
                    "operationId": "createInquiry",
                    "requestBody": json_body("CreateTicket"),
                    "responses": {
                        "201": json_response("Ticket opened", "InquiryReceipt"),
                        "422": error_response("Invalid submission")
                    }
                }
            },
            "/api/v1/tickets": {
                "get": {
                    "tags": ["tickets"],
                    "summary": "List tickets, newest first",
                    "operationId": "listTickets",
                    "security": staff_security(),
                    "parameters": [
                        {"name": "status", "in": "query", "required": false, "schema": {"$ref": "#/components/schemas/TicketStatus"}},
                        {"name": "limit", "in": "query", "required": false, "schema": {"type": "integer", "minimum": 1, "maximum": 200, "default": 50}}
                    ],
                    "responses": {
                        "200": {
                            "description": "Tickets",
                            "content": {
                                "application/json": {
                                    "schema": {
                                        "type": "object",
                                        "properties": {
                                            "data": {"type": "array", "items": {"$ref": "#/components/schemas/Ticket"}}
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            },
            "/api/v1/tickets/{id}": {
                "get": {
                    "tags": ["tickets"],
                    "summary": "Get a ticket with its conversation",
                    "operationId": "getTicket",
                    "security": staff_security(),
                    "parameters": [uuid_path_param()],
                    "responses": {
                        "200": json_response("Ticket details", "TicketDetail"),
                        "404": error_response("Ticket not found")
                    }
                },
                "patch": {
                    "tags": ["tickets"],
                    "summary": "Update status or notes",
                    "operationId": "updateTicket",
                    "security": staff_security(),
                    "parameters": [uuid_path_param()],
                    "requestBody": json_body("UpdateTicketRequest"),
                    "responses": {
                        "200": json_response("Updated ticket", "Ticket"),
                        "404": error_response("Ticket not found"),
                        "422": error_response("Nothing to update")
                    }
                },
                "delete": {
                    "tags": ["tickets"],
                    "summary": "Delete a ticket and its conversation",
                    "operationId": "deleteTicket",
                    "security": staff_security(),
                    "parameters": [uuid_path_param()],
                    "responses": {
                        "204": {"description": "Ticket deleted"},
                        "404": error_response("Ticket not found")
                    }
                }
            },
            "/api/v1/tickets/{id}/reply": {
                "post": {
                    "tags": ["tickets"],
                    "summary": "Queue a reply to the requester",
                    "operationId": "replyToTicket",
                    "security": staff_security(),
                    "parameters": [uuid_path_param()],
                    "requestBody": json_body("ReplyRequest"),
                    "responses": {
                        "202": json_response("Reply queued", "ReplyResponse"),
                        "404": error_response("Ticket not found"),
                        "422": error_response("Empty message")
                    }
                }
            },
            "/api/v1/queue": {
                "get": {
                    "tags": ["queue"],
                    "summary": "List queue items with counts by status",
                    "operationId": "listQueue",
                    "security": staff_security(),
                    "parameters": [
                        {"name": "status", "in": "query", "required": false, "schema": {"$ref": "#/components/schemas/QueueStatus"}},
                        {"name": "limit", "in": "query", "required": false, "schema": {"type": "integer", "minimum": 1, "maximum": 200, "default": 50}}
                    ],
                    "responses": {"200": json_response("Queue items", "QueueListResponse")}
                }
            },
            "/api/v1/queue/{id}": {
                "patch": {
                    "tags": ["queue"],
                    "summary": "Retry a failed item",
                    "operationId": "updateQueueItem",
                    "security": staff_security(),
                    "parameters": [uuid_path_param()],
                    "requestBody": {
                        "content": {
                            "application/json": {
                                "schema": {
                                    "type": "object",
                                    "required": ["action"],
                                    "properties": {"action": {"type": "string", "enum": ["retry"]}}
                                }
                            }
                        }
                    },
                    "responses": {
                        "200": {"description": "Item reset to pending"},
                        "404": error_response("Queue item not found"),
                        "409": error_response("Item is not failed")
                    }
                },
                "delete": {
                    "tags": ["queue"],
                    "summary": "Delete a queue item",
                    "operationId": "deleteQueueItem",
                    "security": staff_security(),
                    "parameters": [uuid_path_param()],
                    "responses": {
                        "204": {"description": "Item deleted"},
                        "404": error_response("Queue item not found")
                    }
                }
            },
            "/api/v1/settings/email": {
                "get": {
                    "tags": ["settings"],
                    "summary": "Current mail settings with masked passwords",
                    "operationId": "getEmailSettings",
                    "security": staff_security(),
                    "responses": {
                        "200": json_response("Mail settings", "MailSettingsView"),
                        "404": error_response("Not configured")
                    }
                },
                "put": {
                    "tags": ["settings"],
                    "summary": "Save mail settings",
                    "description": "A password equal to the masked placeholder `********` keeps the stored value.",
                    "operationId": "updateEmailSettings",
                    "security": staff_security(),
                    "requestBody": json_body("UpdateMailSettings"),
                    "responses": {
                        "200": json_response("Saved settings", "MailSettingsView"),
                        "422": error_response("Invalid settings")
                    }
                }
            },
            "/api/v1/settings/email/test": {
                "post": {
                    "tags": ["settings"],
                    "summary": "Test SMTP and IMAP connectivity",
                    "operationId": "testEmailSettings",
                    "security": staff_security(),
                    "requestBody": {
                        "required": false,
                        "content": {
                            "application/json": {
                                "schema": {"$ref": "#/components/schemas/UpdateMailSettings"}
                            }
                        }
                    },
                    "responses": {
                        "200": json_response("Connection report", "SettingsTestReport"),
                        "422": error_response("Not configured")
                    }
                }
            },
            "/cron/process-queue": {
                "get": cron_operation("Drain the outbound queue once", "processQueue", "DrainSummary"),
                "post": cron_operation("Drain the outbound queue once", "processQueuePost", "DrainSummary")
            },
            "/cron/fetch-emails": {
                "get": cron_operation("Poll the inbound mailbox once", "fetchEmails", "FetchSummary"),
                "post": cron_operation("Poll the inbound mailbox once", "fetchEmailsPost", "FetchSummary")
            }
        },
        "components": {
            "securitySchemes": {
                "api_key": {"type": "apiKey", "in": "header", "name": "X-API-Key"},
                "bearer": {"type": "http", "scheme": "bearer"}
            },
            "schemas": {
                "ErrorResponse": {
                    "type": "object",
                    "properties": {
                        "error": {"type": "string"},
                        "message": {"type": "string"}
                    }
                },
                "HealthResponse": {
                    "type": "object",
                    "properties": {"status": {"type": "string"}}
                },
                "ComponentHealth": {
                    "type": "object",
                    "properties": {
                        "status": {"type": "string", "enum": ["healthy", "unhealthy", "disabled"]},
                        "latency_ms": {"type": "integer"},
                        "error": {"type": "string"}
                    }
                },
                "DetailedHealthResponse": {
                    "type": "object",
                    "properties": {
                        "status": {"type": "string"},
                        "checks": {
                            "type": "object",
                            "properties": {
                                "database": {"$ref": "#/components/schemas/ComponentHealth"},
                                "mail": {"$ref": "#/components/schemas/ComponentHealth"},
                                "queue": {
                                    "type": "object",
                                    "properties": {
                                        "pending": {"type": "integer"},
                                        "processing": {"type": "integer"},
                                        "failed": {"type": "integer"}
                                    }
                                }
                            }
                        }
                    }
                },
                "TicketStatus": {"type": "string", "enum": ["new", "in_progress", "done"]},
                "TicketCategory": {
                    "type": "string",
                    "enum": ["general", "viewing", "valuation", "rental", "purchase", "sale", "email"]
                },
                "CreateTicket": {
                    "type": "object",
                    "required": ["category", "name", "email"],
                    "properties": {
                        "category": {"$ref": "#/components/schemas/TicketCategory"},
                        "name": {"type": "string"},
                        "email": {"type": "string", "format": "email"},
                        "phone": {"type": "string"},
                        "message": {"type": "string"},
                        "metadata": {"type": "object"}
                    }
                },
                "InquiryReceipt": {
                    "type": "object",
                    "properties": {
                        "ticket_id": {"type": "string", "format": "uuid"},
                        "ticket_number": {"type": "integer"},
                        "confirmation_queued": {"type": "boolean"},
                        "notifications_queued": {"type": "integer"}
                    }
                },
                "Ticket": {
                    "type": "object",
                    "properties": {
                        "id": {"type": "string", "format": "uuid"},
                        "ticket_number": {"type": "integer"},
                        "category": {"$ref": "#/components/schemas/TicketCategory"},
                        "name": {"type": "string"},
                        "email": {"type": "string"},
                        "phone": {"type": "string", "nullable": true},
                        "message": {"type": "string"},
                        "metadata": {"type": "object"},
                        "status": {"$ref": "#/components/schemas/TicketStatus"},
                        "notes": {"type": "string", "nullable": true},
                        "created_at": {"type": "string", "format": "date-time"},
                        "updated_at": {"type": "string", "format": "date-time"}
                    }
                },
                "ConversationMessage": {
                    "type": "object",
                    "properties": {
                        "id": {"type": "string", "format": "uuid"},
                        "ticket_id": {"type": "string", "format": "uuid"},
                        "direction": {"type": "string", "enum": ["incoming", "outgoing"]},
                        "from_address": {"type": "string"},
                        "from_name": {"type": "string", "nullable": true},
                        "to_address": {"type": "string"},
                        "to_name": {"type": "string", "nullable": true},
                        "subject": {"type": "string"},
                        "html_body": {"type": "string", "nullable": true},
                        "text_body": {"type": "string", "nullable": true},
                        "message_id": {"type": "string", "nullable": true},
                        "in_reply_to": {"type": "string", "nullable": true},
                        "created_at": {"type": "string", "format": "date-time"}
                    }
                },
                "TicketDetail": {
                    "type": "object",
                    "properties": {
                        "ticket": {"$ref": "#/components/schemas/Ticket"},
                        "messages": {"type": "array", "items": {"$ref": "#/components/schemas/ConversationMessage"}}
                    }
                },
                "UpdateTicketRequest": {
                    "type": "object",
                    "properties": {
                        "status": {"$ref": "#/components/schemas/TicketStatus"},
                        "notes": {"type": "string", "description": "Empty string clears the notes"}
                    }
                },
                "ReplyRequest": {
                    "type": "object",
                    "required": ["message"],
                    "properties": {
                        "message": {"type": "string"},
                        "subject": {"type": "string"}
                    }
                },
                "ReplyResponse": {
                    "type": "object",
                    "properties": {
                        "queue_id": {"type": "string", "format": "uuid"},
                        "subject": {"type": "string"}
                    }
                },
                "QueueStatus": {"type": "string", "enum": ["pending", "processing", "sent", "failed"]},
                "QueueItem": {
                    "type": "object",
                    "properties": {
                        "id": {"type": "string", "format": "uuid"},
                        "ticket_id": {"type": "string", "format": "uuid", "nullable": true},
                        "to_address": {"type": "string"},
                        "subject": {"type": "string"},
                        "email_type": {"type": "string", "enum": ["reply", "confirmation", "notification"]},
                        "status": {"$ref": "#/components/schemas/QueueStatus"},
                        "attempts": {"type": "integer"},
                        "max_attempts": {"type": "integer"},
                        "error_message": {"type": "string", "nullable": true},
                        "sent_at": {"type": "string", "format": "date-time", "nullable": true},
                        "created_at": {"type": "string", "format": "date-time"}
                    }
                },
                "QueueListResponse": {
                    "type": "object",
                    "properties": {
                        "items": {"type": "array", "items": {"$ref": "#/components/schemas/QueueItem"}},
                        "stats": {
                            "type": "object",
                            "properties": {
                                "pending": {"type": "integer"},
                                "processing": {"type": "integer"},
                                "sent": {"type": "integer"},
                                "failed": {"type": "integer"}
                            }
                        }
                    }
                },
                "UpdateMailSettings": {
                    "type": "object",
                    "required": ["smtp_host", "smtp_port", "smtp_user", "smtp_security", "imap_host", "imap_port", "imap_user", "imap_mailbox", "from_address", "from_name", "active"],
                    "properties": {
                        "smtp_host": {"type": "string"},
                        "smtp_port": {"type": "integer"},
                        "smtp_user": {"type": "string"},
                        "smtp_password": {"type": "string", "nullable": true},
                        "smtp_security": {"type": "string", "enum": ["tls", "starttls", "none"]},
                        "imap_host": {"type": "string"},
                        "imap_port": {"type": "integer"},
                        "imap_user": {"type": "string"},
                        "imap_password": {"type": "string", "nullable": true},
                        "imap_mailbox": {"type": "string"},
                        "from_address": {"type": "string"},
                        "from_name": {"type": "string"},
                        "active": {"type": "boolean"}
                    }
                },
                "MailSettingsView": {
                    "allOf": [
                        {"$ref": "#/components/schemas/UpdateMailSettings"},
                        {"type": "object", "properties": {"updated_at": {"type": "string", "format": "date-time"}}}
                    ]
                },
                "ConnectionCheck": {
                    "type": "object",
                    "properties": {
                        "success": {"type": "boolean"},
                        "error": {"type": "string", "nullable": true}
                    }
                },
                "SettingsTestReport": {
                    "type": "object",
                    "properties": {
                        "smtp": {"$ref": "#/components/schemas/ConnectionCheck"},
                        "imap": {"$ref": "#/components/schemas/ConnectionCheck"}
                    }
                },
                "DrainSummary": {
                    "type": "object",
                    "properties": {
                        "claimed": {"type": "integer"},
                        "sent": {"type": "integer"},
                        "retried": {"type": "integer"},
                        "failed": {"type": "integer"},
                        "released": {"type": "integer"},
                        "skipped": {"type": "boolean"},
                        "error_count": {"type": "integer", "description": "Items that failed; details are only logged"}
                    }
                },
                "FetchSummary": {
                    "type": "object",
                    "properties": {
                        "fetched": {"type": "integer"},
                        "processed": {"type": "integer"},
                        "new_tickets": {"type": "integer"},
                        "replies": {"type": "integer"},
                        "duplicates": {"type": "integer"},
                        "skipped": {"type": "boolean"},
                        "error_count": {"type": "integer", "description": "Items that failed; details are only logged"}
                    }
                }
            }
        }
    })
}

const SWAGGER_UI_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Anfrage Desk API Documentation</title>
    <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5.9.0/swagger-ui.css" />
    <style>
        body { margin: 0; padding: 0; }
        .swagger-ui .topbar { display: none; }
    </style>
</head>
<body>
    <div id="swagger-ui"></div>
    <script src="https://unpkg.com/swagger-ui-dist@5.9.0/swagger-ui-bundle.js"></script>
    <script>
        window.onload = function() {
            SwaggerUIBundle({
                url: "/openapi.json",
                dom_id: '#swagger-ui',
                deepLinking: true,
                presets: [
                    SwaggerUIBundle.presets.apis,
                    SwaggerUIBundle.SwaggerUIStandalonePreset
                ],
                layout: "StandaloneLayout"
            });
        };
    </script>
</body>
</html>"#;

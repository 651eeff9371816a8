//! Webhook API for semcache.
//!
//! A single `POST /webhook` endpoint takes a question and answers it from
//! the cache when a semantically similar question was answered before,
//! falling back to the language model (and caching the result) otherwise.
//! Out-of-domain questions are rejected before any embedding work.
//!
//! Handlers are stateless with respect to the cache files: every request
//! reads the persisted artifacts fresh, so the server and any maintenance
//! tooling can share one data directory.
//!
//! ## Endpoints
//!
//! - `POST /webhook` - Answer a question (cache, model fallback, or reject)
//! - `GET /health` - Liveness plus cached record count

use actix_web::{web, HttpResponse, Responder};
use serde::{Serialize, Deserialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, warn};

use crate::cache::{Lookup, SemanticCache};
use crate::provider::{Answerer, Embedder};
use crate::topics::is_technical;

const REJECTION_MESSAGE: &str = "This system only answers technical questions.";

/// Everything a handler needs, built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<SemanticCache>,
    pub embedder: Arc<dyn Embedder>,
    pub answerer: Arc<dyn Answerer>,
}

// --- Request structs ---

#[derive(Deserialize)]
struct WebhookRequest {
    question: String,
}

// --- Response structs ---

#[derive(Serialize)]
struct WebhookResponse {
    answer: String,
    /// "cache", "llm" or "rejected"
    source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    similarity: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    elapsed_ms: u64,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    records: usize,
}

// --- Handlers ---

async fn webhook_handler(
    state: web::Data<AppState>,
    body: web::Json<WebhookRequest>,
) -> impl Responder {
    let start = Instant::now();
    let question = body.question.trim();

    if question.is_empty() {
        return HttpResponse::BadRequest().json(serde_json::json!({"error": "question is empty"}));
    }

    if !is_technical(question) {
        return HttpResponse::Ok().json(WebhookResponse {
            answer: REJECTION_MESSAGE.to_string(),
            source: "rejected".to_string(),
            similarity: None,
            id: None,
            elapsed_ms: elapsed_ms(start),
        });
    }

    let embedding = match state.embedder.embed(question) {
        Ok(embedding) => embedding,
        Err(e) => {
            error!("embedding call failed: {:#}", e);
            return HttpResponse::BadGateway()
                .json(serde_json::json!({"error": format!("embedding failed: {}", e)}));
        }
    };

    if let Lookup::Hit { id, answer, score, .. } = state.cache.lookup(&embedding) {
        return HttpResponse::Ok().json(WebhookResponse {
            answer,
            source: "cache".to_string(),
            similarity: Some(score),
            id: Some(id),
            elapsed_ms: elapsed_ms(start),
        });
    }

    let answer = match state.answerer.complete(question) {
        Ok(answer) => answer,
        Err(e) => {
            error!("completion call failed: {:#}", e);
            return HttpResponse::BadGateway()
                .json(serde_json::json!({"error": format!("completion failed: {}", e)}));
        }
    };

    // A failed insert only costs us the next cache hit; the caller still
    // gets the freshly generated answer.
    let id = match state.cache.insert(question, &answer, &embedding) {
        Ok(record) => Some(record.id),
        Err(e) => {
            warn!("failed to cache new answer: {}", e);
            None
        }
    };

    HttpResponse::Ok().json(WebhookResponse {
        answer,
        source: "llm".to_string(),
        similarity: None,
        id,
        elapsed_ms: elapsed_ms(start),
    })
}

async fn health_handler(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        records: state.cache.count(),
    })
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/webhook").route(web::post().to(webhook_handler)))
       .service(web::resource("/health").route(web::get().to(health_handler)));
}

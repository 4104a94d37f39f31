use actix_web::http::{header, Method};
use actix_web::{web, HttpRequest, HttpResponse, Responder};
use futures_util::StreamExt;
use log::{debug, info, warn};
use serde_json::json;
use std::collections::HashMap;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::error::ProxyError;
use crate::model::prompt;
use crate::model::relay::RelayStream;
use crate::model::Completion;
use crate::rate_limit::{client_key, RateDecision};
use crate::web::models::{ChatRequest, ChatResponse};
use crate::AppState;

const SECRET_HEADER: &str = "x-app-secret";

// Health check endpoint
pub async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

/// Therapist chat endpoint.
///
/// Runs preflight, method, secret, rate limit, body, and moderation checks in
/// that order, stopping at the first failure, then forwards the conversation.
pub async fn therapist(
    req: HttpRequest,
    payload: web::Payload,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ProxyError> {
    if req.method() == Method::OPTIONS {
        return Ok(HttpResponse::NoContent().finish());
    }
    if req.method() != Method::POST {
        return Err(ProxyError::MethodNotAllowed);
    }

    authorize(&req, &data.config.app_secret)?;

    let forwarded_for = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok());
    let client = client_key(forwarded_for, req.peer_addr().map(|addr| addr.ip()));
    match data.limiter.check_and_consume(&client) {
        RateDecision::Allowed { remaining } => debug!("{} requests left for {}", remaining, client),
        RateDecision::Limited { retry_after } => {
            warn!("Rate limit hit for {}", client);
            return Err(ProxyError::RateLimited { retry_after });
        }
    }

    let body = read_body(payload, data.config.max_body_bytes).await?;
    let chat = ChatRequest::parse(&body)?;
    let request_id = Uuid::new_v4();
    info!(
        "[{}] Chat request from {} ({} history turns)",
        request_id,
        client,
        chat.history.len()
    );

    if data.openai.is_flagged(&chat.user).await? {
        info!("[{}] Message flagged by moderation", request_id);
        return Err(ProxyError::Flagged);
    }

    let messages = prompt::assemble(&chat.history, &chat.user);
    match data.openai.complete(&messages, wants_stream(&req)).await? {
        Completion::Reply(reply) => Ok(HttpResponse::Ok().json(ChatResponse { reply })),
        Completion::Stream(upstream) => Ok(HttpResponse::Ok()
            .content_type("text/event-stream")
            .insert_header((header::CACHE_CONTROL, "no-cache"))
            .streaming(RelayStream::new(upstream.bytes_stream(), request_id))),
    }
}

fn authorize(req: &HttpRequest, secret: &str) -> Result<(), ProxyError> {
    let presented = req
        .headers()
        .get(SECRET_HEADER)
        .map(|value| value.as_bytes())
        .unwrap_or_default();

    if presented.ct_eq(secret.as_bytes()).into() {
        Ok(())
    } else {
        Err(ProxyError::Unauthorized)
    }
}

/// Collects the request body, refusing anything over `limit` bytes.
async fn read_body(mut payload: web::Payload, limit: usize) -> Result<web::BytesMut, ProxyError> {
    let mut body = web::BytesMut::new();
    while let Some(chunk) = payload.next().await {
        let chunk = chunk.map_err(|e| ProxyError::Internal(e.to_string()))?;
        if body.len() + chunk.len() > limit {
            return Err(ProxyError::PayloadTooLarge);
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

fn wants_stream(req: &HttpRequest) -> bool {
    web::Query::<HashMap<String, String>>::from_query(req.query_string())
        .map(|query| query.get("stream").map(String::as_str) == Some("1"))
        .unwrap_or(false)
}

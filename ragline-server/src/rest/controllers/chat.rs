use std::convert::Infallible;

use async_stream::stream;
use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::{Stream, StreamExt};
use ragline::chat::{ChatStream, last_user_message, with_context};
use ragline::{ChatMessage, ContextSource};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::info;

use crate::auth::AuthenticatedUser;
use crate::error::{ApiError, GENERIC_ERROR, report_internal};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: bool,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub message: ChatMessage,
    pub sources: Vec<ContextSource>,
}

/// POST /api/chat
///
/// Retrieves context for the caller's last message and answers with it,
/// either as one JSON body or as server-sent events.
pub async fn chat(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;
    if request.messages.is_empty() {
        return Err(ApiError::Validation("messages must not be empty".into()));
    }
    let query = last_user_message(&request.messages)
        .ok_or_else(|| ApiError::Validation("messages must include a user message".into()))?;

    // Cancelled when the handler or the response stream is dropped.
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();

    let context = state.pipeline.retrieve_context(&user, query, &cancel).await?;
    let messages = with_context(&state.system_prompt, &context, &request.messages);
    info!(
        user.id = %user,
        sources = context.sources.len(),
        stream = request.stream,
        model = state.chat.name(),
        "answering chat"
    );

    if request.stream {
        let deltas = state.chat.stream(&messages, &cancel).await?;
        let events = sse_events(deltas, guard);
        return Ok(Sse::new(events).keep_alive(KeepAlive::default()).into_response());
    }

    let content = state.chat.complete(&messages, &cancel).await?;
    Ok(Json(ChatResponse { message: ChatMessage::assistant(content), sources: context.sources })
        .into_response())
}

/// `data: {"content": ...}` per delta, then `data: [DONE]`.
fn sse_events(
    mut deltas: ChatStream,
    guard: DropGuard,
) -> impl Stream<Item = Result<Event, Infallible>> {
    stream! {
        let _guard = guard;
        while let Some(delta) = deltas.next().await {
            match delta {
                Ok(content) => {
                    yield Ok(Event::default().data(json!({ "content": content }).to_string()));
                }
                Err(err) => {
                    let report_id = report_internal(&err);
                    let body = json!({ "error": GENERIC_ERROR, "report_id": report_id });
                    yield Ok(Event::default().data(body.to_string()));
                    break;
                }
            }
        }
        yield Ok(Event::default().data("[DONE]"));
    }
}

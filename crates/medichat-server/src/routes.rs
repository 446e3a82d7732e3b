use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::response::{Html, IntoResponse, Redirect};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use medichat_core::chat::{ChatMessage, ChatSession, Notice};
use medichat_core::pdf::UploadedDocument;
use medichat_core::prompt::ASSISTANT_NAME;
use medichat_core::CoreError;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::error::ServerError;
use crate::state::AppState;
use crate::templates::render_template;

pub fn router(state: AppState) -> Router {
    let upload_limit = state.medichat.config().server.max_upload_bytes;

    Router::new()
        .route("/", get(new_session))
        .route("/health", get(health))
        .route("/chat/{id}", get(show_chat))
        .route("/chat/{id}/documents", post(process_documents))
        .route("/chat/{id}/messages", post(ask))
        .route("/chat/{id}/clear", post(clear_chat))
        .layer(DefaultBodyLimit::max(upload_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn chat_url(id: &str) -> String {
    format!("/chat/{id}")
}

async fn new_session(State(state): State<AppState>) -> Redirect {
    let id = uuid::Uuid::new_v4().to_string();
    state.lock_sessions().insert(id.clone(), ChatSession::new());
    info!(session = %id, "new chat session");
    Redirect::to(&chat_url(&id))
}

#[derive(Serialize)]
struct ChatPageData {
    assistant_name: &'static str,
    model: String,
    session_id: String,
    messages: Vec<ChatMessage>,
    documents: Vec<String>,
    notices: Vec<Notice>,
}

async fn show_chat(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Html<String>, ServerError> {
    let data = {
        let mut sessions = state.lock_sessions();
        let session = sessions.get_mut(&id).ok_or(ServerError::SessionNotFound)?;
        ChatPageData {
            assistant_name: ASSISTANT_NAME,
            model: state.medichat.config().llm.model.clone(),
            session_id: id.clone(),
            messages: session.messages().to_vec(),
            documents: session.documents().to_vec(),
            notices: session.take_notices(),
        }
    };

    Ok(render_template(&state.templates, "chat.html", data)?)
}

/// Run `f` on the session if it still exists.
fn with_session(state: &AppState, id: &str, f: impl FnOnce(&mut ChatSession)) {
    match state.lock_sessions().get_mut(id) {
        Some(session) => f(session),
        None => warn!(session = %id, "session disappeared during request"),
    }
}

fn ensure_session(state: &AppState, id: &str) -> Result<(), ServerError> {
    if state.lock_sessions().contains_key(id) {
        Ok(())
    } else {
        Err(ServerError::SessionNotFound)
    }
}

async fn process_documents(
    State(state): State<AppState>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Result<Redirect, ServerError> {
    ensure_session(&state, &id)?;

    let mut docs = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("files") {
            continue;
        }
        let name = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await?;
        // browsers send an empty part when no file was chosen
        if name.is_empty() && bytes.is_empty() {
            continue;
        }
        docs.push(UploadedDocument::new(name, bytes.to_vec()));
    }

    if docs.is_empty() {
        with_session(&state, &id, |s| {
            s.notify(Notice::warning("Please choose at least one PDF to upload."))
        });
        return Ok(Redirect::to(&chat_url(&id)));
    }

    let uploaded = docs.len();
    info!(session = %id, uploaded, "processing documents");
    let result = state.medichat.process_documents(docs).await;

    with_session(&state, &id, |session| match result {
        Ok(processed) => {
            for warning in processed.warnings {
                session.notify(Notice::warning(warning));
            }
            session.notify(Notice::success(format!(
                "Documents processed successfully! {} of {uploaded} document(s) indexed into {} chunks.",
                processed.documents.len(),
                processed.chunk_count
            )));
            session.replace_index(processed.index, processed.documents);
        }
        Err(CoreError::NoDocumentText(warnings)) => {
            for warning in warnings {
                session.notify(Notice::warning(warning));
            }
            session.notify(Notice::error("No valid text found in uploaded documents."));
        }
        Err(e) => {
            warn!(session = %id, "document processing failed: {e}");
            session.notify(Notice::error(format!("Failed to process documents: {e}")));
        }
    });

    Ok(Redirect::to(&chat_url(&id)))
}

#[derive(Deserialize)]
struct NewMessageForm {
    content: String,
}

async fn ask(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Form(form): Form<NewMessageForm>,
) -> Result<Redirect, ServerError> {
    let question = form.content.trim().to_string();

    let (timestamp, index) = {
        let mut sessions = state.lock_sessions();
        let session = sessions.get_mut(&id).ok_or(ServerError::SessionNotFound)?;
        if question.is_empty() {
            return Ok(Redirect::to(&chat_url(&id)));
        }
        let timestamp = session.push_user(question.clone());
        (timestamp, session.index())
    };

    let Some(index) = index else {
        with_session(&state, &id, |s| {
            s.notify(Notice::warning("Please upload and process documents first!"))
        });
        return Ok(Redirect::to(&chat_url(&id)));
    };

    let result = state.medichat.answer(&index, &question).await;

    with_session(&state, &id, |session| match result {
        Ok(answer) if session.awaiting_reply(&question, &timestamp) => {
            session.push_assistant(answer.text, timestamp, answer.sources)
        }
        Ok(_) => debug!(session = %id, "chat changed while answering, dropping reply"),
        Err(e) => {
            warn!(session = %id, "answer failed: {e}");
            session.notify(Notice::error(format!("Could not get an answer: {e}")));
        }
    });

    Ok(Redirect::to(&chat_url(&id)))
}

async fn clear_chat(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Redirect, ServerError> {
    {
        let mut sessions = state.lock_sessions();
        let session = sessions.get_mut(&id).ok_or(ServerError::SessionNotFound)?;
        session.clear_messages();
        session.notify(Notice::success("Chat history cleared!"));
    }
    Ok(Redirect::to(&chat_url(&id)))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let llm_reachable = state.medichat.generator().health_check().await;
    let sessions = state.lock_sessions().len();
    Json(json!({
        "status": "ok",
        "llm_reachable": llm_reachable,
        "sessions": sessions,
    }))
}

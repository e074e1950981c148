use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use chrono::Utc;
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;

use crate::auth::CurrentUser;
use crate::error::AppError;
use crate::loghub::{LogEntry, LogHub};
use crate::state::AppState;

const KEEP_ALIVE: Duration = Duration::from_secs(20);

#[derive(Debug, Default, Deserialize)]
pub struct LogQuery {
    pub mode: Option<String>,
    #[serde(default)]
    pub since: i64,
}

#[derive(Debug, Serialize)]
pub struct LogPoll {
    pub logs: Vec<LogEntry>,
    pub now: i64,
}

/// GET /api/v1/scrape-log?mode=sse|poll&since=
pub async fn show(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<LogQuery>,
) -> Result<Response, AppError> {
    match query.mode.as_deref().unwrap_or("sse") {
        "poll" => Ok(Json(LogPoll {
            logs: state.hub.since(&user.id, query.since),
            now: Utc::now().timestamp_millis(),
        })
        .into_response()),
        "sse" => Ok(live(&state.hub, &user.id).into_response()),
        other => Err(AppError::BadRequest(format!(
            "Unknown log mode '{other}', expected sse or poll"
        ))),
    }
}

/// SSE data fields cannot carry carriage returns.
fn event(line: &str) -> Event {
    Event::default().data(line.replace('\r', ""))
}

fn live(hub: &LogHub, user_id: &str) -> Sse<impl Stream<Item = Result<Event, Infallible>> + use<>> {
    let mut rx = hub.subscribe(user_id);
    let stream = async_stream::stream! {
        yield Ok(event(&format!("[log] connected at {}", Utc::now().to_rfc3339())));
        loop {
            match rx.recv().await {
                Ok(line) => yield Ok(event(&line)),
                Err(RecvError::Lagged(skipped)) => {
                    yield Ok(event(&format!("[log] {skipped} lines skipped")));
                }
                Err(RecvError::Closed) => break,
            }
        }
    };
    Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEP_ALIVE).text("ping"))
}

use std::convert::Infallible;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Result, anyhow};
use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Html;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use web_navigator::AgentEvent;

/// Ports tried after the requested one is taken.
const PORT_ATTEMPTS: u16 = 10;

/// A task accepted by the console, with the token `POST /cancel` trips.
pub struct TaskRequest {
    pub task: String,
    pub cancel: CancellationToken,
}

/// The running task's cancel handle; `None` while idle.
type Running = Arc<Mutex<Option<CancellationToken>>>;

fn lock(running: &Running) -> MutexGuard<'_, Option<CancellationToken>> {
    running.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Clone)]
struct AppState {
    cmd_tx: mpsc::Sender<TaskRequest>,
    event_tx: broadcast::Sender<AgentEvent>,
    running: Running,
}

#[derive(Deserialize)]
struct CommandPayload {
    command: String,
}

/// The running web console: tasks come in on `commands`, progress goes out
/// on `events`.
pub struct Console {
    pub commands: mpsc::Receiver<TaskRequest>,
    pub events: broadcast::Sender<AgentEvent>,
    running: Running,
}

impl Console {
    /// Mark the console idle so the next command is accepted.
    pub fn finish_task(&self) {
        lock(&self.running).take();
    }
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/command", post(command_handler))
        .route("/cancel", post(cancel_handler))
        .route("/events", get(sse_handler))
        .route("/favicon.ico", get(|| async { StatusCode::NO_CONTENT }))
        .with_state(state)
}

fn channels() -> (Arc<AppState>, Console) {
    let (cmd_tx, commands) = mpsc::channel::<TaskRequest>(1);
    let (events, _) = broadcast::channel::<AgentEvent>(64);
    let running: Running = Arc::new(Mutex::new(None));

    let state = Arc::new(AppState {
        cmd_tx,
        event_tx: events.clone(),
        running: running.clone(),
    });
    let console = Console {
        commands,
        events,
        running,
    };
    (state, console)
}

/// Serve the console on the first free port starting at `port`.
pub async fn start_server(port: u16) -> Result<Console> {
    let (state, console) = channels();
    let app = router(state);

    let mut bound = None;
    for candidate in port..port.saturating_add(PORT_ATTEMPTS) {
        match tokio::net::TcpListener::bind(("127.0.0.1", candidate)).await {
            Ok(listener) => {
                bound = Some((listener, candidate));
                break;
            }
            Err(e) => debug!(port = candidate, error = %e, "port unavailable"),
        }
    }
    let (listener, port) = bound.ok_or_else(|| {
        anyhow!(
            "could not bind any port in {port}..{}; is another agent running?",
            port.saturating_add(PORT_ATTEMPTS)
        )
    })?;

    info!("web console running at http://localhost:{port}");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "web console stopped");
        }
    });

    Ok(console)
}

async fn index_handler() -> Html<&'static str> {
    debug!("GET /");
    Html(INDEX_HTML)
}

async fn command_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CommandPayload>,
) -> (StatusCode, &'static str) {
    let task = payload.command.trim().to_string();
    if task.is_empty() {
        return (StatusCode::BAD_REQUEST, "empty command");
    }

    let mut running = lock(&state.running);
    if running.is_some() {
        return (StatusCode::CONFLICT, "agent busy");
    }

    let cancel = CancellationToken::new();
    info!(%task, "task received");
    match state.cmd_tx.try_send(TaskRequest {
        task,
        cancel: cancel.clone(),
    }) {
        Ok(()) => {
            *running = Some(cancel);
            (StatusCode::ACCEPTED, "ok")
        }
        Err(mpsc::error::TrySendError::Full(_)) => (StatusCode::CONFLICT, "agent busy"),
        Err(mpsc::error::TrySendError::Closed(_)) => {
            (StatusCode::SERVICE_UNAVAILABLE, "agent stopped")
        }
    }
}

async fn cancel_handler(State(state): State<Arc<AppState>>) -> (StatusCode, &'static str) {
    match lock(&state.running).as_ref() {
        Some(cancel) => {
            info!("cancel requested");
            cancel.cancel();
            (StatusCode::OK, "ok")
        }
        None => (StatusCode::CONFLICT, "no task running"),
    }
}

async fn sse_handler(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let rx = state.event_tx.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|received| match received {
        Ok(event) => Some(Ok(to_sse_event(&event))),
        Err(e) => {
            debug!(error = %e, "event subscriber lagged");
            None
        }
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn to_sse_event(event: &AgentEvent) -> Event {
    let data = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    Event::default().event(event.name()).data(data)
}

const INDEX_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Web Navigator</title>
<style>
  * { margin: 0; padding: 0; box-sizing: border-box; }
  body {
    background: #0a0a0f;
    color: #e0e0e0;
    font-family: 'Segoe UI', system-ui, -apple-system, sans-serif;
    height: 100vh;
    display: flex;
    flex-direction: column;
  }
  header {
    padding: 20px 32px;
    border-bottom: 1px solid #1a1a2e;
    display: flex;
    align-items: center;
    gap: 12px;
  }
  header h1 { font-size: 20px; font-weight: 600; color: #fff; }
  .dot { width: 8px; height: 8px; border-radius: 50%; background: #22c55e; }
  .dot.busy { background: #f59e0b; }
  .main {
    flex: 1;
    display: flex;
    flex-direction: column;
    max-width: 860px;
    width: 100%;
    margin: 0 auto;
    padding: 24px 32px;
    gap: 16px;
    overflow: hidden;
  }
  #log { flex: 1; overflow-y: auto; display: flex; flex-direction: column; gap: 8px; }
  .entry { padding: 10px 14px; border-radius: 8px; font-size: 14px; line-height: 1.5; }
  .entry.user { background: #1a1a2e; border-left: 3px solid #6366f1; }
  .entry.step { background: #111118; border-left: 3px solid #3b82f6; font-family: monospace; font-size: 13px; }
  .entry.step .num { color: #6366f1; font-weight: 700; margin-right: 8px; }
  .entry.step .thought { color: #888; display: block; }
  .entry.error { background: #1a0a0a; border-left: 3px solid #ef4444; color: #fca5a5; }
  .entry.done { background: #0a1a0a; border-left: 3px solid #22c55e; color: #86efac; }
  .entry.thinking { background: #111118; border-left: 3px solid #f59e0b; color: #fcd34d; }
  .input-area { display: flex; gap: 8px; }
  #cmd {
    flex: 1;
    background: #111118;
    border: 1px solid #222;
    border-radius: 8px;
    padding: 12px 16px;
    color: #fff;
    font-size: 16px;
    outline: none;
  }
  #cmd:disabled { opacity: 0.5; }
  button {
    background: #6366f1;
    color: #fff;
    border: none;
    border-radius: 8px;
    padding: 12px 20px;
    font-size: 15px;
    font-weight: 600;
    cursor: pointer;
  }
  button:disabled { background: #333; cursor: not-allowed; }
  #cancel { background: #7f1d1d; }
</style>
</head>
<body>
  <header>
    <div class="dot" id="status-dot"></div>
    <h1>Web Navigator</h1>
  </header>
  <div class="main">
    <div id="log"></div>
    <div class="input-area">
      <input type="text" id="cmd" placeholder="Describe a task..." autofocus />
      <button id="send" onclick="send()">Send</button>
      <button id="cancel" onclick="cancelTask()" disabled>Cancel</button>
    </div>
  </div>
<script>
  const log = document.getElementById('log');
  const cmd = document.getElementById('cmd');
  const sendBtn = document.getElementById('send');
  const cancelBtn = document.getElementById('cancel');
  const dot = document.getElementById('status-dot');
  let busy = false;

  const esc = s => String(s).replace(/&/g, '&amp;').replace(/</g, '&lt;');

  function addEntry(cls, html) {
    const div = document.createElement('div');
    div.className = 'entry ' + cls;
    div.innerHTML = html;
    log.appendChild(div);
    log.scrollTop = log.scrollHeight;
  }

  function setBusy(b) {
    busy = b;
    cmd.disabled = b;
    sendBtn.disabled = b;
    cancelBtn.disabled = !b;
    dot.className = b ? 'dot busy' : 'dot';
    if (!b) cmd.focus();
  }

  async function send() {
    const text = cmd.value.trim();
    if (!text || busy) return;
    cmd.value = '';
    addEntry('user', '<strong>Task:</strong> ' + esc(text));
    setBusy(true);
    const res = await fetch('/command', {
      method: 'POST',
      headers: {'Content-Type': 'application/json'},
      body: JSON.stringify({command: text}),
    });
    if (!res.ok) {
      addEntry('error', esc(await res.text()));
      setBusy(false);
    }
  }

  async function cancelTask() {
    cancelBtn.disabled = true;
    await fetch('/cancel', {method: 'POST'});
  }

  cmd.addEventListener('keydown', e => { if (e.key === 'Enter') send(); });

  const es = new EventSource('/events');
  es.addEventListener('thinking', e => {
    addEntry('thinking', 'Step ' + JSON.parse(e.data).step + ': thinking...');
  });
  es.addEventListener('step', e => {
    const d = JSON.parse(e.data);
    addEntry('step', '<span class="num">Step ' + d.number + '</span>' + esc(d.description)
      + '<span class="thought">' + esc(d.thought) + '</span>');
  });
  es.addEventListener('step_error', e => {
    const d = JSON.parse(e.data);
    addEntry('error', '<strong>Step ' + d.number + ' failed:</strong> ' + esc(d.message));
  });
  es.addEventListener('task_complete', e => {
    addEntry('done', '<strong>Answer:</strong> ' + esc(JSON.parse(e.data).summary));
  });
  es.addEventListener('task_error', e => {
    addEntry('error', '<strong>Stopped:</strong> ' + esc(JSON.parse(e.data).message));
  });
  es.addEventListener('ready', () => setBusy(false));

  addEntry('done', 'Agent ready. Describe a task to begin.');
</script>
</body>
</html>
"##;

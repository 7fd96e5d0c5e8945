//! Live reload over WebSocket.
//!
//! Pages load a small script that subscribes to `/api/events` and reloads when the
//! sync engine reports changed documents.

mod websocket;

pub(crate) use websocket::ws_handler;

use axum::http::header;
use axum::response::IntoResponse;

/// Client side of live reload. Reconnects after the server restarts.
const LIVE_RELOAD_JS: &str = r#"(function () {
  var delay = 1000;
  function connect() {
    var scheme = location.protocol === "https:" ? "wss://" : "ws://";
    var socket = new WebSocket(scheme + location.host + "/api/events");
    socket.onopen = function () { delay = 1000; };
    socket.onmessage = function (event) {
      if (event.data === "reload") { location.reload(); }
    };
    socket.onclose = function () {
      setTimeout(connect, delay);
      delay = Math.min(delay * 2, 30000);
    };
  }
  connect();
})();
"#;

/// Handle GET /live-reload.js.
pub(crate) async fn script() -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "text/javascript; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        LIVE_RELOAD_JS,
    )
}

//! WebSocket-based live reload.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Path of the live reload WebSocket endpoint.
pub const SOCKET_PATH: &str = "/__livereload";

/// Path of the client script.
pub const SCRIPT_PATH: &str = "/__livereload.js";

/// Messages sent to browsers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReloadMessage {
    /// Connection established
    Connected,

    /// A rebuild finished; reload the page
    Reload,

    /// A rebuild failed
    BuildFailed { message: String },
}

/// Hub for broadcasting reload messages to every connected browser.
#[derive(Debug, Clone)]
pub struct ReloadHub {
    sender: broadcast::Sender<ReloadMessage>,
}

impl ReloadHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(100);
        Self { sender }
    }

    /// Send a message to all connected clients.
    pub fn send(&self, msg: ReloadMessage) {
        // No receivers just means no browser is open
        let _ = self.sender.send(msg);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReloadMessage> {
        self.sender.subscribe()
    }

    /// Number of connected clients.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ReloadHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Insert the client script tag before the closing `</body>`, or at the end
/// of documents without one.
pub fn inject_script(html: &str) -> String {
    let tag = format!(r#"<script src="{}"></script>"#, SCRIPT_PATH);

    match html.to_ascii_lowercase().rfind("</body>") {
        Some(pos) => {
            let mut out = String::with_capacity(html.len() + tag.len());
            out.push_str(&html[..pos]);
            out.push_str(&tag);
            out.push_str(&html[pos..]);
            out
        }
        None => format!("{}{}", html, tag),
    }
}

/// Client-side live reload script.
pub const CLIENT_SCRIPT: &str = r#"(function() {
  'use strict';

  var protocol = location.protocol === 'https:' ? 'wss://' : 'ws://';
  var ws = new WebSocket(protocol + location.host + '/__livereload');

  ws.onmessage = function(event) {
    var msg = JSON.parse(event.data);

    switch (msg.type) {
      case 'reload':
        location.reload();
        break;

      case 'build_failed':
        console.error('[kiln] Build failed:\n' + msg.message);
        break;

      case 'connected':
        console.log('[kiln] Live reload connected');
        break;
    }
  };

  ws.onclose = function() {
    console.log('[kiln] Disconnected, retrying...');
    setTimeout(function() { location.reload(); }, 1000);
  };
})();
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hub_broadcasts_messages() {
        let hub = ReloadHub::new();
        let mut first = hub.subscribe();
        let mut second = hub.subscribe();

        hub.send(ReloadMessage::Reload);

        assert_eq!(hub.subscriber_count(), 2);
        assert_eq!(first.try_recv().unwrap(), ReloadMessage::Reload);
        assert_eq!(second.try_recv().unwrap(), ReloadMessage::Reload);
    }

    #[test]
    fn sending_without_clients_is_fine() {
        ReloadHub::new().send(ReloadMessage::Reload);
    }

    #[test]
    fn serializes_tagged_messages() {
        let json = serde_json::to_string(&ReloadMessage::BuildFailed {
            message: "compile-styles: failed".to_string(),
        })
        .unwrap();

        assert_eq!(
            json,
            r#"{"type":"build_failed","message":"compile-styles: failed"}"#
        );
        assert_eq!(
            serde_json::to_string(&ReloadMessage::Connected).unwrap(),
            r#"{"type":"connected"}"#
        );
    }

    #[test]
    fn injects_before_closing_body() {
        let html = "<html><BODY><p>hi</p></BODY></html>";

        assert_eq!(
            inject_script(html),
            r#"<html><BODY><p>hi</p><script src="/__livereload.js"></script></BODY></html>"#
        );
    }

    #[test]
    fn appends_when_body_is_missing() {
        assert_eq!(
            inject_script("<p>fragment</p>"),
            r#"<p>fragment</p><script src="/__livereload.js"></script>"#
        );
    }
}

//! Control messages posted to the worker by pages.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;

/// Commands the worker understands. Anything else is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
  #[serde(rename = "CLEAR_DATA_CACHE")]
  ClearDataCache,
}

impl Message {
  pub fn parse(data: &Value) -> Option<Self> {
    serde_json::from_value(data.clone()).ok()
  }
}

/// Acknowledgement sent back on the reply port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
  pub status: String,
}

impl Reply {
  pub fn cache_cleared() -> Self {
    Self {
      status: "cache_cleared".to_string(),
    }
  }
}

/// Sending half of a message channel handed over with a message.
#[derive(Debug)]
pub struct ReplyPort(oneshot::Sender<Value>);

impl ReplyPort {
  pub fn channel() -> (Self, oneshot::Receiver<Value>) {
    let (tx, rx) = oneshot::channel();
    (Self(tx), rx)
  }

  /// Post a reply. Returns false when the other side is gone.
  pub fn post(self, reply: &Reply) -> bool {
    match serde_json::to_value(reply) {
      Ok(value) => self.0.send(value).is_ok(),
      Err(_) => false,
    }
  }
}

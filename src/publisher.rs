use std::collections::HashMap;
use std::fmt::Display;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::Result;
use crate::payload::FieldValue;

/// Transport used to deliver a value to the message bus.
#[async_trait]
pub trait MessageSink {
    async fn publish(&self, topic: &str, payload: String, retain: bool) -> Result<()>;
}

/// Report-by-exception publisher: a channel is only sent when its value
/// differs from the last one delivered on it.
///
/// The cache lives as long as the publisher and is only updated after the
/// sink accepted the message, so a failed send is retried on a later frame.
pub struct ChangeGatedPublisher<S> {
    sink: S,
    prefix: String,
    last: HashMap<String, String>,
}

impl<S: MessageSink> ChangeGatedPublisher<S> {
    pub fn new(sink: S, prefix: impl Into<String>) -> Self {
        Self {
            sink,
            prefix: prefix.into(),
            last: HashMap::new(),
        }
    }

    pub fn topic(&self, channel: &str) -> String {
        format!("{}/{}", self.prefix, channel)
    }

    /// Publishes `value` on `<prefix>/<channel>`.
    ///
    /// Returns true when the value was sent, false when it was unchanged or
    /// the sink reported a failure.
    pub async fn publish(&mut self, channel: &str, value: impl Display) -> bool {
        let topic = self.topic(channel);
        let payload = value.to_string();

        if self.last.get(&topic) == Some(&payload) {
            return false;
        }

        match self.sink.publish(&topic, payload.clone(), true).await {
            Ok(()) => {
                debug!("MQTT {} = {}", topic, payload);
                self.last.insert(topic, payload);
                true
            }
            Err(e) => {
                warn!("Failed to publish {} = {}: {}", topic, payload, e);
                false
            }
        }
    }

    /// Publishes every channel in order, returning how many were sent.
    pub async fn publish_all(&mut self, channels: &[(String, FieldValue)]) -> usize {
        let mut sent = 0;
        for (channel, value) in channels {
            if self.publish(channel, value).await {
                sent += 1;
            }
        }
        sent
    }

    /// Last value delivered on a full topic.
    pub fn last_published(&self, topic: &str) -> Option<&str> {
        self.last.get(topic).map(String::as_str)
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}

//! Scripted in-memory channel for session and queue tests.

use std::sync::Mutex;

use chunkwire_channel::{
    BoxFuture, ChannelIdentity, EventChannel, EventHandler, HandlerId, HandlerRegistry,
    InboundEvent,
};
use chunkwire_protocol::constants::{
    EVENT_UPLOAD_ACKNOWLEDGED, EVENT_UPLOAD_CHUNK_RECEIVED, EVENT_UPLOAD_COMPLETE,
    EVENT_UPLOAD_END, EVENT_UPLOAD_START,
};

/// Something the client sent.
#[derive(Debug, Clone)]
pub(crate) enum Sent {
    Event {
        name: String,
        data: Option<serde_json::Value>,
    },
    Binary {
        name: String,
        header: serde_json::Value,
        data: Vec<u8>,
    },
}

impl Sent {
    pub(crate) fn name(&self) -> &str {
        match self {
            Sent::Event { name, .. } | Sent::Binary { name, .. } => name,
        }
    }
}

/// Maps each outbound message to the server's replies.
pub(crate) type Script = Box<dyn FnMut(&Sent) -> Vec<InboundEvent> + Send>;

pub(crate) fn event(name: &str, data: Option<serde_json::Value>) -> InboundEvent {
    InboundEvent::new(name, data)
}

pub(crate) fn chunk_ack(uploaded: u64) -> InboundEvent {
    event(
        EVENT_UPLOAD_CHUNK_RECEIVED,
        Some(serde_json::json!({ "uploadedSize": uploaded })),
    )
}

/// A server that accepts everything and reports the received size.
pub(crate) fn happy_server() -> Script {
    let mut received = 0u64;
    Box::new(move |sent: &Sent| match sent {
        Sent::Event { name, .. } if name == EVENT_UPLOAD_START => {
            received = 0;
            vec![event(EVENT_UPLOAD_ACKNOWLEDGED, None)]
        }
        Sent::Binary { data, .. } => {
            received += data.len() as u64;
            vec![chunk_ack(received)]
        }
        Sent::Event { name, .. } if name == EVENT_UPLOAD_END => vec![event(
            EVENT_UPLOAD_COMPLETE,
            Some(serde_json::json!({ "size": received })),
        )],
        _ => vec![],
    })
}

/// Channel whose server side is a script. Replies are dispatched
/// synchronously from inside `emit`.
pub(crate) struct ScriptedChannel {
    connected: bool,
    registry: HandlerRegistry,
    sent: Mutex<Vec<Sent>>,
    script: Mutex<Script>,
}

impl ScriptedChannel {
    pub(crate) fn connected(script: Script) -> Self {
        Self {
            connected: true,
            registry: HandlerRegistry::new(),
            sent: Mutex::new(Vec::new()),
            script: Mutex::new(script),
        }
    }

    pub(crate) fn disconnected() -> Self {
        Self {
            connected: false,
            ..Self::connected(Box::new(|_sent: &Sent| vec![]))
        }
    }

    pub(crate) fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn sent_names(&self) -> Vec<String> {
        self.sent().iter().map(|s| s.name().to_string()).collect()
    }

    /// Binary chunk frames: `(header, bytes)`.
    pub(crate) fn chunks(&self) -> Vec<(serde_json::Value, Vec<u8>)> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Binary { header, data, .. } => Some((header, data)),
                Sent::Event { .. } => None,
            })
            .collect()
    }

    pub(crate) fn handler_count(&self, event: &str) -> usize {
        self.registry.handler_count(event)
    }

    fn deliver(&self, sent: Sent) {
        let replies = {
            let mut guard = self.script.lock().unwrap();
            let script = &mut *guard;
            script(&sent)
        };
        self.sent.lock().unwrap().push(sent);
        for reply in replies {
            self.registry.dispatch(&reply);
        }
    }
}

impl EventChannel for ScriptedChannel {
    fn is_connected(&self) -> bool {
        self.connected
    }

    fn identity(&self) -> Option<ChannelIdentity> {
        self.connected.then(|| ChannelIdentity::from("user-1"))
    }

    fn emit<'a>(&'a self, event: &'a str, data: Option<serde_json::Value>) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.deliver(Sent::Event {
                name: event.to_string(),
                data,
            });
        })
    }

    fn emit_binary<'a>(
        &'a self,
        event: &'a str,
        header: serde_json::Value,
        data: Vec<u8>,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.deliver(Sent::Binary {
                name: event.to_string(),
                header,
                data,
            });
        })
    }

    fn on(&self, event: &str, handler: EventHandler) -> HandlerId {
        self.registry.on(event, handler)
    }

    fn off(&self, event: &str, id: HandlerId) {
        self.registry.off(event, id);
    }

    fn remove_all_listeners(&self, event: &str) {
        self.registry.remove_all(event);
    }
}

use crate::protocol::{ChunkPayload, DonePayload, ErrorPayload, StatusPayload, StreamFrame};
use tracing::warn;

/// Known event tags plus a forward-compatible catch-all for anything a newer
/// backend may send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Status,
    Data,
    AiChunk,
    Done,
    Error,
    Unknown,
}

impl EventKind {
    pub fn parse(tag: &str) -> Self {
        match tag {
            "status" => EventKind::Status,
            "data" => EventKind::Data,
            "ai_chunk" => EventKind::AiChunk,
            "done" => EventKind::Done,
            "error" => EventKind::Error,
            _ => EventKind::Unknown,
        }
    }
}

type StatusHandler = Box<dyn FnMut(&str, &str) + Send>;
type DataHandler = Box<dyn FnMut(&serde_json::Value) + Send>;
type ChunkHandler = Box<dyn FnMut(&str) + Send>;
type DoneHandler = Box<dyn FnMut(bool, Option<&str>) + Send>;
type ErrorHandler = Box<dyn FnMut(&str) + Send>;

/// The subset of handlers a caller wires up; absent handlers are no-ops.
#[derive(Default)]
pub struct StreamCallbacks {
    status: Option<StatusHandler>,
    data: Option<DataHandler>,
    chunk: Option<ChunkHandler>,
    done: Option<DoneHandler>,
    error: Option<ErrorHandler>,
}

impl StreamCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_status(mut self, handler: impl FnMut(&str, &str) + Send + 'static) -> Self {
        self.status = Some(Box::new(handler));
        self
    }

    pub fn on_data(mut self, handler: impl FnMut(&serde_json::Value) + Send + 'static) -> Self {
        self.data = Some(Box::new(handler));
        self
    }

    pub fn on_chunk(mut self, handler: impl FnMut(&str) + Send + 'static) -> Self {
        self.chunk = Some(Box::new(handler));
        self
    }

    pub fn on_done(mut self, handler: impl FnMut(bool, Option<&str>) + Send + 'static) -> Self {
        self.done = Some(Box::new(handler));
        self
    }

    pub fn on_error(mut self, handler: impl FnMut(&str) + Send + 'static) -> Self {
        self.error = Some(Box::new(handler));
        self
    }

    pub(crate) fn emit_status(&mut self, phase: &str, message: &str) {
        if let Some(handler) = self.status.as_mut() {
            handler(phase, message);
        }
    }

    pub(crate) fn emit_data(&mut self, payload: &serde_json::Value) {
        if let Some(handler) = self.data.as_mut() {
            handler(payload);
        }
    }

    pub(crate) fn emit_chunk(&mut self, content: &str) {
        if let Some(handler) = self.chunk.as_mut() {
            handler(content);
        }
    }

    pub(crate) fn emit_done(&mut self, success: bool, message: Option<&str>) {
        if let Some(handler) = self.done.as_mut() {
            handler(success, message);
        }
    }

    pub(crate) fn emit_error(&mut self, message: &str) {
        if let Some(handler) = self.error.as_mut() {
            handler(message);
        }
    }
}

/// Routes one decoded frame to the matching callback. A frame whose payload
/// fails to parse is logged and dropped; the stream keeps going.
pub fn dispatch(frame: &StreamFrame, callbacks: &mut StreamCallbacks) {
    let kind = EventKind::parse(&frame.event);
    if kind == EventKind::Unknown {
        return;
    }

    let payload: serde_json::Value = match serde_json::from_str(&frame.data) {
        Ok(value) => value,
        Err(err) => {
            warn!(event = %frame.event, %err, "dropping frame with malformed payload");
            return;
        }
    };

    match kind {
        EventKind::Status => match serde_json::from_value::<StatusPayload>(payload) {
            Ok(status) => callbacks.emit_status(&status.phase, &status.message),
            Err(err) => warn!(%err, "dropping malformed status frame"),
        },
        EventKind::Data => callbacks.emit_data(&payload),
        EventKind::AiChunk => match serde_json::from_value::<ChunkPayload>(payload) {
            Ok(chunk) => callbacks.emit_chunk(&chunk.content),
            Err(err) => warn!(%err, "dropping malformed ai_chunk frame"),
        },
        EventKind::Done => match serde_json::from_value::<DonePayload>(payload) {
            Ok(done) => callbacks.emit_done(done.success, done.message.as_deref()),
            Err(err) => warn!(%err, "dropping malformed done frame"),
        },
        EventKind::Error => match serde_json::from_value::<ErrorPayload>(payload) {
            Ok(error) => callbacks.emit_error(&error.into_message()),
            Err(err) => warn!(%err, "dropping malformed error frame"),
        },
        EventKind::Unknown => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn frame(event: &str, data: &str) -> StreamFrame {
        StreamFrame {
            event: event.to_string(),
            data: data.to_string(),
        }
    }

    fn recording_callbacks() -> (StreamCallbacks, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let callbacks = StreamCallbacks::new()
            .on_status({
                let log = log.clone();
                move |phase, message| {
                    log.lock().unwrap().push(format!("status:{phase}:{message}"))
                }
            })
            .on_data({
                let log = log.clone();
                move |payload| log.lock().unwrap().push(format!("data:{payload}"))
            })
            .on_chunk({
                let log = log.clone();
                move |content| log.lock().unwrap().push(format!("chunk:{content}"))
            })
            .on_done({
                let log = log.clone();
                move |success, message| {
                    log.lock()
                        .unwrap()
                        .push(format!("done:{success}:{}", message.unwrap_or("-")))
                }
            })
            .on_error({
                let log = log.clone();
                move |message| log.lock().unwrap().push(format!("error:{message}"))
            });
        (callbacks, log)
    }

    #[test]
    fn status_frame_routes_phase_and_message() {
        let (mut callbacks, log) = recording_callbacks();
        dispatch(
            &frame("status", r#"{"phase":"analyzing","message":"working"}"#),
            &mut callbacks,
        );
        assert_eq!(log.lock().unwrap().as_slice(), ["status:analyzing:working"]);
    }

    #[test]
    fn data_frame_passes_payload_through() {
        let (mut callbacks, log) = recording_callbacks();
        dispatch(&frame("data", r#"{"rows":[1,2]}"#), &mut callbacks);
        assert_eq!(log.lock().unwrap().as_slice(), [r#"data:{"rows":[1,2]}"#]);
    }

    #[test]
    fn chunk_frame_routes_content() {
        let (mut callbacks, log) = recording_callbacks();
        dispatch(&frame("ai_chunk", r#"{"content":"partial text"}"#), &mut callbacks);
        assert_eq!(log.lock().unwrap().as_slice(), ["chunk:partial text"]);
    }

    #[test]
    fn done_frame_routes_success_and_optional_message() {
        let (mut callbacks, log) = recording_callbacks();
        dispatch(&frame("done", r#"{"success":true}"#), &mut callbacks);
        dispatch(
            &frame("done", r#"{"success":false,"message":"partial"}"#),
            &mut callbacks,
        );
        assert_eq!(
            log.lock().unwrap().as_slice(),
            ["done:true:-", "done:false:partial"]
        );
    }

    #[test]
    fn error_frame_prefers_error_field() {
        let (mut callbacks, log) = recording_callbacks();
        dispatch(
            &frame("error", r#"{"error":"boom","message":"ignored"}"#),
            &mut callbacks,
        );
        dispatch(&frame("error", r#"{"message":"fallback"}"#), &mut callbacks);
        assert_eq!(log.lock().unwrap().as_slice(), ["error:boom", "error:fallback"]);
    }

    #[test]
    fn malformed_json_is_dropped_without_panic() {
        let (mut callbacks, log) = recording_callbacks();
        dispatch(&frame("done", "{not json"), &mut callbacks);
        dispatch(&frame("done", r#"{"success":true}"#), &mut callbacks);
        assert_eq!(log.lock().unwrap().as_slice(), ["done:true:-"]);
    }

    #[test]
    fn unknown_event_tag_is_ignored() {
        let (mut callbacks, log) = recording_callbacks();
        dispatch(&frame("heartbeat", r#"{"n":1}"#), &mut callbacks);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn absent_handlers_are_noops() {
        let mut callbacks = StreamCallbacks::new();
        dispatch(&frame("ai_chunk", r#"{"content":"x"}"#), &mut callbacks);
        dispatch(&frame("done", r#"{"success":true}"#), &mut callbacks);
    }
}

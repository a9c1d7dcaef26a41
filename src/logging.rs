// src/logging.rs
//
// The node-scoped logger (§4.J "log" event, §5 "scoped logger context").
// Node executors call `logging::info(...)` etc. without any context
// parameter; the driver establishes a thread-local scope immediately before
// invoking an executor and tears it down on every exit path via the guard's
// `Drop` impl, mirroring the teacher's `LogBuffer`/`TuiLogger` pattern of a
// lock-guarded buffer rather than a full message bus.
//
// This is thread-local, not process-global like the teacher's single
// `TuiLogger`: concurrent workflow executions (§5) run on different
// threads, each with its own scope.

use crate::events::LogLevel;
use chrono::{DateTime, Utc};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

pub struct LogRecord {
    pub level: LogLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

struct ScopedContext {
    node_id: String,
    node_type: String,
    buffer: Arc<Mutex<VecDeque<LogRecord>>>,
}

thread_local! {
    static CONTEXT: RefCell<Option<ScopedContext>> = RefCell::new(None);
}

/// Establishes the scope for the current thread. Returned guard clears it
/// on drop (normal return, early return, or unwind), which is the release
/// side of "established before each executor invocation and released on
/// every exit path" (§5).
#[must_use]
pub struct ScopeGuard {
    _private: (),
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        CONTEXT.with(|c| *c.borrow_mut() = None);
    }
}

pub fn enter(node_id: String, node_type: String) -> (ScopeGuard, Arc<Mutex<VecDeque<LogRecord>>>) {
    let buffer = Arc::new(Mutex::new(VecDeque::new()));
    CONTEXT.with(|c| {
        *c.borrow_mut() = Some(ScopedContext {
            node_id,
            node_type,
            buffer: buffer.clone(),
        });
    });
    (ScopeGuard { _private: () }, buffer)
}

fn emit(level: LogLevel, message: String) {
    let recorded = CONTEXT.with(|c| {
        if let Some(ctx) = c.borrow().as_ref() {
            ctx.buffer.lock().expect("log buffer poisoned").push_back(LogRecord {
                level,
                message: message.clone(),
                timestamp: Utc::now(),
            });
            true
        } else {
            false
        }
    });
    if !recorded {
        // No active node scope: fall back to the process logger rather than
        // dropping the message, matching the teacher's print-when-unset
        // fallback.
        match level {
            LogLevel::Debug => log::debug!("{message}"),
            LogLevel::Info => log::info!("{message}"),
            LogLevel::Warn => log::warn!("{message}"),
            LogLevel::Error => log::error!("{message}"),
        }
    }
}

pub fn debug(message: impl Into<String>) {
    emit(LogLevel::Debug, message.into());
}

pub fn info(message: impl Into<String>) {
    emit(LogLevel::Info, message.into());
}

pub fn warn(message: impl Into<String>) {
    emit(LogLevel::Warn, message.into());
}

pub fn error(message: impl Into<String>) {
    emit(LogLevel::Error, message.into());
}

/// Exposed so tests/drivers can assert which node a record belongs to
/// without threading context explicitly.
pub fn current_node() -> Option<(String, String)> {
    CONTEXT.with(|c| {
        c.borrow()
            .as_ref()
            .map(|ctx| (ctx.node_id.clone(), ctx.node_type.clone()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_outside_a_scope_do_not_panic() {
        info("no scope active");
    }

    #[test]
    fn scoped_messages_land_in_the_buffer() {
        let (guard, buffer) = enter("n1".into(), "demo".into());
        info("hello");
        assert_eq!(buffer.lock().unwrap().len(), 1);
        drop(guard);
        assert!(current_node().is_none());
    }
}

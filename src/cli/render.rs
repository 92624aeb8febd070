// src/cli/render.rs — Incremental terminal output for streamed replies

use std::io::Write;
use std::sync::{Arc, Mutex};

use crate::chat::{ChatUpdate, UpdateCallback};

#[derive(Debug, Default)]
struct Cursor {
    message_id: Option<String>,
    printed: usize,
    finished: bool,
}

/// Prints only the part of the assistant reply that has not been printed
/// yet, and a newline once the reply is finished.
pub struct StreamPrinter<W> {
    out: Mutex<W>,
    cursor: Mutex<Cursor>,
}

impl StreamPrinter<std::io::Stdout> {
    pub fn stdout() -> Arc<Self> {
        Arc::new(Self::new(std::io::stdout()))
    }
}

impl<W: Write + Send + 'static> StreamPrinter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
            cursor: Mutex::new(Cursor::default()),
        }
    }

    pub fn callback(self: &Arc<Self>) -> UpdateCallback {
        let printer = self.clone();
        Arc::new(move |update: ChatUpdate| printer.render(&update))
    }

    pub fn render(&self, update: &ChatUpdate) {
        let Some(reply) = update.last_assistant() else {
            return;
        };
        let (Ok(mut cursor), Ok(mut out)) = (self.cursor.lock(), self.out.lock()) else {
            return;
        };

        if cursor.message_id.as_deref() != Some(reply.id.as_str()) {
            *cursor = Cursor {
                message_id: Some(reply.id.clone()),
                ..Cursor::default()
            };
        }

        // Replies only ever grow by appending, so `printed` is a char boundary.
        if let Some(fresh) = reply.content.get(cursor.printed..) {
            if !fresh.is_empty() {
                let _ = out.write_all(fresh.as_bytes());
                cursor.printed = reply.content.len();
            }
        }
        if !reply.streaming && !cursor.finished {
            let _ = writeln!(out);
            cursor.finished = true;
        }
        let _ = out.flush();
    }

    pub fn with_output<R>(&self, f: impl FnOnce(&W) -> R) -> Option<R> {
        self.out.lock().ok().map(|out| f(&out))
    }
}

//! Optional per-operation decode trace (SPEC_FULL §10.2). Mirrors the
//! teacher's `CoderState::dbg_log` sink and its `dbg_log!`/`dbg_log_push!`/
//! `dbg_log_pop!` macros (`binschema`'s `coder/coder.rs`), except the sink
//! is threaded through call arguments rather than held as coder state,
//! since `decode` here is a recursive free function, not a method on a
//! persistent coder struct. This is the crate's only logging — no
//! `tracing`/`log` dependency is pulled in for it.

use std::fmt::{self, Arguments};

pub struct Trace<'a> {
    sink: &'a mut dyn fmt::Write,
    indent: usize,
}

impl<'a> Trace<'a> {
    pub fn new(sink: &'a mut dyn fmt::Write) -> Self {
        Trace { sink, indent: 0 }
    }

    pub(crate) fn line(&mut self, args: Arguments) {
        for _ in 0..self.indent {
            let _ = self.sink.write_str("  ");
        }
        let _ = self.sink.write_fmt(args);
        let _ = self.sink.write_str("\n");
    }

    pub(crate) fn push(&mut self, args: Arguments) {
        self.line(args);
        self.indent += 1;
    }

    pub(crate) fn pop(&mut self) {
        self.indent = self.indent.saturating_sub(1);
    }
}

/// Emit one trace line if `$trace` (an `Option<&mut Trace>` binding) holds
/// a sink.
macro_rules! trace_log {
    ($trace:expr, $($t:tt)*) => {
        if let Some(t) = $trace.as_deref_mut() {
            t.line(format_args!($($t)*));
        }
    };
}

/// Emit a line, then indent everything traced until the matching
/// `trace_pop!` (recursion into a nested structure).
macro_rules! trace_push {
    ($trace:expr, $($t:tt)*) => {
        if let Some(t) = $trace.as_deref_mut() {
            t.push(format_args!($($t)*));
        }
    };
}

macro_rules! trace_pop {
    ($trace:expr) => {
        if let Some(t) = $trace.as_deref_mut() {
            t.pop();
        }
    };
}

pub(crate) use trace_log;
pub(crate) use trace_pop;
pub(crate) use trace_push;

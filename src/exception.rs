//! Exception records built from caught errors and panics.
//!
//! A record is built fresh for every notification and dropped after the send.
//!
//! Backtraces come from the failure site where one is available:
//! - panics inside a guarded call: captured by a panic hook while the stack
//!   of the panicking function is still live;
//! - `anyhow::Error`: the backtrace anyhow captured when the error was created;
//! - any other error: captured when the record is built, so the frames show
//!   the notification site (std errors carry no backtrace of their own).

use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::cell::{Cell, RefCell};
use std::error::Error;
use std::marker::PhantomData;
use std::panic;
use std::rc::Rc;
use std::sync::Once;

/// Class name used for records built from a caught panic.
pub const PANIC_CLASS: &str = "panic";

/// Class name used for `anyhow::Error`, whose concrete type is erased.
pub const ANYHOW_CLASS: &str = "anyhow::Error";

/// Class name used for boxed `dyn Error` values.
pub const BOXED_ERROR_CLASS: &str = "Box<dyn Error>";

/// Kind, message and backtrace of a failure, ready for templating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionRecord {
    /// Kind of the failure (the error's type name for typed errors).
    pub class: String,
    /// `Display` output of the failure.
    pub message: String,
    /// Stack frame lines, each prefixed with a tab.
    pub backtrace: Vec<String>,
    /// Messages of the `source()` chain, outermost first.
    pub causes: Vec<String>,
}

impl ExceptionRecord {
    pub fn new(class: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            message: message.into(),
            backtrace: Vec::new(),
            causes: Vec::new(),
        }
    }

    /// Build a record from a typed error.
    ///
    /// The backtrace is captured here, at the notification site, and only
    /// when `RUST_BACKTRACE` or `RUST_LIB_BACKTRACE` enables capturing.
    pub fn from_error<E>(err: &E) -> Self
    where
        E: Error + 'static,
    {
        Self::from_dyn_error(std::any::type_name::<E>(), err)
    }

    /// Build a record from a type-erased error, naming it `class`.
    pub fn from_dyn_error(class: impl Into<String>, err: &(dyn Error + 'static)) -> Self {
        Self::new(class, err.to_string())
            .with_causes(source_chain(err))
            .with_backtrace(&Backtrace::capture())
    }

    /// Build a record from an `anyhow::Error`, keeping the backtrace anyhow
    /// recorded where the error was created.
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        Self::new(ANYHOW_CLASS, err.to_string())
            .with_causes(err.chain().skip(1).map(|cause| cause.to_string()).collect())
            .with_backtrace(err.backtrace())
    }

    /// Build a record from the payload of a caught panic.
    ///
    /// The record has no frames; attach the panic-site backtrace with
    /// [`with_backtrace`](Self::with_backtrace).
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "Box<dyn Any>".to_string()
        };

        Self::new(PANIC_CLASS, message)
    }

    /// Replace the backtrace with the frames of `backtrace`.
    ///
    /// A disabled or unsupported backtrace leaves the record without frames.
    pub fn with_backtrace(mut self, backtrace: &Backtrace) -> Self {
        self.backtrace = match backtrace.status() {
            BacktraceStatus::Captured => backtrace
                .to_string()
                .lines()
                .map(|line| format!("\t{}", line.trim_start()))
                .collect(),
            _ => Vec::new(),
        };
        self
    }

    pub fn with_causes(mut self, causes: Vec<String>) -> Self {
        self.causes = causes;
        self
    }

    /// Backtrace lines joined by newlines.
    pub fn backtrace_text(&self) -> String {
        self.backtrace.join("\n")
    }

    /// First line of the message, for single-line contexts such as a subject.
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }
}

fn source_chain(err: &(dyn Error + 'static)) -> Vec<String> {
    let mut causes = Vec::new();
    let mut current = err.source();
    while let Some(cause) = current {
        causes.push(cause.to_string());
        current = cause.source();
    }
    causes
}

// ===================================================================
// Reportable errors
// ===================================================================

/// Marker for concrete types implementing [`std::error::Error`].
pub enum Concrete {}

/// Marker for type-erased errors (`anyhow::Error`, boxed `dyn Error`).
pub enum Erased {}

/// Errors that a guarded call can report.
///
/// `Kind` is [`Concrete`] or [`Erased`] and is always inferred; it only
/// keeps the implementations for `anyhow::Error` and boxed errors apart
/// from the one covering every `E: Error`.
pub trait ReportableError<Kind> {
    fn to_record(&self) -> ExceptionRecord;
}

impl<E> ReportableError<Concrete> for E
where
    E: Error + 'static,
{
    fn to_record(&self) -> ExceptionRecord {
        ExceptionRecord::from_error(self)
    }
}

impl ReportableError<Erased> for anyhow::Error {
    fn to_record(&self) -> ExceptionRecord {
        ExceptionRecord::from_anyhow(self)
    }
}

impl ReportableError<Erased> for Box<dyn Error + Send + Sync> {
    fn to_record(&self) -> ExceptionRecord {
        ExceptionRecord::from_dyn_error(BOXED_ERROR_CLASS, self.as_ref())
    }
}

impl ReportableError<Erased> for Box<dyn Error + Send> {
    fn to_record(&self) -> ExceptionRecord {
        ExceptionRecord::from_dyn_error(BOXED_ERROR_CLASS, self.as_ref())
    }
}

impl ReportableError<Erased> for Box<dyn Error> {
    fn to_record(&self) -> ExceptionRecord {
        ExceptionRecord::from_dyn_error(BOXED_ERROR_CLASS, self.as_ref())
    }
}

// ===================================================================
// Panic-site backtraces
// ===================================================================

thread_local! {
    static GUARD_DEPTH: Cell<usize> = const { Cell::new(0) };
    static PANIC_BACKTRACE: RefCell<Option<Rc<Backtrace>>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Records the backtrace of panics raised on this thread while alive.
///
/// The process-wide hook is installed once and chains to the hook that was
/// active before it. It only captures on threads inside a guarded call.
pub(crate) struct PanicSiteCapture {
    _not_send: PhantomData<*const ()>,
}

impl PanicSiteCapture {
    pub(crate) fn enter() -> Self {
        PANIC_HOOK.call_once(|| {
            let previous = panic::take_hook();
            panic::set_hook(Box::new(move |info| {
                let guarded = GUARD_DEPTH.try_with(Cell::get).unwrap_or(0) > 0;
                if guarded {
                    let backtrace = Rc::new(Backtrace::force_capture());
                    let _ = PANIC_BACKTRACE.try_with(|slot| *slot.borrow_mut() = Some(backtrace));
                }
                previous(info);
            }));
        });

        GUARD_DEPTH.with(|depth| depth.set(depth.get() + 1));
        Self {
            _not_send: PhantomData,
        }
    }

    /// Backtrace of the latest panic on this thread inside a guarded call.
    pub(crate) fn panic_backtrace(&self) -> Option<Rc<Backtrace>> {
        PANIC_BACKTRACE.with(|slot| slot.borrow().clone())
    }
}

impl Drop for PanicSiteCapture {
    fn drop(&mut self) {
        let remaining = GUARD_DEPTH.with(|depth| {
            let remaining = depth.get().saturating_sub(1);
            depth.set(remaining);
            remaining
        });
        if remaining == 0 {
            PANIC_BACKTRACE.with(|slot| slot.borrow_mut().take());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[derive(Debug)]
    struct RuntimeError {
        message: String,
        source: Option<std::io::Error>,
    }

    impl std::fmt::Display for RuntimeError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(&self.message)
        }
    }

    impl Error for RuntimeError {
        fn source(&self) -> Option<&(dyn Error + 'static)> {
            self.source.as_ref().map(|e| e as &(dyn Error + 'static))
        }
    }

    fn record_of<K, E: ReportableError<K>>(err: &E) -> ExceptionRecord {
        err.to_record()
    }

    #[test]
    fn from_error_uses_type_name_and_display() {
        let err = RuntimeError {
            message: "boom".to_string(),
            source: None,
        };
        let record = ExceptionRecord::from_error(&err);

        assert!(record.class.ends_with("RuntimeError"), "{}", record.class);
        assert_eq!(record.message, "boom");
        assert!(record.causes.is_empty());
    }

    #[test]
    fn from_error_collects_source_chain() {
        let err = RuntimeError {
            message: "could not load invoice".to_string(),
            source: Some(std::io::Error::other("disk unavailable")),
        };
        let record = ExceptionRecord::from_error(&err);

        assert_eq!(record.causes, vec!["disk unavailable".to_string()]);
    }

    #[test]
    fn anyhow_error_keeps_context_chain() {
        let err = Err::<(), _>(std::io::Error::other("disk unavailable"))
            .context("could not load invoice")
            .unwrap_err();

        let record = record_of(&err);
        assert_eq!(record.class, ANYHOW_CLASS);
        assert_eq!(record.message, "could not load invoice");
        assert_eq!(record.causes, vec!["disk unavailable".to_string()]);
    }

    #[test]
    fn boxed_errors_are_reportable() {
        let err: Box<dyn Error + Send + Sync> = Box::new(RuntimeError {
            message: "boom".to_string(),
            source: Some(std::io::Error::other("socket closed")),
        });
        let record = record_of(&err);
        assert_eq!(record.class, BOXED_ERROR_CLASS);
        assert_eq!(record.message, "boom");
        assert_eq!(record.causes, vec!["socket closed".to_string()]);

        let err: Box<dyn Error> = "plain message".into();
        assert_eq!(record_of(&err).message, "plain message");
    }

    #[test]
    fn concrete_errors_go_through_from_error() {
        let err = std::io::Error::other("disk unavailable");
        let record = record_of(&err);
        assert!(record.class.ends_with("Error"), "{}", record.class);
        assert_eq!(record.message, "disk unavailable");
    }

    #[test]
    fn from_panic_reads_str_and_string_payloads() {
        let payload: Box<dyn Any + Send> = Box::new("index out of bounds");
        let record = ExceptionRecord::from_panic(payload.as_ref());
        assert_eq!(record.class, PANIC_CLASS);
        assert_eq!(record.message, "index out of bounds");
        assert!(record.backtrace.is_empty());

        let payload: Box<dyn Any + Send> = Box::new(format!("bad state {}", 7));
        let record = ExceptionRecord::from_panic(payload.as_ref());
        assert_eq!(record.message, "bad state 7");

        let payload: Box<dyn Any + Send> = Box::new(42_u32);
        let record = ExceptionRecord::from_panic(payload.as_ref());
        assert_eq!(record.message, "Box<dyn Any>");
    }

    #[test]
    fn summary_is_first_message_line() {
        let record = ExceptionRecord::new("RuntimeError", "query failed\nSELECT 1\n");
        assert_eq!(record.summary(), "query failed");
        assert_eq!(ExceptionRecord::new("RuntimeError", "").summary(), "");
    }

    #[test]
    fn captured_backtrace_lines_are_tab_prefixed() {
        let backtrace = Backtrace::force_capture();
        let record = ExceptionRecord::new("RuntimeError", "boom").with_backtrace(&backtrace);

        if backtrace.status() == BacktraceStatus::Captured {
            assert!(!record.backtrace.is_empty());
        }
        assert!(record.backtrace.iter().all(|line| line.starts_with('\t')));
        assert_eq!(record.backtrace_text().lines().count(), record.backtrace.len());
    }

    #[test]
    fn disabled_backtrace_yields_no_frames() {
        let record =
            ExceptionRecord::new("RuntimeError", "boom").with_backtrace(&Backtrace::disabled());
        assert!(record.backtrace.is_empty());
        assert_eq!(record.backtrace_text(), "");
    }

    #[test]
    fn panic_capture_is_scoped_to_guard() {
        {
            let capture = PanicSiteCapture::enter();
            let _ = panic::catch_unwind(|| panic!("inside guard"));
            assert!(capture.panic_backtrace().is_some());
        }

        let capture = PanicSiteCapture::enter();
        assert!(capture.panic_backtrace().is_none());
    }
}

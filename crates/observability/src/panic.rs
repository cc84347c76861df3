//! Panic reporting.
//!
//! Background flows run each unit of work behind a panic boundary and keep
//! going. The hook installed here makes sure the panic itself still reaches the
//! logs, with the thread name, the location and a captured backtrace.

use std::any::Any;
use std::backtrace::Backtrace;
use std::panic::PanicHookInfo;
use std::sync::Once;

static INSTALL: Once = Once::new();

/// Install the tracing panic hook. Only the first call has an effect.
pub fn install_hook() {
    INSTALL.call_once(|| {
        std::panic::set_hook(Box::new(report));
    });
}

fn report(info: &PanicHookInfo<'_>) {
    let backtrace = Backtrace::force_capture();
    let thread = std::thread::current();
    let location = info
        .location()
        .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
        .unwrap_or_else(|| "<unknown>".to_string());

    ::tracing::error!(
        thread = thread.name().unwrap_or("<unnamed>"),
        location = %location,
        panic = %payload_message(info.payload()),
        backtrace = %backtrace,
        "panic captured"
    );
}

/// Best-effort text of a panic payload.
pub fn payload_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}

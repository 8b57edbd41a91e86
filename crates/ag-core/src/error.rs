//! Thread-local last-error slot and typed source locations.
//!
//! FFI-facing runtime functions cannot propagate `Result` across the
//! boundary, so they stash a message here instead of panicking. Compiler
//! passes use `SourceLocation` directly through `thiserror`-derived enums
//! and don't touch this module.

use std::cell::RefCell;
use std::ffi::CString;
use std::fmt;
use std::ptr;

/// A position in source text, carried by every compiler diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceLocation {
    pub file: &'static str,
    pub line: u32,
    pub column: u32,
}

impl SourceLocation {
    pub const fn new(file: &'static str, line: u32, column: u32) -> Self {
        Self { file, line, column }
    }

    pub const UNKNOWN: SourceLocation = SourceLocation::new("<unknown>", 0, 0);
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

thread_local! {
    static LAST_ERROR: RefCell<Option<String>> = const { RefCell::new(None) };
    static ERROR_CSTRING: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Set the last runtime error message.
///
/// Clears the cached `CString` first so a stale pointer can never be
/// handed back through `ag_get_error`.
pub fn set_runtime_error(msg: impl Into<String>) {
    ERROR_CSTRING.with(|cs| *cs.borrow_mut() = None);
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = Some(msg.into());
    });
}

pub fn take_runtime_error() -> Option<String> {
    LAST_ERROR.with(|e| e.borrow_mut().take())
}

pub fn has_runtime_error() -> bool {
    LAST_ERROR.with(|e| e.borrow().is_some())
}

pub fn clear_runtime_error() {
    LAST_ERROR.with(|e| *e.borrow_mut() = None);
    ERROR_CSTRING.with(|e| *e.borrow_mut() = None);
}

/// Format a panic payload caught at a `catch_unwind` boundary (message
/// dispatch trampolines in the scheduler run handler bodies behind one).
pub fn format_panic_payload(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn cache_error_cstring(msg: &str) -> *const i8 {
    let safe_msg: String = msg.chars().map(|c| if c == '\0' { '?' } else { c }).collect();
    let cstring = CString::new(safe_msg).expect("null bytes already replaced");
    ERROR_CSTRING.with(|cs| {
        let ptr = cstring.as_ptr();
        *cs.borrow_mut() = Some(cstring);
        ptr
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn ag_has_error() -> bool {
    has_runtime_error()
}

/// Returns null if no error is pending. The returned pointer is valid
/// only until the next call to any `ag_*_error` function.
#[unsafe(no_mangle)]
pub extern "C" fn ag_get_error() -> *const i8 {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(msg) => cache_error_cstring(msg),
        None => ptr::null(),
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn ag_take_error() -> *const i8 {
    match take_runtime_error() {
        Some(msg) => cache_error_cstring(&msg),
        None => ptr::null(),
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn ag_clear_error() {
    clear_runtime_error();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_take_error() {
        clear_runtime_error();
        assert!(!has_runtime_error());

        set_runtime_error("test error");
        assert!(has_runtime_error());

        let error = take_runtime_error();
        assert_eq!(error, Some("test error".to_string()));
        assert!(!has_runtime_error());
    }

    #[test]
    fn clear_error() {
        set_runtime_error("another error");
        assert!(has_runtime_error());

        clear_runtime_error();
        assert!(!has_runtime_error());
        assert!(take_runtime_error().is_none());
    }

    #[test]
    fn format_panic_payload_variants() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("panic message");
        assert_eq!(format_panic_payload(&*payload), "panic message");

        let payload: Box<dyn std::any::Any + Send> = Box::new("owned panic".to_string());
        assert_eq!(format_panic_payload(&*payload), "owned panic");
    }

    #[test]
    fn source_location_display() {
        let loc = SourceLocation::new("foo.ag", 12, 4);
        assert_eq!(loc.to_string(), "foo.ag:12:4");
    }
}

//! Per-thread description of the last loader-detected failure.

use std::cell::RefCell;

use zel_api::ZeResult;

thread_local! {
    static LAST_ERROR: RefCell<String> = const { RefCell::new(String::new()) };
}

/// Records why the entry point `symbol` failed with `result` on the calling thread and returns
/// `result`.
pub fn record(symbol: &str, result: ZeResult, reason: &str) -> ZeResult {
    let description = format!("{symbol}: {} ({reason})", result.name());
    tracing::debug!(%description, "loader error");
    LAST_ERROR.with(|last| *last.borrow_mut() = description);
    result
}

/// Last recorded description, `None` when nothing was recorded on this thread.
pub fn last() -> Option<String> {
    LAST_ERROR.with(|last| {
        let last = last.borrow();
        (!last.is_empty()).then(|| last.clone())
    })
}

pub fn clear() {
    LAST_ERROR.with(|last| last.borrow_mut().clear());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptions_are_per_thread() {
        clear();
        assert_eq!(last(), None);
        let result = record("zeDeviceGet", ZeResult::ErrorUninitialized, "no driver");
        assert_eq!(result, ZeResult::ErrorUninitialized);
        assert_eq!(
            last().as_deref(),
            Some("zeDeviceGet: ERROR_UNINITIALIZED (no driver)")
        );
        std::thread::spawn(|| assert_eq!(last(), None))
            .join()
            .unwrap();
        clear();
        assert_eq!(last(), None);
    }
}

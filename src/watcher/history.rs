//! Reference-counted history API interception
//!
//! `pushState` / `replaceState` are page-global. The first acquirer installs
//! the wrappers, the last releaser restores the originals, and nothing in
//! between stacks another layer.

use tracing::{debug, warn};

use crate::dom::HistoryHooks;
use crate::error::HistoryError;

#[derive(Debug, Default)]
pub struct HistoryInterceptor {
    holders: u32,
}

impl HistoryInterceptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// On failure the holder count is unchanged.
    pub fn acquire<H: HistoryHooks + ?Sized>(&mut self, hooks: &mut H) -> Result<(), HistoryError> {
        if self.holders == 0 {
            if let Err(e) = hooks.install_history_wrappers() {
                warn!(error = %e, "history interception unavailable");
                return Err(e);
            }
            debug!("history wrappers installed");
        }
        self.holders += 1;
        Ok(())
    }

    /// Releasing with no holders is a no-op.
    pub fn release<H: HistoryHooks + ?Sized>(&mut self, hooks: &mut H) {
        match self.holders {
            0 => {}
            1 => {
                self.holders = 0;
                hooks.restore_history();
                debug!("history wrappers restored");
            }
            _ => self.holders -= 1,
        }
    }

    pub fn holders(&self) -> u32 {
        self.holders
    }

    pub fn is_installed(&self) -> bool {
        self.holders > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::MemoryDom;

    #[test]
    fn test_installs_once_restores_once() {
        let mut dom = MemoryDom::new();
        let mut history = HistoryInterceptor::new();

        for _ in 0..3 {
            history.acquire(&mut dom).unwrap();
        }
        assert_eq!(dom.history_wrapper_depth(), 1);
        assert_eq!(dom.history_install_count(), 1);

        history.release(&mut dom);
        history.release(&mut dom);
        assert_eq!(dom.history_wrapper_depth(), 1);

        history.release(&mut dom);
        assert_eq!(dom.history_wrapper_depth(), 0);
        assert!(!history.is_installed());

        history.release(&mut dom);
        assert_eq!(dom.history_wrapper_depth(), 0);
    }

    #[test]
    fn test_reinstall_after_full_release() {
        let mut dom = MemoryDom::new();
        let mut history = HistoryInterceptor::new();
        history.acquire(&mut dom).unwrap();
        history.release(&mut dom);
        history.acquire(&mut dom).unwrap();
        assert_eq!(dom.history_wrapper_depth(), 1);
        assert_eq!(dom.history_install_count(), 2);
    }

    #[test]
    fn test_failed_install_holds_nothing() {
        let mut dom = MemoryDom::new();
        dom.refuse_history(true);
        let mut history = HistoryInterceptor::new();
        assert!(history.acquire(&mut dom).is_err());
        assert_eq!(history.holders(), 0);

        dom.refuse_history(false);
        history.acquire(&mut dom).unwrap();
        assert_eq!(history.holders(), 1);
    }
}

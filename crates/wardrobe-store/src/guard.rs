/// Runs a compensating action when dropped, unless disarmed.
///
/// Store operations that hold state across an await arm one of these so
/// that a dropped future still undoes its local change.
pub(crate) struct Rollback<F: FnOnce()> {
    action: Option<F>,
}

impl<F: FnOnce()> Rollback<F> {
    pub(crate) fn new(action: F) -> Self {
        Self {
            action: Some(action),
        }
    }

    pub(crate) fn disarm(mut self) {
        self.action = None;
    }
}

impl<F: FnOnce()> Drop for Rollback<F> {
    fn drop(&mut self) {
        if let Some(action) = self.action.take() {
            action();
        }
    }
}

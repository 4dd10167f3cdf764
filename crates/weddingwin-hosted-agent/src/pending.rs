/// One-slot holding cell with a single producer and a single consumer.
///
/// A newer value displaces an older one; `take` empties the slot so a held
/// value is handed out at most once.
#[derive(Debug)]
pub struct PendingSlot<T> {
    value: Option<T>,
}

impl<T> Default for PendingSlot<T> {
    fn default() -> Self {
        Self { value: None }
    }
}

impl<T> PendingSlot<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value`, returning whatever it displaced.
    pub fn put(&mut self, value: T) -> Option<T> {
        self.value.replace(value)
    }

    pub fn take(&mut self) -> Option<T> {
        self.value.take()
    }

    pub fn peek(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn is_occupied(&self) -> bool {
        self.value.is_some()
    }

    pub fn clear(&mut self) {
        self.value = None;
    }
}

use crate::priority::{Priority, PriorityList};

/// Handle returned by [`Emitter::on`], used to detach the listener again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener<E> = Box<dyn FnMut(&E) + Send>;

/// Synchronous, priority-ordered event emitter.
///
/// Listeners run on the emitting thread in priority order; listeners with
/// the same priority run in the order they were attached.
pub struct Emitter<E> {
    listeners: PriorityList<Listener<E>>,
}

impl<E> Default for Emitter<E> {
    fn default() -> Self {
        Self {
            listeners: PriorityList::new(),
        }
    }
}

impl<E> std::fmt::Debug for Emitter<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emitter")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl<E> Emitter<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&mut self, priority: Priority, listener: impl FnMut(&E) + Send + 'static) -> ListenerId {
        ListenerId(self.listeners.insert(priority, Box::new(listener)))
    }

    pub fn off(&mut self, id: ListenerId) {
        self.listeners.retain(|entry| entry.seq != id.0);
    }

    pub fn fire(&mut self, event: &E) {
        for entry in self.listeners.iter_mut() {
            (entry.item)(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

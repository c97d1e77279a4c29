//! Listener lists for storage events.
//!
//! A [`Sigh`] owns the listeners of one event.
//! Listeners are connected and disconnected through a [`Sink`],
//! which borrows the signal without the ability to publish.

use std::fmt;

/// Identifies a connected listener for [`Sink::disconnect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Connection(usize);

type Listener<T, E> = Box<dyn FnMut(&T, E)>;

/// A list of listeners invoked with a source of type `T` and an entity of type `E`.
pub struct Sigh<T: ?Sized, E> {
    listeners: Vec<(Connection, Listener<T, E>)>,
    next_id:   usize,
}

impl<T: ?Sized, E> Default for Sigh<T, E> {
    fn default() -> Self { Self { listeners: Vec::new(), next_id: 0 } }
}

impl<T: ?Sized, E> fmt::Debug for Sigh<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sigh").field("listeners", &self.listeners.len()).finish()
    }
}

impl<T: ?Sized, E: Copy> Sigh<T, E> {
    /// Creates a signal without listeners.
    pub fn new() -> Self { Self::default() }

    /// The number of connected listeners.
    pub fn len(&self) -> usize { self.listeners.len() }

    /// Whether no listeners are connected.
    pub fn is_empty(&self) -> bool { self.listeners.is_empty() }

    /// Invokes every listener in connection order.
    pub fn publish(&mut self, source: &T, entity: E) {
        for (_, listener) in &mut self.listeners {
            listener(source, entity);
        }
    }

    /// Borrows the signal for connecting and disconnecting listeners.
    pub fn sink(&mut self) -> Sink<'_, T, E> { Sink { sigh: self } }
}

/// Connects and disconnects listeners of a [`Sigh`].
pub struct Sink<'t, T: ?Sized, E> {
    sigh: &'t mut Sigh<T, E>,
}

impl<'t, T: ?Sized, E: Copy> Sink<'t, T, E> {
    /// Appends a listener. Listeners run in the order they were connected.
    pub fn connect(&mut self, listener: impl FnMut(&T, E) + 'static) -> Connection {
        let connection = Connection(self.sigh.next_id);
        self.sigh.next_id += 1;
        self.sigh.listeners.push((connection, Box::new(listener)));
        connection
    }

    /// Removes a listener. Returns whether it was still connected.
    pub fn disconnect(&mut self, connection: Connection) -> bool {
        let before = self.sigh.listeners.len();
        self.sigh.listeners.retain(|&(id, _)| id != connection);
        self.sigh.listeners.len() != before
    }

    /// Removes every listener.
    pub fn clear(&mut self) { self.sigh.listeners.clear(); }

    /// The number of connected listeners.
    pub fn len(&self) -> usize { self.sigh.len() }

    /// Whether no listeners are connected.
    pub fn is_empty(&self) -> bool { self.sigh.is_empty() }
}

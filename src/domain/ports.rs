use crate::domain::model::{Command, Payload};
use crate::utils::error::Result;

/// A way of exchanging one command for one response object with the service.
///
/// Calls block until the response arrives, the connection fails, or an I/O
/// timeout expires.
pub trait Transport: Send {
    fn call(&mut self, command: Command, payload: Payload) -> Result<Payload>;

    /// Releases any held connection. Safe to call repeatedly.
    fn close(&mut self);
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn call(&mut self, command: Command, payload: Payload) -> Result<Payload> {
        (**self).call(command, payload)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

//! Participants run under `std::panic::catch_unwind`; a panic comes back as a
//! `Box<dyn Any + Send>` payload which usually carries the panic message.

use std::any::Any;

/// Attempt to create a `String` with the given context and downcast
/// the payload to look for a message within it. If no message is found,
/// the `String` will contain only the context.
pub fn panic_to_string(context: &str, err: &(dyn Any + Send)) -> String {
    if let Some(err) = err.downcast_ref::<&str>() {
        return format!("{}: {}", context, err);
    }
    if let Some(err) = err.downcast_ref::<String>() {
        return format!("{}: {}", context, err);
    }
    format!("{} (no message)", context)
}

//! Container event listeners

use crate::{ContainerType, Packet, Stream};

/// Receives lifecycle and packet events from a [`crate::Container`].
///
/// Every method has an empty default, so implementors only override the
/// events they care about. Listeners run synchronously inside the
/// container operation that raised the event.
pub trait ContainerListener: Send {
    /// Container opened on `url`
    fn on_open(&mut self, _url: &str, _kind: ContainerType) {}

    /// Container closed, explicitly or on drop
    fn on_close(&mut self) {}

    /// Stream registered, by the caller (write) or by discovery (read)
    fn on_add_stream(&mut self, _stream: &Stream) {}

    fn on_write_header(&mut self) {}

    /// Packet returned by `read_next_packet`
    fn on_read_packet(&mut self, _packet: &Packet) {}

    /// Packet handed to the muxer. Called in physical emission order,
    /// which differs from call order when interleaving.
    fn on_write_packet(&mut self, _packet: &Packet) {}

    /// Interleave queue force-flushed `_count` packets
    fn on_flush(&mut self, _count: usize) {}

    fn on_write_trailer(&mut self) {}
}

pub(crate) fn notify(
    listeners: &mut [Box<dyn ContainerListener>],
    mut event: impl FnMut(&mut dyn ContainerListener),
) {
    for listener in listeners {
        event(listener.as_mut());
    }
}

//! The message channel model and its mapping to transport send modes.
//!
//! Applications request delivery guarantees in terms of the rich
//! [`MessageChannel`] enumeration; transports only promise the 2-tier
//! [`SendMode`] contract. The mapping here is the entire bridge.

use crosswire_transport::SendMode;

/// The delivery guarantee requested for a message.
///
/// Different kinds of traffic need different guarantees: an auth message
/// MUST arrive (reliable), while a position update sent sixty times a
/// second can afford to lose a few (unreliable). Ordered-vs-sequenced
/// distinctions are preserved for transports that understand them, but
/// only the reliable/unreliable split is guaranteed end to end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MessageChannel {
    /// Delivered in order, no loss. Like TCP. The default.
    #[default]
    Reliable,

    /// Delivered (no loss), but may arrive out of order.
    ReliableUnordered,

    /// Delivered, and stale messages are dropped in favor of newer ones.
    ReliableSequenced,

    /// May be lost, may arrive out of order. Like UDP.
    Unreliable,

    /// May be lost; stale messages are dropped in favor of newer ones.
    UnreliableSequenced,

    /// No channel information.
    ///
    /// Receive-side only: transports that carry no per-message channel
    /// metadata report inbound traffic under `Unknown`. It is never a
    /// valid argument on the send path.
    Unknown,
}

impl MessageChannel {
    /// Collapses this channel to the transport's 2-tier send mode.
    ///
    /// Every `Reliable*` variant maps to [`SendMode::Reliable`], both
    /// `Unreliable*` variants to [`SendMode::Unreliable`].
    ///
    /// # Panics
    /// Panics on [`MessageChannel::Unknown`] — passing it to a send is a
    /// programming error, not a runtime condition to recover from.
    pub fn send_mode(self) -> SendMode {
        match self {
            MessageChannel::Reliable
            | MessageChannel::ReliableUnordered
            | MessageChannel::ReliableSequenced => SendMode::Reliable,
            MessageChannel::Unreliable
            | MessageChannel::UnreliableSequenced => SendMode::Unreliable,
            MessageChannel::Unknown => {
                panic!("MessageChannel::Unknown is not sendable")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_mode_reliable_variants_map_to_reliable() {
        assert_eq!(MessageChannel::Reliable.send_mode(), SendMode::Reliable);
        assert_eq!(
            MessageChannel::ReliableUnordered.send_mode(),
            SendMode::Reliable
        );
        assert_eq!(
            MessageChannel::ReliableSequenced.send_mode(),
            SendMode::Reliable
        );
    }

    #[test]
    fn test_send_mode_unreliable_variants_map_to_unreliable() {
        assert_eq!(
            MessageChannel::Unreliable.send_mode(),
            SendMode::Unreliable
        );
        assert_eq!(
            MessageChannel::UnreliableSequenced.send_mode(),
            SendMode::Unreliable
        );
    }

    #[test]
    #[should_panic(expected = "not sendable")]
    fn test_send_mode_unknown_panics() {
        let _ = MessageChannel::Unknown.send_mode();
    }

    #[test]
    fn test_default_is_reliable() {
        assert_eq!(MessageChannel::default(), MessageChannel::Reliable);
    }
}

//! Addressed datagrams.

use std::net::{Ipv4Addr, SocketAddr};

use bytes::Bytes;

/// One UDP message and the addresses it travels between.
///
/// Received datagrams carry the peer that sent them and the local address
/// they arrived on. Datagrams built with [`Datagram::to`] have an
/// unspecified sender until the socket sends them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    payload: Bytes,
    sender: SocketAddr,
    recipient: SocketAddr,
}

impl Datagram {
    pub(crate) fn received(payload: Bytes, sender: SocketAddr, recipient: SocketAddr) -> Self {
        Self {
            payload,
            sender,
            recipient,
        }
    }

    /// Outgoing datagram addressed to `recipient`.
    pub fn to(recipient: SocketAddr, payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
            sender: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            recipient,
        }
    }

    /// Datagram addressed back to whoever sent this one, from the address it arrived on.
    pub fn reply(&self, payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
            sender: self.recipient,
            recipient: self.sender,
        }
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    pub fn sender(&self) -> SocketAddr {
        self.sender
    }

    pub fn recipient(&self) -> SocketAddr {
        self.recipient
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_swaps_addresses() {
        let peer: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        let local: SocketAddr = "127.0.0.1:5000".parse().unwrap();
        let incoming = Datagram::received(Bytes::from_static(b"ping"), peer, local);

        let reply = incoming.reply("pong");
        assert_eq!(reply.recipient(), peer);
        assert_eq!(reply.sender(), local);
        assert_eq!(reply.payload().as_ref(), b"pong");
    }

    #[test]
    fn outgoing_datagram_has_no_sender_yet() {
        let target: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        let datagram = Datagram::to(target, vec![1u8, 2, 3]);
        assert_eq!(datagram.recipient(), target);
        assert_eq!(datagram.sender().port(), 0);
        assert_eq!(datagram.len(), 3);
    }
}

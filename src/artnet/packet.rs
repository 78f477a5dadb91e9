//! Art-Net wire format: the OpDmx (0x5000) and ArtPoll/ArtPollReply
//! packets . Byte layout is grounded
//! directly on the teacher's `build_artdmx_packet`/`build_artpoll_packet`,
//! with one deliberate deviation: the spec's header names sub-universe
//! and net as two separate bytes, so this version keeps them separate
//! end to end rather than packing them into one `port_address` value
//! and splitting it back apart at send time.

pub const ARTNET_PORT: u16 = 6454;
const HEADER: &[u8; 8] = b"Art-Net\0";
const OPCODE_DMX: u16 = 0x5000;
const OPCODE_POLL: u16 = 0x2000;
const OPCODE_POLL_REPLY: u16 = 0x2100;
const PROTOCOL_VERSION: u16 = 0x000E;

/// Build an OpDmx packet: 18-byte header + up to 512 bytes DMX payload.
pub fn build_opdmx_packet(sequence: u8, physical: u8, sub_universe: u8, net: u8, payload: &[u8]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(18 + payload.len());
    packet.extend_from_slice(HEADER);
    packet.extend_from_slice(&OPCODE_DMX.to_le_bytes());
    packet.extend_from_slice(&PROTOCOL_VERSION.to_be_bytes());
    packet.push(sequence);
    packet.push(physical);
    packet.push(sub_universe);
    packet.push(net);
    packet.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    packet.extend_from_slice(payload);
    packet
}

pub fn build_artpoll_packet() -> Vec<u8> {
    let mut packet = Vec::with_capacity(14);
    packet.extend_from_slice(HEADER);
    packet.extend_from_slice(&OPCODE_POLL.to_le_bytes());
    packet.extend_from_slice(&PROTOCOL_VERSION.to_be_bytes());
    packet.push(0x00); // TalkToMe: auto
    packet.push(0x00); // Priority
    packet
}

#[derive(Debug, Clone)]
pub struct PollReply {
    pub short_name: String,
    pub long_name: String,
    pub net: u8,
    pub sub_universe: u8,
}

/// Parse an ArtPollReply (opcode 0x2100). Returns `None` for anything
/// that isn't a well-formed Art-Net packet of that type.
pub fn parse_poll_reply(buf: &[u8]) -> Option<PollReply> {
    if buf.len() < 108 || &buf[0..8] != HEADER {
        return None;
    }
    let opcode = u16::from_le_bytes([buf[8], buf[9]]);
    if opcode != OPCODE_POLL_REPLY {
        return None;
    }

    let net = buf[18];
    let sub_universe = buf[19];
    let short_name = String::from_utf8_lossy(&buf[26..26 + 18])
        .trim_matches(char::from(0))
        .to_string();
    let long_name = String::from_utf8_lossy(&buf[44..44 + 64])
        .trim_matches(char::from(0))
        .to_string();

    Some(PollReply { short_name, long_name, net, sub_universe })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opdmx_header_matches_wire_format() {
        let packet = build_opdmx_packet(7, 0, 3, 1, &[255, 0, 0]);
        assert_eq!(&packet[0..8], b"Art-Net\0");
        assert_eq!(&packet[8..10], &[0x00, 0x50]); // opcode 0x5000 LE
        assert_eq!(&packet[10..12], &[0x00, 0x0E]); // protocol version BE
        assert_eq!(packet[12], 7); // sequence
        assert_eq!(packet[13], 0); // physical
        assert_eq!(packet[14], 3); // sub-universe
        assert_eq!(packet[15], 1); // net
        assert_eq!(&packet[16..18], &[0x00, 0x03]); // length BE
        assert_eq!(&packet[18..21], &[255, 0, 0]);
    }

    #[test]
    fn artpoll_header_matches_wire_format() {
        let packet = build_artpoll_packet();
        assert_eq!(&packet[0..8], b"Art-Net\0");
        assert_eq!(&packet[8..10], &[0x00, 0x20]); // opcode 0x2000 LE
    }
}

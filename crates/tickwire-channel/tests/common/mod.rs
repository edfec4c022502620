#![allow(dead_code)]

use std::net::SocketAddr;
use std::thread;
use std::time::{Duration, Instant};

use bytes::{BufMut, BytesMut};
use tickwire_channel::NetworkChannel;
use tickwire_frame::{
    CodecError, Decoded, Packet, PacketCodec, PacketHeader, PacketId, PacketSink,
};
use tickwire_transport::{NetListener, NetSocket};

/// Packet whose body is `id` (u32 LE) followed by `data`. Id 0 is a
/// heartbeat with an empty body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestPacket {
    pub id: PacketId,
    pub data: Vec<u8>,
}

impl TestPacket {
    pub fn new(id: PacketId, data: &[u8]) -> Self {
        Self {
            id,
            data: data.to_vec(),
        }
    }
}

impl Packet for TestPacket {
    fn id(&self) -> PacketId {
        self.id
    }
}

pub struct BodyLength(pub usize);

impl PacketHeader for BodyLength {
    fn packet_length(&self) -> usize {
        self.0
    }
}

/// Header value the codec refuses to parse.
pub const REJECTED_HEADER: u32 = u32::MAX;

/// Header value the codec parses to no header at all.
pub const EMPTY_HEADER: u32 = u32::MAX - 1;

/// 4-byte header carrying the body length as u32 LE.
///
/// Bodies whose data starts with `!` decode with a custom error attached.
/// Bodies shorter than the 4-byte id fail to decode.
#[derive(Default)]
pub struct TestCodec {
    pub heartbeats: bool,
}

impl TestCodec {
    pub fn with_heartbeats() -> Self {
        Self { heartbeats: true }
    }
}

impl PacketCodec for TestCodec {
    type Header = BodyLength;
    type Packet = TestPacket;

    fn header_length(&self) -> usize {
        4
    }

    fn send_heartbeat(&mut self, sink: &dyn PacketSink<TestPacket>) -> bool {
        self.heartbeats && sink.enqueue(TestPacket::new(0, &[]))
    }

    fn serialize(&mut self, packet: &TestPacket, dst: &mut BytesMut) -> Result<(), CodecError> {
        if packet.id == 0 {
            dst.put_u32_le(0);
            return Ok(());
        }
        if packet.data.len() > 1024 {
            return Err(CodecError::PacketTooLarge {
                size: packet.data.len(),
                max: 1024,
            });
        }
        dst.put_u32_le((4 + packet.data.len()) as u32);
        dst.put_u32_le(packet.id);
        dst.extend_from_slice(&packet.data);
        Ok(())
    }

    fn deserialize_header(&mut self, src: &[u8]) -> Result<Decoded<BodyLength>, CodecError> {
        let raw: [u8; 4] = src.try_into().map_err(|_| CodecError::Truncated {
            expected: 4,
            actual: src.len(),
        })?;
        match u32::from_le_bytes(raw) {
            REJECTED_HEADER => Err(CodecError::Malformed("rejected header".into())),
            EMPTY_HEADER => Ok(Decoded::none()),
            length => Ok(Decoded::ok(BodyLength(length as usize))),
        }
    }

    fn deserialize_packet(
        &mut self,
        header: &BodyLength,
        src: &[u8],
    ) -> Result<Decoded<TestPacket>, CodecError> {
        if header.0 == 0 {
            return Ok(Decoded::ok(TestPacket::new(0, &[])));
        }
        if src.len() < 4 {
            return Err(CodecError::Malformed("body shorter than id".into()));
        }
        let id = u32::from_le_bytes([src[0], src[1], src[2], src[3]]);
        let packet = TestPacket::new(id, &src[4..]);
        let flagged = packet.data.first() == Some(&b'!');
        let decoded = Decoded::ok(packet);
        Ok(if flagged {
            decoded.with_custom_error("flagged body")
        } else {
            decoded
        })
    }
}

/// Wire form of a non-heartbeat packet.
pub fn wire(id: PacketId, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&((4 + data.len()) as u32).to_le_bytes());
    out.extend_from_slice(&id.to_le_bytes());
    out.extend_from_slice(data);
    out
}

pub fn loopback_listener() -> NetListener {
    NetListener::bind("127.0.0.1:0".parse().expect("loopback addr should parse"))
        .expect("listener should bind")
}

/// Accept one connection on a background thread.
pub fn accept_one(listener: NetListener) -> thread::JoinHandle<NetSocket> {
    thread::spawn(move || listener.accept().expect("listener should accept"))
}

/// A connected pair of raw sockets: (accepted side, connecting side).
pub fn socket_pair() -> (NetSocket, NetSocket) {
    let listener = loopback_listener();
    let addr = listener.local_addr();
    let server = accept_one(listener);
    let client = NetSocket::connect(addr).expect("client should connect");
    let accepted = server.join().expect("accept thread should finish");
    (accepted, client)
}

/// An address nothing is listening on.
pub fn closed_port() -> SocketAddr {
    let listener = loopback_listener();
    listener.local_addr()
}

/// Tick `channel` with a zero delta until `done` holds. Panics after 5s.
pub fn pump_until<C: PacketCodec>(channel: &NetworkChannel<C>, mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        channel.update(Duration::ZERO).expect("tick should succeed");
        thread::sleep(Duration::from_millis(5));
    }
}

/// Poll `done` without ticking. Panics after 5s.
pub fn wait_until(mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(5));
    }
}

//! Interleavings of descriptor arrival and frame-byte arrival.
//!
//! Control data for a receive can land before the frame bytes that claim
//! it: the descriptor rides the call carrying the first bytes of its
//! message, and the rest of the frame may trail in later reads. The
//! pending-descriptor FIFO has to hold the descriptor until the parser
//! recognizes the message boundary that owns it.

use std::io::{IoSlice, Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;

use fdmsg_channel::{
    codec, ChannelTransport, Header, Message, ReceiveOutcome, FLAG_HAS_DESCRIPTOR, HEADER_SIZE,
};
use nix::sys::socket::{sendmsg, ControlMessage, MsgFlags};

fn frame(msg_type: u32, flags: u16, payload: &[u8]) -> Vec<u8> {
    let hdr = Header {
        msg_type,
        flags,
        peer_id: 0,
        sender_pid: 1,
        total_len: (HEADER_SIZE + payload.len()) as u16,
    };
    let mut wire = vec![0u8; HEADER_SIZE];
    codec::encode_header(&hdr, wire.as_mut_slice());
    wire.extend_from_slice(payload);
    wire
}

fn send_with_fd(sock: &UnixStream, data: &[u8], fd: RawFd) {
    let iov = [IoSlice::new(data)];
    let fds = [fd];
    let cmsg = [ControlMessage::ScmRights(&fds)];
    let n = sendmsg::<()>(sock.as_raw_fd(), &iov, &cmsg, MsgFlags::empty(), None).unwrap();
    assert_eq!(n, data.len());
}

fn pump(rx: &mut ChannelTransport<UnixStream>) -> Message {
    loop {
        if let Some(msg) = rx.parse_next().unwrap() {
            return msg;
        }
        match rx.receive_once().unwrap() {
            ReceiveOutcome::Progressed(_) => {}
            other => panic!("unexpected receive outcome: {other:?}"),
        }
    }
}

#[test]
fn descriptor_arrives_before_its_header_completes() {
    let (mut raw, rx) = UnixStream::pair().unwrap();
    let mut rx = ChannelTransport::new(rx).unwrap();
    let (ours, theirs) = UnixStream::pair().unwrap();

    let wire = frame(11, FLAG_HAS_DESCRIPTOR, b"trailing payload");

    // First half of the header travels with the descriptor.
    send_with_fd(&raw, &wire[..HEADER_SIZE / 2], theirs.as_raw_fd());
    drop(theirs);

    assert!(matches!(
        rx.receive_once().unwrap(),
        ReceiveOutcome::Progressed(_)
    ));
    assert_eq!(rx.pending_descriptors(), 1);
    assert!(rx.parse_next().unwrap().is_none(), "header still truncated");
    assert_eq!(rx.pending_descriptors(), 1, "descriptor must not be dropped");

    // The rest of the frame arrives plain.
    raw.write_all(&wire[HEADER_SIZE / 2..]).unwrap();
    rx.receive_once().unwrap();

    let msg = rx.parse_next().unwrap().expect("frame now complete");
    assert_eq!(msg.msg_type, 11);
    assert_eq!(msg.payload.as_ref(), b"trailing payload");
    let passed = msg.descriptor.expect("descriptor claimed by its message");
    assert_eq!(rx.pending_descriptors(), 0);

    // The claimed descriptor is the socket end we sent.
    let mut passed = UnixStream::from(passed);
    passed.write_all(b"ok").unwrap();
    let mut buf = [0u8; 2];
    (&ours).read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"ok");
}

#[test]
fn descriptor_is_claimed_by_the_flagged_message_only() {
    let (tx_sock, rx_sock) = UnixStream::pair().unwrap();
    let mut tx = ChannelTransport::new(tx_sock).unwrap();
    let mut rx = ChannelTransport::new(rx_sock).unwrap();
    let (_ours, theirs) = UnixStream::pair().unwrap();

    tx.compose(1, 0, 0, None, b"plain").unwrap();
    tx.compose(2, 0, 0, Some(theirs.into()), b"carrier").unwrap();
    tx.flush().unwrap();

    // Both frames (and the descriptor) may arrive in a single receive; the
    // unflagged message must not claim it.
    let plain = pump(&mut rx);
    assert_eq!(plain.msg_type, 1);
    assert!(plain.descriptor.is_none());

    let carrier = pump(&mut rx);
    assert_eq!(carrier.msg_type, 2);
    assert!(carrier.descriptor.is_some());
    assert_eq!(rx.pending_descriptors(), 0);
}

//! End-to-end exercises over a same-process socket pair.

use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::net::UnixStream;

use fdmsg::channel::{ChannelTransport, DrainOutcome, Message, ReceiveOutcome};
use fdmsg::transport::{socket_pair, DescriptorBudget, ProcessFdTable};

fn channel_pair() -> (ChannelTransport<UnixStream>, ChannelTransport<UnixStream>) {
    let (a, b) = socket_pair().unwrap();
    (
        ChannelTransport::new(a).unwrap(),
        ChannelTransport::new(b).unwrap(),
    )
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

fn open_fd_count() -> usize {
    ProcessFdTable::new().in_use()
}

#[test]
fn ping_roundtrip() {
    let (mut tx, mut rx) = channel_pair();
    tx.compose(1, 7, 0, None, b"ping").unwrap();
    tx.flush().unwrap();

    let msg = pump(&mut rx);
    assert_eq!(msg.msg_type, 1);
    assert_eq!(msg.peer_id, 7);
    assert_eq!(msg.sender_pid, std::process::id());
    assert_eq!(msg.payload.as_ref(), b"ping");
    assert!(msg.descriptor.is_none());
}

#[test]
fn message_stream_survives_partial_io_in_order() {
    let (mut tx, mut rx) = channel_pair();
    tx.get_ref().set_nonblocking(true).unwrap();
    rx.get_ref().set_nonblocking(true).unwrap();

    const COUNT: u32 = 50;
    for i in 0..COUNT {
        let payload = vec![i as u8; (i as usize * 371) % 4000];
        tx.compose(i, i * 2, 0, None, &payload).unwrap();
    }

    // Readiness-driven pumping: drain and receive in lockstep, letting the
    // kernel buffers fill and empty as they will.
    let mut received: Vec<Message> = Vec::new();
    while received.len() < COUNT as usize {
        if tx.has_backlog() {
            match tx.drain_once().unwrap() {
                DrainOutcome::Progressed(_) | DrainOutcome::WouldBlock => {}
                DrainOutcome::Closed => panic!("peer still open"),
            }
        }
        match rx.receive_once().unwrap() {
            ReceiveOutcome::Progressed(_) | ReceiveOutcome::WouldBlock => {}
            ReceiveOutcome::Closed => panic!("peer still open"),
        }
        while let Some(msg) = rx.parse_next().unwrap() {
            received.push(msg);
        }
    }

    assert!(!tx.has_backlog());
    for (i, msg) in received.iter().enumerate() {
        let i = i as u32;
        assert_eq!(msg.msg_type, i);
        assert_eq!(msg.peer_id, i * 2);
        assert_eq!(msg.payload.len(), (i as usize * 371) % 4000);
        assert!(msg.payload.iter().all(|b| *b == i as u8));
    }
}

#[test]
fn passed_descriptor_reaches_the_same_file() {
    let (mut tx, mut rx) = channel_pair();

    let mut original = tempfile::tempfile().unwrap();
    original.write_all(b"shared resource").unwrap();
    let clone = original.try_clone().unwrap();

    tx.compose(8, 0, 0, Some(clone.into()), b"here is a file")
        .unwrap();
    tx.flush().unwrap();

    let msg = pump(&mut rx);
    let mut passed = std::fs::File::from(msg.descriptor.expect("descriptor attached"));

    passed.seek(SeekFrom::Start(0)).unwrap();
    let mut content = String::new();
    passed.read_to_string(&mut content).unwrap();
    assert_eq!(content, "shared resource");

    // Writes through the passed descriptor land in the original file.
    passed.write_all(b" and a tail").unwrap();
    original.seek(SeekFrom::Start(0)).unwrap();
    let mut full = String::new();
    original.read_to_string(&mut full).unwrap();
    assert_eq!(full, "shared resource and a tail");
}

#[test]
fn teardown_closes_unsent_descriptors_exactly_once() {
    // Borrow the socket so dropping the transport releases only what it
    // owns: the queued buffers and their descriptors.
    let (sock, _peer) = socket_pair().unwrap();
    let mut tx = ChannelTransport::new(&sock).unwrap();
    let (g1, _k1) = socket_pair().unwrap();
    let (g2, _k2) = socket_pair().unwrap();
    let baseline = open_fd_count();

    tx.compose(1, 0, 0, Some(g1.into()), b"queued").unwrap();
    tx.compose(2, 0, 0, Some(g2.into()), b"queued").unwrap();
    assert_eq!(open_fd_count(), baseline, "ownership moved, nothing closed");

    drop(tx);
    assert_eq!(open_fd_count(), baseline - 2, "both descriptors released");
}

#[test]
fn teardown_closes_unclaimed_pending_descriptors() {
    let (tx_sock, rx_sock) = socket_pair().unwrap();
    let mut tx = ChannelTransport::new(&tx_sock).unwrap();
    let mut rx = ChannelTransport::new(&rx_sock).unwrap();
    let (give, _keep) = socket_pair().unwrap();

    tx.compose(5, 0, 0, Some(give.into()), b"flagged").unwrap();
    tx.flush().unwrap();

    while rx.pending_descriptors() == 0 {
        match rx.receive_once().unwrap() {
            ReceiveOutcome::Progressed(_) => {}
            other => panic!("unexpected receive outcome: {other:?}"),
        }
    }
    let baseline = open_fd_count();

    // Never parsed, so the descriptor is still owned by the transport.
    drop(rx);
    assert_eq!(open_fd_count(), baseline - 1);
}

#[test]
fn backlog_flag_drives_write_interest() {
    let (mut tx, mut rx) = channel_pair();
    assert!(!tx.has_backlog());
    tx.compose(1, 0, 0, None, b"x").unwrap();
    assert!(tx.has_backlog());
    tx.flush().unwrap();
    assert!(!tx.has_backlog());
    let _ = pump(&mut rx);
}

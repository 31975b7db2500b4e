//! Integration tests: single-DCB I/O round trips over real socket pairs.

mod common;

use std::io::{Read, Write};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use gateline::{BufferChain, DcbState, Error, diagnostics};

use common::{gather, manager_with_mask, set_sndbuf, socket_dcb};

/// Allocate, write, verify the wire, close, reap, registry empty.
#[test]
fn single_thread_round_trip() {
    let (manager, poller) = manager_with_mask(0b1);
    let (dcb, mut peer) = socket_dcb(&manager);

    let (ok, _) = dcb.set_state(DcbState::Polling);
    assert!(ok);

    dcb.write(BufferChain::from_slice(b"HELLO")).unwrap();
    assert_eq!(dcb.writeq_len(), 0);

    let mut received = [0u8; 5];
    peer.read_exact(&mut received).unwrap();
    assert_eq!(&received, b"HELLO");

    manager.close(&dcb);
    assert_eq!(poller.removed.load(std::sync::atomic::Ordering::SeqCst), 1);
    manager.process_zombies(0);

    assert_eq!(manager.live_dcbs(), 0);
    assert_eq!(dcb.state(), DcbState::Freed);
}

/// A write larger than the socket buffer succeeds, parks the remainder on
/// the write queue, and later drains deliver every byte in order.
#[test]
fn backpressure_queues_remainder_then_drains() {
    let (manager, _poller) = manager_with_mask(0b1);
    let (dcb, mut peer) = socket_dcb(&manager);
    dcb.set_state(DcbState::Polling);
    set_sndbuf(dcb.fd(), 4096);

    const TOTAL: usize = 1 << 20;
    let payload: Vec<u8> = (0..TOTAL).map(|i| (i % 251) as u8).collect();

    let mut chain = BufferChain::new();
    for part in payload.chunks(256 * 1024) {
        chain.push(bytes::Bytes::copy_from_slice(part));
    }

    // The socket cannot absorb a megabyte: success, remainder queued.
    dcb.write(chain).unwrap();
    let queued = dcb.writeq_len();
    assert!(queued > 0, "expected backpressure to queue a remainder");
    assert!(queued < TOTAL);
    assert_eq!(dcb.stats().buffered_writes(), 1);

    let reader = thread::spawn(move || {
        let mut received = Vec::with_capacity(TOTAL);
        let mut buf = [0u8; 16384];
        while received.len() < TOTAL {
            let n = peer.read(&mut buf).unwrap();
            assert!(n > 0, "peer closed early");
            received.extend_from_slice(&buf[..n]);
        }
        received
    });

    // Drain as the peer makes room, as the poll layer would on EPOLLOUT.
    while dcb.writeq_len() > 0 {
        if dcb.drain() == 0 {
            thread::sleep(Duration::from_millis(1));
        }
    }

    let received = reader.join().unwrap();
    assert_eq!(received.len(), TOTAL);
    assert_eq!(received, payload);
}

/// 10 KiB pending with a 4 KiB buffer cap reads as three segments.
#[test]
fn read_drains_pending_bytes_in_capped_segments() {
    let (manager, _poller) = manager_with_mask(0b1);
    let (dcb, mut peer) = socket_dcb(&manager);
    dcb.set_state(DcbState::Polling);

    let payload: Vec<u8> = (0..10240).map(|i| (i % 199) as u8).collect();
    peer.write_all(&payload).unwrap();

    let mut chain = BufferChain::new();
    let n = dcb.read(&mut chain).unwrap();
    assert_eq!(n, 10240);

    let sizes: Vec<usize> = chain.segments().map(|s| s.len()).collect();
    assert_eq!(sizes, vec![4096, 4096, 2048]);
    assert_eq!(gather(&chain), payload);
}

/// Read returns zero once the peer has closed.
#[test]
fn read_returns_zero_on_peer_close() {
    let (manager, _poller) = manager_with_mask(0b1);
    let (dcb, peer) = socket_dcb(&manager);
    dcb.set_state(DcbState::Polling);
    drop(peer);

    let mut chain = BufferChain::new();
    assert_eq!(dcb.read(&mut chain).unwrap(), 0);
    assert!(chain.is_empty());
}

/// A non-EAGAIN write errno reports failure and keeps the data queued.
#[test]
fn write_to_hung_up_peer_fails_with_remainder_retained() {
    let (manager, _poller) = manager_with_mask(0b1);
    let (dcb, peer) = socket_dcb(&manager);
    dcb.set_state(DcbState::Polling);
    drop(peer);

    let result = dcb.write(BufferChain::from_slice(b"DOOMED"));
    assert!(matches!(result, Err(Error::WriteFailed(_))));
    assert_eq!(dcb.writeq_len(), 6);
}

/// Racing producers: the wire carries every message untorn, and each
/// producer's messages appear in its submission order.
#[test]
fn write_order_holds_under_racing_producers() {
    const PRODUCERS: usize = 4;
    const MESSAGES: usize = 200;
    const MSG_LEN: usize = 8; // "t0m000;\n"

    let (manager, _poller) = manager_with_mask(0b1);
    let (dcb, mut peer) = socket_dcb(&manager);
    dcb.set_state(DcbState::Polling);
    set_sndbuf(dcb.fd(), 4096);

    let reader = thread::spawn(move || {
        let total = PRODUCERS * MESSAGES * MSG_LEN;
        let mut received = Vec::with_capacity(total);
        let mut buf = [0u8; 4096];
        while received.len() < total {
            let n = peer.read(&mut buf).unwrap();
            assert!(n > 0, "peer closed early");
            received.extend_from_slice(&buf[..n]);
        }
        received
    });

    let writers: Vec<_> = (0..PRODUCERS)
        .map(|t| {
            let dcb = dcb.clone();
            thread::spawn(move || {
                for m in 0..MESSAGES {
                    let text = format!("t{t}m{m:03};\n");
                    // Two segments per message: torn interleaving would
                    // split them across another producer's write.
                    let mut chain = BufferChain::from_slice(&text.as_bytes()[..4]);
                    chain.push(bytes::Bytes::copy_from_slice(&text.as_bytes()[4..]));
                    dcb.write(chain).unwrap();
                }
            })
        })
        .collect();

    // Stand in for the poll layer's EPOLLOUT dispatch.
    let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let drainer = {
        let dcb = dcb.clone();
        let stop = stop.clone();
        thread::spawn(move || {
            loop {
                if dcb.drain() == 0 {
                    if stop.load(std::sync::atomic::Ordering::SeqCst) && dcb.writeq_len() == 0 {
                        break;
                    }
                    thread::sleep(Duration::from_micros(200));
                }
            }
        })
    };

    for writer in writers {
        writer.join().unwrap();
    }
    stop.store(true, std::sync::atomic::Ordering::SeqCst);
    drainer.join().unwrap();

    let received = reader.join().unwrap();
    let mut next_expected = [0usize; PRODUCERS];
    for message in received.chunks(MSG_LEN) {
        let text = std::str::from_utf8(message).expect("torn message");
        assert!(text.starts_with('t'), "torn message: {text:?}");
        assert_eq!(&text[6..], ";\n", "torn message: {text:?}");
        let producer: usize = text[1..2].parse().unwrap();
        let seq: usize = text[3..6].parse().unwrap();
        assert_eq!(
            seq, next_expected[producer],
            "producer {producer} messages reordered"
        );
        next_expected[producer] += 1;
    }
    assert_eq!(next_expected, [MESSAGES; PRODUCERS]);
}

/// Formatted writes reach the wire through the DCB, and reports can be
/// rendered into an administrative DCB.
#[test]
fn printf_and_report_to_admin_dcb() {
    use gateline::Dcb;

    let (manager, _poller) = manager_with_mask(0b1);
    let (dcb, _peer) = socket_dcb(&manager);
    let (admin, mut admin_peer) = socket_dcb(&manager);
    dcb.set_state(DcbState::Polling);
    admin.set_state(DcbState::Polling);

    Dcb::printf(&admin, format_args!("uptime {}s\n", 42)).unwrap();
    let mut line = [0u8; 11];
    admin_peer.read_exact(&mut line).unwrap();
    assert_eq!(&line, b"uptime 42s\n");

    diagnostics::print_dcb_to(&admin, &dcb).unwrap();
    let mut report = vec![0u8; 16];
    admin_peer.read_exact(&mut report).unwrap();
    assert!(report.starts_with(b"DCB: "));
}

/// The registry walk renders every live DCB.
#[test]
fn diagnostics_render_registry() {
    let (manager, _poller) = manager_with_mask(0b1);
    let (dcb, _peer) = socket_dcb(&manager);
    let (other, _peer2) = socket_dcb(&manager);
    dcb.set_state(DcbState::Polling);
    other.set_state(DcbState::Polling);

    dcb.write(BufferChain::from_slice(b"ping")).unwrap();

    let mut out = Vec::new();
    diagnostics::print_all(&mut out, &manager).unwrap();
    let report = String::from_utf8(out).unwrap();

    assert_eq!(report.matches("DCB: ").count(), 2);
    assert!(report.contains("DCB in the polling loop"));
    assert!(report.contains("No. of Writes:          1"));
}

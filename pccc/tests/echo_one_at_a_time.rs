//! Drives a `PcccConnection` in one-at-a-time mode against a stub daemon
//! thread speaking the SOH|len|payload socket protocol.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

use pccc::{Outcome, PcccConnection};

fn spawn_stub_daemon(listener: TcpListener) -> thread::JoinHandle<()> {
	thread::spawn(move || {
		let (mut sock, _) = listener.accept().unwrap();

		// SOH, len, DST|SRC|CMD|STS|TNS(LE)|FNC|data
		let mut header = [0u8; 2];
		sock.read_exact(&mut header).unwrap();
		assert_eq!(header[0], 0x01);

		let mut frame = vec![0u8; header[1] as usize];
		sock.read_exact(&mut frame).unwrap();

		// ACK the send.
		sock.write_all(&[0x06]).unwrap();

		let dst = frame[0];
		let src = frame[1];
		let cmd = frame[2];
		let tns = [frame[4], frame[5]];

		let mut reply = vec![src, dst, cmd | 0x40, 0x00, tns[0], tns[1]];
		reply.extend_from_slice(&frame[7..]); // echo the FNC 0x06 "diagnostic loop" payload back

		sock.write_all(&[0x01, reply.len() as u8]).unwrap();
		sock.write_all(&reply).unwrap();

		let mut ack = [0u8; 1];
		sock.read_exact(&mut ack).unwrap();
		assert_eq!(ack[0], 0x06);
	})
}

#[test]
fn echo_command_round_trips_in_blocking_mode() {
	let listener = TcpListener::bind("127.0.0.1:0").unwrap();
	let addr = listener.local_addr().unwrap();
	let daemon = spawn_stub_daemon(listener);

	let sock = TcpStream::connect(addr).unwrap();
	let mut client = PcccConnection::new(sock, 8, Duration::from_millis(500)).unwrap();

	let outcome = client.cmd_send_blocking(0, 1, 0x06, Some(0x00), vec![0xDE, 0xAD, 0xBE, 0xEF]);

	assert!(matches!(outcome, Outcome::Success));

	daemon.join().unwrap();
}

#[test]
fn daemon_nak_reports_no_deliver() {
	let listener = TcpListener::bind("127.0.0.1:0").unwrap();
	let addr = listener.local_addr().unwrap();

	let daemon = thread::spawn(move || {
		let (mut sock, _) = listener.accept().unwrap();
		let mut header = [0u8; 2];
		sock.read_exact(&mut header).unwrap();
		let mut frame = vec![0u8; header[1] as usize];
		sock.read_exact(&mut frame).unwrap();
		sock.write_all(&[0x15]).unwrap(); // NAK the send
	});

	let sock = TcpStream::connect(addr).unwrap();
	let mut client = PcccConnection::new(sock, 8, Duration::from_millis(500)).unwrap();

	let outcome = client.cmd_send_blocking(0, 1, 0x06, Some(0x00), vec![0x01]);
	assert!(matches!(outcome, Outcome::NoDeliver));

	daemon.join().unwrap();
}

#[test]
fn no_reply_times_out() {
	let listener = TcpListener::bind("127.0.0.1:0").unwrap();
	let addr = listener.local_addr().unwrap();

	let daemon = thread::spawn(move || {
		let (mut sock, _) = listener.accept().unwrap();
		let mut header = [0u8; 2];
		sock.read_exact(&mut header).unwrap();
		let mut frame = vec![0u8; header[1] as usize];
		sock.read_exact(&mut frame).unwrap();
		sock.write_all(&[0x06]).unwrap(); // ACK the send, then go silent
		thread::sleep(Duration::from_millis(300));
	});

	let sock = TcpStream::connect(addr).unwrap();
	let mut client = PcccConnection::new(sock, 8, Duration::from_millis(50)).unwrap();

	let outcome = client.cmd_send_blocking(0, 1, 0x06, Some(0x00), vec![0x01]);
	assert!(matches!(outcome, Outcome::Timeout));

	daemon.join().unwrap();
}

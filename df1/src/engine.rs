//! The ambient top-level aggregate: owns every live `Connection`, wires its
//! serial TTY, its listening socket, and its client sockets into the reactor,
//! and drives the 10ms tick that every timer in the core hangs off of.

use std::fs::File;
use std::net::{TcpListener, TcpStream};
use std::time::Duration;

use collections::bytes::Slice;
use log::{info, warn};
use runtime::{Io, Listener};
use stakker::{fwd_to, CX};

use crate::config::ConnectionConfig;
use crate::connection::Connection;
use crate::serial;

const TICK_PERIOD: Duration = Duration::from_millis(10);
const LISTEN_BACKLOG: i32 = 5;

struct ConnSlot {
	inner: Connection,
	tty: Io<File>,
	listener: Listener<TcpListener>,
	clients: Vec<Option<Io<TcpStream>>>,
}

pub struct Engine {
	conns: Vec<ConnSlot>,
}

#[cfg(unix)]
fn bind_listener(port: u16) -> std::io::Result<TcpListener> {
	use std::net::{SocketAddr, SocketAddrV4};
	use std::os::unix::io::FromRawFd;

	unsafe {
		let fd = libc::socket(libc::AF_INET, libc::SOCK_STREAM, 0);

		if fd < 0 {
			return Err(std::io::Error::last_os_error());
		}

		let one: libc::c_int = 1;
		libc::setsockopt(
			fd,
			libc::SOL_SOCKET,
			libc::SO_REUSEADDR,
			&one as *const _ as *const libc::c_void,
			std::mem::size_of_val(&one) as libc::socklen_t,
		);

		let addr: SocketAddr = SocketAddrV4::new(std::net::Ipv4Addr::UNSPECIFIED, port).into();
		let (sockaddr, len) = socket_addr(&addr);

		if libc::bind(fd, &sockaddr as *const _ as *const libc::sockaddr, len) != 0 {
			let err = std::io::Error::last_os_error();
			libc::close(fd);
			return Err(err);
		}

		if libc::listen(fd, LISTEN_BACKLOG) != 0 {
			let err = std::io::Error::last_os_error();
			libc::close(fd);
			return Err(err);
		}

		let listener = TcpListener::from_raw_fd(fd);
		listener.set_nonblocking(true)?;
		Ok(listener)
	}
}

#[cfg(unix)]
fn socket_addr(addr: &std::net::SocketAddr) -> (libc::sockaddr_in, libc::socklen_t) {
	let std::net::SocketAddr::V4(addr) = addr else { unreachable!("bind_listener only constructs V4 addresses") };

	let sockaddr = libc::sockaddr_in {
		sin_family: libc::AF_INET as libc::sa_family_t,
		sin_port: addr.port().to_be(),
		sin_addr: libc::in_addr { s_addr: u32::from_ne_bytes(addr.ip().octets()) },
		sin_zero: [0; 8],
		#[cfg(any(target_os = "macos", target_os = "freebsd", target_os = "openbsd", target_os = "netbsd"))]
		sin_len: std::mem::size_of::<libc::sockaddr_in>() as u8,
	};

	(sockaddr, std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t)
}

#[cfg(not(unix))]
fn bind_listener(port: u16) -> std::io::Result<TcpListener> {
	let listener = TcpListener::bind(("0.0.0.0", port))?;
	listener.set_nonblocking(true)?;
	Ok(listener)
}

impl Engine {
	pub fn init(cx: CX![], configs: Vec<ConnectionConfig>) -> Option<Self> {
		let mut conns = Vec::with_capacity(configs.len());

		for (idx, config) in configs.into_iter().enumerate() {
			let device = serial::open(&config.device, config.baud).ok()?;
			let tty = Io::new(device, fwd_to!([cx], tty_data(idx) as (Slice)));

			let listener = bind_listener(config.listen_port)
				.map_err(|err| log::error!("Failed to bind listen port {}: {err}", config.listen_port))
				.ok()?;

			let listener = Listener::new(listener, fwd_to!([cx], accept_ready(idx) as ()));

			info!("Connection '{}' listening on port {}", config.name, config.listen_port);

			conns.push(ConnSlot {
				inner: Connection::new(&config),
				tty,
				listener,
				clients: Vec::new(),
			});
		}

		let actor = cx.access_actor().clone();
		cx.after(TICK_PERIOD, move |s| actor.apply(s, |this, cx| this.tick(cx)));

		Some(Self { conns })
	}

	fn tick(&mut self, cx: CX![]) {
		for slot in &mut self.conns {
			slot.inner.tick();
			Self::flush(slot);
		}

		let actor = cx.access_actor().clone();
		cx.after(TICK_PERIOD, move |s| actor.apply(s, |this, cx| this.tick(cx)));
	}

	fn accept_ready(&mut self, cx: CX![], conn: usize) {
		let slot = &mut self.conns[conn];

		loop {
			let (stream, addr) = match slot.listener.get_ref().accept() {
				Ok(pair) => pair,
				Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => return,
				Err(err) => {
					warn!("Accept failed on connection {conn}: {err}");
					return;
				}
			};

			if let Err(err) = stream.set_nonblocking(true) {
				warn!("Failed to set client socket non-blocking: {err}");
				continue;
			}

			let idx = slot.inner.add_client();
			debug_assert_eq!(idx, slot.clients.len());

			let fwd = fwd_to!([cx], client_data(conn, idx) as (Slice));
			slot.clients.push(Some(Io::new(stream, fwd)));

			info!("Accepted client on connection {conn} from {addr}");
		}
	}

	fn tty_data(&mut self, _cx: CX![], conn: usize, buf: Slice) {
		let slot = &mut self.conns[conn];

		for &byte in buf.iter() {
			slot.inner.tty_byte(byte);
		}

		Self::flush(slot);
	}

	fn client_data(&mut self, _cx: CX![], conn: usize, client: usize, buf: Slice) {
		let slot = &mut self.conns[conn];

		if buf.is_empty() {
			Self::drop_client(slot, client);
			return;
		}

		for &byte in buf.iter() {
			if !slot.inner.client_byte(client, byte) {
				Self::drop_client(slot, client);
				return;
			}
		}

		Self::flush(slot);
	}

	fn drop_client(slot: &mut ConnSlot, idx: usize) {
		slot.inner.remove_client(idx);
		slot.clients.swap_remove(idx);
	}

	/// Drains the serial-line and client-socket output buffers the core accumulated while handling the events above.
	fn flush(slot: &mut ConnSlot) {
		if !slot.inner.tty_out.is_empty() {
			if slot.tty.write(&slot.inner.tty_out).is_err() {
				warn!("Write error on serial line");
			}

			slot.inner.tty_out.clear();
		}

		for idx in 0..slot.clients.len() {
			let client = slot.inner.client_mut(idx);

			if !client.sock_out.write_ready() {
				continue;
			}

			let Some(io) = slot.clients[idx].as_ref() else { continue };

			if io.write(client.sock_out.filled()).is_err() {
				warn!("Write error on client socket {idx}");
			}

			let n = client.sock_out.filled().len();
			client.sock_out.write_to(n);
		}
	}
}

//! Opens and configures the serial TTY the link layer runs over. This is ambient
//! plumbing the core doesn't depend on: `Connection`/`Engine` only need something
//! that implements `AsRawFd` and behaves like a non-blocking duplex byte stream.

use std::fs::{File, OpenOptions};

use log::error;
use utils::error::*;

use crate::config::BaudRate;

#[cfg(unix)]
pub fn open(device: &str, baud: BaudRate) -> Result<File> {
	use std::os::unix::fs::OpenOptionsExt;
	use std::os::unix::io::AsRawFd;

	let file = OpenOptions::new()
		.read(true)
		.write(true)
		.custom_flags(libc::O_NONBLOCK | libc::O_NOCTTY)
		.open(device)
		.map_err(|err| error!("Failed to open serial device {device}: {err}"))?;

	configure(file.as_raw_fd(), baud).map_err(|err| error!("Failed to configure serial device {device}: {err}"))?;

	Ok(file)
}

#[cfg(unix)]
fn configure(fd: i32, baud: BaudRate) -> std::io::Result<()> {
	use std::io;
	use std::mem::MaybeUninit;

	let speed = match baud {
		BaudRate::B110 => libc::B110,
		BaudRate::B300 => libc::B300,
		BaudRate::B600 => libc::B600,
		BaudRate::B1200 => libc::B1200,
		BaudRate::B2400 => libc::B2400,
		BaudRate::B9600 => libc::B9600,
		BaudRate::B19200 => libc::B19200,
		BaudRate::B38400 => libc::B38400,
	};

	unsafe {
		let mut term = MaybeUninit::<libc::termios>::uninit();

		if libc::tcgetattr(fd, term.as_mut_ptr()) != 0 {
			return Err(io::Error::last_os_error());
		}

		let mut term = term.assume_init();

		libc::cfmakeraw(&mut term);
		libc::cfsetispeed(&mut term, speed);
		libc::cfsetospeed(&mut term, speed);

		// 8 data bits, no parity, one stop bit: the framing DF1 assumes.
		term.c_cflag &= !(libc::PARENB | libc::CSTOPB | libc::CSIZE);
		term.c_cflag |= libc::CS8 | libc::CLOCAL | libc::CREAD;

		// Non-canonical, byte-at-a-time reads; the poll loop decides when data is available.
		term.c_cc[libc::VMIN] = 0;
		term.c_cc[libc::VTIME] = 0;

		if libc::tcsetattr(fd, libc::TCSANOW, &term) != 0 {
			return Err(io::Error::last_os_error());
		}
	}

	Ok(())
}

#[cfg(not(unix))]
pub fn open(_device: &str, _baud: BaudRate) -> Result<File> {
	error!("Serial device support is only implemented for unix targets");
	Err(())
}

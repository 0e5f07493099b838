//! Device link.
//!
//! A link is any byte stream carrying newline-terminated lines: a serial
//! device, a FIFO, a replay file, or standard input (`-`). Terminal devices
//! are switched to raw mode at the configured baud rate, 8 data bits, no
//! parity, 1 stop bit and no flow control, and their pending input is
//! discarded before the first read.
//!
//! On unix, terminals and FIFOs are opened non-blocking and read through the
//! reactor, so dropping a pending read releases the device at once.

use crate::{LinkError, LinkResult};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, BufReader};
use tracing::{debug, info};

/// Port identifier that selects standard input.
pub const STDIN_PORT: &str = "-";

/// Serial line settings. Framing is always 8N1 without flow control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkSettings {
    pub baud_rate: u32,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self { baud_rate: 9600 }
    }
}

/// An open link, ready to be handed to the ingestor.
pub struct Link {
    name: String,
    reader: BufReader<Box<dyn AsyncRead + Send + Unpin>>,
}

impl Link {
    /// Wrap an arbitrary reader (replay data, tests).
    pub fn from_reader(name: impl Into<String>, reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self {
            name: name.into(),
            reader: BufReader::new(Box::new(reader)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn into_reader(self) -> BufReader<Box<dyn AsyncRead + Send + Unpin>> {
        self.reader
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link").field("name", &self.name).finish()
    }
}

/// Open the link named by `port`.
pub fn open_link(port: &str, settings: LinkSettings) -> LinkResult<Link> {
    if port == STDIN_PORT {
        info!("Reading lines from standard input");
        return Ok(Link::from_reader("stdin", tokio::io::stdin()));
    }

    let path = PathBuf::from(port);
    let file = open_device(&path)?;

    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;
        let fd = file.as_raw_fd();
        if unsafe { libc::isatty(fd) } == 1 {
            termios::configure(fd, settings).map_err(|e| match e {
                termios::ConfigureError::Baud(rate) => LinkError::UnsupportedBaud(rate),
                termios::ConfigureError::Io(source) => LinkError::Configure {
                    path: path.clone(),
                    source,
                },
            })?;
            debug!(port, baud = settings.baud_rate, "Configured terminal line 8N1");
        } else {
            debug!(port, "Link is not a terminal; reading as a plain stream");
        }
    }
    #[cfg(not(unix))]
    let _ = settings;

    let link = into_link(port, &path, file)?;
    info!(port, "Link opened");
    Ok(link)
}

#[cfg(unix)]
fn into_link(port: &str, path: &Path, file: std::fs::File) -> LinkResult<Link> {
    let is_regular = file
        .metadata()
        .map(|meta| meta.file_type().is_file())
        .map_err(|source| LinkError::Open {
            path: path.to_path_buf(),
            source,
        })?;
    if is_regular {
        return Ok(Link::from_reader(port, tokio::fs::File::from_std(file)));
    }

    let reader = device::DeviceReader::new(file).map_err(|source| LinkError::Configure {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Link::from_reader(port, reader))
}

#[cfg(not(unix))]
fn into_link(port: &str, _path: &Path, file: std::fs::File) -> LinkResult<Link> {
    Ok(Link::from_reader(port, tokio::fs::File::from_std(file)))
}

fn open_device(path: &Path) -> LinkResult<std::fs::File> {
    let mut options = std::fs::OpenOptions::new();
    options.read(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.custom_flags(libc::O_NOCTTY | libc::O_NONBLOCK);
    }

    options.open(path).map_err(|source| LinkError::Open {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(unix)]
mod device {
    use std::io::{self, Read};
    use std::pin::Pin;
    use std::task::{ready, Context, Poll};
    use tokio::io::unix::AsyncFd;
    use tokio::io::{AsyncRead, ReadBuf};

    /// Non-blocking descriptor driven by the runtime's reactor.
    pub(super) struct DeviceReader {
        inner: AsyncFd<std::fs::File>,
    }

    impl DeviceReader {
        /// `file` must have been opened with `O_NONBLOCK`.
        pub(super) fn new(file: std::fs::File) -> io::Result<Self> {
            Ok(Self {
                inner: AsyncFd::new(file)?,
            })
        }
    }

    impl AsyncRead for DeviceReader {
        fn poll_read(
            self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            loop {
                let mut guard = ready!(self.inner.poll_read_ready(cx))?;
                let unfilled = buf.initialize_unfilled();
                match guard.try_io(|inner| {
                    let mut file: &std::fs::File = inner.get_ref();
                    file.read(unfilled)
                }) {
                    Ok(Ok(len)) => {
                        buf.advance(len);
                        return Poll::Ready(Ok(()));
                    }
                    Ok(Err(e)) => return Poll::Ready(Err(e)),
                    Err(_would_block) => continue,
                }
            }
        }
    }
}

#[cfg(unix)]
mod termios {
    use super::LinkSettings;
    use libc::c_int;

    pub(super) enum ConfigureError {
        Baud(u32),
        Io(std::io::Error),
    }

    impl From<std::io::Error> for ConfigureError {
        fn from(e: std::io::Error) -> Self {
            ConfigureError::Io(e)
        }
    }

    pub(super) fn configure(fd: c_int, settings: LinkSettings) -> Result<(), ConfigureError> {
        let speed = speed_for(settings.baud_rate).ok_or(ConfigureError::Baud(settings.baud_rate))?;

        let mut termios = get_termios(fd)?;
        unsafe {
            libc::cfmakeraw(&mut termios);
        }
        check(unsafe { libc::cfsetispeed(&mut termios, speed) })?;
        check(unsafe { libc::cfsetospeed(&mut termios, speed) })?;

        termios.c_cflag &= !(libc::CSIZE | libc::PARENB | libc::CSTOPB | libc::CRTSCTS);
        termios.c_cflag |= libc::CS8 | libc::CLOCAL | libc::CREAD;
        termios.c_iflag &= !(libc::IXON | libc::IXOFF | libc::IXANY);

        check(unsafe { libc::tcsetattr(fd, libc::TCSANOW, &termios) })?;
        // Drop whatever arrived before we were listening.
        check(unsafe { libc::tcflush(fd, libc::TCIFLUSH) })?;
        Ok(())
    }

    fn get_termios(fd: c_int) -> std::io::Result<libc::termios> {
        let mut termios = unsafe { std::mem::zeroed::<libc::termios>() };
        check(unsafe { libc::tcgetattr(fd, &mut termios) })?;
        Ok(termios)
    }

    fn check(result: c_int) -> std::io::Result<()> {
        if result == -1 {
            Err(std::io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    pub(super) fn speed_for(baud: u32) -> Option<libc::speed_t> {
        let speed = match baud {
            1200 => libc::B1200,
            2400 => libc::B2400,
            4800 => libc::B4800,
            9600 => libc::B9600,
            19200 => libc::B19200,
            38400 => libc::B38400,
            57600 => libc::B57600,
            115200 => libc::B115200,
            _ => return None,
        };
        Some(speed)
    }
}

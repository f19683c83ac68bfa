// src/syscalls.rs
use libc::{c_int, c_void};
use std::io;
use std::ptr;

pub use libc::{EPOLLERR, EPOLLET, EPOLLHUP, EPOLLIN, EPOLLOUT, epoll_event};

// ---- Descriptor Operations ----

/// Switch a descriptor to non-blocking mode.
pub fn set_nonblocking(fd: c_int) -> io::Result<()> {
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL, 0);
        if flags < 0 {
            return Err(io::Error::last_os_error());
        }
        if libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

pub fn close(fd: c_int) {
    unsafe {
        libc::close(fd);
    }
}

/// Accept one pending connection. `Ok(None)` means the backlog is empty.
///
/// The returned descriptor is still in blocking mode; the caller decides
/// what to do if switching it fails.
pub fn accept_connection(listen_fd: c_int) -> io::Result<Option<c_int>> {
    loop {
        let fd = unsafe { libc::accept(listen_fd, ptr::null_mut(), ptr::null_mut()) };
        if fd >= 0 {
            return Ok(Some(fd));
        }

        let err = io::Error::last_os_error();
        match err.kind() {
            io::ErrorKind::WouldBlock => return Ok(None),
            io::ErrorKind::Interrupted => continue,
            _ => return Err(err),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    Data(usize),
    WouldBlock,
    Eof,
}

pub fn read_nonblocking(fd: c_int, buf: &mut [u8]) -> io::Result<ReadOutcome> {
    loop {
        let res = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut c_void, buf.len()) };
        if res > 0 {
            return Ok(ReadOutcome::Data(res as usize));
        }
        if res == 0 {
            return Ok(ReadOutcome::Eof);
        }

        let err = io::Error::last_os_error();
        match err.kind() {
            io::ErrorKind::WouldBlock => return Ok(ReadOutcome::WouldBlock),
            io::ErrorKind::Interrupted => continue,
            _ => return Err(err),
        }
    }
}

/// Single send(2). `Ok(None)` means the socket buffer is full.
///
/// MSG_NOSIGNAL keeps a reset peer from raising SIGPIPE.
pub fn write_nonblocking(fd: c_int, buf: &[u8]) -> io::Result<Option<usize>> {
    loop {
        let res = unsafe {
            libc::send(
                fd,
                buf.as_ptr() as *const c_void,
                buf.len(),
                libc::MSG_NOSIGNAL,
            )
        };
        if res >= 0 {
            return Ok(Some(res as usize));
        }

        let err = io::Error::last_os_error();
        match err.kind() {
            io::ErrorKind::WouldBlock => return Ok(None),
            io::ErrorKind::Interrupted => continue,
            _ => return Err(err),
        }
    }
}

// ---- Wake-up Pipe ----

/// Create a non-blocking, close-on-exec pipe. Returns (read_fd, write_fd).
pub fn create_pipe() -> io::Result<(c_int, c_int)> {
    let mut fds = [0 as c_int; 2];
    unsafe {
        if libc::pipe2(fds.as_mut_ptr(), libc::O_NONBLOCK | libc::O_CLOEXEC) < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok((fds[0], fds[1]))
}

/// Write a single byte into a wake-up pipe.
pub fn notify_pipe(write_fd: c_int) -> io::Result<()> {
    let byte = 1u8;
    let res = unsafe { libc::write(write_fd, &byte as *const u8 as *const c_void, 1) };
    if res < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Drain every byte sitting in the read end of a wake-up pipe.
pub fn drain_pipe(read_fd: c_int) {
    let mut buf = [0u8; 64];
    while let Ok(ReadOutcome::Data(_)) = read_nonblocking(read_fd, &mut buf) {}
}

// ---- Epoll Operations ----

/// Owned epoll instance. Every registration is edge-triggered.
pub struct Epoll {
    pub fd: c_int,
}

impl Epoll {
    pub fn new() -> io::Result<Self> {
        let fd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { fd })
    }

    pub fn add(&self, fd: c_int, token: u64, interests: i32) -> io::Result<()> {
        self.ctl(libc::EPOLL_CTL_ADD, fd, token, interests)
    }

    pub fn modify(&self, fd: c_int, token: u64, interests: i32) -> io::Result<()> {
        self.ctl(libc::EPOLL_CTL_MOD, fd, token, interests)
    }

    /// Remove `fd`. A descriptor the kernel no longer knows about is not an
    /// error.
    pub fn delete(&self, fd: c_int) -> io::Result<()> {
        let res = unsafe { libc::epoll_ctl(self.fd, libc::EPOLL_CTL_DEL, fd, ptr::null_mut()) };
        if res < 0 {
            let err = io::Error::last_os_error();
            if !matches!(err.raw_os_error(), Some(libc::ENOENT) | Some(libc::EBADF)) {
                return Err(err);
            }
        }
        Ok(())
    }

    fn ctl(&self, op: c_int, fd: c_int, token: u64, interests: i32) -> io::Result<()> {
        let mut event = epoll_event {
            events: (interests | EPOLLET) as u32,
            u64: token,
        };
        if unsafe { libc::epoll_ctl(self.fd, op, fd, &mut event) } < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Block until at least one event is ready or `timeout_ms` elapses
    /// (`-1` waits forever). A signal interruption reports zero events.
    pub fn wait(&self, events: &mut [epoll_event], timeout_ms: i32) -> io::Result<usize> {
        let res = unsafe {
            libc::epoll_wait(
                self.fd,
                events.as_mut_ptr(),
                events.len() as c_int,
                timeout_ms,
            )
        };

        if res < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(0);
            }
            return Err(err);
        }

        Ok(res as usize)
    }
}

impl Drop for Epoll {
    fn drop(&mut self) {
        close(self.fd);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipe_reads_would_block_when_empty() {
        let (rd, wr) = create_pipe().unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(read_nonblocking(rd, &mut buf).unwrap(), ReadOutcome::WouldBlock);

        assert_eq!(write_pipe(wr, b"ab"), 2);
        assert_eq!(read_nonblocking(rd, &mut buf).unwrap(), ReadOutcome::Data(2));
        assert_eq!(&buf[..2], b"ab");

        close(wr);
        assert_eq!(read_nonblocking(rd, &mut buf).unwrap(), ReadOutcome::Eof);
        close(rd);
    }

    #[test]
    fn epoll_reports_pipe_edge_once() {
        let epoll = Epoll::new().unwrap();
        let (rd, wr) = create_pipe().unwrap();
        epoll.add(rd, 42, EPOLLIN).unwrap();

        let mut events = vec![epoll_event { events: 0, u64: 0 }; 4];
        assert_eq!(epoll.wait(&mut events, 0).unwrap(), 0);

        write_pipe(wr, b"x");
        assert_eq!(epoll.wait(&mut events, 100).unwrap(), 1);
        assert_eq!({ events[0].u64 }, 42);

        // Edge-triggered: no new data, no second notification.
        assert_eq!(epoll.wait(&mut events, 0).unwrap(), 0);

        epoll.delete(rd).unwrap();
        // Deleting twice is tolerated.
        epoll.delete(rd).unwrap();
        close(rd);
        close(wr);
    }

    fn write_pipe(fd: c_int, bytes: &[u8]) -> isize {
        unsafe { libc::write(fd, bytes.as_ptr() as *const c_void, bytes.len()) }
    }
}

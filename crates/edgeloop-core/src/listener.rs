// src/listener.rs
use crate::config::LISTEN_ADDR;
use crate::error::{InitStage, ServerError, ServerResult};
use crate::syscalls;
use libc::{c_int, c_void, socklen_t};
use std::io;
use std::mem;
use std::net::{Ipv4Addr, SocketAddrV4};

/// The bound, listening, non-blocking TCP socket.
///
/// Construction either yields a fully configured listener or releases
/// everything it created; the descriptor is closed on drop.
#[derive(Debug)]
pub struct Listener {
    fd: c_int,
}

impl Listener {
    /// Bind `127.0.0.1:port` with SO_REUSEADDR, listen with `backlog` and
    /// switch to non-blocking mode.
    pub fn bind(port: u16, backlog: i32) -> ServerResult<Self> {
        let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_STREAM | libc::SOCK_CLOEXEC, 0) };
        if fd < 0 {
            return Err(ServerError::init(
                InitStage::Socket,
                io::Error::last_os_error(),
            ));
        }
        // From here on, dropping `listener` closes the descriptor.
        let listener = Listener { fd };

        let one: c_int = 1;
        let res = unsafe {
            libc::setsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_REUSEADDR,
                &one as *const _ as *const c_void,
                mem::size_of_val(&one) as socklen_t,
            )
        };
        if res < 0 {
            return Err(ServerError::init(
                InitStage::SetOption,
                io::Error::last_os_error(),
            ));
        }

        let sin = libc::sockaddr_in {
            sin_family: libc::AF_INET as libc::sa_family_t,
            sin_port: port.to_be(),
            sin_addr: libc::in_addr {
                s_addr: u32::from_ne_bytes(LISTEN_ADDR.octets()),
            },
            sin_zero: [0; 8],
        };
        let res = unsafe {
            libc::bind(
                fd,
                &sin as *const _ as *const libc::sockaddr,
                mem::size_of_val(&sin) as socklen_t,
            )
        };
        if res < 0 {
            return Err(ServerError::init(InitStage::Bind, io::Error::last_os_error()));
        }

        if unsafe { libc::listen(fd, backlog) } < 0 {
            return Err(ServerError::init(
                InitStage::Listen,
                io::Error::last_os_error(),
            ));
        }

        syscalls::set_nonblocking(fd).map_err(|e| ServerError::init(InitStage::NonBlocking, e))?;

        Ok(listener)
    }

    pub fn fd(&self) -> c_int {
        self.fd
    }

    /// The address actually bound, with the kernel-chosen port when the
    /// listener was created with port 0.
    pub fn local_addr(&self) -> io::Result<SocketAddrV4> {
        let mut sin: libc::sockaddr_in = unsafe { mem::zeroed() };
        let mut len = mem::size_of_val(&sin) as socklen_t;
        let res = unsafe {
            libc::getsockname(
                self.fd,
                &mut sin as *mut _ as *mut libc::sockaddr,
                &mut len,
            )
        };
        if res < 0 {
            return Err(io::Error::last_os_error());
        }
        let ip = Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr));
        Ok(SocketAddrV4::new(ip, u16::from_be(sin.sin_port)))
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        syscalls::close(self.fd);
    }
}

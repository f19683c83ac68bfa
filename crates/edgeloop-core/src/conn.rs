// src/conn.rs
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnState {
    #[default]
    Free,
    /// Accumulating the request line.
    Reading,
    /// Response encoded; waiting to flush the rest of `write_buf`.
    Writing,
}

/// One slot of the connection table.
///
/// Buffers survive `free`/`allocate` cycles so a slot only allocates the
/// first time it is used.
#[derive(Debug)]
pub struct Conn {
    pub fd: i32,              // Descriptor, or the next free index while Free
    pub state: ConnState,
    pub read_buf: Vec<u8>,
    pub write_buf: Vec<u8>,
    pub write_pos: usize,     // Bytes of write_buf already sent
    pub peer_closed: bool,    // Peer shut down its write half
    pub last_active: Instant,
}

impl Conn {
    pub fn empty() -> Self {
        Self {
            fd: -1,
            state: ConnState::Free,
            read_buf: Vec::new(),
            write_buf: Vec::new(),
            write_pos: 0,
            peer_closed: false,
            last_active: Instant::now(),
        }
    }

    /// Reset the slot for a freshly accepted descriptor.
    pub fn reset(&mut self, fd: i32, now: Instant) {
        self.fd = fd;
        self.state = ConnState::Reading;
        self.read_buf.clear();
        self.write_buf.clear();
        self.write_pos = 0;
        self.peer_closed = false;
        self.last_active = now;
    }

    pub fn pending_write(&self) -> &[u8] {
        &self.write_buf[self.write_pos.min(self.write_buf.len())..]
    }
}

impl Default for Conn {
    fn default() -> Self {
        Self::empty()
    }
}

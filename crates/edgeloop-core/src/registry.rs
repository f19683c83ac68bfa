// src/registry.rs
use crate::syscalls::{EPOLLERR, EPOLLHUP, EPOLLIN, EPOLLOUT, Epoll, epoll_event};
use libc::c_int;
use std::collections::HashSet;
use std::io;
use std::time::Duration;

/// What a registration waits for. Always edge-triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Readable,
    Writable,
}

impl Interest {
    fn bits(self) -> i32 {
        match self {
            Interest::Readable => EPOLLIN,
            Interest::Writable => EPOLLOUT,
        }
    }
}

/// One readiness notification, decoded from the raw epoll mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub token: u64,
    pub readable: bool,
    pub writable: bool,
    /// EPOLLERR or EPOLLHUP.
    pub error: bool,
}

impl Event {
    fn from_raw(raw: &epoll_event) -> Self {
        let mask = raw.events;
        Self {
            token: raw.u64,
            readable: mask & EPOLLIN as u32 != 0,
            writable: mask & EPOLLOUT as u32 != 0,
            error: mask & (EPOLLERR | EPOLLHUP) as u32 != 0,
        }
    }
}

/// Edge-triggered readiness registry.
///
/// Consumers must drain a descriptor completely on every notification:
/// the kernel reports a transition to readable once and stays silent until
/// new data arrives after the descriptor was emptied.
pub struct Registry {
    epoll: Epoll,
    raw: Vec<epoll_event>,
    ready: Vec<Event>,
    watched: HashSet<c_int>,
}

impl Registry {
    /// `max_events` bounds the batch returned by a single [`wait`](Self::wait).
    pub fn new(max_events: usize) -> io::Result<Self> {
        let max_events = max_events.max(1);
        Ok(Self {
            epoll: Epoll::new()?,
            raw: vec![epoll_event { events: 0, u64: 0 }; max_events],
            ready: Vec::with_capacity(max_events),
            watched: HashSet::new(),
        })
    }

    pub fn register(&mut self, fd: c_int, token: u64, interest: Interest) -> io::Result<()> {
        self.epoll.add(fd, token, interest.bits())?;
        self.watched.insert(fd);
        Ok(())
    }

    pub fn reregister(&mut self, fd: c_int, token: u64, interest: Interest) -> io::Result<()> {
        self.epoll.modify(fd, token, interest.bits())
    }

    /// Stop watching `fd`. Unknown descriptors are ignored.
    pub fn deregister(&mut self, fd: c_int) -> io::Result<()> {
        if !self.watched.remove(&fd) {
            return Ok(());
        }
        self.epoll.delete(fd)
    }

    /// Wait for readiness. `None` blocks until something happens.
    pub fn wait(&mut self, timeout: Option<Duration>) -> io::Result<&[Event]> {
        let timeout_ms = match timeout {
            None => -1,
            Some(d) => d.as_millis().min(i32::MAX as u128) as i32,
        };

        let n = self.epoll.wait(&mut self.raw, timeout_ms)?;
        self.ready.clear();
        self.ready
            .extend(self.raw[..n].iter().map(Event::from_raw));
        Ok(&self.ready)
    }

    pub fn is_registered(&self, fd: c_int) -> bool {
        self.watched.contains(&fd)
    }

    /// Number of descriptors currently watched.
    pub fn len(&self) -> usize {
        self.watched.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watched.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syscalls;

    #[test]
    fn deregister_unknown_fd_is_a_noop() {
        let mut registry = Registry::new(8).unwrap();
        assert!(registry.deregister(12345).is_ok());
        assert!(registry.is_empty());
    }

    #[test]
    fn tracks_registrations_and_reports_tokens() {
        let mut registry = Registry::new(8).unwrap();
        let (rd, wr) = syscalls::create_pipe().unwrap();

        registry.register(rd, 7, Interest::Readable).unwrap();
        assert!(registry.is_registered(rd));
        assert_eq!(registry.len(), 1);

        assert!(registry.wait(Some(Duration::ZERO)).unwrap().is_empty());

        unsafe { libc::write(wr, b"z".as_ptr() as *const libc::c_void, 1) };
        let events = registry.wait(Some(Duration::from_millis(100))).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].token, 7);
        assert!(events[0].readable);
        assert!(!events[0].error);

        registry.deregister(rd).unwrap();
        assert!(!registry.is_registered(rd));
        assert_eq!(registry.len(), 0);

        syscalls::close(rd);
        syscalls::close(wr);
    }

    #[test]
    fn batch_is_bounded_by_max_events() {
        let mut registry = Registry::new(2).unwrap();
        let mut pipes = Vec::new();
        for token in 0..4u64 {
            let (rd, wr) = syscalls::create_pipe().unwrap();
            registry.register(rd, token, Interest::Readable).unwrap();
            unsafe { libc::write(wr, b"z".as_ptr() as *const libc::c_void, 1) };
            pipes.push((rd, wr));
        }

        let first = registry.wait(Some(Duration::from_millis(100))).unwrap().len();
        assert_eq!(first, 2);

        for (rd, wr) in pipes {
            registry.deregister(rd).unwrap();
            syscalls::close(rd);
            syscalls::close(wr);
        }
    }
}

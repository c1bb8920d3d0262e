use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Session created, debuggee not yet running.
    Init,
    Running,
    Stopped,
    /// Terminal state; absorbing.
    Finish,
}

/// Thread-safe debuggee state holder. `Finish` is absorbing: once reached,
/// no later notification may resurrect the session.
pub struct StatusMachine {
    status: Mutex<Status>,
}

impl StatusMachine {
    pub fn new() -> StatusMachine {
        StatusMachine {
            status: Mutex::new(Status::Init),
        }
    }

    pub fn get(&self) -> Status {
        *self.status.lock().unwrap()
    }

    pub fn is(&self, status: Status) -> bool {
        self.get() == status
    }

    pub fn set(&self, status: Status) {
        let mut current = self.status.lock().unwrap();
        if *current == Status::Finish {
            return;
        }
        *current = status;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_in_init() {
        let status = StatusMachine::new();
        assert!(status.is(Status::Init));
    }

    #[test]
    fn run_stop_cycle() {
        let status = StatusMachine::new();
        status.set(Status::Running);
        assert!(status.is(Status::Running));
        status.set(Status::Stopped);
        assert!(status.is(Status::Stopped));
        status.set(Status::Running);
        assert!(status.is(Status::Running));
    }

    #[test]
    fn finish_is_absorbing() {
        let status = StatusMachine::new();
        status.set(Status::Running);
        status.set(Status::Finish);
        assert!(status.is(Status::Finish));
        // A stale notification must not resurrect the session.
        status.set(Status::Running);
        assert!(status.is(Status::Finish));
        status.set(Status::Finish);
        assert!(status.is(Status::Finish));
    }
}

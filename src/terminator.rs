//! Interrupt and time-limit hooks, matching the shape of a
//! `terminators` module almost verbatim.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::Status;

pub trait Terminator {
    fn initialize(&mut self) {}

    fn terminate(&mut self) -> Option<Status>;
}

/// Polls a caller-supplied atomic flag; never installs a signal handler
/// itself.
pub struct FlagTerminator {
    flag: Arc<AtomicBool>,
}

impl FlagTerminator {
    pub fn new(flag: Arc<AtomicBool>) -> Self {
        Self { flag }
    }
}

impl Terminator for FlagTerminator {
    fn terminate(&mut self) -> Option<Status> {
        if self.flag.load(std::sync::atomic::Ordering::SeqCst) {
            Some(Status::Interrupted)
        } else {
            None
        }
    }
}

/// Terminator that triggers after a specified number of seconds.
pub struct TimeOutTerminator {
    max_time_secs: f64,
    start_time: std::time::Instant,
}

impl TimeOutTerminator {
    pub fn new(max_time_secs: f64) -> Self {
        Self { max_time_secs, start_time: std::time::Instant::now() }
    }
}

impl Terminator for TimeOutTerminator {
    fn initialize(&mut self) {
        self.start_time = std::time::Instant::now();
    }

    fn terminate(&mut self) -> Option<Status> {
        if self.start_time.elapsed().as_secs_f64() >= self.max_time_secs {
            Some(Status::TimeLimit)
        } else {
            None
        }
    }
}

/// Terminator that combines multiple terminators and triggers if any of
/// them do.
pub struct MultipleTerminators {
    terminators: Vec<Box<dyn Terminator>>,
}

impl MultipleTerminators {
    pub fn new(terminators: Vec<Box<dyn Terminator>>) -> Self {
        Self { terminators }
    }
}

impl Terminator for MultipleTerminators {
    fn initialize(&mut self) {
        for terminator in &mut self.terminators {
            terminator.initialize();
        }
    }

    fn terminate(&mut self) -> Option<Status> {
        for terminator in &mut self.terminators {
            if let Some(status) = terminator.as_mut().terminate() {
                return Some(status);
            }
        }
        None
    }
}

/// Installs a process-wide SIGINT handler; only available behind the
/// `interrupt` feature, and only one instance may exist per process
/// (`ctrlc::set_handler` itself enforces this).
#[cfg(feature = "interrupt")]
pub struct InterruptTerminator {
    interrupted: Arc<AtomicBool>,
}

#[cfg(feature = "interrupt")]
impl InterruptTerminator {
    pub fn new() -> Result<Self, ctrlc::Error> {
        let interrupted = Arc::new(AtomicBool::new(false));
        let flag = interrupted.clone();
        ctrlc::set_handler(move || {
            flag.store(true, std::sync::atomic::Ordering::SeqCst);
        })?;
        Ok(Self { interrupted })
    }

    pub fn interrupt(&self) {
        self.interrupted.store(true, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(feature = "interrupt")]
impl Terminator for InterruptTerminator {
    fn terminate(&mut self) -> Option<Status> {
        if self.interrupted.load(std::sync::atomic::Ordering::SeqCst) {
            Some(Status::Interrupted)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn flag_terminator_fires_once_flag_is_set() {
        let flag = Arc::new(AtomicBool::new(false));
        let mut t = FlagTerminator::new(flag.clone());
        assert_eq!(t.terminate(), None);
        flag.store(true, Ordering::SeqCst);
        assert_eq!(t.terminate(), Some(Status::Interrupted));
    }

    #[test]
    fn timeout_terminator_fires_after_duration() {
        let mut t = TimeOutTerminator::new(0.0);
        t.initialize();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert_eq!(t.terminate(), Some(Status::TimeLimit));
    }

    #[test]
    fn multiple_terminators_fires_if_any_fires() {
        let flag = Arc::new(AtomicBool::new(true));
        let mut t = MultipleTerminators::new(vec![
            Box::new(TimeOutTerminator::new(1e9)),
            Box::new(FlagTerminator::new(flag)),
        ]);
        assert_eq!(t.terminate(), Some(Status::Interrupted));
    }

    #[cfg(feature = "interrupt")]
    #[cfg(unix)]
    #[test]
    fn interrupt_terminator_responds_to_sigint() {
        let mut terminator = InterruptTerminator::new().expect("only constructed once in this process");
        assert_eq!(terminator.terminate(), None);
        terminator.interrupt();
        assert_eq!(terminator.terminate(), Some(Status::Interrupted));
    }
}

//! Event pump - Serializes callbacks raised on gateway threads onto the loop thread
//!
//! Producers hold a [`PumpHandle`] and enqueue closures over the loop state.
//! The single consumer owns the [`EventPump`] and runs queued closures with
//! [`EventPump::drain_once`], once per frame and while waiting on I/O.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{mpsc as std_mpsc, Arc, Mutex};
use std::thread::{self, ThreadId};

use tokio::sync::mpsc;

use super::errors::PumpError;

/// Work item executed against the loop state
pub type Task<S> = Box<dyn FnOnce(&mut S) + Send>;

struct Envelope<S> {
    task: Task<S>,
    ack: Option<std_mpsc::SyncSender<()>>,
}

impl<S> Envelope<S> {
    fn invoke(self, state: &mut S) {
        let Envelope { task, ack } = self;
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| task(state))) {
            tracing::error!("Pump task panicked: {}", panic_message(payload.as_ref()));
        }
        if let Some(ack) = ack {
            let _ = ack.send(());
        }
    }
}

/// Best-effort text of a caught panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Producer side of the pump. Cheap to clone, usable from any thread.
pub struct PumpHandle<S> {
    sender: mpsc::UnboundedSender<Envelope<S>>,
    owner: Arc<Mutex<ThreadId>>,
}

impl<S> Clone for PumpHandle<S> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            owner: Arc::clone(&self.owner),
        }
    }
}

impl<S> PumpHandle<S> {
    /// Enqueue `task` for the pump thread. Never blocks.
    pub fn post<F>(&self, task: F) -> Result<(), PumpError>
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        self.sender
            .send(Envelope {
                task: Box::new(task),
                ack: None,
            })
            .map_err(|_| PumpError::Closed)
    }

    /// Enqueue `task` and block until the pump thread has executed it
    pub fn send<F>(&self, task: F) -> Result<(), PumpError>
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        if self.is_pump_thread() {
            return Err(PumpError::WouldDeadlock);
        }

        let (ack, done) = std_mpsc::sync_channel(1);
        self.sender
            .send(Envelope {
                task: Box::new(task),
                ack: Some(ack),
            })
            .map_err(|_| PumpError::Closed)?;

        done.recv().map_err(|_| PumpError::Closed)
    }

    pub fn is_pump_thread(&self) -> bool {
        let owner = self.owner.lock().unwrap_or_else(|e| e.into_inner());
        *owner == thread::current().id()
    }
}

/// Consumer side of the pump, owned by the loop thread
pub struct EventPump<S> {
    receiver: mpsc::UnboundedReceiver<Envelope<S>>,
    handle: PumpHandle<S>,
}

impl<S> EventPump<S> {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            receiver,
            handle: PumpHandle {
                sender,
                owner: Arc::new(Mutex::new(thread::current().id())),
            },
        }
    }

    pub fn handle(&self) -> PumpHandle<S> {
        self.handle.clone()
    }

    /// Make the calling thread the pump thread
    pub fn bind_to_current_thread(&self) {
        let mut owner = self.handle.owner.lock().unwrap_or_else(|e| e.into_inner());
        *owner = thread::current().id();
    }

    /// Execute `task` inline. Only the pump owner can call this.
    pub fn send<F>(&self, state: &mut S, task: F)
    where
        F: FnOnce(&mut S),
    {
        task(state);
    }

    /// Run exactly the tasks queued at the time of the call.
    ///
    /// Tasks enqueued while draining wait for the next call.
    pub fn drain_once(&mut self, state: &mut S) -> usize {
        let pending = self.receiver.len();
        let mut executed = 0;
        for _ in 0..pending {
            match self.receiver.try_recv() {
                Ok(envelope) => {
                    envelope.invoke(state);
                    executed += 1;
                }
                Err(_) => break,
            }
        }
        executed
    }

    pub fn pending(&self) -> usize {
        self.receiver.len()
    }
}

impl<S> Default for EventPump<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn drain_runs_posted_tasks_in_order() {
        let mut pump: EventPump<Vec<u32>> = EventPump::new();
        let handle = pump.handle();
        for i in 0..3 {
            handle.post(move |log: &mut Vec<u32>| log.push(i)).unwrap();
        }

        let mut log = Vec::new();
        assert_eq!(pump.drain_once(&mut log), 3);
        assert_eq!(log, vec![0, 1, 2]);
        assert_eq!(pump.drain_once(&mut log), 0);
    }

    #[test]
    fn tasks_posted_during_drain_wait_for_next_drain() {
        let mut pump: EventPump<Vec<&'static str>> = EventPump::new();
        let handle = pump.handle();
        let inner = pump.handle();
        handle
            .post(move |log: &mut Vec<&'static str>| {
                log.push("outer");
                inner.post(|log: &mut Vec<&'static str>| log.push("inner")).unwrap();
            })
            .unwrap();

        let mut log = Vec::new();
        assert_eq!(pump.drain_once(&mut log), 1);
        assert_eq!(log, vec!["outer"]);
        assert_eq!(pump.drain_once(&mut log), 1);
        assert_eq!(log, vec!["outer", "inner"]);
    }

    #[test]
    fn panicking_task_does_not_stall_the_rest() {
        let mut pump: EventPump<u32> = EventPump::new();
        let handle = pump.handle();
        handle.post(|n: &mut u32| *n += 1).unwrap();
        handle.post(|_: &mut u32| panic!("boom")).unwrap();
        handle.post(|n: &mut u32| *n += 10).unwrap();

        let mut n = 0;
        assert_eq!(pump.drain_once(&mut n), 3);
        assert_eq!(n, 11);
    }

    #[test]
    fn send_from_other_thread_blocks_until_drained() {
        let mut pump: EventPump<u32> = EventPump::new();
        let handle = pump.handle();
        let worker = thread::spawn(move || handle.send(|n: &mut u32| *n = 5));

        let mut n = 0;
        while n == 0 {
            pump.drain_once(&mut n);
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(worker.join().unwrap(), Ok(()));
        assert_eq!(n, 5);
    }

    #[test]
    fn send_wakes_caller_even_when_task_panics() {
        let mut pump: EventPump<u32> = EventPump::new();
        let handle = pump.handle();
        let worker = thread::spawn(move || handle.send(|_: &mut u32| panic!("boom")));

        let mut n = 0;
        while !worker.is_finished() {
            pump.drain_once(&mut n);
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(worker.join().unwrap(), Ok(()));
    }

    #[test]
    fn blocking_send_on_pump_thread_is_rejected() {
        let pump: EventPump<u32> = EventPump::new();
        let mut n = 0;
        assert_eq!(pump.handle().send(|n: &mut u32| *n += 1), Err(PumpError::WouldDeadlock));
        pump.send(&mut n, |n| *n += 1);
        assert_eq!(n, 1);
    }

    #[test]
    fn post_after_pump_dropped_reports_closed() {
        let pump: EventPump<u32> = EventPump::new();
        let handle = pump.handle();
        drop(pump);
        // receiver went away with the pump
        assert_eq!(handle.post(|_| {}), Err(PumpError::Closed));
    }
}

use backend::{Acknowledgement, ReloadAcknowledger};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, TryRecvError};
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

const PROMPT: &str = "Out of missiles. Reload, then press Enter (q to quit): ";

/// Reload confirmations typed on stdin.
///
/// A background thread forwards lines so the control loop can poll without
/// blocking, and so a blocking wait still notices Ctrl+C.
pub(crate) struct Operator {
    lines: Receiver<String>,
    shutdown: Arc<AtomicBool>,
    poll_interval: Duration,
    prompted: bool,
    stdin_closed: bool,
}

impl Operator {
    pub(crate) fn spawn(shutdown: Arc<AtomicBool>, poll_interval: Duration) -> Self {
        let (tx, rx) = unbounded();
        thread::spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("stdin closed: {e}");
                        break;
                    }
                }
            }
            debug!("stdin reader exiting");
        });

        Self::with_lines(rx, shutdown, poll_interval)
    }

    fn with_lines(
        lines: Receiver<String>,
        shutdown: Arc<AtomicBool>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            lines,
            shutdown,
            poll_interval,
            prompted: false,
            stdin_closed: false,
        }
    }

    fn prompt(&mut self) {
        if !self.prompted {
            // anything typed before the magazine ran dry is not an answer
            while self.lines.try_recv().is_ok() {}
            println!("{PROMPT}");
            self.prompted = true;
        }
    }

    fn answer(&mut self, line: &str) -> Option<Acknowledgement> {
        let answer = parse_answer(line);
        match answer {
            Some(_) => self.prompted = false,
            None => println!("{PROMPT}"),
        }
        answer
    }
}

fn parse_answer(line: &str) -> Option<Acknowledgement> {
    match line.trim().to_ascii_lowercase().as_str() {
        "" | "y" | "yes" | "r" | "reload" => Some(Acknowledgement::Reloaded),
        "q" | "quit" | "exit" => Some(Acknowledgement::Shutdown),
        _ => None,
    }
}

impl ReloadAcknowledger for Operator {
    fn wait_for_reload(&mut self) -> backend::Result<Acknowledgement> {
        self.prompt();
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                return Ok(Acknowledgement::Shutdown);
            }
            match self.lines.recv_timeout(self.poll_interval) {
                Ok(line) => {
                    if let Some(answer) = self.answer(&line) {
                        return Ok(answer);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return Ok(Acknowledgement::Shutdown),
            }
        }
    }

    fn poll_reload(&mut self) -> backend::Result<Option<Acknowledgement>> {
        self.prompt();
        if self.shutdown.load(Ordering::SeqCst) {
            return Ok(Some(Acknowledgement::Shutdown));
        }
        match self.lines.try_recv() {
            Ok(line) => Ok(self.answer(&line)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => {
                // only Ctrl+C can end the run from here
                if !self.stdin_closed {
                    warn!("stdin closed, reloads can no longer be acknowledged");
                    self.stdin_closed = true;
                }
                Ok(None)
            }
        }
    }
}

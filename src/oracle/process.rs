use std::io::{self, BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::{LineChannel, ReadLine};
use crate::error::HuntError;

const EXIT_GRACE: Duration = Duration::from_millis(500);
const EXIT_POLL: Duration = Duration::from_millis(10);

/// An engine running as a child process.
///
/// Stdout is drained by a dedicated thread into a channel so reads can
/// time out; a blocked pipe read cannot.
pub struct EngineProcess {
    program: String,
    child: Child,
    stdin: Option<ChildStdin>,
    lines: Receiver<io::Result<String>>,
    reader: Option<JoinHandle<()>>,
}

impl EngineProcess {
    pub fn spawn(program: &str, args: &[String]) -> Result<Self, HuntError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| HuntError::Spawn {
                program: program.to_string(),
                source,
            })?;

        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| HuntError::Config(format!("`{program}` has no stdout pipe")))?;

        let (tx, rx) = mpsc::channel();
        let reader = thread::Builder::new()
            .name(format!("{program}-stdout"))
            .spawn(move || {
                for line in BufReader::new(stdout).lines() {
                    let failed = line.is_err();
                    if tx.send(line).is_err() || failed {
                        break;
                    }
                }
            })?;

        debug!(program, pid = child.id(), "spawned engine");
        Ok(Self {
            program: program.to_string(),
            child,
            stdin,
            lines: rx,
            reader: Some(reader),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    fn reap(&mut self) -> io::Result<()> {
        let deadline = Instant::now() + EXIT_GRACE;
        while Instant::now() < deadline {
            if self.child.try_wait()?.is_some() {
                return Ok(());
            }
            thread::sleep(EXIT_POLL);
        }
        warn!(program = %self.program, "engine ignored quit; killing");
        self.child.kill()?;
        self.child.wait()?;
        Ok(())
    }
}

impl LineChannel for EngineProcess {
    fn send_line(&mut self, line: &str) -> io::Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;
        stdin.write_all(line.as_bytes())?;
        stdin.write_all(b"\n")?;
        stdin.flush()
    }

    fn read_line(&mut self, timeout: Duration) -> io::Result<ReadLine> {
        match self.lines.recv_timeout(timeout) {
            Ok(Ok(line)) => Ok(ReadLine::Line(line.trim_end_matches('\r').to_string())),
            Ok(Err(e)) => Err(e),
            Err(RecvTimeoutError::Timeout) => Ok(ReadLine::TimedOut),
            Err(RecvTimeoutError::Disconnected) => Ok(ReadLine::Eof),
        }
    }

    fn close(&mut self) -> io::Result<()> {
        if let Some(mut stdin) = self.stdin.take() {
            // The engine may already be gone; closing stdin is enough then.
            let _ = stdin.write_all(b"quit\n").and_then(|_| stdin.flush());
        }
        // The reader thread exits on its own once stdout closes.
        self.reader.take();
        self.reap()
    }
}

impl Drop for EngineProcess {
    fn drop(&mut self) {
        if self.stdin.is_some() || self.reader.is_some() {
            if let Err(e) = self.close() {
                warn!(program = %self.program, error = %e, "failed to stop engine");
            }
        }
    }
}

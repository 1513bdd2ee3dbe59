use std::io::{self, BufRead, Write};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

/// Operator interrupt (Ctrl+C), shared between the signal handler and the
/// running command.
///
/// Raising is sticky until a command consumes it, so an interrupt that
/// arrives between two polls is not lost.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    fn flag(&self) -> MutexGuard<'_, bool> {
        // A panicking holder cannot leave a bool half-written
        self.inner.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn raise(&self) {
        *self.flag() = true;
        self.inner.1.notify_all();
    }

    pub fn is_raised(&self) -> bool {
        *self.flag()
    }

    /// Consume a pending interrupt, returning whether there was one
    pub fn take(&self) -> bool {
        std::mem::take(&mut *self.flag())
    }

    /// Block until raised, then consume it
    pub fn wait(&self) {
        let mut raised = self.flag();
        while !*raised {
            raised = self
                .inner
                .1
                .wait(raised)
                .unwrap_or_else(|e| e.into_inner());
        }
        *raised = false;
    }

    /// Block for at most `timeout`; consumes and returns true if raised
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let raised = self.flag();
        let (mut raised, _) = self
            .inner
            .1
            .wait_timeout_while(raised, timeout, |raised| !*raised)
            .unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *raised)
    }
}

/// Line-oriented operator console: where commands print and where the
/// emulation loop reads scripted replies from.
pub struct Console<R, W> {
    input: R,
    output: W,
    interrupt: Interrupt,
}

impl<R: BufRead, W: Write> Console<R, W> {
    pub fn new(input: R, output: W, interrupt: Interrupt) -> Self {
        Self {
            input,
            output,
            interrupt,
        }
    }

    /// Read one line without its line terminator. `None` at end of input.
    ///
    /// Only `\n` / `\r\n` are stripped; tabs and spaces are significant to
    /// the emulation reply parser.
    pub fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }
        Ok(Some(line))
    }

    pub fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }

    pub fn output(&self) -> &W {
        &self.output
    }

    pub fn into_output(self) -> W {
        self.output
    }
}

impl<R, W: Write> Write for Console<R, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.output.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.output.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::thread;

    #[test]
    fn read_line_keeps_tabs() {
        let mut console = Console::new(Cursor::new("\t\r\n1AABB\n\nlast"), Vec::new(), Interrupt::new());
        assert_eq!(console.read_line().unwrap().as_deref(), Some("\t"));
        assert_eq!(console.read_line().unwrap().as_deref(), Some("1AABB"));
        assert_eq!(console.read_line().unwrap().as_deref(), Some(""));
        assert_eq!(console.read_line().unwrap().as_deref(), Some("last"));
        assert_eq!(console.read_line().unwrap(), None);
    }

    #[test]
    fn console_writes_to_output() {
        let mut console = Console::new(Cursor::new(""), Vec::new(), Interrupt::new());
        writeln!(console, "Field is on.").unwrap();
        assert_eq!(String::from_utf8(console.into_output()).unwrap(), "Field is on.\n");
    }

    #[test]
    fn interrupt_take_consumes() {
        let interrupt = Interrupt::new();
        assert!(!interrupt.take());
        interrupt.raise();
        assert!(interrupt.is_raised());
        assert!(interrupt.take());
        assert!(!interrupt.is_raised());
    }

    #[test]
    fn interrupt_wait_returns_when_raised_elsewhere() {
        let interrupt = Interrupt::new();
        let remote = interrupt.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.raise();
        });
        interrupt.wait();
        handle.join().unwrap();
        assert!(!interrupt.is_raised());
    }

    #[test]
    fn interrupt_wait_timeout() {
        let interrupt = Interrupt::new();
        assert!(!interrupt.wait_timeout(Duration::from_millis(5)));
        interrupt.raise();
        assert!(interrupt.wait_timeout(Duration::from_millis(5)));
        assert!(!interrupt.is_raised());
    }
}

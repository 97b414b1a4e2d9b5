//! Scripted stand-in for the serial line, for unit tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::serial_terminal::{ShieldTerminalError, Transport};

#[derive(Debug, Default)]
struct Script {
    written: Vec<String>,
    // Chunks readable right now, one per read_available call
    input: VecDeque<Vec<u8>>,
    // Chunk groups released one group per write
    replies: VecDeque<Vec<Vec<u8>>>,
}

/// Records every write and replays canned device output.
///
/// Clones share the same script so a test can keep a handle after moving the
/// transport into a driver.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    script: Rc<RefCell<Script>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make chunks readable immediately.
    pub fn push_input(&self, chunks: &[&str]) {
        let mut script = self.script.borrow_mut();
        script
            .input
            .extend(chunks.iter().map(|c| c.as_bytes().to_vec()));
    }

    /// Queue chunks that become readable after the next write.
    pub fn reply(&self, chunks: &[&str]) {
        self.script
            .borrow_mut()
            .replies
            .push_back(chunks.iter().map(|c| c.as_bytes().to_vec()).collect());
    }

    pub fn written(&self) -> Vec<String> {
        self.script.borrow().written.clone()
    }
}

impl Transport for ScriptedTransport {
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), ShieldTerminalError> {
        let mut script = self.script.borrow_mut();
        script
            .written
            .push(String::from_utf8_lossy(bytes).into_owned());
        if let Some(reply) = script.replies.pop_front() {
            script.input.extend(reply);
        }
        Ok(())
    }

    fn read_available(&mut self) -> Result<Vec<u8>, ShieldTerminalError> {
        Ok(self.script.borrow_mut().input.pop_front().unwrap_or_default())
    }

    fn clear_input(&mut self) -> Result<(), ShieldTerminalError> {
        self.script.borrow_mut().input.clear();
        Ok(())
    }
}

use std::collections::{BTreeMap, HashMap};
use std::ops::Range;

/// Chunks received so far for one task, keyed by sequence number.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskOutputBuffer {
    chunks: BTreeMap<usize, String>,
    role: Option<String>,
}

impl TaskOutputBuffer {
    pub fn role(&self) -> Option<&str> {
        self.role.as_deref()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    fn store(&mut self, role: Option<&str>, sequence: usize, chunk: &str) {
        if let Some(role) = role.map(str::trim).filter(|role| !role.is_empty()) {
            self.role = Some(role.to_string());
        }
        self.chunks.insert(sequence, chunk.to_string());
    }

    /// Concatenates slots in index order. Missing interior slots render as empty
    /// strings and are reported back as half-open index ranges.
    fn finalize(self) -> ChunkOutcome {
        let mut text = String::new();
        let mut gaps = Vec::new();
        let mut expected = 0usize;
        for (sequence, chunk) in self.chunks {
            if sequence > expected {
                gaps.push(expected..sequence);
            }
            text.push_str(&chunk);
            expected = sequence.saturating_add(1);
        }
        ChunkOutcome::Finalized {
            text,
            role: self.role,
            gaps,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOutcome {
    Buffering,
    Finalized {
        text: String,
        role: Option<String>,
        gaps: Vec<Range<usize>>,
    },
}

#[derive(Debug, Default)]
pub struct TaskOutputReassembler {
    buffers: HashMap<String, TaskOutputBuffer>,
}

impl TaskOutputReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores one chunk. Repeating a sequence number overwrites its slot, so
    /// redelivery is idempotent. A `done` chunk finalizes and drops the buffer.
    pub fn apply(
        &mut self,
        task_id: &str,
        role: Option<&str>,
        sequence: usize,
        chunk: &str,
        done: bool,
    ) -> ChunkOutcome {
        let buffer = self.buffers.entry(task_id.to_string()).or_default();
        buffer.store(role, sequence, chunk);
        if !done {
            return ChunkOutcome::Buffering;
        }

        match self.buffers.remove(task_id) {
            Some(buffer) => buffer.finalize(),
            None => ChunkOutcome::Buffering,
        }
    }

    pub fn buffer(&self, task_id: &str) -> Option<&TaskOutputBuffer> {
        self.buffers.get(task_id)
    }

    pub fn pending_tasks(&self) -> usize {
        self.buffers.len()
    }

    pub fn clear(&mut self) {
        self.buffers.clear();
    }
}

//! Run/lumi/event allow-list.

use mp_core::{Error, EventId, Result};
use std::collections::BTreeMap;
use std::io::BufRead;
use std::path::Path;

/// Accepts only events listed as `run:lumi:event`, one per line.
///
/// Blank lines and lines starting with `#` are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunLumiEventSelector {
    seen: BTreeMap<EventId, bool>,
}

impl RunLumiEventSelector {
    /// Selector over an explicit set of events.
    pub fn from_ids(ids: impl IntoIterator<Item = EventId>) -> Self {
        Self { seen: ids.into_iter().map(|id| (id, false)).collect() }
    }

    /// Parse `run:lumi:event` lines.
    pub fn from_reader(reader: impl BufRead) -> Result<Self> {
        let mut ids = Vec::new();
        for (n, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let id = parse_id(line)
                .map_err(|e| Error::Input(format!("allow-list line {}: {e}", n + 1)))?;
            ids.push(id);
        }
        Ok(Self::from_ids(ids))
    }

    /// Read an allow-list file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    /// `true` if `id` is listed; marks it seen.
    pub fn accept(&mut self, id: EventId) -> bool {
        match self.seen.get_mut(&id) {
            Some(seen) => {
                *seen = true;
                true
            }
            None => false,
        }
    }

    /// `true` once every listed event has been seen.
    pub fn are_we_done(&self) -> bool {
        self.seen.values().all(|&s| s)
    }

    /// Number of listed events.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// `true` when nothing is listed.
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

fn parse_id(line: &str) -> std::result::Result<EventId, String> {
    let parts: Vec<&str> = line.split(':').map(str::trim).collect();
    let [run, lumi, event] = parts.as_slice() else {
        return Err(format!("expected run:lumi:event, got '{line}'"));
    };
    let run = run.parse().map_err(|e| format!("bad run '{run}': {e}"))?;
    let lumi = lumi.parse().map_err(|e| format!("bad lumi '{lumi}': {e}"))?;
    let event = event.parse().map_err(|e| format!("bad event '{event}': {e}"))?;
    Ok(EventId::new(run, lumi, event))
}

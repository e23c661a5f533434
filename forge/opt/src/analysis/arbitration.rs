use forge_ir::{CompKind, ReadClear};

/// What a [RoundRobin] referee did in one clock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cycle {
    /// The slot holding the resource at the end of the clock.
    pub grant: Option<usize>,
    /// The slot whose access finished during the clock.
    pub completed: Option<usize>,
}

/// Cycle-level model of the referee placed in front of a shared memory
/// port.
///
/// Each slot captures its GO into a pending flag. At most one slot holds
/// the grant at a time; when its access reports DONE the grant is released
/// and the priority rotates to the slot after it, so every contender is
/// served before any is served twice. The simplified referee keeps a fixed
/// priority instead.
#[derive(Debug, Clone)]
pub struct RoundRobin {
    state: usize,
    pending: Vec<bool>,
    granted: Option<usize>,
    /// Slot whose pending flag is cleared at the start of the next clock.
    clearing: Option<usize>,
    simple: bool,
    read_clear: ReadClear,
}

impl RoundRobin {
    pub fn new(slots: usize, simple: bool, read_clear: ReadClear) -> Self {
        RoundRobin {
            state: 0,
            pending: vec![false; slots],
            granted: None,
            clearing: None,
            simple,
            read_clear,
        }
    }

    /// The model of a synthesized referee.
    pub fn from_kind(kind: &CompKind) -> Option<Self> {
        match kind {
            CompKind::Referee {
                slots,
                simple,
                read_clear,
                ..
            } => Some(Self::new(*slots as usize, *simple, *read_clear)),
            _ => None,
        }
    }

    pub fn slots(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, slot: usize) -> bool {
        self.pending.get(slot).copied().unwrap_or(false)
    }

    pub fn granted(&self) -> Option<usize> {
        self.granted
    }

    /// Advance one clock with the given GO and DONE inputs, one per slot.
    /// DONE is only observed for the granted slot.
    pub fn clock(&mut self, go: &[bool], done: &[bool]) -> Cycle {
        let slots = self.slots();
        if let Some(slot) = self.clearing.take() {
            self.pending[slot] = false;
        }
        for (slot, go) in go.iter().enumerate().take(slots) {
            if *go {
                self.pending[slot] = true;
            }
        }

        let mut completed = None;
        if let Some(slot) = self.granted {
            if done.get(slot).copied().unwrap_or(false) {
                completed = Some(slot);
                match self.read_clear {
                    ReadClear::BeforeMux => self.pending[slot] = false,
                    ReadClear::AfterMux => self.clearing = Some(slot),
                }
                self.granted = None;
                if !self.simple {
                    self.state = (slot + 1) % slots;
                }
            }
        }

        if self.granted.is_none() {
            let start = if self.simple { 0 } else { self.state };
            self.granted = (0..slots)
                .map(|i| (start + i) % slots)
                .find(|s| self.pending[*s] && self.clearing != Some(*s));
        }

        Cycle {
            grant: self.granted,
            completed,
        }
    }
}

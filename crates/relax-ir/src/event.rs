use std::fmt;

use indexmap::IndexSet;
use relax_smt::terms::SmtTerm;

/// A unique identifier for an event; also its index in the program's arena.
pub type EventId = usize;
/// A unique identifier for a thread.
pub type ThreadId = usize;
/// A unique identifier for a memory location.
pub type LocationId = usize;

/// What an event does.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Initial write of a location. Executes unconditionally.
    Init,
    Load,
    Store,
    /// A fence with its architecture name (`Mfence`, `Sync`, `Lwsync`, ...).
    Fence(String),
    /// Control-flow marker.
    Branch,
    /// Register-only computation.
    Local,
}

/// A compiled program event. Immutable once the program is built.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub id: EventId,
    /// `None` for initial writes.
    pub thread: Option<ThreadId>,
    pub po_index: usize,
    pub kind: EventKind,
    pub tags: IndexSet<String>,
    pub location: Option<LocationId>,
    /// Written value for stores and inits, destination register for loads.
    pub value: Option<SmtTerm>,
    pub guard: SmtTerm,
}

impl Event {
    /// The condition under which this event executes.
    pub fn executes(&self) -> &SmtTerm {
        &self.guard
    }

    pub fn is_memory(&self) -> bool {
        matches!(self.kind, EventKind::Init | EventKind::Load | EventKind::Store)
    }

    pub fn is_read(&self) -> bool {
        self.kind == EventKind::Load
    }

    /// Stores and initial writes.
    pub fn is_write(&self) -> bool {
        matches!(self.kind, EventKind::Init | EventKind::Store)
    }

    pub fn is_init(&self) -> bool {
        self.kind == EventKind::Init
    }

    pub fn is_fence(&self, name: &str) -> bool {
        matches!(&self.kind, EventKind::Fence(n) if n == name)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Statically known to execute in every run.
    pub fn always_executes(&self) -> bool {
        self.guard.is_true()
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            EventKind::Init => "IW".to_string(),
            EventKind::Load => "R".to_string(),
            EventKind::Store => "W".to_string(),
            EventKind::Fence(name) => name.clone(),
            EventKind::Branch => "B".to_string(),
            EventKind::Local => "L".to_string(),
        };
        match self.thread {
            Some(t) => write!(f, "e{}:T{t}:{kind}", self.id)?,
            None => write!(f, "e{}:{kind}", self.id)?,
        }
        if let Some(loc) = self.location {
            write!(f, "@{loc}")?;
        }
        Ok(())
    }
}

/// Observed memory value of a memory event.
pub fn value_var(id: EventId) -> String {
    format!("val_{id}")
}

/// Final value of a location after the execution.
pub fn final_value_var(loc: LocationId) -> String {
    format!("last_val_{loc}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: EventKind) -> Event {
        Event {
            id: 3,
            thread: Some(1),
            po_index: 3,
            kind,
            tags: IndexSet::new(),
            location: Some(0),
            value: None,
            guard: SmtTerm::bool(true),
        }
    }

    #[test]
    fn kind_predicates() {
        assert!(event(EventKind::Store).is_write());
        assert!(event(EventKind::Init).is_write());
        assert!(!event(EventKind::Load).is_write());
        assert!(event(EventKind::Load).is_read());
        assert!(event(EventKind::Fence("Mfence".into())).is_fence("Mfence"));
        assert!(!event(EventKind::Fence("Mfence".into())).is_fence("Sync"));
        assert!(!event(EventKind::Branch).is_memory());
    }

    #[test]
    fn display_and_variable_names() {
        assert_eq!(event(EventKind::Store).to_string(), "e3:T1:W@0");
        assert_eq!(value_var(7), "val_7");
        assert_eq!(final_value_var(2), "last_val_2");
    }
}

use indexmap::{IndexMap, IndexSet};
use relax_smt::sorts::SmtSort;
use relax_smt::terms::SmtTerm;
use thiserror::Error;

use crate::event::{Event, EventId, EventKind, LocationId, ThreadId};
use crate::filter::EventFilter;

/// A shared memory location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub name: String,
    pub initial: i64,
}

/// A thread and its events in program order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thread {
    pub id: ThreadId,
    pub events: Vec<EventId>,
}

/// Structural problems found by [`Program::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProgramError {
    #[error("Event at index {index} carries id {id}")]
    IdMismatch { index: usize, id: EventId },
    #[error("Event {0} is a memory event without a location")]
    MissingLocation(EventId),
    #[error("Event {event} refers to unknown location {location}")]
    UnknownLocation { event: EventId, location: LocationId },
    #[error("Event {0} is a memory event without a value")]
    MissingValue(EventId),
    #[error("Event {event} refers to unknown thread {thread}")]
    UnknownThread { event: EventId, thread: ThreadId },
    #[error("Event {0} belongs to no thread")]
    Unthreaded(EventId),
    #[error("Thread {thread} lists event {event} out of program order")]
    ProgramOrder { thread: ThreadId, event: EventId },
    #[error("Location {0} has no initial write")]
    MissingInit(LocationId),
    #[error("Location {0} has more than one initial write")]
    DuplicateInit(LocationId),
    #[error("Initial write {0} appears after thread events")]
    InitAfterThreadEvent(EventId),
    #[error("Conflicting declarations for '{0}'")]
    ConflictingDeclaration(String),
}

/// A compiled program: the immutable input of a verification task.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub name: String,
    pub locations: IndexMap<LocationId, Location>,
    pub threads: Vec<Thread>,
    pub events: Vec<Event>,
    /// Registers and guard variables introduced by the front end.
    pub declarations: IndexMap<String, SmtSort>,
    /// Control- and data-flow formula of the compiled program.
    pub constraints: Vec<SmtTerm>,
    /// Condition whose reachability is being checked.
    pub assertion: Option<SmtTerm>,
}

impl Program {
    pub fn event(&self, id: EventId) -> &Event {
        &self.events[id]
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events_where<'a>(
        &'a self,
        filter: &'a EventFilter,
    ) -> impl Iterator<Item = &'a Event> + 'a {
        self.events.iter().filter(move |e| filter.matches(e))
    }

    /// Memory events accessing `loc`, initial write included.
    pub fn accesses(&self, loc: LocationId) -> impl Iterator<Item = &Event> + '_ {
        self.events
            .iter()
            .filter(move |e| e.is_memory() && e.location == Some(loc))
    }

    pub fn init_of(&self, loc: LocationId) -> Option<EventId> {
        self.accesses(loc).find(|e| e.is_init()).map(|e| e.id)
    }

    pub fn location_name(&self, loc: LocationId) -> Option<&str> {
        self.locations.get(&loc).map(|l| l.name.as_str())
    }

    pub fn find_location_by_name(&self, name: &str) -> Option<LocationId> {
        self.locations
            .iter()
            .find(|(_, l)| l.name == name)
            .map(|(id, _)| *id)
    }

    pub fn validate(&self) -> Result<(), ProgramError> {
        let mut first_thread_event = None;
        let mut inits: IndexMap<LocationId, usize> = IndexMap::new();

        for (index, e) in self.events.iter().enumerate() {
            if e.id != index {
                return Err(ProgramError::IdMismatch { index, id: e.id });
            }
            if e.is_memory() {
                let loc = e.location.ok_or(ProgramError::MissingLocation(e.id))?;
                if !self.locations.contains_key(&loc) {
                    return Err(ProgramError::UnknownLocation {
                        event: e.id,
                        location: loc,
                    });
                }
                if e.value.is_none() {
                    return Err(ProgramError::MissingValue(e.id));
                }
            }
            match (e.is_init(), e.thread) {
                (true, _) => {
                    if first_thread_event.is_some() {
                        return Err(ProgramError::InitAfterThreadEvent(e.id));
                    }
                    if let Some(loc) = e.location {
                        *inits.entry(loc).or_insert(0) += 1;
                    }
                }
                (false, None) => return Err(ProgramError::Unthreaded(e.id)),
                (false, Some(t)) => {
                    first_thread_event.get_or_insert(e.id);
                    let listed = self
                        .threads
                        .get(t)
                        .map(|thread| thread.events.contains(&e.id));
                    if listed != Some(true) {
                        return Err(ProgramError::UnknownThread {
                            event: e.id,
                            thread: t,
                        });
                    }
                }
            }
        }

        for &loc in self.locations.keys() {
            match inits.get(&loc).copied().unwrap_or(0) {
                0 => return Err(ProgramError::MissingInit(loc)),
                1 => {}
                _ => return Err(ProgramError::DuplicateInit(loc)),
            }
        }

        for thread in &self.threads {
            let mut last: Option<usize> = None;
            for &id in &thread.events {
                let e = self.events.get(id).ok_or(ProgramError::UnknownThread {
                    event: id,
                    thread: thread.id,
                })?;
                if e.thread != Some(thread.id) {
                    return Err(ProgramError::UnknownThread {
                        event: id,
                        thread: thread.id,
                    });
                }
                if last.is_some_and(|prev| prev >= e.po_index) {
                    return Err(ProgramError::ProgramOrder {
                        thread: thread.id,
                        event: id,
                    });
                }
                last = Some(e.po_index);
            }
        }
        Ok(())
    }
}

/// Incremental construction of a [`Program`].
///
/// Locations must be introduced before thread events so that every initial
/// write precedes them in the arena.
#[derive(Debug, Clone, Default)]
pub struct ProgramBuilder {
    name: String,
    locations: IndexMap<LocationId, Location>,
    threads: Vec<Thread>,
    events: Vec<Event>,
    declarations: IndexMap<String, SmtSort>,
    constraints: Vec<SmtTerm>,
    assertion: Option<SmtTerm>,
    guards: Vec<SmtTerm>,
    conflict: Option<String>,
}

impl ProgramBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn location(&mut self, name: impl Into<String>, initial: i64) -> LocationId {
        let loc = self.locations.len();
        self.locations.insert(
            loc,
            Location {
                name: name.into(),
                initial,
            },
        );
        let id = self.events.len();
        self.events.push(Event {
            id,
            thread: None,
            po_index: id,
            kind: EventKind::Init,
            tags: IndexSet::new(),
            location: Some(loc),
            value: Some(SmtTerm::int(initial)),
            guard: SmtTerm::bool(true),
        });
        loc
    }

    pub fn thread(&mut self) -> ThreadId {
        let id = self.threads.len();
        self.threads.push(Thread {
            id,
            events: Vec::new(),
        });
        id
    }

    fn push(
        &mut self,
        thread: ThreadId,
        kind: EventKind,
        location: Option<LocationId>,
        value: Option<SmtTerm>,
    ) -> EventId {
        let id = self.events.len();
        self.events.push(Event {
            id,
            thread: Some(thread),
            po_index: id,
            kind,
            tags: IndexSet::new(),
            location,
            value,
            guard: SmtTerm::and_all(self.guards.iter().cloned()),
        });
        if let Some(t) = self.threads.get_mut(thread) {
            t.events.push(id);
        }
        id
    }

    /// Load from `loc` into the integer register `reg`.
    pub fn load(&mut self, thread: ThreadId, loc: LocationId, reg: &str) -> EventId {
        self.declare(reg, SmtSort::Int);
        self.push(thread, EventKind::Load, Some(loc), Some(SmtTerm::var(reg)))
    }

    pub fn store(&mut self, thread: ThreadId, loc: LocationId, value: SmtTerm) -> EventId {
        self.push(thread, EventKind::Store, Some(loc), Some(value))
    }

    pub fn fence(&mut self, thread: ThreadId, name: &str) -> EventId {
        self.push(thread, EventKind::Fence(name.to_string()), None, None)
    }

    pub fn branch(&mut self, thread: ThreadId) -> EventId {
        self.push(thread, EventKind::Branch, None, None)
    }

    /// Register assignment `reg := value`, effective when the event executes.
    pub fn local(&mut self, thread: ThreadId, reg: &str, value: SmtTerm) -> EventId {
        self.declare(reg, SmtSort::Int);
        let id = self.push(thread, EventKind::Local, None, Some(SmtTerm::var(reg)));
        let guard = self.events[id].guard.clone();
        self.constraints
            .push(guard.implies(SmtTerm::var(reg).eq(value)));
        id
    }

    pub fn tag_last(&mut self, tag: &str) -> &mut Self {
        if let Some(e) = self.events.last_mut() {
            e.tags.insert(tag.to_string());
        }
        self
    }

    /// Run `f` with `guard` conjoined to the guard of every event it creates.
    pub fn with_guard<R>(&mut self, guard: SmtTerm, f: impl FnOnce(&mut Self) -> R) -> R {
        self.guards.push(guard);
        let out = f(self);
        self.guards.pop();
        out
    }

    pub fn declare(&mut self, name: &str, sort: SmtSort) -> &mut Self {
        match self.declarations.get(name) {
            Some(existing) if *existing != sort => {
                self.conflict.get_or_insert_with(|| name.to_string());
            }
            Some(_) => {}
            None => {
                self.declarations.insert(name.to_string(), sort);
            }
        }
        self
    }

    pub fn constrain(&mut self, term: SmtTerm) -> &mut Self {
        self.constraints.push(term);
        self
    }

    pub fn assert_reachable(&mut self, term: SmtTerm) -> &mut Self {
        self.assertion = Some(term);
        self
    }

    pub fn build(self) -> Result<Program, ProgramError> {
        if let Some(name) = self.conflict {
            return Err(ProgramError::ConflictingDeclaration(name));
        }
        let program = Program {
            name: self.name,
            locations: self.locations,
            threads: self.threads,
            events: self.events,
            declarations: self.declarations,
            constraints: self.constraints,
            assertion: self.assertion,
        };
        program.validate()?;
        Ok(program)
    }
}

use std::fmt;

use crate::event::{Event, EventKind};

/// Unary predicate over events, used by cartesian relations and by presets
/// such as `po & (R * M)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventFilter {
    Any,
    Memory,
    Read,
    /// Stores and initial writes.
    Write,
    Init,
    Fence,
    FenceNamed(String),
    Branch,
    Tag(String),
    Union(Box<EventFilter>, Box<EventFilter>),
    Intersection(Box<EventFilter>, Box<EventFilter>),
    Minus(Box<EventFilter>, Box<EventFilter>),
}

impl EventFilter {
    pub fn union(self, other: EventFilter) -> Self {
        EventFilter::Union(Box::new(self), Box::new(other))
    }

    pub fn intersect(self, other: EventFilter) -> Self {
        EventFilter::Intersection(Box::new(self), Box::new(other))
    }

    pub fn minus(self, other: EventFilter) -> Self {
        EventFilter::Minus(Box::new(self), Box::new(other))
    }

    pub fn matches(&self, event: &Event) -> bool {
        match self {
            EventFilter::Any => true,
            EventFilter::Memory => event.is_memory(),
            EventFilter::Read => event.is_read(),
            EventFilter::Write => event.is_write(),
            EventFilter::Init => event.is_init(),
            EventFilter::Fence => matches!(event.kind, EventKind::Fence(_)),
            EventFilter::FenceNamed(name) => event.is_fence(name),
            EventFilter::Branch => event.kind == EventKind::Branch,
            EventFilter::Tag(tag) => event.has_tag(tag),
            EventFilter::Union(a, b) => a.matches(event) || b.matches(event),
            EventFilter::Intersection(a, b) => a.matches(event) && b.matches(event),
            EventFilter::Minus(a, b) => a.matches(event) && !b.matches(event),
        }
    }

    fn is_compound(&self) -> bool {
        matches!(
            self,
            EventFilter::Union(..) | EventFilter::Intersection(..) | EventFilter::Minus(..)
        )
    }
}

struct Operand<'a>(&'a EventFilter);

impl fmt::Display for Operand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_compound() {
            write!(f, "({})", self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl fmt::Display for EventFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventFilter::Any => write!(f, "_"),
            EventFilter::Memory => write!(f, "M"),
            EventFilter::Read => write!(f, "R"),
            EventFilter::Write => write!(f, "W"),
            EventFilter::Init => write!(f, "IW"),
            EventFilter::Fence => write!(f, "F"),
            EventFilter::FenceNamed(name) | EventFilter::Tag(name) => write!(f, "{name}"),
            EventFilter::Branch => write!(f, "B"),
            EventFilter::Union(a, b) => write!(f, "{} | {}", Operand(a), Operand(b)),
            EventFilter::Intersection(a, b) => write!(f, "{} & {}", Operand(a), Operand(b)),
            EventFilter::Minus(a, b) => write!(f, "{} \\ {}", Operand(a), Operand(b)),
        }
    }
}

/*!
Annotated examples as they are read from the corpus. Offsets are counted in characters (Unicode
scalar values), not bytes, and are half-open: `[start, end)`.

A corpus record looks like:
```json
{"text": "A company laid off 650 people",
 "events": [{"label": "Layoff",
             "trigger": {"offset": [10, 18], "text": "laid off"},
             "roles": [{"label": "Employer", "offset": [0, 9], "text": "A company"}]}]}
```
*/
use crate::error::{Error, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_jsonlines::json_lines;
use std::borrow::Cow;
use std::fmt::Display;
use std::path::Path;

/// Label given to triggers when they are injected in the role list of their event.
pub const TRIGGER: &str = "trigger";

/// Half-open character span. The end is always greater than the start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "(usize, usize)", into = "(usize, usize)")]
pub struct Span {
    pub(crate) start: usize,
    pub(crate) end: usize,
}

impl Span {
    pub fn try_new(start: usize, end: usize) -> Result<Self> {
        if end > start {
            Ok(Span { start, end })
        } else {
            Err(Error::InvalidSpan { start, end })
        }
    }

    /// Builds a span, panicking if `end <= start`. Use `try_new` for untrusted offsets.
    pub fn new(start: usize, end: usize) -> Self {
        assert!(end > start, "invalid span [{start}, {end})");
        Span { start, end }
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Always false, a span covers at least one character.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Index of the last covered character.
    pub fn last(&self) -> usize {
        self.end - 1
    }

    /// Characters of `text` covered by the span.
    pub fn slice(&self, text: &str) -> String {
        text.chars().skip(self.start).take(self.len()).collect()
    }
}

impl TryFrom<(usize, usize)> for Span {
    type Error = Error;
    fn try_from(value: (usize, usize)) -> Result<Self> {
        Span::try_new(value.0, value.1)
    }
}

impl From<Span> for (usize, usize) {
    fn from(value: Span) -> Self {
        (value.start, value.end)
    }
}

impl Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Role {
    pub label: String,
    pub offset: Span,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Trigger {
    pub offset: Span,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Event {
    pub label: String,
    pub trigger: Trigger,
    #[serde(default)]
    pub roles: Vec<Role>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Example {
    pub text: String,
    #[serde(default)]
    pub events: Vec<Event>,
}

/// Example used by span extraction models: a text and its (possibly nested) labelled entities.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityExample {
    pub text: String,
    #[serde(default)]
    pub entities: Vec<Role>,
}

impl From<&Example> for EntityExample {
    /// Flattens the events of an example: every role and every trigger becomes an entity, the
    /// triggers being labelled with their event-scoped label.
    fn from(example: &Example) -> Self {
        let entities = example
            .events
            .iter()
            .flat_map(|e| e.effective_roles(TriggerLabel::EventScoped))
            .map(|r| Role {
                label: r.label.into_owned(),
                offset: r.offset,
                text: r.text.to_string(),
            })
            .collect();
        EntityExample {
            text: example.text.clone(),
            entities,
        }
    }
}

/// How the trigger is labelled once it is injected in the role list of its event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerLabel {
    /// The same `"trigger"` label for every event type.
    Generic,
    /// One label per event type, such as `"Layoff-trigger"`.
    EventScoped,
}

/// The event-scoped trigger label of an event type.
pub fn event_scoped_trigger(event_label: &str) -> String {
    format!("{event_label}-{TRIGGER}")
}

/// Borrowed view of a role of an event. The trigger is one of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleView<'e> {
    pub label: Cow<'e, str>,
    pub offset: Span,
    pub text: &'e str,
}

impl Event {
    pub fn trigger_label(&self, kind: TriggerLabel) -> Cow<'static, str> {
        match kind {
            TriggerLabel::Generic => Cow::Borrowed(TRIGGER),
            TriggerLabel::EventScoped => Cow::Owned(event_scoped_trigger(&self.label)),
        }
    }

    /// The roles of the event followed by its trigger. The event itself is left untouched, so
    /// encoding the same event twice yields the same list.
    pub fn effective_roles(&self, kind: TriggerLabel) -> impl Iterator<Item = RoleView<'_>> + '_ {
        let trigger = RoleView {
            label: self.trigger_label(kind),
            offset: self.trigger.offset,
            text: &self.trigger.text,
        };
        self.roles
            .iter()
            .map(|r| RoleView {
                label: Cow::Borrowed(r.label.as_str()),
                offset: r.offset,
                text: &r.text,
            })
            .chain(std::iter::once(trigger))
    }
}

/// Reads a JSON lines corpus, one record per line.
pub fn read_corpus<T, P>(path: P) -> Result<Vec<T>>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let records = json_lines::<T, P>(path)?.collect::<std::io::Result<Vec<T>>>()?;
    Ok(records)
}

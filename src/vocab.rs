/*!
Label vocabularies. A vocabulary is built once from the training split and then frozen: the id
of a label decides which slice of the tag tensors (and of the model output) it owns, so training
and inference must share the exact same ordering. Vocabularies serialize as the list of their
labels in id order.
*/
use crate::error::Result;
use crate::example::{event_scoped_trigger, EntityExample, Example, TRIGGER};
use ahash::{AHashMap, AHashSet, RandomState};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt::Display;
use std::fs::File;
use std::hash::Hash;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// An (event type, role type) pair, such as `("Layoff", "Employer")` or `("Layoff", "trigger")`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CombinedLabel {
    pub event: String,
    pub role: String,
}

impl CombinedLabel {
    pub fn new<E: Into<String>, R: Into<String>>(event: E, role: R) -> Self {
        Self {
            event: event.into(),
            role: role.into(),
        }
    }

    pub fn is_trigger(&self) -> bool {
        self.role == TRIGGER
    }
}

impl Display for CombinedLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.event, self.role)
    }
}

/// First pass of the vocabulary construction: distinct labels in first-seen order.
#[derive(Debug, Clone)]
pub struct OrderedLabelSet<L> {
    seen: AHashSet<L>,
    labels: Vec<L>,
}

impl<L: Hash + Eq + Clone> Default for OrderedLabelSet<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: Hash + Eq + Clone> OrderedLabelSet<L> {
    pub fn new() -> Self {
        Self {
            seen: AHashSet::with_hasher(RandomState::new()),
            labels: Vec::new(),
        }
    }

    /// Returns false if the label was already present.
    pub fn insert(&mut self, label: L) -> bool {
        if self.seen.contains(&label) {
            return false;
        }
        self.seen.insert(label.clone());
        self.labels.push(label);
        true
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Second pass: freezes the labels in first-seen order.
    pub fn freeze(self) -> LabelVocabulary<L> {
        LabelVocabulary::from_labels(self.labels)
    }
}

impl<L: Hash + Eq + Clone + Ord> OrderedLabelSet<L> {
    /// Second pass: freezes the labels in ascending order.
    pub fn freeze_sorted(mut self) -> LabelVocabulary<L> {
        self.labels.sort();
        LabelVocabulary::from_labels(self.labels)
    }
}

impl<L: Hash + Eq + Clone> Extend<L> for OrderedLabelSet<L> {
    fn extend<T: IntoIterator<Item = L>>(&mut self, iter: T) {
        for label in iter {
            self.insert(label);
        }
    }
}

/// Frozen bijection between labels and dense ids `0..len`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    from = "Vec<L>",
    into = "Vec<L>",
    bound(
        serialize = "L: Serialize + Clone",
        deserialize = "L: DeserializeOwned + Hash + Eq + Clone"
    )
)]
pub struct LabelVocabulary<L> {
    labels: Box<[L]>,
    ids: AHashMap<L, usize>,
}

impl<L: Hash + Eq + Clone> From<Vec<L>> for LabelVocabulary<L> {
    fn from(value: Vec<L>) -> Self {
        Self::from_labels(value)
    }
}

impl<L: Clone> From<LabelVocabulary<L>> for Vec<L> {
    fn from(value: LabelVocabulary<L>) -> Self {
        value.labels.into_vec()
    }
}

impl<L: PartialEq> PartialEq for LabelVocabulary<L> {
    fn eq(&self, other: &Self) -> bool {
        self.labels == other.labels
    }
}

impl<L: Eq> Eq for LabelVocabulary<L> {}

impl<L: Hash + Eq + Clone> LabelVocabulary<L> {
    /// Ids are given in the order of `labels`. Later duplicates are dropped.
    pub fn from_labels<I: IntoIterator<Item = L>>(labels: I) -> Self {
        let mut deduplicated: Vec<L> = Vec::new();
        let mut ids: AHashMap<L, usize> = AHashMap::with_hasher(RandomState::new());
        for label in labels {
            if !ids.contains_key(&label) {
                ids.insert(label.clone(), deduplicated.len());
                deduplicated.push(label);
            }
        }
        Self {
            labels: deduplicated.into_boxed_slice(),
            ids,
        }
    }

    pub fn id<Q>(&self, label: &Q) -> Option<usize>
    where
        L: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.ids.get(label).copied()
    }

    pub fn contains<Q>(&self, label: &Q) -> bool
    where
        L: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.ids.contains_key(label)
    }
}

impl<L> LabelVocabulary<L> {
    pub fn label(&self, id: usize) -> Option<&L> {
        self.labels.get(id)
    }

    pub fn labels(&self) -> &[L] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &L)> {
        self.labels.iter().enumerate()
    }

    /// Id to label map, as exported alongside a trained model.
    pub fn id2label(&self) -> Vec<(usize, &L)> {
        self.iter().collect()
    }
}

impl<L: Serialize + Clone> LabelVocabulary<L> {
    pub fn to_writer<W: Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.to_writer(&mut writer)?;
        writer.flush()?;
        Ok(())
    }
}

impl<L: DeserializeOwned + Hash + Eq + Clone> LabelVocabulary<L> {
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_reader(BufReader::new(File::open(path)?))
    }
}

impl LabelVocabulary<String> {
    /// Event types in first-seen order.
    pub fn event_types(examples: &[Example]) -> Self {
        let mut set = OrderedLabelSet::new();
        set.extend(
            examples
                .iter()
                .flat_map(|ex| ex.events.iter())
                .map(|e| e.label.clone()),
        );
        set.freeze()
    }

    /// Role types in first-seen order, followed by the event-scoped trigger label of every
    /// event type.
    pub fn role_types(examples: &[Example]) -> Self {
        let mut set = OrderedLabelSet::new();
        set.extend(
            examples
                .iter()
                .flat_map(|ex| ex.events.iter())
                .flat_map(|e| e.roles.iter())
                .map(|r| r.label.clone()),
        );
        set.extend(trigger_labels(examples));
        set.freeze()
    }

    /// Triggers and roles seen as flat entities, sorted.
    pub fn entities(examples: &[Example]) -> Self {
        let mut set = OrderedLabelSet::new();
        set.extend(trigger_labels(examples));
        set.extend(
            examples
                .iter()
                .flat_map(|ex| ex.events.iter())
                .flat_map(|e| e.roles.iter())
                .map(|r| r.label.clone()),
        );
        set.freeze_sorted()
    }

    /// Entity labels of a span extraction corpus, sorted.
    pub fn span_labels(examples: &[EntityExample]) -> Self {
        let mut set = OrderedLabelSet::new();
        set.extend(
            examples
                .iter()
                .flat_map(|ex| ex.entities.iter())
                .map(|e| e.label.clone()),
        );
        set.freeze_sorted()
    }
}

impl LabelVocabulary<CombinedLabel> {
    /// Every (event type, role type) pair seen in training, `(event, "trigger")` included, sorted.
    pub fn combined(examples: &[Example]) -> Self {
        let mut set = OrderedLabelSet::new();
        for event in examples.iter().flat_map(|ex| ex.events.iter()) {
            set.insert(CombinedLabel::new(event.label.as_str(), TRIGGER));
            set.extend(
                event
                    .roles
                    .iter()
                    .map(|r| CombinedLabel::new(event.label.as_str(), r.label.as_str())),
            );
        }
        set.freeze_sorted()
    }
}

fn trigger_labels(examples: &[Example]) -> Vec<String> {
    LabelVocabulary::event_types(examples)
        .labels()
        .iter()
        .map(|e| event_scoped_trigger(e))
        .collect()
}

/// Every vocabulary derived from a training split. They are built together, once, and shared
/// read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vocabularies {
    pub event_types: LabelVocabulary<String>,
    pub role_types: LabelVocabulary<String>,
    pub entities: LabelVocabulary<String>,
    pub combined: LabelVocabulary<CombinedLabel>,
}

impl Vocabularies {
    pub fn build(training_examples: &[Example]) -> Self {
        let vocabularies = Self {
            event_types: LabelVocabulary::event_types(training_examples),
            role_types: LabelVocabulary::role_types(training_examples),
            entities: LabelVocabulary::entities(training_examples),
            combined: LabelVocabulary::combined(training_examples),
        };
        tracing::debug!(
            event_types = vocabularies.event_types.len(),
            role_types = vocabularies.role_types.len(),
            entities = vocabularies.entities.len(),
            combined = vocabularies.combined.len(),
            "built label vocabularies"
        );
        vocabularies
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(serde_json::from_reader(BufReader::new(File::open(path)?))?)
    }
}

/*!
Inference side of the tagging schemes: logits produced by the model are thresholded and mapped
back to character spans. A cell is kept when its logit is strictly greater than the threshold;
with centered logits the usual threshold is `0.0`.

Events are rebuilt from the three tensors. Within one event type, two role spans are linked when
both their head-pair cell and their tail-pair cell are kept. Events are the connected components
of the linked spans. When triggers are labelled, a component holding several triggers is split:
each trigger seeds one event made of itself and of the arguments linked to it, so an argument
shared by two events belongs to both.
*/
use crate::config::{Pairing, Strategy};
use crate::encoder::encoder_for;
use crate::error::{Error, Result};
use crate::example::{Span, TRIGGER};
use crate::offsets::TokenOffsetMap;
use crate::vocab::{LabelVocabulary, Vocabularies};
use ndarray::{Array3, ArrayView2, ArrayView3, Axis};
use num::Float;
use std::collections::BTreeMap;
use std::fmt::Display;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DecodedSpan {
    pub label: String,
    pub span: Span,
    pub text: String,
}

/// Kept `(label, head, tail)` cells of the upper triangle, in ascending order. Cells touching a
/// special or padding token are dropped, as well as cells whose token range is not valid.
fn kept_cells<F: Float>(
    logits: ArrayView3<'_, F>,
    offsets: &TokenOffsetMap,
    threshold: F,
) -> Vec<(usize, usize, usize, Span)> {
    logits
        .indexed_iter()
        .filter(|&((_, head, tail), &logit)| head <= tail && logit > threshold)
        .filter_map(|((label, head, tail), _)| {
            offsets
                .char_span(head, tail)
                .map(|span| (label, head, tail, span))
        })
        .collect()
}

fn check_shape<F>(
    name: &'static str,
    logits: ArrayView3<'_, F>,
    labels: usize,
    offsets: &TokenOffsetMap,
) -> Result<()> {
    let expected = [labels, offsets.len(), offsets.len()];
    if logits.shape() != expected.as_slice() {
        return Err(Error::shape(name, &expected, logits.shape()));
    }
    Ok(())
}

/// Decodes a `[labels, L, L]` span tensor, as produced for `SpanEncoder` targets or for the role
/// tensor of the event strategies.
pub fn decode_spans<F, L>(
    logits: ArrayView3<'_, F>,
    labels: &LabelVocabulary<L>,
    text: &str,
    offsets: &TokenOffsetMap,
    threshold: F,
) -> Result<Vec<DecodedSpan>>
where
    F: Float,
    L: Display,
{
    check_shape("span logits", logits, labels.len(), offsets)?;
    Ok(kept_cells(logits, offsets, threshold)
        .into_iter()
        .filter_map(|(label, _, _, span)| {
            labels.label(label).map(|l| DecodedSpan {
                label: l.to_string(),
                span,
                text: span.slice(text),
            })
        })
        .collect())
}

/// Role, head-pair and tail-pair logits of a single example.
#[derive(Debug, Clone, PartialEq)]
pub struct EventLogits<F> {
    pub role: Array3<F>,
    pub head: Array3<F>,
    pub tail: Array3<F>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DecodedArgument {
    pub span: Span,
    /// Role label. `None` for strategies whose role tensor does not carry it.
    pub role: Option<String>,
    pub text: String,
}

impl DecodedArgument {
    pub fn is_trigger(&self) -> bool {
        self.role.as_deref() == Some(TRIGGER)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DecodedEvent {
    pub label: String,
    /// Arguments sorted by span. The trigger is one of them when the strategy labels it.
    pub arguments: Vec<DecodedArgument>,
}

impl DecodedEvent {
    pub fn trigger(&self) -> Option<&DecodedArgument> {
        self.arguments.iter().find(|a| a.is_trigger())
    }
}

/// Role span kept by the decoder, before grouping.
#[derive(Debug, Clone)]
struct Candidate {
    /// Event type id, `None` when the role tensor is shared by every event type.
    event: Option<usize>,
    role: Option<String>,
    head: usize,
    tail: usize,
    span: Span,
}

impl Candidate {
    fn is_trigger(&self) -> bool {
        self.role.as_deref() == Some(TRIGGER)
    }
}

/// Head-pair and tail-pair logits of one event type.
struct Links<'a, F> {
    head: ArrayView2<'a, F>,
    tail: ArrayView2<'a, F>,
    threshold: F,
    pairing: Pairing,
}

impl<'a, F: Float> Links<'a, F> {
    fn kept(&self, m: &ArrayView2<'_, F>, i: usize, j: usize) -> bool {
        m[[i, j]] > self.threshold
    }

    /// Both the head cell and the tail cell of the pair are kept.
    fn linked(&self, a: &Candidate, b: &Candidate) -> bool {
        let (head, tail) = (&self.head, &self.tail);
        match self.pairing {
            Pairing::Forward => {
                self.kept(head, a.head.min(b.head), a.head.max(b.head))
                    && self.kept(tail, a.tail.min(b.tail), a.tail.max(b.tail))
            }
            Pairing::Directed => {
                (self.kept(head, a.head, b.head) && self.kept(tail, a.tail, b.tail))
                    || (self.kept(head, b.head, a.head) && self.kept(tail, b.tail, a.tail))
            }
        }
    }
}

/// Rebuilds events out of the logits of one of the event strategies. It must be given the
/// vocabularies the model was trained with.
#[derive(Debug, Clone, Copy)]
pub struct EventDecoder<'v> {
    strategy: Strategy,
    vocabularies: &'v Vocabularies,
}

impl<'v> EventDecoder<'v> {
    pub fn new(strategy: Strategy, vocabularies: &'v Vocabularies) -> Self {
        Self {
            strategy,
            vocabularies,
        }
    }

    /// Sizes of the role and of the head/tail label axes.
    pub fn label_axes(&self) -> (usize, usize) {
        encoder_for(self.strategy, self.vocabularies, false).label_axes()
    }

    pub fn decode<F: Float>(
        &self,
        logits: &EventLogits<F>,
        text: &str,
        offsets: &TokenOffsetMap,
        threshold: F,
    ) -> Result<Vec<DecodedEvent>> {
        let (role_labels, pair_labels) = self.label_axes();
        check_shape("role logits", logits.role.view(), role_labels, offsets)?;
        check_shape("head logits", logits.head.view(), pair_labels, offsets)?;
        check_shape("tail logits", logits.tail.view(), pair_labels, offsets)?;

        let candidates = self.candidates(logits.role.view(), offsets, threshold);
        let mut events = Vec::new();
        for (event_id, event_label) in self.vocabularies.event_types.iter() {
            let members: Vec<&Candidate> = candidates
                .iter()
                .filter(|c| c.event.map_or(true, |e| e == event_id))
                .collect();
            let slot = match self.strategy {
                Strategy::Combined | Strategy::SparseCombined => 0,
                Strategy::RoleType | Strategy::EntityGraph => event_id,
            };
            let links = Links {
                head: logits.head.index_axis(Axis(0), slot),
                tail: logits.tail.index_axis(Axis(0), slot),
                threshold,
                pairing: self.strategy.pairing(),
            };
            let groups = self
                .group(&members, &links)
                .into_iter()
                .filter(|component| self.keeps(component))
                .flat_map(|component| self.split_by_trigger(component, &links));
            for component in groups {
                let mut arguments: Vec<DecodedArgument> = component
                    .iter()
                    .map(|c| DecodedArgument {
                        span: c.span,
                        role: c.role.clone(),
                        text: c.span.slice(text),
                    })
                    .collect();
                arguments.sort();
                arguments.dedup();
                events.push(DecodedEvent {
                    label: event_label.clone(),
                    arguments,
                });
            }
        }
        Ok(events)
    }

    fn candidates<F: Float>(
        &self,
        role: ArrayView3<'_, F>,
        offsets: &TokenOffsetMap,
        threshold: F,
    ) -> Vec<Candidate> {
        kept_cells(role, offsets, threshold)
            .into_iter()
            .filter_map(|(label, head, tail, span)| {
                let (event, role) = match self.strategy {
                    Strategy::Combined | Strategy::SparseCombined => {
                        let combined = self.vocabularies.combined.label(label)?;
                        let event = self.vocabularies.event_types.id(combined.event.as_str())?;
                        (Some(event), Some(combined.role.clone()))
                    }
                    Strategy::RoleType => (Some(label), None),
                    Strategy::EntityGraph => (None, None),
                };
                Some(Candidate {
                    event,
                    role,
                    head,
                    tail,
                    span,
                })
            })
            .collect()
    }

    /// Connected components of the linked candidates, in order of their first member.
    fn group<'c, F: Float>(
        &self,
        members: &[&'c Candidate],
        links: &Links<'_, F>,
    ) -> Vec<Vec<&'c Candidate>> {
        fn find(parent: &mut [usize], i: usize) -> usize {
            if parent[i] != i {
                parent[i] = find(parent, parent[i]);
            }
            parent[i]
        }

        let mut parent: Vec<usize> = (0..members.len()).collect();
        for i in 0..members.len() {
            for j in (i + 1)..members.len() {
                if links.linked(members[i], members[j]) {
                    let (pi, pj) = (find(&mut parent, i), find(&mut parent, j));
                    if pi != pj {
                        parent[pj] = pi;
                    }
                }
            }
        }
        let mut components: BTreeMap<usize, Vec<&'c Candidate>> = BTreeMap::new();
        let mut first_member: BTreeMap<usize, usize> = BTreeMap::new();
        for (i, member) in members.iter().enumerate() {
            let root = find(&mut parent, i);
            first_member.entry(root).or_insert(i);
            components.entry(root).or_default().push(*member);
        }
        let mut ordered: Vec<(usize, Vec<&'c Candidate>)> = components
            .into_iter()
            .map(|(root, component)| (first_member[&root], component))
            .collect();
        ordered.sort_by_key(|(first, _)| *first);
        ordered.into_iter().map(|(_, component)| component).collect()
    }

    /// One group per trigger of the component, in trigger order, holding the trigger and the
    /// arguments linked to it. Strategies without trigger labels keep the component whole.
    fn split_by_trigger<'c, F: Float>(
        &self,
        component: Vec<&'c Candidate>,
        links: &Links<'_, F>,
    ) -> Vec<Vec<&'c Candidate>> {
        if !matches!(self.strategy, Strategy::Combined | Strategy::SparseCombined) {
            return vec![component];
        }
        let (triggers, arguments): (Vec<&Candidate>, Vec<&Candidate>) =
            component.into_iter().partition(|c| c.is_trigger());
        triggers
            .into_iter()
            .map(|trigger| {
                let linked = arguments.iter().filter(|a| links.linked(trigger, a));
                std::iter::once(trigger).chain(linked.copied()).collect()
            })
            .collect()
    }

    fn keeps(&self, component: &[&Candidate]) -> bool {
        match self.strategy {
            Strategy::Combined | Strategy::SparseCombined => {
                component.iter().any(|c| c.is_trigger())
            }
            Strategy::EntityGraph => component.len() > 1,
            Strategy::RoleType => true,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::encoder::{encoder_for, ExampleTags};
    use crate::example::test::layoff_example;
    use crate::example::{Event, Example, Role, Trigger};
    use crate::tokenizer::{CharTokenizer, Tokenize};
    use rstest::rstest;

    const MAX_LENGTH: usize = 48;

    fn offsets_of(text: &str) -> TokenOffsetMap {
        CharTokenizer::from_texts([text])
            .encode(text, MAX_LENGTH)
            .unwrap()
            .offsets
    }

    /// Logits of a perfect model: `1.0` on tagged cells, `-1.0` elsewhere.
    fn logits_from(
        example: &Example,
        vocabularies: &Vocabularies,
        strategy: Strategy,
    ) -> EventLogits<f32> {
        let offsets = offsets_of(&example.text);
        let encoded =
            encoder_for(strategy, vocabularies, false).encode(example, &offsets, MAX_LENGTH);
        let to_logits = |t: &Array3<i64>| t.mapv(|v| if v > 0 { 1.0 } else { -1.0 });
        match encoded.tags {
            ExampleTags::Dense(tags) => EventLogits {
                role: to_logits(&tags.role),
                head: to_logits(&tags.head),
                tail: to_logits(&tags.tail),
            },
            ExampleTags::Sparse(_) => panic!("evaluation targets must be dense"),
        }
    }

    fn role(label: &str, start: usize, end: usize, text: &str) -> Role {
        Role {
            label: String::from(label),
            offset: Span::new(start, end),
            text: String::from(text),
        }
    }

    /// `"Acme fired 30 and Bolt fired 40"`: two Layoff events.
    fn build_two_layoffs() -> Example {
        let layoff = |trigger: (usize, usize), employer: Role, count: Role| Event {
            label: String::from("Layoff"),
            trigger: Trigger {
                offset: Span::new(trigger.0, trigger.1),
                text: String::from("fired"),
            },
            roles: vec![employer, count],
        };
        Example {
            text: String::from("Acme fired 30 and Bolt fired 40"),
            events: vec![
                layoff((5, 10), role("Employer", 0, 4, "Acme"), role("Count", 11, 13, "30")),
                layoff((23, 28), role("Employer", 18, 22, "Bolt"), role("Count", 29, 31, "40")),
            ],
        }
    }

    #[rstest]
    #[case(0.5, 0)]
    #[case(0.49, 1)]
    fn test_threshold_is_strict(#[case] threshold: f32, #[case] expected: usize) {
        let text = "abc";
        let offsets = offsets_of(text);
        let labels = LabelVocabulary::from_labels([String::from("X")]);
        let mut logits = Array3::<f32>::zeros((1, MAX_LENGTH, MAX_LENGTH));
        logits[[0, 1, 2]] = 0.5;
        let spans = decode_spans(logits.view(), &labels, text, &offsets, threshold).unwrap();
        assert_eq!(spans.len(), expected);
    }

    #[test]
    fn test_decode_spans_ignores_lower_triangle_and_special_tokens() {
        let text = "abc";
        let offsets = offsets_of(text);
        let labels = LabelVocabulary::from_labels([String::from("X"), String::from("Y")]);
        let mut logits = Array3::<f64>::from_elem((2, MAX_LENGTH, MAX_LENGTH), -1.0);
        logits[[1, 1, 2]] = 3.0;
        logits[[0, 3, 1]] = 3.0;
        logits[[0, 0, 2]] = 3.0;
        logits[[0, 2, 4]] = 3.0;
        let spans = decode_spans(logits.view(), &labels, text, &offsets, 0.0).unwrap();
        assert_eq!(
            spans,
            vec![DecodedSpan {
                label: String::from("Y"),
                span: Span::new(0, 2),
                text: String::from("ab"),
            }]
        );
    }

    #[test]
    fn test_decode_spans_shape_mismatch() {
        let offsets = offsets_of("abc");
        let labels = LabelVocabulary::from_labels([String::from("X")]);
        let logits = Array3::<f32>::zeros((2, MAX_LENGTH, MAX_LENGTH));
        let result = decode_spans(logits.view(), &labels, "abc", &offsets, 0.0);
        assert!(matches!(result, Err(Error::Shape { .. })));
    }

    #[test]
    fn test_combined_round_trip() {
        let example = layoff_example();
        let vocabularies = Vocabularies::build(&[example.clone()]);
        let logits = logits_from(&example, &vocabularies, Strategy::Combined);
        let decoder = EventDecoder::new(Strategy::Combined, &vocabularies);
        let events = decoder
            .decode(&logits, &example.text, &offsets_of(&example.text), 0.0)
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].label, "Layoff");
        let trigger = events[0].trigger().unwrap();
        assert_eq!(trigger.span, Span::new(2, 10));
        assert_eq!(trigger.text, "company ");
        assert_eq!(events[0].arguments[0].role.as_deref(), Some("Employer"));
        assert_eq!(events[0].arguments[0].text, "A");
    }

    #[rstest]
    #[case(Strategy::Combined)]
    #[case(Strategy::SparseCombined)]
    #[case(Strategy::RoleType)]
    #[case(Strategy::EntityGraph)]
    fn test_simultaneous_events_are_separated(#[case] strategy: Strategy) {
        let example = build_two_layoffs();
        let vocabularies = Vocabularies::build(&[example.clone()]);
        let logits = logits_from(&example, &vocabularies, strategy);
        let events = EventDecoder::new(strategy, &vocabularies)
            .decode(&logits, &example.text, &offsets_of(&example.text), 0.0)
            .unwrap();
        assert_eq!(events.len(), 2);
        let texts: Vec<Vec<&str>> = events
            .iter()
            .map(|e| e.arguments.iter().map(|a| a.text.as_str()).collect())
            .collect();
        assert_eq!(
            texts,
            vec![vec!["Acme", "fired", "30"], vec!["Bolt", "fired", "40"]]
        );
    }

    /// `"Acme fired 30 and fired 40"`: two Layoff events sharing their Employer.
    fn build_shared_employer() -> Example {
        let layoff = |trigger: (usize, usize), count: Role| Event {
            label: String::from("Layoff"),
            trigger: Trigger {
                offset: Span::new(trigger.0, trigger.1),
                text: String::from("fired"),
            },
            roles: vec![role("Employer", 0, 4, "Acme"), count],
        };
        Example {
            text: String::from("Acme fired 30 and fired 40"),
            events: vec![
                layoff((5, 10), role("Count", 11, 13, "30")),
                layoff((18, 23), role("Count", 24, 26, "40")),
            ],
        }
    }

    #[rstest]
    #[case(Strategy::Combined)]
    #[case(Strategy::SparseCombined)]
    fn test_shared_argument_belongs_to_each_event(#[case] strategy: Strategy) {
        let example = build_shared_employer();
        let vocabularies = Vocabularies::build(&[example.clone()]);
        let logits = logits_from(&example, &vocabularies, strategy);
        let events = EventDecoder::new(strategy, &vocabularies)
            .decode(&logits, &example.text, &offsets_of(&example.text), 0.0)
            .unwrap();
        let texts: Vec<Vec<&str>> = events
            .iter()
            .map(|e| e.arguments.iter().map(|a| a.text.as_str()).collect())
            .collect();
        assert_eq!(
            texts,
            vec![vec!["Acme", "fired", "30"], vec!["Acme", "fired", "40"]]
        );
        let triggers: Vec<Span> = events.iter().map(|e| e.trigger().unwrap().span).collect();
        assert_eq!(triggers, vec![Span::new(5, 10), Span::new(18, 23)]);
        for event in events.iter() {
            assert_eq!(event.arguments.iter().filter(|a| a.is_trigger()).count(), 1);
        }
    }

    #[test]
    fn test_combined_drops_events_without_trigger() {
        let example = layoff_example();
        let vocabularies = Vocabularies::build(&[example.clone()]);
        let mut logits = logits_from(&example, &vocabularies, Strategy::Combined);
        // Trigger cell of ("Layoff", "trigger").
        logits.role[[1, 3, 10]] = -1.0;
        let events = EventDecoder::new(Strategy::Combined, &vocabularies)
            .decode(&logits, &example.text, &offsets_of(&example.text), 0.0)
            .unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_head_link_alone_does_not_group() {
        let example = build_two_layoffs();
        let vocabularies = Vocabularies::build(&[example.clone()]);
        let mut logits = logits_from(&example, &vocabularies, Strategy::RoleType);
        // Acme (token 1) and Bolt (token 19) share a head link but no tail link.
        logits.head[[0, 1, 19]] = 1.0;
        let events = EventDecoder::new(Strategy::RoleType, &vocabularies)
            .decode(&logits, &example.text, &offsets_of(&example.text), 0.0)
            .unwrap();
        assert_eq!(events.len(), 2);
        logits.tail[[0, 4, 22]] = 1.0;
        let events = EventDecoder::new(Strategy::RoleType, &vocabularies)
            .decode(&logits, &example.text, &offsets_of(&example.text), 0.0)
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].arguments.len(), 6);
    }

    #[test]
    fn test_event_decoder_checks_shapes() {
        let vocabularies = Vocabularies::build(&[layoff_example()]);
        let logits = EventLogits {
            role: Array3::<f32>::zeros((1, MAX_LENGTH, MAX_LENGTH)),
            head: Array3::<f32>::zeros((1, MAX_LENGTH, MAX_LENGTH)),
            tail: Array3::<f32>::zeros((1, MAX_LENGTH, MAX_LENGTH)),
        };
        let offsets = offsets_of("A company laid off 650 people");
        let decoder = EventDecoder::new(Strategy::Combined, &vocabularies);
        assert_eq!(decoder.label_axes(), (2, 1));
        assert!(decoder.decode(&logits, "", &offsets, 0.0).is_err());
    }
}

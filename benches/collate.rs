use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use gplink::{
    encoder_for, CharTokenizer, Collator, Event, Example, Role, Span, Strategy, Trigger,
    Vocabularies,
};
use pprof::criterion::{Output, PProfProfiler};

const MAX_LENGTH: usize = 128;

/// Synthetic corpus: every example holds `n_events` events of three roles each, spread over a
/// text of 120 characters.
fn build_corpus(n_examples: usize, n_events: usize) -> Vec<Example> {
    let text: String = "abcdefghijklmnopqrstuvwxyz0123456789"
        .chars()
        .cycle()
        .take(120)
        .collect();
    (0..n_examples)
        .map(|i| {
            let events = (0..n_events)
                .map(|e| {
                    let base = (i * 7 + e * 23) % 100;
                    let role = |label: &str, start: usize| Role {
                        label: label.to_string(),
                        offset: Span::new(start, start + 3),
                        text: String::new(),
                    };
                    Event {
                        label: format!("Event{}", e % 4),
                        trigger: Trigger {
                            offset: Span::new(base + 10, base + 12),
                            text: String::new(),
                        },
                        roles: vec![
                            role("Agent", base),
                            role("Patient", base + 4),
                            role("Time", base + 14),
                        ],
                    }
                })
                .collect();
            Example {
                text: text.clone(),
                events,
            }
        })
        .collect()
}

fn benchmark_collate(c: &mut Criterion) {
    let corpus = build_corpus(32, 4);
    let vocabularies = Vocabularies::build(&corpus);
    let tokenizer = CharTokenizer::from_texts(corpus.iter().map(|ex| ex.text.as_str()));
    let mut group = c.benchmark_group("collate_32_examples");
    for strategy in Strategy::all() {
        for parallel in [false, true] {
            let collator = Collator::new(
                &tokenizer,
                encoder_for(strategy, &vocabularies, true),
                MAX_LENGTH,
            )
            .parallel(parallel);
            let mode = if parallel { "parallel" } else { "sequential" };
            let id = BenchmarkId::new(strategy.name(), mode);
            group.bench_function(id, |b| b.iter(|| collator.collate(&corpus).unwrap()));
        }
    }
    group.finish();
}

fn benchmark_vocabularies(c: &mut Criterion) {
    let corpus = build_corpus(1000, 4);
    c.bench_function("vocabularies_1000_examples", |b| {
        b.iter(|| Vocabularies::build(&corpus))
    });
}

criterion_group!(
    name=collate_benches;
    config = Criterion::default().sample_size(50).with_profiler(PProfProfiler::new(3000, Output::Flamegraph(None)));
    targets = benchmark_collate,
    benchmark_vocabularies
);
criterion_main!(collate_benches);

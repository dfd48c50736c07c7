//! Integration tests for chain assembly.
//!
//! These tests verify that:
//! - A failed link leaves zero stages allocated
//! - A failed construction leaves zero stages allocated
//! - A successful chain releases every stage, last first
//! - Launch descriptions assemble with the queues they place

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use visionpipe::buffer::Buffer;
use visionpipe::element::{Element, Output};
use visionpipe::error::{Error, Result};
use visionpipe::format::{Caps, PixelFormatTag};
use visionpipe::pipeline::config::StageSpec;
use visionpipe::pipeline::{ChainBuilder, ElementFactory, PipelineState, parse_pipeline};

/// Counts live probe stages and records release order.
#[derive(Clone, Default)]
struct ProbeLedger {
    live: Arc<AtomicUsize>,
    released: Arc<Mutex<Vec<String>>>,
}

impl ProbeLedger {
    fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    fn released(&self) -> Vec<String> {
        self.released.lock().unwrap().clone()
    }
}

struct Probe {
    name: String,
    input: Caps,
    output: Caps,
    ledger: ProbeLedger,
}

impl Probe {
    fn new(name: String, input: Caps, output: Caps, ledger: &ProbeLedger) -> Self {
        ledger.live.fetch_add(1, Ordering::SeqCst);
        Self {
            name,
            input,
            output,
            ledger: ledger.clone(),
        }
    }
}

impl Drop for Probe {
    fn drop(&mut self) {
        self.ledger.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Element for Probe {
    fn process(&mut self, buffer: Buffer) -> Result<Output> {
        Ok(buffer.into())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn input_caps(&self) -> Caps {
        self.input.clone()
    }

    fn output_caps(&self) -> Caps {
        self.output.clone()
    }

    fn release(&mut self) {
        self.ledger.released.lock().unwrap().push(self.name.clone());
    }
}

/// `pass` takes and gives anything, `rgb` emits RGB frames, `gray` only takes
/// GRAY8 frames, `broken` never constructs.
fn probe_factory(ledger: &ProbeLedger) -> ElementFactory {
    let mut factory = ElementFactory::new();
    let kinds = [
        ("pass", Caps::Any, Caps::Any),
        ("rgb", Caps::Any, Caps::raw(&[PixelFormatTag::Rgb])),
        ("gray", Caps::raw(&[PixelFormatTag::Gray8]), Caps::Any),
    ];
    for (kind, input, output) in kinds {
        let ledger = ledger.clone();
        factory.register(kind, move |spec| {
            let name = spec.name.clone().unwrap_or_else(|| kind.to_string());
            Ok(Box::new(Probe::new(name, input.clone(), output.clone(), &ledger)))
        });
    }
    factory.register("broken", |_| Err(Error::Config("refusing to construct".into())));
    factory
}

fn named(kind: &str, index: usize) -> StageSpec {
    StageSpec::new(kind).with_name(format!("s{index}"))
}

#[test]
fn test_link_failure_at_stage_five_leaves_nothing() {
    let ledger = ProbeLedger::default();
    let factory = probe_factory(&ledger);
    let specs = vec![
        named("pass", 1),
        named("pass", 2),
        named("pass", 3),
        named("rgb", 4),
        named("gray", 5),
        named("pass", 6),
        named("pass", 7),
    ];

    let err = ChainBuilder::new(&factory).build("t", &specs).err().unwrap();
    match err {
        Error::AssemblyFailed { stage, .. } => assert_eq!(stage, "s4 -> s5"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(ledger.live(), 0);
    // Every probe released, newest first.
    assert_eq!(
        ledger.released(),
        ["s7", "s6", "s5", "s4", "s3", "s2", "s1"]
    );
}

#[test]
fn test_construction_failure_at_stage_five_leaves_nothing() {
    let ledger = ProbeLedger::default();
    let factory = probe_factory(&ledger);
    let mut specs: Vec<StageSpec> = (1..=4).map(|i| named("pass", i)).collect();
    specs.push(named("broken", 5));
    specs.extend((6..=7).map(|i| named("pass", i)));

    let err = ChainBuilder::new(&factory).build("t", &specs).err().unwrap();
    assert!(matches!(err, Error::AssemblyFailed { ref stage, .. } if stage == "broken"));
    assert_eq!(ledger.live(), 0);
    assert_eq!(ledger.released(), ["s4", "s3", "s2", "s1"]);
}

#[test]
fn test_unknown_stage_fails_assembly() {
    let factory = ElementFactory::new();
    let specs = vec![StageSpec::new("identity"), StageSpec::new("vp8dec")];
    let err = ChainBuilder::new(&factory).build("t", &specs).err().unwrap();
    assert!(matches!(err, Error::AssemblyFailed { ref stage, .. } if stage == "vp8dec"));
}

#[test]
fn test_teardown_releases_in_reverse_order() {
    let ledger = ProbeLedger::default();
    let factory = probe_factory(&ledger);
    let specs: Vec<StageSpec> = (1..=5).map(|i| named("pass", i)).collect();

    let mut chain = ChainBuilder::new(&factory).build("t", &specs).unwrap();
    assert_eq!(ledger.live(), 5);
    chain.start().unwrap();
    assert_eq!(chain.state(), PipelineState::Playing);
    chain.stop().unwrap();
    assert_eq!(chain.state(), PipelineState::TornDown);

    assert_eq!(ledger.live(), 0);
    assert_eq!(ledger.released(), ["s5", "s4", "s3", "s2", "s1"]);

    // Idempotent, and a torn down chain cannot restart.
    chain.stop().unwrap();
    assert!(matches!(chain.start(), Err(Error::InvalidState(_))));
}

#[test]
fn test_drop_tears_down() {
    let ledger = ProbeLedger::default();
    let factory = probe_factory(&ledger);
    let specs = vec![named("pass", 1), named("pass", 2)];
    {
        let mut chain = ChainBuilder::new(&factory).build("t", &specs).unwrap();
        chain.start().unwrap();
    }
    assert_eq!(ledger.live(), 0);
    assert_eq!(ledger.released(), ["s2", "s1"]);
}

#[test]
fn test_assembly_from_description() {
    let ledger = ProbeLedger::default();
    let factory = probe_factory(&ledger);
    let specs = parse_pipeline(
        "appsrc is-live=true ! pass name=a ! queue max-size-bytes=4096 ! rgb name=b \
         ! queue ! visiongrayscale ! appsink sync=false drop=true",
    )
    .unwrap();

    let chain = ChainBuilder::new(&factory).build("t", &specs).unwrap();
    assert_eq!(
        chain.stage_names(),
        ["a", "b", "visiongrayscale", "appsink"]
    );
    let queues: Vec<String> = chain.queue_stats().into_iter().map(|(name, _)| name).collect();
    // A description places queues only where it names them.
    assert_eq!(queues, ["t:b-queue", "t:visiongrayscale-queue"]);
    assert_eq!(chain.segment_count(), 3);
    drop(chain);
    assert_eq!(ledger.live(), 0);
}

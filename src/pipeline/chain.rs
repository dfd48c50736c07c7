//! A running chain: worker threads, lifecycle and ordered teardown.
//!
//! The assembler splits the stage list at every queue. Each piece (a
//! *segment*) gets one worker thread that pops from the queue in front of it,
//! runs its stages in order, and pushes into the queue behind it. Segment 0
//! reads from the ingress queue; the last segment ends in the sink.

use crate::buffer::Buffer;
use crate::element::Element;
use crate::elements::app::FlushSignal;
use crate::elements::{AppSrc, Queue, QueueStats, SampleReceiver};
use crate::error::{Error, Result};
use crate::observability::{
    StageMetrics, record_chain_error, record_queue_bytes, span_segment, trace_state_change,
};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

/// Lifecycle of a [`PipelineChain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Assembled and linked; no worker running.
    Created,
    /// Workers running.
    Playing,
    /// Every stage released. Terminal.
    TornDown,
}

impl PipelineState {
    fn as_str(self) -> &'static str {
        match self {
            Self::Created => "Created",
            Self::Playing => "Playing",
            Self::TornDown => "TornDown",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// First fatal error raised by a worker.
type Failure = Arc<Mutex<Option<Error>>>;

/// Stages between two queues, run by one worker thread.
pub(crate) struct Segment {
    index: usize,
    input: Queue,
    output: Option<Queue>,
    elements: Vec<Box<dyn Element>>,
    metrics: Vec<StageMetrics>,
}

impl Segment {
    pub(crate) fn new(index: usize, input: Queue) -> Self {
        Self {
            index,
            input,
            output: None,
            elements: Vec::new(),
            metrics: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, track: &str, element: Box<dyn Element>) {
        self.metrics.push(StageMetrics::new(track, element.name()));
        self.elements.push(element);
    }

    pub(crate) fn set_output(&mut self, queue: Queue) {
        self.output = Some(queue);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Run `buffer` through the stages from `first` on.
    fn run_from(&mut self, track: &str, first: usize, buffer: Buffer) -> Result<()> {
        let Some(element) = self.elements.get_mut(first) else {
            return match &self.output {
                Some(queue) => {
                    queue.push(buffer)?;
                    record_queue_bytes(track, queue.name(), queue.current_bytes());
                    Ok(())
                }
                None => Ok(()),
            };
        };
        let output = {
            let _timer = self.metrics[first].start_timer();
            element.process(buffer)?
        };
        for buffer in output {
            self.run_from(track, first + 1, buffer)?;
        }
        Ok(())
    }

    /// Flush what each stage still holds, front to back.
    fn drain(&mut self, track: &str) -> Result<()> {
        for i in 0..self.elements.len() {
            let output = self.elements[i].end_of_stream()?;
            for buffer in output {
                self.run_from(track, i + 1, buffer)?;
            }
        }
        if let Some(queue) = &self.output {
            queue.end_of_stream();
        }
        Ok(())
    }

    fn shutting_down(&self, egress: &FlushSignal) -> bool {
        self.input.is_flushing()
            || self.output.as_ref().is_some_and(Queue::is_flushing)
            || egress.is_flushing()
    }
}

/// Everything a worker needs besides its segment.
#[derive(Clone)]
struct WorkerContext {
    track: Arc<str>,
    source: AppSrc,
    queues: Vec<Queue>,
    egress: FlushSignal,
    failure: Failure,
}

impl WorkerContext {
    /// Store a fatal error and flush every queue so all workers wind down.
    fn fail(&self, error: Error) {
        tracing::error!(track = %self.track, error = %error, "fatal chain error");
        record_chain_error(&self.track);
        self.failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_or_insert(error);
        self.source.set_flushing(true);
        for queue in &self.queues {
            queue.set_flushing(true);
        }
        self.egress.set_flushing(true);
    }
}

fn run_segment(ctx: WorkerContext, mut segment: Segment) -> Segment {
    let span = span_segment(&ctx.track, segment.index);
    let _guard = span.enter();
    tracing::debug!(stages = segment.elements.len(), "worker started");

    loop {
        let Some(buffer) = segment.input.pop() else {
            if segment.input.is_flushing() {
                tracing::debug!("input flushing, worker exiting");
            } else {
                tracing::debug!("end of stream");
                if let Err(e) = segment.drain(&ctx.track) {
                    if !segment.shutting_down(&ctx.egress) {
                        ctx.fail(e);
                    }
                }
            }
            break;
        };

        if let Err(e) = segment.run_from(&ctx.track, 0, buffer) {
            if segment.shutting_down(&ctx.egress) {
                break;
            }
            if e.is_fatal() {
                ctx.fail(e);
                break;
            }
            tracing::warn!(error = %e, "buffer dropped");
            record_chain_error(&ctx.track);
        }
    }
    segment
}

/// One assembled chain for one track.
///
/// Built by [`ChainBuilder`](super::ChainBuilder). Dropping the chain stops it.
///
/// # Example
///
/// ```rust,ignore
/// let mut chain = ChainBuilder::new(&factory).build("track-1", &config.stages())?;
/// let samples = chain.take_receiver().unwrap();
/// chain.start()?;
/// chain.ingress().inject(packet)?;
/// chain.stop()?;
/// ```
pub struct PipelineChain {
    track: Arc<str>,
    state: PipelineState,
    source: AppSrc,
    receiver: Option<SampleReceiver>,
    queues: Vec<Queue>,
    egress: FlushSignal,
    stage_names: Vec<String>,
    segments: Vec<Segment>,
    workers: Vec<JoinHandle<Segment>>,
    failure: Failure,
}

impl PipelineChain {
    pub(crate) fn new(
        track: Arc<str>,
        source: AppSrc,
        receiver: SampleReceiver,
        egress: FlushSignal,
        queues: Vec<Queue>,
        segments: Vec<Segment>,
    ) -> Self {
        let stage_names = segments
            .iter()
            .flat_map(|s| s.elements.iter().map(|e| e.name().to_string()))
            .collect();
        Self {
            track,
            state: PipelineState::Created,
            source,
            receiver: Some(receiver),
            queues,
            egress,
            stage_names,
            segments,
            workers: Vec::new(),
            failure: Arc::new(Mutex::new(None)),
        }
    }

    /// Track this chain serves.
    pub fn track_id(&self) -> &str {
        &self.track
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Handle for injecting encoded buffers. Clone it freely.
    pub fn ingress(&self) -> AppSrc {
        self.source.clone()
    }

    /// Take the egress receiver. Returns `None` after the first call.
    pub fn take_receiver(&mut self) -> Option<SampleReceiver> {
        self.receiver.take()
    }

    /// Number of worker segments.
    pub fn segment_count(&self) -> usize {
        self.segments.len() + self.workers.len()
    }

    /// Statistics of every inter-segment queue, upstream first.
    pub fn queue_stats(&self) -> Vec<(String, QueueStats)> {
        self.queues
            .iter()
            .map(|q| (q.name().to_string(), q.stats()))
            .collect()
    }

    /// Names of all stages, in construction order.
    pub fn stage_names(&self) -> &[String] {
        &self.stage_names
    }

    /// Whether a worker hit a fatal error.
    pub fn has_failed(&self) -> bool {
        self.failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn transition(&mut self, to: PipelineState) {
        trace_state_change(&self.track, self.state.as_str(), to.as_str());
        self.state = to;
    }

    /// Start every stage and spawn one worker per segment.
    pub fn start(&mut self) -> Result<()> {
        if self.state != PipelineState::Created {
            return Err(Error::InvalidState(format!(
                "cannot start a chain that is {}",
                self.state
            )));
        }

        for element in self.segments.iter_mut().flat_map(|s| s.elements.iter_mut()) {
            element.start()?;
        }

        let ctx = WorkerContext {
            track: Arc::clone(&self.track),
            source: self.source.clone(),
            queues: self.queues.clone(),
            egress: self.egress.clone(),
            failure: Arc::clone(&self.failure),
        };
        let mut spawn_error = None;
        for segment in std::mem::take(&mut self.segments) {
            if spawn_error.is_some() {
                // Kept so stop() releases them in order.
                self.segments.push(segment);
                continue;
            }
            let worker_ctx = ctx.clone();
            let spawned = thread::Builder::new()
                .name(format!("{}-seg{}", self.track, segment.index))
                .spawn(move || run_segment(worker_ctx, segment));
            match spawned {
                Ok(handle) => self.workers.push(handle),
                Err(e) => spawn_error = Some(e),
            }
        }
        if let Some(e) = spawn_error {
            self.transition(PipelineState::Playing);
            ctx.fail(Error::Io(e));
            return self.stop();
        }

        self.transition(PipelineState::Playing);
        tracing::info!(track = %self.track, workers = self.workers.len(), "chain started");
        Ok(())
    }

    /// Signal end-of-stream and wait for it to reach the sink, then tear down.
    ///
    /// Everything injected before the call is processed first.
    pub fn drain(&mut self) -> Result<()> {
        self.source.end_of_stream();
        self.join_workers();
        self.stop()
    }

    fn join_workers(&mut self) {
        for worker in self.workers.drain(..) {
            match worker.join() {
                Ok(segment) => self.segments.push(segment),
                Err(_) => {
                    let error = Error::Element("worker thread panicked".into());
                    tracing::error!(track = %self.track, "worker thread panicked");
                    self.failure
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .get_or_insert(error);
                }
            }
        }
        self.segments.sort_by_key(|s| s.index);
    }

    /// Tear the chain down.
    ///
    /// New buffers stop entering the stages first, and a sink parked on a
    /// lagging consumer or on `sync` pacing gives up its wait. Every worker
    /// is joined (so a frame in flight finishes), and only then are stages released,
    /// in strict reverse construction order. Returns the first fatal worker
    /// error, if any. Calling it again is a no-op.
    pub fn stop(&mut self) -> Result<()> {
        if self.state == PipelineState::TornDown {
            return Ok(());
        }

        self.source.set_flushing(true);
        for queue in &self.queues {
            queue.set_flushing(true);
        }
        self.egress.set_flushing(true);
        self.join_workers();

        for segment in self.segments.iter_mut().rev() {
            for element in segment.elements.iter_mut().rev() {
                element.release();
                tracing::debug!(track = %self.track, stage = %element.name(), "stage released");
            }
        }
        while let Some(mut segment) = self.segments.pop() {
            while let Some(element) = segment.elements.pop() {
                drop(element);
            }
        }
        self.transition(PipelineState::TornDown);

        match self
            .failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl Drop for PipelineChain {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!(track = %self.track, error = %e, "chain failed before drop");
        }
    }
}

impl fmt::Debug for PipelineChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineChain")
            .field("track", &self.track)
            .field("state", &self.state)
            .field("segments", &self.segment_count())
            .finish()
    }
}

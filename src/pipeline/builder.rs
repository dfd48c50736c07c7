//! Chain assembly.
//!
//! [`ChainBuilder`] turns an ordered stage list into a linked
//! [`PipelineChain`]:
//!
//! 1. the `appsrc` and `appsink` endpoints are built from their specs (or
//!    defaults when the list omits them);
//! 2. every other stage is created through the [`ElementFactory`];
//! 3. each adjacent pair is linked by intersecting caps;
//! 4. the list is split into worker segments at every queue.
//!
//! Assembly is all-or-nothing. If any stage fails to instantiate or any pair
//! fails to link, every stage created so far is released (last first) and
//! dropped before [`Error::AssemblyFailed`] is returned.

use super::chain::{PipelineChain, Segment};
use super::config::{QueueConfig, QueuePlacement, SinkConfig, SourceConfig, StageConfig, StageSpec};
use super::factory::ElementFactory;
use crate::element::Element;
use crate::elements::{AppSink, AppSrc, Queue};
use crate::error::{Error, Result};
use crate::format::Caps;
use std::sync::Arc;

/// A created stage and the queue (if any) that will feed it.
struct Planned {
    element: Box<dyn Element>,
    queue: Option<QueueConfig>,
}

/// Stages created during one assembly attempt.
///
/// Dropping it releases whatever it still holds, in reverse creation order.
#[derive(Default)]
struct Assembly {
    stages: Vec<Planned>,
}

impl Assembly {
    fn push(&mut self, element: Box<dyn Element>, queue: Option<QueueConfig>) {
        self.stages.push(Planned { element, queue });
    }

    /// Link every adjacent pair, starting from the source caps.
    fn link(&mut self, source_caps: Caps) -> Result<()> {
        let mut upstream_caps = source_caps;
        let mut upstream_name = "appsrc".to_string();
        for i in 0..self.stages.len() {
            let (done, rest) = self.stages.split_at_mut(i);
            let next = &mut rest[0].element;
            let link = format!("{upstream_name} -> {}", next.name());

            let caps = upstream_caps
                .intersect(&next.input_caps())
                .ok_or_else(|| Error::assembly(&link, "no common caps"))?;
            if let Some(prev) = done.last_mut() {
                prev.element
                    .link_downstream(&caps)
                    .map_err(|e| Error::assembly(&link, e))?;
            }
            next.link_upstream(&caps)
                .map_err(|e| Error::assembly(&link, e))?;
            tracing::debug!(link = %link, "linked");

            upstream_caps = next.output_caps();
            upstream_name = next.name().to_string();
        }
        Ok(())
    }
}

impl Drop for Assembly {
    fn drop(&mut self) {
        for planned in self.stages.iter_mut().rev() {
            planned.element.release();
        }
        while let Some(planned) = self.stages.pop() {
            drop(planned);
        }
    }
}

/// Assembles [`PipelineChain`]s from stage lists.
///
/// # Example
///
/// ```rust
/// use visionpipe::pipeline::config::StageSpec;
/// use visionpipe::pipeline::{ChainBuilder, ElementFactory, PipelineState};
///
/// let factory = ElementFactory::new();
/// let specs = vec![
///     StageSpec::new("appsrc"),
///     StageSpec::new("identity"),
///     StageSpec::new("appsink"),
/// ];
/// let chain = ChainBuilder::new(&factory).build("track-1", &specs).unwrap();
/// assert_eq!(chain.state(), PipelineState::Created);
/// assert_eq!(chain.stage_names(), ["identity", "appsink"]);
/// ```
#[derive(Debug)]
pub struct ChainBuilder<'a> {
    factory: &'a ElementFactory,
    default_queue: QueueConfig,
}

impl<'a> ChainBuilder<'a> {
    /// Builder creating stages through `factory`.
    pub fn new(factory: &'a ElementFactory) -> Self {
        Self {
            factory,
            default_queue: QueueConfig::default(),
        }
    }

    /// Queue inserted in front of compute stages whose spec does not say otherwise.
    pub fn default_queue(mut self, config: QueueConfig) -> Self {
        self.default_queue = config;
        self
    }

    fn placement(&self, placement: QueuePlacement, element: &dyn Element) -> Option<QueueConfig> {
        match placement {
            QueuePlacement::Custom(config) => Some(config),
            QueuePlacement::Default => element.is_compute().then_some(self.default_queue),
            QueuePlacement::None => None,
        }
    }

    /// Assemble the chain for `track_id` from `specs`.
    pub fn build(&self, track_id: impl Into<Arc<str>>, specs: &[StageSpec]) -> Result<PipelineChain> {
        let track: Arc<str> = track_id.into();

        let (source_config, rest) = match specs.split_first() {
            Some((first, rest)) if first.factory == SourceConfig::FACTORY => (
                SourceConfig::from_properties(&first.properties)
                    .map_err(|e| Error::assembly(SourceConfig::FACTORY, e))?,
                rest,
            ),
            _ => (SourceConfig::default(), specs),
        };
        let (sink_spec, middle) = match rest.split_last() {
            Some((last, middle)) if last.factory == SinkConfig::FACTORY => (Some(last), middle),
            _ => (None, rest),
        };
        let sink_config = match sink_spec {
            Some(spec) => SinkConfig::from_properties(&spec.properties)
                .map_err(|e| Error::assembly(SinkConfig::FACTORY, e))?,
            None => SinkConfig::default(),
        };

        let mut assembly = Assembly::default();
        for spec in middle {
            let element = self.factory.create(spec)?;
            let queue = self.placement(spec.queue, element.as_ref());
            assembly.push(element, queue);
        }

        let (sink, receiver) = AppSink::new(Arc::clone(&track), sink_config);
        let sink = match sink_spec.and_then(|s| s.name.clone()) {
            Some(name) => sink.with_name(name),
            None => sink,
        };
        let egress = sink.flush_signal();
        let sink_placement = sink_spec.map_or(QueuePlacement::Default, |s| s.queue);
        let queue = self.placement(sink_placement, &sink);
        assembly.push(Box::new(sink), queue);

        let source = AppSrc::new(Arc::clone(&track), source_config);
        assembly.link(source.caps())?;

        let stages = std::mem::take(&mut assembly.stages);
        let mut queues = Vec::new();
        let mut segments = vec![Segment::new(0, source.queue().clone())];
        for planned in stages {
            if let Some(config) = planned.queue {
                let queue = Queue::new(config)
                    .with_name(format!("{track}:{}-queue", planned.element.name()));
                if let Some(current) = segments.last_mut() {
                    current.set_output(queue.clone());
                }
                queues.push(queue.clone());
                segments.push(Segment::new(segments.len(), queue));
            }
            if let Some(current) = segments.last_mut() {
                current.push(&track, planned.element);
            }
        }

        tracing::info!(
            track = %track,
            stages = specs.len(),
            segments = segments.len(),
            relay_segments = segments.iter().filter(|s| s.is_empty()).count(),
            "chain assembled"
        );
        Ok(PipelineChain::new(track, source, receiver, egress, queues, segments))
    }
}

/// Assemble the chain for `track_id` with the default queue policy.
pub fn build(
    track_id: impl Into<Arc<str>>,
    specs: &[StageSpec],
    factory: &ElementFactory,
) -> Result<PipelineChain> {
    ChainBuilder::new(factory).build(track_id, specs)
}

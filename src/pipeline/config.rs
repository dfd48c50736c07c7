//! Typed stage configuration.
//!
//! Every stage is configured through a [`Properties`] list, the same
//! `key=value` pairs a launch description carries. The typed structs below
//! hold the reference values and convert to and from those lists, so options
//! for external stages are forwarded verbatim.

use crate::elements::LeakyMode;
use crate::error::{Error, Result};
use crate::format::RtpCaps;
use crate::pipeline::parser::PropertyValue;
use std::fmt;
use std::time::Duration;

/// 80 MiB, the byte ceiling of every queue in the reference chain.
pub const DEFAULT_QUEUE_MAX_BYTES: usize = 10_485_760 * 8;

/// Ordered `key=value` list for one stage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Properties(Vec<(String, PropertyValue)>);

impl Properties {
    /// Empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `key=value`, replacing an earlier entry for the same key.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.set(key, value);
        self
    }

    /// Set `key=value`, replacing an earlier entry for the same key.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some((_, v)) => *v = value,
            None => self.0.push((key, value)),
        }
    }

    /// Raw value of `key`.
    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Remove and return `key`.
    pub fn take(&mut self, key: &str) -> Option<PropertyValue> {
        let pos = self.0.iter().position(|(k, _)| k == key)?;
        Some(self.0.remove(pos).1)
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Fail on any key not in `known`.
    pub fn check_known(&self, stage: &str, known: &[&str]) -> Result<()> {
        match self.0.iter().find(|(k, _)| !known.contains(&k.as_str())) {
            Some((k, _)) => Err(Error::Config(format!("{stage}: unknown property '{k}'"))),
            None => Ok(()),
        }
    }

    fn typed<T>(
        &self,
        key: &str,
        what: &str,
        conv: impl FnOnce(&PropertyValue) -> Option<T>,
    ) -> Result<Option<T>> {
        match self.get(key) {
            None => Ok(None),
            Some(v) => conv(v)
                .map(Some)
                .ok_or_else(|| Error::Config(format!("property '{key}' expects {what}, got {v}"))),
        }
    }

    /// `key` as a signed integer.
    pub fn get_i64(&self, key: &str) -> Result<Option<i64>> {
        self.typed(key, "an integer", PropertyValue::as_i64)
    }

    /// `key` as an unsigned integer.
    pub fn get_u64(&self, key: &str) -> Result<Option<u64>> {
        self.typed(key, "a non-negative integer", PropertyValue::as_u64)
    }

    /// `key` as a `u32`.
    pub fn get_u32(&self, key: &str) -> Result<Option<u32>> {
        self.typed(key, "a 32-bit unsigned integer", |v| {
            v.as_u64().and_then(|n| u32::try_from(n).ok())
        })
    }

    /// `key` as a `usize`.
    pub fn get_usize(&self, key: &str) -> Result<Option<usize>> {
        self.typed(key, "a size", |v| {
            v.as_u64().and_then(|n| usize::try_from(n).ok())
        })
    }

    /// `key` as a boolean.
    pub fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        self.typed(key, "a boolean", PropertyValue::as_bool)
    }

    /// `key` as text.
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get(key).map(PropertyValue::as_string)
    }
}

impl From<Vec<(String, PropertyValue)>> for Properties {
    fn from(v: Vec<(String, PropertyValue)>) -> Self {
        let mut props = Self::new();
        for (k, val) in v {
            props.set(k, val);
        }
        props
    }
}

impl fmt::Display for Properties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{k}={v}")?;
        }
        Ok(())
    }
}

/// A typed configuration for one kind of stage.
pub trait StageConfig: Default + Sized {
    /// Factory name of the stage this configures.
    const FACTORY: &'static str;

    /// Property keys this config understands.
    const KEYS: &'static [&'static str];

    /// Property list to hand to the stage.
    fn to_properties(&self) -> Properties;

    /// Apply `props` on top of the defaults.
    fn from_properties(props: &Properties) -> Result<Self>;

    /// A stage spec for this config.
    fn to_spec(&self) -> StageSpec {
        StageSpec::new(Self::FACTORY).with_properties(self.to_properties())
    }
}

// ============================================================================
// Queue
// ============================================================================

/// Configuration for a [`Queue`](crate::elements::Queue).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    /// Byte ceiling. Never exceeded.
    pub max_bytes: usize,
    /// Buffer-count ceiling.
    pub max_buffers: usize,
    /// Behavior when full.
    pub leaky: LeakyMode,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_QUEUE_MAX_BYTES,
            max_buffers: 200,
            leaky: LeakyMode::None,
        }
    }
}

impl QueueConfig {
    /// Set the byte ceiling.
    pub fn max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Set the buffer-count ceiling.
    pub fn max_buffers(mut self, max_buffers: usize) -> Self {
        self.max_buffers = max_buffers;
        self
    }

    /// Set the leaky mode.
    pub fn leaky(mut self, leaky: LeakyMode) -> Self {
        self.leaky = leaky;
        self
    }
}

fn leaky_from(value: &PropertyValue) -> Option<LeakyMode> {
    match value.as_i64() {
        Some(0) => return Some(LeakyMode::None),
        Some(1) => return Some(LeakyMode::Upstream),
        Some(2) => return Some(LeakyMode::Downstream),
        Some(_) => return None,
        None => {}
    }
    match value.as_string().as_str() {
        "no" | "none" | "false" => Some(LeakyMode::None),
        "upstream" => Some(LeakyMode::Upstream),
        "downstream" => Some(LeakyMode::Downstream),
        _ => None,
    }
}

impl StageConfig for QueueConfig {
    const FACTORY: &'static str = "queue";
    const KEYS: &'static [&'static str] = &["max-size-bytes", "max-size-buffers", "leaky"];

    fn to_properties(&self) -> Properties {
        let leaky = match self.leaky {
            LeakyMode::None => 0,
            LeakyMode::Upstream => 1,
            LeakyMode::Downstream => 2,
        };
        Properties::new()
            .with("max-size-bytes", self.max_bytes)
            .with("max-size-buffers", self.max_buffers)
            .with("leaky", leaky)
    }

    fn from_properties(props: &Properties) -> Result<Self> {
        props.check_known(Self::FACTORY, Self::KEYS)?;
        let mut config = Self::default();
        if let Some(v) = props.get_usize("max-size-bytes")? {
            if v == 0 {
                return Err(Error::Config("queue: max-size-bytes must be positive".into()));
            }
            config.max_bytes = v;
        }
        if let Some(v) = props.get_usize("max-size-buffers")? {
            config.max_buffers = v;
        }
        if let Some(v) = props.typed("leaky", "no, upstream or downstream", leaky_from)? {
            config.leaky = v;
        }
        Ok(config)
    }
}

// ============================================================================
// Source
// ============================================================================

/// Configuration for the ingress [`AppSrc`](crate::elements::AppSrc).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    /// Caps stamped on injected buffers.
    pub caps: RtpCaps,
    /// Live source.
    pub is_live: bool,
    /// Stamp buffers with running time on injection.
    pub do_timestamp: bool,
    /// Duration attached to every injected chunk.
    pub chunk_duration: Duration,
    /// Byte ceiling of the ingress queue.
    pub max_bytes: usize,
    /// Buffer-count ceiling of the ingress queue.
    pub max_buffers: usize,
    /// Longest an injecting thread waits for space; `None` waits forever.
    pub block_timeout: Option<Duration>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            caps: RtpCaps::vp8(),
            is_live: true,
            do_timestamp: true,
            chunk_duration: Duration::from_millis(1),
            max_bytes: 200_000,
            max_buffers: 1024,
            block_timeout: Some(Duration::from_millis(100)),
        }
    }
}

impl StageConfig for SourceConfig {
    const FACTORY: &'static str = "appsrc";
    const KEYS: &'static [&'static str] = &[
        "payload",
        "clock-rate",
        "encoding-name",
        "is-live",
        "do-timestamp",
        "chunk-duration-us",
        "max-bytes",
        "max-buffers",
        "block-timeout-ms",
    ];

    fn to_properties(&self) -> Properties {
        let mut props = Properties::new()
            .with("payload", self.caps.payload)
            .with("clock-rate", self.caps.clock_rate)
            .with("encoding-name", self.caps.encoding_name.as_str())
            .with("is-live", self.is_live)
            .with("do-timestamp", self.do_timestamp)
            .with("chunk-duration-us", self.chunk_duration.as_micros() as u64)
            .with("max-bytes", self.max_bytes)
            .with("max-buffers", self.max_buffers);
        if let Some(t) = self.block_timeout {
            props.set("block-timeout-ms", t.as_millis() as u64);
        }
        props
    }

    fn from_properties(props: &Properties) -> Result<Self> {
        props.check_known(Self::FACTORY, Self::KEYS)?;
        let mut config = Self::default();
        if let Some(v) = props.typed("payload", "an RTP payload type", |v| {
            v.as_u64().and_then(|n| u8::try_from(n).ok())
        })? {
            config.caps.payload = v;
        }
        if let Some(v) = props.get_u32("clock-rate")? {
            config.caps.clock_rate = v;
        }
        if let Some(v) = props.get_string("encoding-name") {
            config.caps.encoding_name = v;
        }
        if let Some(v) = props.get_bool("is-live")? {
            config.is_live = v;
        }
        if let Some(v) = props.get_bool("do-timestamp")? {
            config.do_timestamp = v;
        }
        if let Some(v) = props.get_u64("chunk-duration-us")? {
            config.chunk_duration = Duration::from_micros(v);
        }
        if let Some(v) = props.get_usize("max-bytes")? {
            config.max_bytes = v;
        }
        if let Some(v) = props.get_usize("max-buffers")? {
            config.max_buffers = v;
        }
        if let Some(v) = props.get_u64("block-timeout-ms")? {
            config.block_timeout = Some(Duration::from_millis(v));
        }
        Ok(config)
    }
}

// ============================================================================
// External stages
// ============================================================================

/// Configuration forwarded to the RTP jitter buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JitterBufferConfig {
    /// Timestamp mode; 0 disables clock slaving.
    pub mode: i64,
}

impl StageConfig for JitterBufferConfig {
    const FACTORY: &'static str = "rtpjitterbuffer";
    const KEYS: &'static [&'static str] = &["mode"];

    fn to_properties(&self) -> Properties {
        Properties::new().with("mode", self.mode)
    }

    fn from_properties(props: &Properties) -> Result<Self> {
        props.check_known(Self::FACTORY, Self::KEYS)?;
        Ok(Self {
            mode: props.get_i64("mode")?.unwrap_or_default(),
        })
    }
}

/// Configuration forwarded to the VP8 depayloader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepayConfig {
    /// Negotiate RTP header extensions automatically.
    pub auto_header_extension: bool,
}

impl Default for DepayConfig {
    fn default() -> Self {
        Self {
            auto_header_extension: true,
        }
    }
}

impl StageConfig for DepayConfig {
    const FACTORY: &'static str = "rtpvp8depay";
    const KEYS: &'static [&'static str] = &["auto-header-extension"];

    fn to_properties(&self) -> Properties {
        Properties::new().with("auto-header-extension", self.auto_header_extension)
    }

    fn from_properties(props: &Properties) -> Result<Self> {
        props.check_known(Self::FACTORY, Self::KEYS)?;
        Ok(Self {
            auto_header_extension: props.get_bool("auto-header-extension")?.unwrap_or(true),
        })
    }
}

/// Configuration forwarded to the VP8 decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderConfig {
    /// Decode threads.
    pub threads: u32,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self { threads: 16 }
    }
}

impl StageConfig for DecoderConfig {
    const FACTORY: &'static str = "vp8dec";
    const KEYS: &'static [&'static str] = &["threads"];

    fn to_properties(&self) -> Properties {
        Properties::new().with("threads", self.threads)
    }

    fn from_properties(props: &Properties) -> Result<Self> {
        props.check_known(Self::FACTORY, Self::KEYS)?;
        Ok(Self {
            threads: props.get_u32("threads")?.unwrap_or(16),
        })
    }
}

/// Rate-control and resilience knobs forwarded to the VP8 encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderConfig {
    /// Lowest quantizer.
    pub min_quantizer: u32,
    /// Highest quantizer.
    pub max_quantizer: u32,
    /// Most frames between keyframes.
    pub keyframe_max_dist: u32,
    /// Encode threads.
    pub threads: u32,
    /// Undershoot percentage.
    pub undershoot: u32,
    /// Overshoot percentage.
    pub overshoot: u32,
    /// Client buffer size (ms).
    pub buffer_size: u32,
    /// Initial client buffer level (ms).
    pub buffer_initial_size: u32,
    /// Optimal client buffer level (ms).
    pub buffer_optimal_size: u32,
    /// Error resilience flags.
    pub error_resilient: u32,
    /// Encode deadline (µs, 1 = realtime).
    pub deadline: i64,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            min_quantizer: 2,
            max_quantizer: 56,
            keyframe_max_dist: 10,
            threads: 16,
            undershoot: 100,
            overshoot: 10,
            buffer_size: 1000,
            buffer_initial_size: 5000,
            buffer_optimal_size: 600,
            error_resilient: 1,
            deadline: 1,
        }
    }
}

impl StageConfig for EncoderConfig {
    const FACTORY: &'static str = "vp8enc";
    const KEYS: &'static [&'static str] = &[
        "min-quantizer",
        "max-quantizer",
        "keyframe-max-dist",
        "threads",
        "undershoot",
        "overshoot",
        "buffer-size",
        "buffer-initial-size",
        "buffer-optimal-size",
        "error-resilient",
        "deadline",
    ];

    fn to_properties(&self) -> Properties {
        Properties::new()
            .with("min-quantizer", self.min_quantizer)
            .with("max-quantizer", self.max_quantizer)
            .with("keyframe-max-dist", self.keyframe_max_dist)
            .with("threads", self.threads)
            .with("undershoot", self.undershoot)
            .with("overshoot", self.overshoot)
            .with("buffer-size", self.buffer_size)
            .with("buffer-initial-size", self.buffer_initial_size)
            .with("buffer-optimal-size", self.buffer_optimal_size)
            .with("error-resilient", self.error_resilient)
            .with("deadline", self.deadline)
    }

    fn from_properties(props: &Properties) -> Result<Self> {
        props.check_known(Self::FACTORY, Self::KEYS)?;
        let d = Self::default();
        let config = Self {
            min_quantizer: props.get_u32("min-quantizer")?.unwrap_or(d.min_quantizer),
            max_quantizer: props.get_u32("max-quantizer")?.unwrap_or(d.max_quantizer),
            keyframe_max_dist: props
                .get_u32("keyframe-max-dist")?
                .unwrap_or(d.keyframe_max_dist),
            threads: props.get_u32("threads")?.unwrap_or(d.threads),
            undershoot: props.get_u32("undershoot")?.unwrap_or(d.undershoot),
            overshoot: props.get_u32("overshoot")?.unwrap_or(d.overshoot),
            buffer_size: props.get_u32("buffer-size")?.unwrap_or(d.buffer_size),
            buffer_initial_size: props
                .get_u32("buffer-initial-size")?
                .unwrap_or(d.buffer_initial_size),
            buffer_optimal_size: props
                .get_u32("buffer-optimal-size")?
                .unwrap_or(d.buffer_optimal_size),
            error_resilient: props.get_u32("error-resilient")?.unwrap_or(d.error_resilient),
            deadline: props.get_i64("deadline")?.unwrap_or(d.deadline),
        };
        if config.min_quantizer > config.max_quantizer {
            return Err(Error::Config(format!(
                "vp8enc: min-quantizer {} above max-quantizer {}",
                config.min_quantizer, config.max_quantizer
            )));
        }
        Ok(config)
    }
}

// ============================================================================
// Sink
// ============================================================================

/// Configuration for the egress [`AppSink`](crate::elements::AppSink).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkConfig {
    /// Pace samples to their timestamps.
    pub sync: bool,
    /// Drop samples instead of blocking when the consumer lags.
    pub drop: bool,
    /// Capacity of the egress channel.
    pub max_buffers: usize,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            sync: false,
            drop: true,
            max_buffers: 64,
        }
    }
}

impl StageConfig for SinkConfig {
    const FACTORY: &'static str = "appsink";
    const KEYS: &'static [&'static str] = &["sync", "drop", "max-buffers"];

    fn to_properties(&self) -> Properties {
        Properties::new()
            .with("sync", self.sync)
            .with("drop", self.drop)
            .with("max-buffers", self.max_buffers)
    }

    fn from_properties(props: &Properties) -> Result<Self> {
        props.check_known(Self::FACTORY, Self::KEYS)?;
        let d = Self::default();
        Ok(Self {
            sync: props.get_bool("sync")?.unwrap_or(d.sync),
            drop: props.get_bool("drop")?.unwrap_or(d.drop),
            max_buffers: props.get_usize("max-buffers")?.unwrap_or(d.max_buffers),
        })
    }
}

// ============================================================================
// Stage specs
// ============================================================================

/// Which queue, if any, feeds a stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QueuePlacement {
    /// A default queue in front of compute stages only.
    #[default]
    Default,
    /// Always this queue.
    Custom(QueueConfig),
    /// Never a queue.
    None,
}

/// One entry of a chain description.
#[derive(Debug, Clone, PartialEq)]
pub struct StageSpec {
    /// Factory name (e.g. "vp8dec").
    pub factory: String,
    /// Instance name; defaults to the factory name plus its position.
    pub name: Option<String>,
    /// Properties forwarded to the stage.
    pub properties: Properties,
    /// Queue feeding this stage.
    pub queue: QueuePlacement,
}

impl StageSpec {
    /// Spec for `factory` with no properties.
    pub fn new(factory: impl Into<String>) -> Self {
        Self {
            factory: factory.into(),
            name: None,
            properties: Properties::new(),
            queue: QueuePlacement::Default,
        }
    }

    /// Set the instance name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Replace the properties.
    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    /// Add one property.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.set(key, value);
        self
    }

    /// Feed this stage through a queue configured with `config`.
    pub fn with_queue(mut self, config: QueueConfig) -> Self {
        self.queue = QueuePlacement::Custom(config);
        self
    }

    /// Never put a queue in front of this stage.
    pub fn without_queue(mut self) -> Self {
        self.queue = QueuePlacement::None;
        self
    }
}

impl fmt::Display for StageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let QueuePlacement::Custom(q) = &self.queue {
            write!(f, "queue {} ! ", q.to_properties())?;
        }
        f.write_str(&self.factory)?;
        if let Some(name) = &self.name {
            write!(f, " name={name}")?;
        }
        if !self.properties.is_empty() {
            write!(f, " {}", self.properties)?;
        }
        Ok(())
    }
}

/// Render `specs` as a launch description that parses back to the same list.
pub fn describe(specs: &[StageSpec]) -> String {
    specs
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ! ")
}

// ============================================================================
// Whole chain
// ============================================================================

/// Configuration of the full reference chain for one track.
///
/// ```text
/// appsrc ! rtpjitterbuffer ! identity ! rtpvp8depay ! vp8dec ! videoconvert
///        ! <filter> ! videoconvert ! vp8enc ! appsink
/// ```
///
/// with an 80 MiB queue in front of the jitter buffer, depayloader, decoder,
/// input convert, filter and encoder. `identity`, the output convert and the
/// sink share the worker of the stage before them.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Ingress.
    pub source: SourceConfig,
    /// Queue placed in front of each queued stage.
    pub queue: QueueConfig,
    /// Jitter buffer.
    pub jitter_buffer: JitterBufferConfig,
    /// Depayloader.
    pub depay: DepayConfig,
    /// Decoder.
    pub decoder: DecoderConfig,
    /// Factory name of the per-frame filter.
    pub filter: String,
    /// Encoder.
    pub encoder: EncoderConfig,
    /// Egress.
    pub sink: SinkConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::reference()
    }
}

impl PipelineConfig {
    /// The reference chain with the edge-detection filter.
    pub fn reference() -> Self {
        Self {
            source: SourceConfig::default(),
            queue: QueueConfig::default(),
            jitter_buffer: JitterBufferConfig::default(),
            depay: DepayConfig::default(),
            decoder: DecoderConfig::default(),
            filter: "visioncannyfilter".to_string(),
            encoder: EncoderConfig::default(),
            sink: SinkConfig::default(),
        }
    }

    /// Use another filter stage.
    pub fn with_filter(mut self, factory: impl Into<String>) -> Self {
        self.filter = factory.into();
        self
    }

    /// The ordered stage list.
    pub fn stages(&self) -> Vec<StageSpec> {
        let q = self.queue;
        vec![
            self.source.to_spec().without_queue(),
            self.jitter_buffer.to_spec().with_queue(q),
            StageSpec::new("identity").without_queue(),
            self.depay.to_spec().with_queue(q),
            self.decoder.to_spec().with_queue(q),
            StageSpec::new("videoconvert").with_queue(q),
            StageSpec::new(self.filter.clone()).with_queue(q),
            StageSpec::new("videoconvert").without_queue(),
            self.encoder.to_spec().with_queue(q),
            self.sink.to_spec().without_queue(),
        ]
    }

    /// The stage list as a launch description.
    pub fn describe(&self) -> String {
        describe(&self.stages())
    }
}

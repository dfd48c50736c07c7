//! Stage factory: creates elements from [`StageSpec`]s.
//!
//! Built-in stages are registered by [`ElementFactory::new`]. Stages backed by
//! an external media runtime (jitter buffer, depayloader, codecs) are
//! registered by the host with [`ElementFactory::register`].

use crate::element::Element;
use crate::elements::{Identity, VideoConvertElement};
use crate::error::{Error, Result};
use crate::format::PixelFormatTag;
use crate::pipeline::config::StageSpec;
use crate::vision::{CannyFilter, CannyThresholds, GrayscaleFilter, TransformStage};
use std::collections::HashMap;
use std::fmt;

/// Type alias for element constructor functions.
pub type ElementConstructor = Box<dyn Fn(&StageSpec) -> Result<Box<dyn Element>> + Send + Sync>;

/// Registry of element constructors.
pub struct ElementFactory {
    constructors: HashMap<String, ElementConstructor>,
}

impl ElementFactory {
    /// Create a new factory with built-in stages registered.
    pub fn new() -> Self {
        let mut factory = Self::empty();
        factory.register("identity", create_identity);
        factory.register("videoconvert", create_videoconvert);
        factory.register("visioncannyfilter", create_canny);
        factory.register("visiongrayscale", create_grayscale);
        factory
    }

    /// Create a factory with nothing registered.
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Register (or replace) a constructor.
    pub fn register<F>(&mut self, name: &str, constructor: F)
    where
        F: Fn(&StageSpec) -> Result<Box<dyn Element>> + Send + Sync + 'static,
    {
        self.constructors
            .insert(name.to_string(), Box::new(constructor));
    }

    /// Create the stage `spec` describes.
    ///
    /// Unknown factory names and constructor failures are reported as
    /// [`Error::AssemblyFailed`].
    pub fn create(&self, spec: &StageSpec) -> Result<Box<dyn Element>> {
        let constructor = self
            .constructors
            .get(&spec.factory)
            .ok_or_else(|| Error::assembly(&spec.factory, "no such element"))?;
        constructor(spec).map_err(|e| match e {
            e @ Error::AssemblyFailed { .. } => e,
            e => Error::assembly(&spec.factory, e),
        })
    }

    /// Check if a stage type is registered.
    pub fn is_registered(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// List all registered stage names.
    pub fn list_elements(&self) -> Vec<String> {
        let mut names: Vec<String> = self.constructors.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for ElementFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ElementFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementFactory")
            .field("elements", &self.list_elements())
            .finish()
    }
}

fn instance_name(spec: &StageSpec) -> String {
    spec.name.clone().unwrap_or_else(|| spec.factory.clone())
}

// Built-in element constructors

fn create_identity(spec: &StageSpec) -> Result<Box<dyn Element>> {
    spec.properties.check_known(&spec.factory, &[])?;
    Ok(Box::new(Identity::new().with_name(instance_name(spec))))
}

fn create_videoconvert(spec: &StageSpec) -> Result<Box<dyn Element>> {
    spec.properties.check_known(&spec.factory, &["format"])?;
    let mut element = VideoConvertElement::new().with_name(instance_name(spec));
    if let Some(format) = spec.properties.get_string("format") {
        element = element.with_output_format(format.parse::<PixelFormatTag>()?);
    }
    Ok(Box::new(element))
}

fn create_canny(spec: &StageSpec) -> Result<Box<dyn Element>> {
    let props = &spec.properties;
    props.check_known(&spec.factory, &["low-threshold", "high-threshold"])?;
    let defaults = CannyThresholds::default();
    let low = props.get_i64("low-threshold")?.unwrap_or(defaults.low as i64);
    let high = props.get_i64("high-threshold")?.unwrap_or(defaults.high as i64);
    let (Ok(low), Ok(high)) = (i32::try_from(low), i32::try_from(high)) else {
        return Err(Error::Config("thresholds out of range".into()));
    };
    if low < 0 || low > high {
        return Err(Error::Config(format!(
            "thresholds must satisfy 0 <= low <= high, got {low}/{high}"
        )));
    }
    let filter = CannyFilter::new().with_thresholds(low, high);
    Ok(Box::new(
        TransformStage::new(filter).with_name(instance_name(spec)),
    ))
}

fn create_grayscale(spec: &StageSpec) -> Result<Box<dyn Element>> {
    spec.properties.check_known(&spec.factory, &[])?;
    Ok(Box::new(
        TransformStage::new(GrayscaleFilter::new()).with_name(instance_name(spec)),
    ))
}

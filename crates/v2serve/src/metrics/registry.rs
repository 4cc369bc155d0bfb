//! Metric family registry with idempotent registration.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt::{self, Write};
use std::sync::Arc;

use super::instruments::{CounterVec, Desc, GaugeVec, HistogramVec};
use super::MetricsError;

/// A registered metric family.
#[derive(Debug, Clone)]
pub enum Family {
    Counter(Arc<CounterVec>),
    Gauge(Arc<GaugeVec>),
    Histogram(Arc<HistogramVec>),
}

impl Family {
    pub fn kind(&self) -> &'static str {
        match self {
            Family::Counter(_) => "counter",
            Family::Gauge(_) => "gauge",
            Family::Histogram(_) => "histogram",
        }
    }

    fn desc(&self) -> &Desc {
        match self {
            Family::Counter(c) => c.desc(),
            Family::Gauge(g) => g.desc(),
            Family::Histogram(h) => h.desc(),
        }
    }

    fn encode(&self, out: &mut dyn Write) -> fmt::Result {
        match self {
            Family::Counter(c) => c.encode(out),
            Family::Gauge(g) => g.encode(out),
            Family::Histogram(h) => h.encode(out),
        }
    }
}

/// Process-wide set of metric families, keyed by name.
///
/// Construct one at startup and share it by reference; registering a name
/// twice hands back the existing family.
#[derive(Debug, Default)]
pub struct Registry {
    families: RwLock<BTreeMap<String, Family>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the family registered under `name`, creating it with
    /// `factory` if absent.
    pub fn get_or_insert<F>(&self, name: &str, factory: F) -> Result<Family, MetricsError>
    where
        F: FnOnce() -> Family,
    {
        validate_name(name)?;
        if let Some(family) = self.families.read().get(name) {
            return Ok(family.clone());
        }
        let mut families = self.families.write();
        Ok(families
            .entry(name.to_string())
            .or_insert_with(factory)
            .clone())
    }

    pub fn counter_vec(
        &self,
        name: &str,
        help: &str,
        labels: &[&str],
    ) -> Result<Arc<CounterVec>, MetricsError> {
        let family = self.get_or_insert(name, || {
            Family::Counter(Arc::new(CounterVec::new(Desc::new(name, help, labels))))
        })?;
        family.desc().check_label_names(labels)?;
        match family {
            Family::Counter(c) => Ok(c),
            other => Err(kind_mismatch(name, &other, "counter")),
        }
    }

    pub fn gauge_vec(
        &self,
        name: &str,
        help: &str,
        labels: &[&str],
    ) -> Result<Arc<GaugeVec>, MetricsError> {
        let family = self.get_or_insert(name, || {
            Family::Gauge(Arc::new(GaugeVec::new(Desc::new(name, help, labels))))
        })?;
        family.desc().check_label_names(labels)?;
        match family {
            Family::Gauge(g) => Ok(g),
            other => Err(kind_mismatch(name, &other, "gauge")),
        }
    }

    pub fn histogram_vec(
        &self,
        name: &str,
        help: &str,
        labels: &[&str],
        buckets: &[f64],
    ) -> Result<Arc<HistogramVec>, MetricsError> {
        let family = self.get_or_insert(name, || {
            Family::Histogram(Arc::new(HistogramVec::new(
                Desc::new(name, help, labels),
                buckets,
            )))
        })?;
        family.desc().check_label_names(labels)?;
        match family {
            Family::Histogram(h) => Ok(h),
            other => Err(kind_mismatch(name, &other, "histogram")),
        }
    }

    pub fn len(&self) -> usize {
        self.families.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.families.read().is_empty()
    }

    /// Write every family in Prometheus text exposition format (0.0.4).
    pub fn encode(&self, out: &mut dyn Write) -> fmt::Result {
        let families: Vec<Family> = self.families.read().values().cloned().collect();
        for family in &families {
            family.encode(out)?;
        }
        Ok(())
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = self.encode(&mut out);
        out
    }
}

fn kind_mismatch(name: &str, existing: &Family, requested: &'static str) -> MetricsError {
    MetricsError::KindMismatch {
        name: name.to_string(),
        existing: existing.kind(),
        requested,
    }
}

/// Metric names match `[a-zA-Z_:][a-zA-Z0-9_:]*`.
fn validate_name(name: &str) -> Result<(), MetricsError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(MetricsError::InvalidName(name.to_string()))
    }
}

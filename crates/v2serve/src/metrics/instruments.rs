//! Labeled counter, gauge and histogram families.
//!
//! Every sample update is a single atomic operation; the label map is only
//! write-locked the first time a label combination is seen.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt::{self, Write};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use super::MetricsError;

/// Name, help text and label names of a metric family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Desc {
    pub name: String,
    pub help: String,
    pub label_names: Vec<String>,
}

impl Desc {
    pub(crate) fn new(name: &str, help: &str, label_names: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            help: help.to_string(),
            label_names: label_names.iter().map(|l| l.to_string()).collect(),
        }
    }

    pub(crate) fn check_label_names(&self, requested: &[&str]) -> Result<(), MetricsError> {
        if self.label_names.iter().map(String::as_str).eq(requested.iter().copied()) {
            Ok(())
        } else {
            Err(MetricsError::LabelMismatch {
                name: self.name.clone(),
                expected: self.label_names.clone(),
                found: requested.iter().map(|l| l.to_string()).collect(),
            })
        }
    }

    fn check_arity(&self, values: &[&str]) -> Result<(), MetricsError> {
        if values.len() == self.label_names.len() {
            Ok(())
        } else {
            Err(MetricsError::LabelMismatch {
                name: self.name.clone(),
                expected: self.label_names.clone(),
                found: values.iter().map(|v| v.to_string()).collect(),
            })
        }
    }

    fn write_header(&self, out: &mut dyn Write, kind: &str) -> fmt::Result {
        writeln!(out, "# HELP {} {}", self.name, escape_help(&self.help))?;
        writeln!(out, "# TYPE {} {}", self.name, kind)
    }
}

/// Map from label values to one series, created on first use.
#[derive(Debug)]
struct Series<T> {
    children: RwLock<BTreeMap<Vec<String>, Arc<T>>>,
}

impl<T> Series<T> {
    fn new() -> Self {
        Self {
            children: RwLock::new(BTreeMap::new()),
        }
    }

    fn get_or_create(&self, values: &[&str], make: impl FnOnce() -> T) -> Arc<T> {
        let key: Vec<String> = values.iter().map(|v| v.to_string()).collect();
        if let Some(child) = self.children.read().get(&key) {
            return Arc::clone(child);
        }
        let mut children = self.children.write();
        Arc::clone(children.entry(key).or_insert_with(|| Arc::new(make())))
    }

    fn find(&self, values: &[&str]) -> Option<Arc<T>> {
        let key: Vec<String> = values.iter().map(|v| v.to_string()).collect();
        self.children.read().get(&key).map(Arc::clone)
    }

    fn snapshot(&self) -> Vec<(Vec<String>, Arc<T>)> {
        self.children
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), Arc::clone(v)))
            .collect()
    }
}

/// Monotonic counter.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self) {
        self.inc_by(1);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Value that can go up and down.
#[derive(Debug, Default)]
pub struct Gauge(AtomicI64);

impl Gauge {
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn set(&self, v: i64) {
        self.0.store(v, Ordering::Relaxed);
    }

    pub fn get(&self) -> i64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Fixed-bucket histogram.
#[derive(Debug)]
pub struct Histogram {
    bounds: Arc<[f64]>,
    /// Per-bucket (non-cumulative) counts; the last slot is `+Inf`
    buckets: Box<[AtomicU64]>,
    sum_bits: AtomicU64,
}

impl Histogram {
    fn new(bounds: Arc<[f64]>) -> Self {
        let buckets = (0..=bounds.len()).map(|_| AtomicU64::new(0)).collect();
        Self {
            bounds,
            buckets,
            sum_bits: AtomicU64::new(0f64.to_bits()),
        }
    }

    /// Record one sample. Negative and non-finite samples are dropped.
    pub fn observe(&self, v: f64) {
        if !v.is_finite() || v < 0.0 {
            return;
        }
        let index = self
            .bounds
            .iter()
            .position(|&b| v <= b)
            .unwrap_or(self.bounds.len());
        self.buckets[index].fetch_add(1, Ordering::Relaxed);

        let mut current = self.sum_bits.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(current) + v).to_bits();
            match self.sum_bits.compare_exchange_weak(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
    }

    /// Total samples; always equal to the `+Inf` bucket.
    pub fn count(&self) -> u64 {
        self.buckets.iter().map(|b| b.load(Ordering::Relaxed)).sum()
    }

    pub fn sum(&self) -> f64 {
        f64::from_bits(self.sum_bits.load(Ordering::Relaxed))
    }

    /// `(upper bound, cumulative count)` pairs, ending with `+Inf`.
    pub fn cumulative(&self) -> Vec<(f64, u64)> {
        let mut running = 0;
        self.bounds
            .iter()
            .copied()
            .chain(std::iter::once(f64::INFINITY))
            .zip(self.buckets.iter())
            .map(|(bound, bucket)| {
                running += bucket.load(Ordering::Relaxed);
                (bound, running)
            })
            .collect()
    }
}

#[derive(Debug)]
pub struct CounterVec {
    desc: Desc,
    series: Series<Counter>,
}

impl CounterVec {
    pub(crate) fn new(desc: Desc) -> Self {
        Self {
            desc,
            series: Series::new(),
        }
    }

    pub fn desc(&self) -> &Desc {
        &self.desc
    }

    pub fn with_label_values(&self, values: &[&str]) -> Result<Arc<Counter>, MetricsError> {
        self.desc.check_arity(values)?;
        Ok(self.series.get_or_create(values, Counter::default))
    }

    /// Look up a series without creating it.
    pub fn find(&self, values: &[&str]) -> Option<Arc<Counter>> {
        self.series.find(values)
    }

    pub(crate) fn encode(&self, out: &mut dyn Write) -> fmt::Result {
        self.desc.write_header(out, "counter")?;
        for (values, counter) in self.series.snapshot() {
            let labels = format_labels(&self.desc.label_names, &values, None);
            writeln!(out, "{}{} {}", self.desc.name, labels, counter.get())?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct GaugeVec {
    desc: Desc,
    series: Series<Gauge>,
}

impl GaugeVec {
    pub(crate) fn new(desc: Desc) -> Self {
        Self {
            desc,
            series: Series::new(),
        }
    }

    pub fn desc(&self) -> &Desc {
        &self.desc
    }

    pub fn with_label_values(&self, values: &[&str]) -> Result<Arc<Gauge>, MetricsError> {
        self.desc.check_arity(values)?;
        Ok(self.series.get_or_create(values, Gauge::default))
    }

    pub(crate) fn encode(&self, out: &mut dyn Write) -> fmt::Result {
        self.desc.write_header(out, "gauge")?;
        for (values, gauge) in self.series.snapshot() {
            let labels = format_labels(&self.desc.label_names, &values, None);
            writeln!(out, "{}{} {}", self.desc.name, labels, gauge.get())?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct HistogramVec {
    desc: Desc,
    bounds: Arc<[f64]>,
    series: Series<Histogram>,
}

impl HistogramVec {
    /// `bounds` are sorted and deduplicated; `+Inf` is implicit.
    pub(crate) fn new(desc: Desc, bounds: &[f64]) -> Self {
        let mut sorted: Vec<f64> = bounds.iter().copied().filter(|b| b.is_finite()).collect();
        sorted.sort_by(|a, b| a.total_cmp(b));
        sorted.dedup();
        Self {
            desc,
            bounds: sorted.into(),
            series: Series::new(),
        }
    }

    pub fn desc(&self) -> &Desc {
        &self.desc
    }

    pub fn with_label_values(&self, values: &[&str]) -> Result<Arc<Histogram>, MetricsError> {
        self.desc.check_arity(values)?;
        let bounds = Arc::clone(&self.bounds);
        Ok(self.series.get_or_create(values, || Histogram::new(bounds)))
    }

    /// Look up a series without creating it.
    pub fn find(&self, values: &[&str]) -> Option<Arc<Histogram>> {
        self.series.find(values)
    }

    pub(crate) fn encode(&self, out: &mut dyn Write) -> fmt::Result {
        self.desc.write_header(out, "histogram")?;
        let name = &self.desc.name;
        for (values, histogram) in self.series.snapshot() {
            let cumulative = histogram.cumulative();
            let total = cumulative.last().map_or(0, |&(_, n)| n);
            for (bound, count) in cumulative {
                let le = if bound.is_infinite() {
                    "+Inf".to_string()
                } else {
                    bound.to_string()
                };
                let labels = format_labels(&self.desc.label_names, &values, Some(&le));
                writeln!(out, "{}_bucket{} {}", name, labels, count)?;
            }
            let labels = format_labels(&self.desc.label_names, &values, None);
            writeln!(out, "{}_sum{} {}", name, labels, histogram.sum())?;
            writeln!(out, "{}_count{} {}", name, labels, total)?;
        }
        Ok(())
    }
}

/// `{a="x",b="y"}`, or empty when there are no labels.
fn format_labels(names: &[String], values: &[String], le: Option<&str>) -> String {
    let mut pairs: Vec<String> = names
        .iter()
        .zip(values)
        .map(|(n, v)| format!("{}=\"{}\"", n, escape_label(v)))
        .collect();
    if let Some(le) = le {
        pairs.push(format!("le=\"{}\"", le));
    }
    if pairs.is_empty() {
        String::new()
    } else {
        format!("{{{}}}", pairs.join(","))
    }
}

fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

fn escape_help(v: &str) -> String {
    v.replace('\\', "\\\\").replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn counter_series_are_independent() {
        let vec = CounterVec::new(Desc::new("c_total", "help", &["status"]));
        vec.with_label_values(&["ok"]).unwrap().inc();
        vec.with_label_values(&["ok"]).unwrap().inc();
        vec.with_label_values(&["err"]).unwrap().inc();
        assert_eq!(vec.with_label_values(&["ok"]).unwrap().get(), 2);
        assert_eq!(vec.with_label_values(&["err"]).unwrap().get(), 1);
    }

    #[test]
    fn wrong_label_arity_is_rejected() {
        let vec = CounterVec::new(Desc::new("c_total", "help", &["model", "status"]));
        assert!(vec.with_label_values(&["only-one"]).is_err());
    }

    #[test]
    fn histogram_buckets_are_cumulative() {
        let vec = HistogramVec::new(Desc::new("h", "help", &[]), &[0.1, 1.0]);
        let h = vec.with_label_values(&[]).unwrap();
        h.observe(0.05);
        h.observe(0.5);
        h.observe(5.0);
        h.observe(-1.0);
        assert_eq!(h.cumulative(), vec![(0.1, 1), (1.0, 2), (f64::INFINITY, 3)]);
        assert_eq!(h.count(), 3);
        assert!((h.sum() - 5.55).abs() < 1e-9);
    }

    #[test]
    fn histogram_encodes_buckets_sum_and_count() {
        let vec = HistogramVec::new(Desc::new("lat_seconds", "Latency", &["model"]), &[0.5]);
        vec.with_label_values(&["m"]).unwrap().observe(0.25);
        let mut out = String::new();
        vec.encode(&mut out).unwrap();
        assert_eq!(
            out,
            "# HELP lat_seconds Latency\n\
             # TYPE lat_seconds histogram\n\
             lat_seconds_bucket{model=\"m\",le=\"0.5\"} 1\n\
             lat_seconds_bucket{model=\"m\",le=\"+Inf\"} 1\n\
             lat_seconds_sum{model=\"m\"} 0.25\n\
             lat_seconds_count{model=\"m\"} 1\n"
        );
    }

    #[test]
    fn scrape_during_observation_keeps_count_and_inf_bucket_equal() {
        let vec = HistogramVec::new(Desc::new("h", "help", &[]), &[0.1, 1.0]);
        let h = vec.with_label_values(&[]).unwrap();

        let value_of = |out: &str, prefix: &str| -> u64 {
            out.lines()
                .find_map(|l| l.strip_prefix(prefix))
                .and_then(|v| v.trim().parse().ok())
                .unwrap()
        };

        std::thread::scope(|s| {
            for _ in 0..4 {
                let h = Arc::clone(&h);
                s.spawn(move || {
                    for i in 0..5000 {
                        h.observe(f64::from(i % 3) * 0.5);
                    }
                });
            }
            for _ in 0..200 {
                let mut out = String::new();
                vec.encode(&mut out).unwrap();
                assert_eq!(
                    value_of(&out, "h_bucket{le=\"+Inf\"}"),
                    value_of(&out, "h_count")
                );
            }
        });
        assert_eq!(h.count(), 20_000);
    }

    #[test]
    fn label_values_are_escaped() {
        let vec = GaugeVec::new(Desc::new("g", "help", &["model"]));
        vec.with_label_values(&["a\"b\\c\nd"]).unwrap().set(1);
        let mut out = String::new();
        vec.encode(&mut out).unwrap();
        assert!(out.contains("g{model=\"a\\\"b\\\\c\\nd\"} 1"), "{}", out);
    }

    #[test]
    fn gauge_moves_both_ways() {
        let g = Gauge::default();
        g.inc();
        g.inc();
        g.dec();
        assert_eq!(g.get(), 1);
        g.set(0);
        assert_eq!(g.get(), 0);
    }
}

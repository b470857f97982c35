//! Prometheus exposition-format writing.
//!
//! One [`MetricWriter`] lives for exactly one scrape and appends to the
//! shared output buffer. It tracks which metric names already got their
//! `# HELP`/`# TYPE` preamble so a name is introduced at most once per
//! scrape no matter how many label combinations follow, and it renders
//! labels in the order the caller passes them, which keeps output stable
//! for identical input.

use std::borrow::Cow;
use std::fmt;

use ahash::AHashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
}

impl MetricKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
        }
    }
}

/// Sample value. Integers render without a decimal point; floats in their
/// shortest round-trip form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Num {
    U(u64),
    I(i64),
    F(f64),
}

impl fmt::Display for Num {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Num::U(v) => write!(f, "{v}"),
            Num::I(v) => write!(f, "{v}"),
            Num::F(v) => write!(f, "{v}"),
        }
    }
}

impl From<u64> for Num {
    fn from(v: u64) -> Self {
        Num::U(v)
    }
}

impl From<i64> for Num {
    fn from(v: i64) -> Self {
        Num::I(v)
    }
}

impl From<f64> for Num {
    fn from(v: f64) -> Self {
        Num::F(v)
    }
}

fn escape_label_value(v: &str) -> Cow<'_, str> {
    if !v.contains(['\\', '"', '\n']) {
        return Cow::Borrowed(v);
    }
    let mut out = String::with_capacity(v.len() + 2);
    for c in v.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

pub struct MetricWriter<'a> {
    out: &'a mut String,
    with_help: bool,
    seen: AHashSet<&'static str>,
}

impl<'a> MetricWriter<'a> {
    /// `with_help = false` is the compact mode: no preambles at all.
    pub fn new(out: &'a mut String, with_help: bool) -> Self {
        Self {
            out,
            with_help,
            seen: AHashSet::new(),
        }
    }

    /// Emit the `# HELP`/`# TYPE` preamble for `name`, once per scrape.
    pub fn help(&mut self, name: &'static str, kind: MetricKind, text: &str) {
        if !self.with_help || !self.seen.insert(name) {
            return;
        }
        self.out.push('\n');
        self.out.push_str("# HELP ");
        self.out.push_str(name);
        self.out.push(' ');
        self.out.push_str(text);
        self.out.push('\n');
        self.out.push_str("# TYPE ");
        self.out.push_str(name);
        self.out.push(' ');
        self.out.push_str(kind.as_str());
        self.out.push('\n');
    }

    /// Append one series line. Labels render in slice order.
    pub fn sample(&mut self, name: &'static str, labels: &[(&str, &str)], value: Num) {
        self.out.push_str(name);
        if !labels.is_empty() {
            self.out.push('{');
            for (i, (k, v)) in labels.iter().enumerate() {
                if i > 0 {
                    self.out.push(',');
                }
                self.out.push_str(k);
                self.out.push_str("=\"");
                self.out.push_str(&escape_label_value(v));
                self.out.push('"');
            }
            self.out.push('}');
        }
        self.out.push(' ');
        self.out.push_str(&value.to_string());
        self.out.push('\n');
    }

    /// Preamble and single unlabeled sample in one go; the common shape for
    /// scalar gauges.
    pub fn scalar(&mut self, name: &'static str, kind: MetricKind, text: &str, value: Num) {
        self.help(name, kind, text);
        self.sample(name, &[], value);
    }
}

//! Structural comparison of grains and grain sequences.
//!
//! [`compare_grain`] walks the full attribute tree of two grains and
//! produces a [`DiffNode`] tree mirroring it; options refine the verdict
//! per attribute path. `creation_timestamp` is excluded unless explicitly
//! included; everything else is compared by default.

use crate::grain::{Grain, GrainData, GrainPayload};
use crate::psnr::{DataLayout, MsePsnr, PsnrKernel};
use crate::types::Timestamp;
use std::fmt;

/// Comparison operator for [`expected_difference`] and [`psnr`] rules.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn eval<T: PartialOrd>(&self, a: T, b: T) -> bool {
        match self {
            CompareOp::Eq => a == b,
            CompareOp::Ne => a != b,
            CompareOp::Lt => a < b,
            CompareOp::Le => a <= b,
            CompareOp::Gt => a > b,
            CompareOp::Ge => a >= b,
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

/// One comparison refinement, built with the functions below.
#[derive(Clone, Debug)]
pub enum CompareOption {
    Include(String),
    Exclude(String),
    ExpectedDifference {
        path: String,
        op: CompareOp,
        value: i128,
    },
    Psnr {
        path: String,
        op: CompareOp,
        thresholds: Vec<f64>,
    },
}

/// Includes a path excluded by default, such as `creation_timestamp`.
pub fn include(path: &str) -> CompareOption {
    CompareOption::Include(path.to_string())
}

/// Excludes a path (and everything below it) from the verdict. Wins over
/// `include` on the same path.
pub fn exclude(path: &str) -> CompareOption {
    CompareOption::Exclude(path.to_string())
}

/// Requires `a.path - b.path OP value` for a numeric or timestamp scalar;
/// timestamp differences are in nanoseconds.
pub fn expected_difference(path: &str, op: CompareOp, value: i128) -> CompareOption {
    CompareOption::ExpectedDifference {
        path: path.to_string(),
        op,
        value,
    }
}

/// Replaces byte equality of the data region with a PSNR requirement:
/// each component or channel must satisfy `threshold OP psnr`, so `Lt`
/// reads "threshold below the achieved PSNR" and identical data passes
/// any finite threshold list.
pub fn psnr(path: &str, op: CompareOp, thresholds: Vec<f64>) -> CompareOption {
    CompareOption::Psnr {
        path: path.to_string(),
        op,
        thresholds,
    }
}

/// Compares metadata only: sugar for `exclude("data")`.
pub fn metadata_only() -> CompareOption {
    exclude("data")
}

/// Paths excluded unless an `include` rule names them.
const DEFAULT_EXCLUDED: &[&str] = &["creation_timestamp"];

fn path_matches(rule: &str, path: &str) -> bool {
    path == rule || (path.len() > rule.len() && path.starts_with(rule) && path.as_bytes()[rule.len()] == b'.')
}

struct Rules<'a> {
    options: &'a [CompareOption],
}

impl Rules<'_> {
    fn excluded(&self, path: &str) -> bool {
        for option in self.options {
            if let CompareOption::Exclude(rule) = option {
                if path_matches(rule, path) {
                    return true;
                }
            }
        }
        if DEFAULT_EXCLUDED.iter().any(|rule| path_matches(rule, path)) {
            return !self.options.iter().any(|option| {
                matches!(option, CompareOption::Include(rule) if path_matches(rule, path))
            });
        }
        false
    }

    fn expected_difference(&self, path: &str) -> Option<(CompareOp, i128)> {
        self.options.iter().find_map(|option| match option {
            CompareOption::ExpectedDifference {
                path: rule,
                op,
                value,
            } if rule == path => Some((*op, *value)),
            _ => None,
        })
    }

    fn psnr(&self, path: &str) -> Option<(CompareOp, &[f64])> {
        self.options.iter().find_map(|option| match option {
            CompareOption::Psnr {
                path: rule,
                op,
                thresholds,
            } if rule == path => Some((*op, thresholds.as_slice())),
            _ => None,
        })
    }
}

/// The verdict-bearing content of a diff tree node.
#[derive(Clone, Debug)]
pub enum DiffKind {
    /// The two values matched under the active rule.
    Equal { value: String },
    /// Mismatch; `reason` says why.
    Different {
        a: String,
        b: String,
        reason: String,
    },
    /// Rendered for diagnostics but not part of the verdict.
    Excluded { a: String, b: String },
    /// Composite; satisfied when every child is.
    Group,
}

/// One node of the comparison tree, isomorphic to the grain attribute tree.
#[derive(Clone, Debug)]
pub struct DiffNode {
    pub path: String,
    pub kind: DiffKind,
    pub children: Vec<DiffNode>,
}

impl DiffNode {
    pub fn ok(&self) -> bool {
        match &self.kind {
            DiffKind::Equal { .. } | DiffKind::Excluded { .. } => true,
            DiffKind::Different { .. } => false,
            DiffKind::Group => self.children.iter().all(DiffNode::ok),
        }
    }

    fn glyph(&self) -> &'static str {
        match &self.kind {
            DiffKind::Excluded { .. } => "\u{25ef}",
            _ if self.ok() => "\u{2705}",
            _ => "\u{274c}",
        }
    }

    fn render(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let indent = "  ".repeat(depth);
        match &self.kind {
            DiffKind::Equal { value } => {
                writeln!(f, "{}{} {}: {}", indent, self.glyph(), self.path, value)?
            }
            DiffKind::Different { a, b, reason } => writeln!(
                f,
                "{}{} {}: {} != {} ({})",
                indent,
                self.glyph(),
                self.path,
                a,
                b,
                reason
            )?,
            DiffKind::Excluded { a, b } => writeln!(
                f,
                "{}{} {}: {} / {}",
                indent,
                self.glyph(),
                self.path,
                a,
                b
            )?,
            DiffKind::Group => writeln!(f, "{}{} {}", indent, self.glyph(), self.path)?,
        }
        for child in &self.children {
            child.render(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for DiffNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render(f, 0)
    }
}

/// Compares two grains with the built-in MSE kernel for PSNR rules.
pub fn compare_grain(a: &Grain, b: &Grain, options: &[CompareOption]) -> DiffNode {
    compare_grain_with(a, b, options, &MsePsnr)
}

/// Compares two grains, delegating PSNR rules to `kernel`.
pub fn compare_grain_with(
    a: &Grain,
    b: &Grain,
    options: &[CompareOption],
    kernel: &dyn PsnrKernel,
) -> DiffNode {
    let rules = Rules { options };
    let mut children = Vec::new();

    children.push(display_node(
        &rules,
        "grain_type",
        &a.grain_type(),
        &b.grain_type(),
    ));
    if a.grain_type() != b.grain_type() {
        // Structurally incomparable; the cause rides on the root.
        return DiffNode {
            path: "grain".to_string(),
            kind: DiffKind::Different {
                a: a.grain_type().to_string(),
                b: b.grain_type().to_string(),
                reason: "grain types differ, payloads not compared".to_string(),
            },
            children,
        };
    }

    children.push(display_node(&rules, "source_id", &a.meta.source_id, &b.meta.source_id));
    children.push(display_node(&rules, "flow_id", &a.meta.flow_id, &b.meta.flow_id));
    children.push(timestamp_node(
        &rules,
        "origin_timestamp",
        a.meta.origin_timestamp,
        b.meta.origin_timestamp,
    ));
    children.push(timestamp_node(
        &rules,
        "sync_timestamp",
        a.meta.sync_timestamp,
        b.meta.sync_timestamp,
    ));
    children.push(timestamp_node(
        &rules,
        "creation_timestamp",
        a.meta.creation_timestamp,
        b.meta.creation_timestamp,
    ));
    children.push(display_node(&rules, "rate", &a.meta.rate, &b.meta.rate));
    children.push(display_node(&rules, "duration", &a.meta.duration, &b.meta.duration));
    children.push(list_node(
        &rules,
        "timelabels",
        &a.meta.timelabels,
        &b.meta.timelabels,
        |rules, path, la, lb| display_node(rules, path, la, lb),
    ));

    match (&a.payload, &b.payload) {
        (GrainPayload::Empty, GrainPayload::Empty) => {}
        (GrainPayload::Video(va), GrainPayload::Video(vb)) => {
            children.push(display_node(&rules, "cog_frame_format", &va.format, &vb.format));
            children.push(display_node(&rules, "cog_frame_layout", &va.layout, &vb.layout));
            children.push(int_node(&rules, "width", va.width, vb.width));
            children.push(int_node(&rules, "height", va.height, vb.height));
            children.push(int_node(&rules, "extension", va.extension, vb.extension));
            children.push(display_node(
                &rules,
                "aspect_ratio",
                &va.aspect_ratio,
                &vb.aspect_ratio,
            ));
            children.push(display_node(
                &rules,
                "pixel_aspect_ratio",
                &va.pixel_aspect_ratio,
                &vb.pixel_aspect_ratio,
            ));
            children.push(components_node(&rules, va, vb));
        }
        (GrainPayload::CodedVideo(ca), GrainPayload::CodedVideo(cb)) => {
            children.push(display_node(&rules, "cog_frame_format", &ca.format, &cb.format));
            children.push(display_node(&rules, "cog_frame_layout", &ca.layout, &cb.layout));
            children.push(int_node(&rules, "origin_width", ca.origin_width, cb.origin_width));
            children.push(int_node(&rules, "origin_height", ca.origin_height, cb.origin_height));
            children.push(int_node(&rules, "coded_width", ca.coded_width, cb.coded_width));
            children.push(int_node(&rules, "coded_height", ca.coded_height, cb.coded_height));
            children.push(display_node(&rules, "key_frame", &ca.key_frame, &cb.key_frame));
            children.push(int_node(
                &rules,
                "temporal_offset",
                ca.temporal_offset,
                cb.temporal_offset,
            ));
            children.push(list_node(
                &rules,
                "unit_offsets",
                &ca.unit_offsets,
                &cb.unit_offsets,
                |rules, path, ua, ub| int_node(rules, path, *ua, *ub),
            ));
        }
        (GrainPayload::Audio(aa), GrainPayload::Audio(ab)) => {
            children.push(display_node(&rules, "cog_audio_format", &aa.format, &ab.format));
            children.push(int_node(&rules, "channels", aa.channels, ab.channels));
            children.push(int_node(&rules, "samples", aa.samples, ab.samples));
            children.push(int_node(&rules, "sample_rate", aa.sample_rate, ab.sample_rate));
        }
        (GrainPayload::CodedAudio(aa), GrainPayload::CodedAudio(ab)) => {
            children.push(display_node(&rules, "cog_audio_format", &aa.format, &ab.format));
            children.push(int_node(&rules, "channels", aa.channels, ab.channels));
            children.push(int_node(&rules, "samples", aa.samples, ab.samples));
            children.push(int_node(&rules, "priming", aa.priming, ab.priming));
            children.push(int_node(&rules, "remainder", aa.remainder, ab.remainder));
            children.push(int_node(&rules, "sample_rate", aa.sample_rate, ab.sample_rate));
        }
        (GrainPayload::Event(ea), GrainPayload::Event(eb)) => {
            children.push(int_node(&rules, "event_type", ea.event_type, eb.event_type));
        }
        _ => unreachable!("grain types checked above"),
    }

    children.push(data_node(&rules, a, b, kernel));

    DiffNode {
        path: "grain".to_string(),
        kind: DiffKind::Group,
        children,
    }
}

fn display_node<T: PartialEq + fmt::Display>(
    rules: &Rules<'_>,
    path: &str,
    a: &T,
    b: &T,
) -> DiffNode {
    let kind = if rules.excluded(path) {
        DiffKind::Excluded {
            a: a.to_string(),
            b: b.to_string(),
        }
    } else if a == b {
        DiffKind::Equal {
            value: a.to_string(),
        }
    } else {
        DiffKind::Different {
            a: a.to_string(),
            b: b.to_string(),
            reason: "values differ".to_string(),
        }
    };
    DiffNode {
        path: path.to_string(),
        kind,
        children: Vec::new(),
    }
}

fn scalar_node(
    rules: &Rules<'_>,
    path: &str,
    a_value: i128,
    b_value: i128,
    a_text: String,
    b_text: String,
    unit: &str,
) -> DiffNode {
    let kind = if rules.excluded(path) {
        DiffKind::Excluded {
            a: a_text,
            b: b_text,
        }
    } else if let Some((op, value)) = rules.expected_difference(path) {
        let diff = a_value - b_value;
        if op.eval(diff, value) {
            DiffKind::Equal {
                value: format!("a - b = {}{} {} {}{}", diff, unit, op.symbol(), value, unit),
            }
        } else {
            DiffKind::Different {
                a: a_text,
                b: b_text,
                reason: format!(
                    "a - b = {}{}, expected {} {}{}",
                    diff,
                    unit,
                    op.symbol(),
                    value,
                    unit
                ),
            }
        }
    } else if a_value == b_value {
        DiffKind::Equal { value: a_text }
    } else {
        DiffKind::Different {
            a: a_text,
            b: b_text,
            reason: "values differ".to_string(),
        }
    };
    DiffNode {
        path: path.to_string(),
        kind,
        children: Vec::new(),
    }
}

fn int_node<T: Into<i128> + fmt::Display + Copy>(
    rules: &Rules<'_>,
    path: &str,
    a: T,
    b: T,
) -> DiffNode {
    scalar_node(rules, path, a.into(), b.into(), a.to_string(), b.to_string(), "")
}

fn timestamp_node(rules: &Rules<'_>, path: &str, a: Timestamp, b: Timestamp) -> DiffNode {
    scalar_node(
        rules,
        path,
        a.as_nanos(),
        b.as_nanos(),
        a.to_string(),
        b.to_string(),
        "ns",
    )
}

fn list_node<T>(
    rules: &Rules<'_>,
    path: &str,
    a: &[T],
    b: &[T],
    item: impl Fn(&Rules<'_>, &str, &T, &T) -> DiffNode,
) -> DiffNode {
    if rules.excluded(path) {
        return DiffNode {
            path: path.to_string(),
            kind: DiffKind::Excluded {
                a: format!("{} entries", a.len()),
                b: format!("{} entries", b.len()),
            },
            children: Vec::new(),
        };
    }
    let mut children = vec![int_node(
        rules,
        &format!("{}.count", path),
        a.len() as u64,
        b.len() as u64,
    )];
    for (i, (ia, ib)) in a.iter().zip(b).enumerate() {
        children.push(item(rules, &format!("{}.{}", path, i), ia, ib));
    }
    DiffNode {
        path: path.to_string(),
        kind: DiffKind::Group,
        children,
    }
}

fn components_node(
    rules: &Rules<'_>,
    a: &crate::grain::VideoGrain,
    b: &crate::grain::VideoGrain,
) -> DiffNode {
    let path = "components";
    if rules.excluded(path) {
        return DiffNode {
            path: path.to_string(),
            kind: DiffKind::Excluded {
                a: format!("{} components", a.components.len()),
                b: format!("{} components", b.components.len()),
            },
            children: Vec::new(),
        };
    }
    let mut children = vec![int_node(
        rules,
        "components.count",
        a.components.len() as u64,
        b.components.len() as u64,
    )];
    let offsets_a = a.component_offsets();
    let offsets_b = b.component_offsets();
    for (i, (ca, cb)) in a.components.iter().zip(&b.components).enumerate() {
        let base = format!("components.{}", i);
        let fields = vec![
            int_node(rules, &format!("{}.width", base), ca.width, cb.width),
            int_node(rules, &format!("{}.height", base), ca.height, cb.height),
            int_node(rules, &format!("{}.stride", base), ca.stride, cb.stride),
            int_node(rules, &format!("{}.length", base), ca.length, cb.length),
            int_node(rules, &format!("{}.offset", base), offsets_a[i], offsets_b[i]),
        ];
        children.push(DiffNode {
            path: base,
            kind: DiffKind::Group,
            children: fields,
        });
    }
    DiffNode {
        path: path.to_string(),
        kind: DiffKind::Group,
        children,
    }
}

fn render_data(data: &GrainData) -> String {
    match data {
        GrainData::Bytes(bytes) if bytes.is_empty() => "0 bytes".to_string(),
        GrainData::Bytes(bytes) => format!(
            "{} bytes, {}..",
            bytes.len(),
            hex::encode(&bytes[..bytes.len().min(8)])
        ),
        GrainData::Lazy(lazy) => format!("lazy {} bytes at {}", lazy.length, lazy.offset),
    }
}

fn data_node(rules: &Rules<'_>, a: &Grain, b: &Grain, kernel: &dyn PsnrKernel) -> DiffNode {
    let path = "data";
    let a_text = render_data(&a.data);
    let b_text = render_data(&b.data);

    if rules.excluded(path) {
        // Lazy handles are deliberately not read here.
        return DiffNode {
            path: path.to_string(),
            kind: DiffKind::Excluded {
                a: a_text,
                b: b_text,
            },
            children: Vec::new(),
        };
    }

    if let Some((op, thresholds)) = rules.psnr(path) {
        return psnr_node(a, b, kernel, op, thresholds, a_text, b_text);
    }

    let kind = match (&a.data, &b.data) {
        (GrainData::Bytes(ba), GrainData::Bytes(bb)) => {
            if ba == bb {
                DiffKind::Equal { value: a_text }
            } else if ba.len() != bb.len() {
                DiffKind::Different {
                    a: a_text,
                    b: b_text,
                    reason: "data lengths differ".to_string(),
                }
            } else {
                let at = ba.iter().zip(bb).position(|(x, y)| x != y).unwrap_or(0);
                DiffKind::Different {
                    a: a_text,
                    b: b_text,
                    reason: format!("first difference at byte {}", at),
                }
            }
        }
        (GrainData::Lazy(la), GrainData::Lazy(lb)) if la == lb => DiffKind::Equal {
            value: format!("same byte range, {}", a_text),
        },
        _ => DiffKind::Different {
            a: a_text,
            b: b_text,
            reason: "lazy data not materialised".to_string(),
        },
    };
    DiffNode {
        path: path.to_string(),
        kind,
        children: Vec::new(),
    }
}

fn psnr_node(
    a: &Grain,
    b: &Grain,
    kernel: &dyn PsnrKernel,
    op: CompareOp,
    thresholds: &[f64],
    a_text: String,
    b_text: String,
) -> DiffNode {
    let path = "data".to_string();
    let different = |reason: String| DiffNode {
        path: path.clone(),
        kind: DiffKind::Different {
            a: a_text.clone(),
            b: b_text.clone(),
            reason,
        },
        children: Vec::new(),
    };

    let (bytes_a, bytes_b) = match (a.data.bytes(), b.data.bytes()) {
        (Some(ba), Some(bb)) => (ba, bb),
        // PSNR never reads lazy handles; say so instead of failing.
        _ => {
            return DiffNode {
                path,
                kind: DiffKind::Excluded {
                    a: a_text,
                    b: b_text,
                },
                children: Vec::new(),
            }
        }
    };

    let layout = match (&a.payload, &b.payload) {
        (GrainPayload::Video(va), GrainPayload::Video(vb)) => {
            if va.format != vb.format || va.components != vb.components {
                return different("video formats differ, PSNR not computed".to_string());
            }
            DataLayout::Video {
                format: va.format,
                components: &va.components,
            }
        }
        (GrainPayload::Audio(aa), GrainPayload::Audio(ab)) => {
            if aa.format != ab.format || aa.channels != ab.channels || aa.samples != ab.samples {
                return different("audio formats differ, PSNR not computed".to_string());
            }
            DataLayout::Audio {
                format: aa.format,
                channels: aa.channels,
                samples: aa.samples,
            }
        }
        _ => return different("PSNR applies to video and audio grains only".to_string()),
    };

    let values = match kernel.psnr(bytes_a, bytes_b, &layout) {
        Ok(values) => values,
        Err(e) => return different(format!("PSNR kernel failed: {}", e)),
    };
    if values.len() != thresholds.len() {
        return different(format!(
            "{} PSNR values against {} thresholds",
            values.len(),
            thresholds.len()
        ));
    }
    let rendered = values
        .iter()
        .map(|v| format!("{:.2}", v))
        .collect::<Vec<_>>()
        .join(", ");
    for (value, threshold) in values.iter().zip(thresholds) {
        if !op.eval(*threshold, *value) {
            return different(format!(
                "psnr [{}] dB, required threshold {} psnr",
                rendered,
                op.symbol()
            ));
        }
    }
    DiffNode {
        path,
        kind: DiffKind::Equal {
            value: format!("psnr [{}] dB", rendered),
        },
        children: Vec::new(),
    }
}

/// The outcome of a pairwise sequence comparison.
#[derive(Debug)]
pub struct SequenceDiff {
    pub ok: bool,
    /// Index of the first mismatching pair.
    pub failed_index: Option<usize>,
    /// Per-index diffs; only the last one when `return_last_only` was set.
    pub diffs: Vec<(usize, DiffNode)>,
}

/// Pulls grains pairwise and compares until the first mismatch or both
/// ends. A sequence outliving the other fails with an existence node.
/// `return_last_only` bounds memory by keeping only the latest diff.
pub fn compare_sequences<A, B>(
    a: A,
    b: B,
    options: &[CompareOption],
    return_last_only: bool,
) -> SequenceDiff
where
    A: IntoIterator<Item = Grain>,
    B: IntoIterator<Item = Grain>,
{
    let mut iter_a = a.into_iter();
    let mut iter_b = b.into_iter();
    let mut diffs: Vec<(usize, DiffNode)> = Vec::new();
    let mut index = 0usize;

    loop {
        let node = match (iter_a.next(), iter_b.next()) {
            (None, None) => {
                return SequenceDiff {
                    ok: true,
                    failed_index: None,
                    diffs,
                }
            }
            (Some(ga), Some(gb)) => compare_grain(&ga, &gb, options),
            (Some(ga), None) => existence_node(Some(&ga), None),
            (None, Some(gb)) => existence_node(None, Some(&gb)),
        };
        let ok = node.ok();
        if return_last_only {
            diffs.clear();
        }
        diffs.push((index, node));
        if !ok {
            return SequenceDiff {
                ok: false,
                failed_index: Some(index),
                diffs,
            };
        }
        index += 1;
    }
}

fn summarize(grain: &Grain) -> String {
    format!("{} grain, {} data bytes", grain.grain_type(), grain.data.len())
}

fn existence_node(a: Option<&Grain>, b: Option<&Grain>) -> DiffNode {
    let (a_text, b_text) = match (a, b) {
        (Some(ga), None) => (summarize(ga), "does not exist".to_string()),
        (None, Some(gb)) => ("does not exist".to_string(), summarize(gb)),
        _ => unreachable!("one side must exist"),
    };
    DiffNode {
        path: "grain".to_string(),
        kind: DiffKind::Different {
            a: a_text,
            b: b_text,
            reason: "sequences have different lengths".to_string(),
        },
        children: Vec::new(),
    }
}

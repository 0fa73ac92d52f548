use anyhow::{Result, anyhow, bail};
use serde::Deserialize;
use tracing::warn;

use crate::ooxml::package::{REL_TYPE_HYPERLINK, Relationships};
use crate::ooxml::text::{self, DRAWINGML_NS, PPR_ORDER, RPR_ORDER};
use crate::ooxml::{NodeId, XmlDocument};

const FILL_NAMES: &[&str] = &["noFill", "solidFill", "gradFill", "blipFill", "pattFill", "grpFill"];
const MIN_SIZE: u32 = 100;
const MAX_SIZE: u32 = 400_000;
const MAX_LEVEL: u8 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub fn from_hex(value: &str) -> Option<Self> {
        if value.len() != 6 || !value.is_ascii() {
            return None;
        }
        let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&value[range], 16).ok();
        Some(Self(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }

    pub fn to_hex(self) -> String {
        format!("{:02X}{:02X}{:02X}", self.0, self.1, self.2)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThemeColor {
    Background1,
    Background2,
    Text1,
    Text2,
    Dark1,
    Dark2,
    Light1,
    Light2,
    Accent(u8),
    Hyperlink,
    FollowedHyperlink,
    Placeholder,
}

impl ThemeColor {
    pub fn from_code(code: &str) -> Option<Self> {
        let color = match code {
            "bg1" => Self::Background1,
            "bg2" => Self::Background2,
            "tx1" => Self::Text1,
            "tx2" => Self::Text2,
            "dk1" => Self::Dark1,
            "dk2" => Self::Dark2,
            "lt1" => Self::Light1,
            "lt2" => Self::Light2,
            "hlink" => Self::Hyperlink,
            "folHlink" => Self::FollowedHyperlink,
            "phClr" => Self::Placeholder,
            other => {
                let n: u8 = other.strip_prefix("accent")?.parse().ok()?;
                if !(1..=6).contains(&n) {
                    return None;
                }
                Self::Accent(n)
            }
        };
        Some(color)
    }

    pub fn code(self) -> String {
        match self {
            Self::Background1 => "bg1".into(),
            Self::Background2 => "bg2".into(),
            Self::Text1 => "tx1".into(),
            Self::Text2 => "tx2".into(),
            Self::Dark1 => "dk1".into(),
            Self::Dark2 => "dk2".into(),
            Self::Light1 => "lt1".into(),
            Self::Light2 => "lt2".into(),
            Self::Accent(n) => format!("accent{}", n),
            Self::Hyperlink => "hlink".into(),
            Self::FollowedHyperlink => "folHlink".into(),
            Self::Placeholder => "phClr".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColorSpec {
    Rgb(Rgb),
    Theme { color: ThemeColor, brightness: f32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Underline {
    None,
    Single,
    Double,
    Other(String),
}

impl Underline {
    fn from_code(code: &str) -> Self {
        match code {
            "none" => Self::None,
            "sng" => Self::Single,
            "dbl" => Self::Double,
            other => Self::Other(other.to_string()),
        }
    }

    fn code(&self) -> &str {
        match self {
            Self::None => "none",
            Self::Single => "sng",
            Self::Double => "dbl",
            Self::Other(code) => code,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LanguageTag {
    Known(String),
    Unspecified,
}

impl LanguageTag {
    pub fn parse(value: &str) -> Self {
        let mut parts = value.split('-');
        let primary_ok = parts
            .next()
            .map(|p| (2..=3).contains(&p.len()) && p.chars().all(|c| c.is_ascii_alphabetic()))
            .unwrap_or(false);
        let rest_ok = parts.all(|p| (1..=8).contains(&p.len()) && p.chars().all(|c| c.is_ascii_alphanumeric()));
        if primary_ok && rest_ok {
            Self::Known(value.to_string())
        } else {
            Self::Unspecified
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStyle {
    pub font_family: Option<String>,
    /// Hundredths of a point.
    pub size: Option<u32>,
    pub bold: Option<bool>,
    pub italic: Option<bool>,
    pub underline: Option<Underline>,
    pub color: Option<ColorSpec>,
    pub language: Option<LanguageTag>,
    pub hyperlink: Option<String>,
}

impl RunStyle {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn without_hyperlink(&self) -> Self {
        Self {
            hyperlink: None,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    Left,
    Center,
    Right,
    Justify,
    JustifyLow,
    Distributed,
    ThaiDistributed,
}

impl Alignment {
    fn from_code(code: &str) -> Option<Self> {
        Some(match code {
            "l" => Self::Left,
            "ctr" => Self::Center,
            "r" => Self::Right,
            "just" => Self::Justify,
            "justLow" => Self::JustifyLow,
            "dist" => Self::Distributed,
            "thaiDist" => Self::ThaiDistributed,
            _ => return None,
        })
    }

    fn code(self) -> &'static str {
        match self {
            Self::Left => "l",
            Self::Center => "ctr",
            Self::Right => "r",
            Self::Justify => "just",
            Self::JustifyLow => "justLow",
            Self::Distributed => "dist",
            Self::ThaiDistributed => "thaiDist",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Spacing {
    /// Hundredths of a point (`a:spcPts`).
    Points(i32),
    /// Thousandths of a percent (`a:spcPct`).
    Percent(i32),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParagraphStyle {
    pub alignment: Option<Alignment>,
    pub level: Option<u8>,
    pub space_before: Option<Spacing>,
    pub space_after: Option<Spacing>,
    pub line_spacing: Option<Spacing>,
    pub default_run: RunStyle,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowTemplate {
    #[default]
    Last,
    First,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParagraphTemplate {
    pub paragraph: ParagraphStyle,
    pub runs: Vec<RunStyle>,
}

impl ParagraphTemplate {
    pub fn run_style(&self) -> &RunStyle {
        self.runs.first().unwrap_or(&self.paragraph.default_run)
    }
}

/// `line_templates[i]` is the paragraph that line `i` of the frame text came from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StyleSnapshot {
    pub paragraphs: Vec<ParagraphTemplate>,
    pub line_templates: Vec<usize>,
}

impl StyleSnapshot {
    pub fn capture(doc: &XmlDocument, rels: &Relationships, body: NodeId) -> Self {
        let mut paragraphs = Vec::new();
        let mut line_templates = Vec::new();
        for (idx, paragraph) in text::paragraphs(doc, body).into_iter().enumerate() {
            let lines = text::paragraph_text(doc, paragraph).split('\n').count();
            line_templates.extend(std::iter::repeat_n(idx, lines));
            paragraphs.push(capture_template(doc, rels, paragraph));
        }
        Self {
            paragraphs,
            line_templates,
        }
    }

    pub fn template_for(&self, line: usize, policy: OverflowTemplate) -> Option<&ParagraphTemplate> {
        if let Some(template) = self
            .line_templates
            .get(line)
            .and_then(|idx| self.paragraphs.get(*idx))
        {
            return Some(template);
        }
        match policy {
            OverflowTemplate::Last => self.paragraphs.last(),
            OverflowTemplate::First => self.paragraphs.first(),
        }
    }
}

fn capture_template(doc: &XmlDocument, rels: &Relationships, paragraph: NodeId) -> ParagraphTemplate {
    let style = capture_paragraph_style(doc, rels, paragraph);
    let mut runs: Vec<RunStyle> = text::runs(doc, paragraph)
        .into_iter()
        .map(|r| capture_run_style(doc, rels, text::run_properties(doc, r)))
        .collect();
    if runs.is_empty() && !text::paragraph_text(doc, paragraph).is_empty() {
        runs.push(style.default_run.without_hyperlink());
    }
    ParagraphTemplate {
        paragraph: style,
        runs,
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "true" | "on" => Some(true),
        "0" | "false" | "off" => Some(false),
        _ => None,
    }
}

pub fn capture_run_style(doc: &XmlDocument, rels: &Relationships, props: Option<NodeId>) -> RunStyle {
    let Some(props) = props else {
        return RunStyle::default();
    };
    let size = doc.attr(props, "sz").and_then(|v| v.parse::<u32>().ok());
    let font_family = doc
        .first_child_named(props, "latin")
        .and_then(|latin| doc.attr(latin, "typeface"))
        .filter(|face| !face.is_empty())
        .map(str::to_string);
    let hyperlink = doc
        .first_child_named(props, "hlinkClick")
        .and_then(|link| doc.attr_local(link, "id"))
        .and_then(|id| rels.get(id))
        .filter(|rel| rel.external)
        .map(|rel| rel.target.clone());

    RunStyle {
        font_family,
        size,
        bold: doc.attr(props, "b").and_then(parse_bool),
        italic: doc.attr(props, "i").and_then(parse_bool),
        underline: doc.attr(props, "u").map(Underline::from_code),
        color: capture_color(doc, props),
        language: doc.attr(props, "lang").map(LanguageTag::parse),
        hyperlink,
    }
}

fn capture_color(doc: &XmlDocument, props: NodeId) -> Option<ColorSpec> {
    let fill = doc.first_child_named(props, "solidFill")?;
    if let Some(srgb) = doc.first_child_named(fill, "srgbClr") {
        return doc.attr(srgb, "val").and_then(Rgb::from_hex).map(ColorSpec::Rgb);
    }
    let scheme = doc.first_child_named(fill, "schemeClr")?;
    let color = ThemeColor::from_code(doc.attr(scheme, "val")?)?;
    let modifier = |name: &str| {
        doc.first_child_named(scheme, name)
            .and_then(|node| doc.attr(node, "val"))
            .and_then(|v| v.parse::<f32>().ok())
            .map(|v| v / 100_000.0)
    };
    let brightness = match (modifier("lumMod"), modifier("lumOff")) {
        (_, Some(offset)) => offset,
        (Some(factor), None) => factor - 1.0,
        (None, None) => 0.0,
    };
    Some(ColorSpec::Theme { color, brightness })
}

pub fn capture_paragraph_style(doc: &XmlDocument, rels: &Relationships, paragraph: NodeId) -> ParagraphStyle {
    let default_run = capture_run_style(doc, rels, text::default_run_properties(doc, paragraph));
    let Some(ppr) = text::paragraph_properties(doc, paragraph) else {
        return ParagraphStyle {
            default_run,
            ..ParagraphStyle::default()
        };
    };
    let spacing = |name: &str| {
        let node = doc.first_child_named(ppr, name)?;
        if let Some(pct) = doc.first_child_named(node, "spcPct") {
            return doc.attr(pct, "val")?.parse().ok().map(Spacing::Percent);
        }
        let pts = doc.first_child_named(node, "spcPts")?;
        doc.attr(pts, "val")?.parse().ok().map(Spacing::Points)
    };
    ParagraphStyle {
        alignment: doc.attr(ppr, "algn").and_then(Alignment::from_code),
        level: doc
            .attr(ppr, "lvl")
            .and_then(|v| v.parse::<u8>().ok())
            .filter(|lvl| *lvl <= MAX_LEVEL),
        space_before: spacing("spcBef"),
        space_after: spacing("spcAft"),
        line_spacing: spacing("lnSpc"),
        default_run,
    }
}

/// Returns how many fields could not be written.
pub fn apply_run_style(
    doc: &mut XmlDocument,
    rels: &mut Relationships,
    props: NodeId,
    style: &RunStyle,
) -> usize {
    let mut failures = 0usize;
    let mut record = |field: &str, result: Result<()>| {
        if let Err(err) = result {
            warn!("style: failed to apply {}: {}", field, err);
            failures += 1;
        }
    };

    if let Some(family) = &style.font_family {
        record("font family", set_font_family(doc, props, family));
    }
    if let Some(size) = style.size {
        record("size", set_size(doc, props, size));
    }
    if let Some(bold) = style.bold {
        doc.set_attr(props, "b", if bold { "1" } else { "0" });
    }
    if let Some(italic) = style.italic {
        doc.set_attr(props, "i", if italic { "1" } else { "0" });
    }
    if let Some(underline) = &style.underline {
        doc.set_attr(props, "u", underline.code());
    }
    if let Some(color) = &style.color {
        record("color", set_color(doc, props, color));
    }
    if let Some(LanguageTag::Known(tag)) = &style.language {
        record("language", set_language(doc, props, tag));
    }
    if let Some(url) = &style.hyperlink {
        record("hyperlink", set_hyperlink(doc, rels, props, url));
    }
    failures
}

fn set_font_family(doc: &mut XmlDocument, props: NodeId, family: &str) -> Result<()> {
    if family.trim().is_empty() {
        bail!("empty font family");
    }
    let name = doc.qualify(DRAWINGML_NS, "a", "latin");
    let latin = doc.ensure_child(props, &name, RPR_ORDER);
    doc.set_attr(latin, "typeface", family);
    Ok(())
}

fn set_size(doc: &mut XmlDocument, props: NodeId, size: u32) -> Result<()> {
    if !(MIN_SIZE..=MAX_SIZE).contains(&size) {
        bail!("font size {} out of range", size);
    }
    doc.set_attr(props, "sz", size.to_string());
    Ok(())
}

fn set_language(doc: &mut XmlDocument, props: NodeId, tag: &str) -> Result<()> {
    if LanguageTag::parse(tag) == LanguageTag::Unspecified {
        bail!("invalid language tag {:?}", tag);
    }
    doc.set_attr(props, "lang", tag);
    Ok(())
}

fn set_color(doc: &mut XmlDocument, props: NodeId, color: &ColorSpec) -> Result<()> {
    if let ColorSpec::Theme { brightness, .. } = color {
        if !(-1.0..=1.0).contains(brightness) {
            return Err(anyhow!("brightness {} out of range", brightness));
        }
    }
    doc.remove_children_named(props, FILL_NAMES);
    let fill_name = doc.qualify(DRAWINGML_NS, "a", "solidFill");
    let fill = doc.create_element(&fill_name);
    doc.insert_ordered(props, fill, RPR_ORDER);
    match color {
        ColorSpec::Rgb(rgb) => {
            let name = doc.qualify(DRAWINGML_NS, "a", "srgbClr");
            let node = doc.create_element(&name);
            doc.set_attr(node, "val", rgb.to_hex());
            doc.append_child(fill, node);
        }
        ColorSpec::Theme { color, brightness } => {
            let name = doc.qualify(DRAWINGML_NS, "a", "schemeClr");
            let node = doc.create_element(&name);
            doc.set_attr(node, "val", color.code());
            doc.append_child(fill, node);
            let brightness = *brightness;
            if brightness > 0.0 {
                append_modifier(doc, node, "lumMod", 1.0 - brightness);
                append_modifier(doc, node, "lumOff", brightness);
            } else if brightness < 0.0 {
                append_modifier(doc, node, "lumMod", 1.0 + brightness);
            }
        }
    }
    Ok(())
}

fn append_modifier(doc: &mut XmlDocument, parent: NodeId, local: &str, value: f32) {
    let name = doc.qualify(DRAWINGML_NS, "a", local);
    let node = doc.create_element(&name);
    doc.set_attr(node, "val", ((value * 100_000.0).round() as i64).to_string());
    doc.append_child(parent, node);
}

fn set_hyperlink(doc: &mut XmlDocument, rels: &mut Relationships, props: NodeId, url: &str) -> Result<()> {
    if url.trim().is_empty() {
        bail!("empty hyperlink target");
    }
    doc.remove_children_named(props, &["hlinkClick"]);
    let rel_id = match rels.find_external(REL_TYPE_HYPERLINK, url) {
        Some(rel) => rel.id.clone(),
        None => rels.add(REL_TYPE_HYPERLINK, url, true),
    };
    let name = doc.qualify(DRAWINGML_NS, "a", "hlinkClick");
    let link = doc.create_element(&name);
    let key = text::rel_attr(doc, "id");
    doc.set_attr(link, &key, rel_id);
    doc.insert_ordered(props, link, RPR_ORDER);
    Ok(())
}

pub fn apply_paragraph_style(
    doc: &mut XmlDocument,
    rels: &mut Relationships,
    paragraph: NodeId,
    style: &ParagraphStyle,
) -> usize {
    let has_layout = style.alignment.is_some()
        || style.level.is_some()
        || style.space_before.is_some()
        || style.space_after.is_some()
        || style.line_spacing.is_some();
    let mut failures = 0;
    if has_layout {
        let ppr = text::ensure_paragraph_properties(doc, paragraph);
        if let Some(alignment) = style.alignment {
            doc.set_attr(ppr, "algn", alignment.code());
        }
        if let Some(level) = style.level {
            if level <= MAX_LEVEL {
                doc.set_attr(ppr, "lvl", level.to_string());
            } else {
                warn!("style: indent level {} out of range", level);
                failures += 1;
            }
        }
        for (local, value) in [
            ("lnSpc", style.line_spacing),
            ("spcBef", style.space_before),
            ("spcAft", style.space_after),
        ] {
            if let Some(value) = value {
                set_spacing(doc, ppr, local, value);
            }
        }
    }
    if !style.default_run.is_empty() {
        let defaults = text::ensure_default_run_properties(doc, paragraph);
        failures += apply_run_style(doc, rels, defaults, &style.default_run);
    }
    failures
}

fn set_spacing(doc: &mut XmlDocument, ppr: NodeId, local: &str, value: Spacing) {
    let name = doc.qualify(DRAWINGML_NS, "a", local);
    let node = doc.ensure_child(ppr, &name, PPR_ORDER);
    doc.clear_children(node);
    let (child, val) = match value {
        Spacing::Percent(v) => ("spcPct", v),
        Spacing::Points(v) => ("spcPts", v),
    };
    let child_name = doc.qualify(DRAWINGML_NS, "a", child);
    let child = doc.create_element(&child_name);
    doc.set_attr(child, "val", val.to_string());
    doc.append_child(node, child);
}

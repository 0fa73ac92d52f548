use crate::ooxml::{NodeId, XmlDocument};

pub const STANDARD_CHART_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/chart";
pub const EXTENDED_CHART_NS: &str = "http://schemas.microsoft.com/office/drawing/2014/chartex";

pub trait ChartDialect: Send + Sync {
    fn name(&self) -> &'static str;
    fn locate_title(&self, doc: &XmlDocument) -> Vec<NodeId>;
    fn locate_axis_titles(&self, doc: &XmlDocument) -> Vec<NodeId>;
    fn locate_series(&self, doc: &XmlDocument) -> Vec<NodeId>;
    fn locate_categories(&self, doc: &XmlDocument) -> Vec<NodeId>;
    fn locate_data_labels(&self, doc: &XmlDocument) -> Vec<NodeId>;

    fn text_nodes(&self, doc: &XmlDocument) -> Vec<NodeId> {
        let mut seen = std::collections::HashSet::new();
        let mut nodes = Vec::new();
        for found in [
            self.locate_title(doc),
            self.locate_axis_titles(doc),
            self.locate_series(doc),
            self.locate_categories(doc),
            self.locate_data_labels(doc),
        ] {
            for node in found {
                if seen.insert(node) {
                    nodes.push(node);
                }
            }
        }
        nodes
    }
}

pub fn detect(doc: &XmlDocument) -> Option<Box<dyn ChartDialect>> {
    match doc.namespace_of(doc.root())? {
        STANDARD_CHART_NS => Some(Box::new(StandardChart)),
        EXTENDED_CHART_NS => Some(Box::new(ExtendedChart)),
        _ => None,
    }
}

fn leaves(doc: &XmlDocument, scopes: &[NodeId], locals: &[&str]) -> Vec<NodeId> {
    let mut out = Vec::new();
    for scope in scopes {
        let mut found: Vec<NodeId> = locals
            .iter()
            .flat_map(|local| doc.descendants_named(*scope, local))
            .collect();
        found.sort();
        out.extend(found);
    }
    out
}

fn children_at(doc: &XmlDocument, parent: Option<NodeId>, locals: &[&str]) -> Vec<NodeId> {
    let Some(parent) = parent else {
        return Vec::new();
    };
    doc.child_elements(parent)
        .filter(|child| locals.contains(&doc.local_name(*child)))
        .collect()
}

pub struct StandardChart;

impl StandardChart {
    fn plot_area(doc: &XmlDocument) -> Option<NodeId> {
        doc.find_path(doc.root(), &["chart", "plotArea"])
    }

    fn series(doc: &XmlDocument) -> Vec<NodeId> {
        let Some(plot) = Self::plot_area(doc) else {
            return Vec::new();
        };
        doc.child_elements(plot)
            .filter(|group| doc.local_name(*group).ends_with("Chart"))
            .flat_map(|group| doc.children_named(group, "ser"))
            .collect()
    }
}

impl ChartDialect for StandardChart {
    fn name(&self) -> &'static str {
        "standard"
    }

    fn locate_title(&self, doc: &XmlDocument) -> Vec<NodeId> {
        let titles = children_at(doc, doc.first_child_named(doc.root(), "chart"), &["title"]);
        leaves(doc, &titles, &["t", "v"])
    }

    fn locate_axis_titles(&self, doc: &XmlDocument) -> Vec<NodeId> {
        let axes = children_at(doc, Self::plot_area(doc), &["catAx", "valAx", "dateAx", "serAx"]);
        let titles: Vec<NodeId> = axes
            .into_iter()
            .filter_map(|axis| doc.first_child_named(axis, "title"))
            .collect();
        leaves(doc, &titles, &["t", "v"])
    }

    fn locate_series(&self, doc: &XmlDocument) -> Vec<NodeId> {
        let names: Vec<NodeId> = Self::series(doc)
            .into_iter()
            .filter_map(|ser| doc.first_child_named(ser, "tx"))
            .collect();
        leaves(doc, &names, &["v", "t"])
    }

    fn locate_categories(&self, doc: &XmlDocument) -> Vec<NodeId> {
        let categories: Vec<NodeId> = Self::series(doc)
            .into_iter()
            .filter_map(|ser| doc.first_child_named(ser, "cat"))
            .collect();
        leaves(doc, &categories, &["v"])
    }

    fn locate_data_labels(&self, doc: &XmlDocument) -> Vec<NodeId> {
        let labels: Vec<NodeId> = Self::series(doc)
            .into_iter()
            .filter_map(|ser| doc.first_child_named(ser, "dLbls"))
            .flat_map(|dlbls| doc.children_named(dlbls, "dLbl"))
            .collect();
        leaves(doc, &labels, &["t"])
    }
}

/// `cx:chartSpace` (chart extension schema used by waterfall, treemap, ...).
pub struct ExtendedChart;

impl ExtendedChart {
    fn series(doc: &XmlDocument) -> Vec<NodeId> {
        doc.find_path(doc.root(), &["chart", "plotArea", "plotAreaRegion"])
            .map(|region| doc.children_named(region, "series"))
            .unwrap_or_default()
    }
}

impl ChartDialect for ExtendedChart {
    fn name(&self) -> &'static str {
        "extended"
    }

    fn locate_title(&self, doc: &XmlDocument) -> Vec<NodeId> {
        let titles = children_at(doc, doc.first_child_named(doc.root(), "chart"), &["title"]);
        leaves(doc, &titles, &["t", "v"])
    }

    fn locate_axis_titles(&self, doc: &XmlDocument) -> Vec<NodeId> {
        let plot = doc.find_path(doc.root(), &["chart", "plotArea"]);
        let titles: Vec<NodeId> = children_at(doc, plot, &["axis"])
            .into_iter()
            .filter_map(|axis| doc.first_child_named(axis, "title"))
            .collect();
        leaves(doc, &titles, &["t", "v"])
    }

    fn locate_series(&self, doc: &XmlDocument) -> Vec<NodeId> {
        let names: Vec<NodeId> = Self::series(doc)
            .into_iter()
            .filter_map(|series| doc.first_child_named(series, "tx"))
            .collect();
        leaves(doc, &names, &["v"])
    }

    fn locate_categories(&self, doc: &XmlDocument) -> Vec<NodeId> {
        let dims: Vec<NodeId> = doc
            .find_path(doc.root(), &["chartData"])
            .map(|data| {
                doc.children_named(data, "data")
                    .into_iter()
                    .flat_map(|entry| doc.children_named(entry, "strDim"))
                    .collect()
            })
            .unwrap_or_default();
        leaves(doc, &dims, &["pt"])
    }

    fn locate_data_labels(&self, doc: &XmlDocument) -> Vec<NodeId> {
        let labels: Vec<NodeId> = Self::series(doc)
            .into_iter()
            .filter_map(|series| doc.first_child_named(series, "dataLabels"))
            .collect();
        leaves(doc, &labels, &["t"])
    }
}

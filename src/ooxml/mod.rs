pub mod package;
pub mod presentation;
pub mod text;
pub mod xml;

pub use package::{Package, Relationship, Relationships};
pub use presentation::{Presentation, ShapeKind, ShapeRef, Slide, TableCell};
pub use xml::{NodeId, XmlDocument};

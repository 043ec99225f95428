//! Presentation items.
//!
//! An [`Item`] is the canvas side of a presentation node: its matrix, its
//! handles and ports, and variant state such as `combined`. The variants
//! (boxed element, line, fork/join bar) each implement the capability
//! traits below; [`Shape`] dispatches to them.

use crate::config::ItemDefaults;
use crate::error::EditorError;
use crate::persist::PersistValue;
use crate::watcher::WatchPath;
use serde::{Deserialize, Serialize};
use smallvec::{SmallVec, smallvec};
use umbra_canvas::{Canvas, Constraint, Handle, HandleId, Port, Strength};
use umbra_core::geometry::{Matrix, Point};
use umbra_core::{ElementId, ElementType};

/// Type name shared by every presentation node.
pub const PRESENTATION_TYPE: &str = "Presentation";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemKind {
    /// A resizable box with four corner handles.
    Element,
    /// A line with a head and a tail handle.
    Line,
    /// A fork/join bar.
    Fork,
}

impl ItemKind {
    pub fn type_name(self) -> &'static str {
        match self {
            ItemKind::Element => "ElementItem",
            ItemKind::Line => "LineItem",
            ItemKind::Fork => "ForkNodeItem",
        }
    }

    /// Element type of the presentation node in the element graph.
    pub fn element_type(self) -> ElementType {
        ElementType::new(self.type_name()).extends(PRESENTATION_TYPE)
    }
}

// ─── Capabilities ────────────────────────────────────────────────────────

/// Geometry: where handles start, which ports and constraints they carry.
pub trait HasHandles {
    /// Handle positions in item coordinates for a fresh item.
    fn default_points(&self, defaults: &ItemDefaults) -> SmallVec<[Point; 4]>;

    fn movable(&self) -> bool {
        true
    }

    fn connectable(&self) -> bool {
        false
    }

    fn ports(&self, handles: &[Handle]) -> SmallVec<[Port; 4]>;

    fn constraints(&self, handles: &[Handle]) -> SmallVec<[Constraint; 6]>;
}

/// Items bound to a subject redraw when the subject link changes.
pub trait HasSubject {
    fn subject_paths(&self) -> Vec<WatchPath> {
        vec![WatchPath::subject()]
    }
}

/// Items that show their subject's name and stereotypes.
pub trait HasName: HasSubject {
    fn name_paths(&self) -> Vec<WatchPath> {
        vec![
            WatchPath::subject().of_type("NamedElement").then("name"),
            WatchPath::subject()
                .then("appliedStereotype")
                .then("classifier")
                .then("name"),
        ]
    }
}

// ─── Variants ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct ElementShape {
    pub min_width: f64,
    pub min_height: f64,
    pub combined: Option<String>,
}

impl HasHandles for ElementShape {
    fn default_points(&self, defaults: &ItemDefaults) -> SmallVec<[Point; 4]> {
        let (w, h) = (defaults.width, defaults.height);
        smallvec![
            Point::new(0.0, 0.0),
            Point::new(w, 0.0),
            Point::new(w, h),
            Point::new(0.0, h),
        ]
    }

    fn ports(&self, handles: &[Handle]) -> SmallVec<[Port; 4]> {
        let [nw, ne, se, sw] = corners(handles);
        smallvec![
            Port::line("top", nw, ne),
            Port::line("right", ne, se),
            Port::line("bottom", se, sw),
            Port::line("left", sw, nw),
        ]
    }

    fn constraints(&self, handles: &[Handle]) -> SmallVec<[Constraint; 6]> {
        let [nw, ne, se, sw] = corners(handles);
        smallvec![
            Constraint::horizontal(nw, ne),
            Constraint::vertical(nw, sw),
            Constraint::horizontal(se, sw),
            Constraint::vertical(se, ne),
            Constraint::LessThan {
                smaller: nw.x,
                bigger: ne.x,
                delta: self.min_width,
            },
            Constraint::above(nw, sw, self.min_height),
        ]
    }
}

impl HasSubject for ElementShape {}
impl HasName for ElementShape {}

fn corners(handles: &[Handle]) -> [umbra_canvas::Pos; 4] {
    [
        handles[0].pos,
        handles[1].pos,
        handles[2].pos,
        handles[3].pos,
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LineShape;

impl HasHandles for LineShape {
    fn default_points(&self, _defaults: &ItemDefaults) -> SmallVec<[Point; 4]> {
        smallvec![Point::new(0.0, 0.0), Point::new(10.0, 10.0)]
    }

    fn connectable(&self) -> bool {
        true
    }

    fn ports(&self, _handles: &[Handle]) -> SmallVec<[Port; 4]> {
        SmallVec::new()
    }

    fn constraints(&self, _handles: &[Handle]) -> SmallVec<[Constraint; 6]> {
        SmallVec::new()
    }
}

impl HasSubject for LineShape {}

#[derive(Debug, Clone, PartialEq)]
pub struct ForkShape {
    pub min_height: f64,
    pub combined: Option<String>,
}

impl HasHandles for ForkShape {
    fn default_points(&self, defaults: &ItemDefaults) -> SmallVec<[Point; 4]> {
        smallvec![Point::new(0.0, 0.0), Point::new(0.0, defaults.fork_height)]
    }

    fn ports(&self, handles: &[Handle]) -> SmallVec<[Port; 4]> {
        smallvec![Port::line("bar", handles[0].pos, handles[1].pos)]
    }

    fn constraints(&self, handles: &[Handle]) -> SmallVec<[Constraint; 6]> {
        let (top, bottom) = (handles[0].pos, handles[1].pos);
        smallvec![
            Constraint::vertical(top, bottom),
            Constraint::above(top, bottom, self.min_height),
        ]
    }
}

impl HasSubject for ForkShape {}

impl HasName for ForkShape {
    fn name_paths(&self) -> Vec<WatchPath> {
        vec![
            WatchPath::subject().of_type("NamedElement").then("name"),
            WatchPath::subject()
                .then("appliedStereotype")
                .then("classifier")
                .then("name"),
            WatchPath::subject().of_type("JoinNode").then("joinSpec"),
        ]
    }
}

/// Tagged variant over the item kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Element(ElementShape),
    Line(LineShape),
    Fork(ForkShape),
}

impl Shape {
    pub fn new(kind: ItemKind, defaults: &ItemDefaults) -> Self {
        match kind {
            ItemKind::Element => Shape::Element(ElementShape {
                min_width: defaults.min_width,
                min_height: defaults.min_height,
                combined: None,
            }),
            ItemKind::Line => Shape::Line(LineShape),
            ItemKind::Fork => Shape::Fork(ForkShape {
                min_height: defaults.fork_min_height,
                combined: None,
            }),
        }
    }

    pub fn kind(&self) -> ItemKind {
        match self {
            Shape::Element(_) => ItemKind::Element,
            Shape::Line(_) => ItemKind::Line,
            Shape::Fork(_) => ItemKind::Fork,
        }
    }

    fn geometry(&self) -> &dyn HasHandles {
        match self {
            Shape::Element(s) => s,
            Shape::Line(s) => s,
            Shape::Fork(s) => s,
        }
    }

    /// Number of handles the variant is built with.
    pub fn handle_count(&self) -> usize {
        match self {
            Shape::Element(_) => 4,
            Shape::Line(_) | Shape::Fork(_) => 2,
        }
    }

    /// Paths every item of this variant watches by default.
    pub fn watch_paths(&self) -> Vec<WatchPath> {
        match self {
            Shape::Element(s) => [s.subject_paths(), s.name_paths()].concat(),
            Shape::Line(s) => s.subject_paths(),
            Shape::Fork(s) => [s.subject_paths(), s.name_paths()].concat(),
        }
    }

    pub fn combined(&self) -> Option<&str> {
        match self {
            Shape::Element(s) => s.combined.as_deref(),
            Shape::Fork(s) => s.combined.as_deref(),
            Shape::Line(_) => None,
        }
    }

    /// Replace `combined`, returning the old value. Lines have none.
    pub fn set_combined(&mut self, value: Option<String>) -> Option<Option<String>> {
        match self {
            Shape::Element(s) => Some(std::mem::replace(&mut s.combined, value)),
            Shape::Fork(s) => Some(std::mem::replace(&mut s.combined, value)),
            Shape::Line(_) => None,
        }
    }
}

// ─── Item ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub id: ElementId,
    pub diagram: ElementId,
    pub matrix: Matrix,
    handles: SmallVec<[Handle; 4]>,
    ports: SmallVec<[Port; 4]>,
    pub shape: Shape,
}

impl Item {
    /// Create the item's handles on `canvas`. `points` overrides the default
    /// layout and is given in item coordinates. Constraints are not added
    /// here; see [`constraints`](Self::constraints).
    pub fn setup(
        id: ElementId,
        diagram: ElementId,
        shape: Shape,
        matrix: Matrix,
        points: Option<&[Point]>,
        defaults: &ItemDefaults,
        canvas: &mut Canvas,
    ) -> Result<Self, EditorError> {
        let geometry = shape.geometry();
        let points: SmallVec<[Point; 4]> = match points {
            Some(points) => SmallVec::from_slice(points),
            None => geometry.default_points(defaults),
        };
        if points.len() != shape.handle_count() {
            return Err(EditorError::Load {
                name: "points".to_string(),
                reason: format!(
                    "{} expects {} handles, got {}",
                    shape.kind().type_name(),
                    shape.handle_count(),
                    points.len()
                ),
            });
        }

        let (movable, connectable) = (geometry.movable(), geometry.connectable());
        let handles: SmallVec<[Handle; 4]> = points
            .iter()
            .map(|p| canvas.add_handle(matrix * *p, Strength::Normal, movable, connectable))
            .collect();
        let ports = geometry.ports(&handles);
        Ok(Self {
            id,
            diagram,
            matrix,
            handles,
            ports,
            shape,
        })
    }

    pub fn kind(&self) -> ItemKind {
        self.shape.kind()
    }

    pub fn handles(&self) -> &[Handle] {
        &self.handles
    }

    pub fn ports(&self) -> &[Port] {
        &self.ports
    }

    pub fn handle(&self, id: HandleId) -> Option<&Handle> {
        self.handles.iter().find(|h| h.id == id)
    }

    /// First handle of a line.
    pub fn head(&self) -> Option<&Handle> {
        matches!(self.shape, Shape::Line(_))
            .then(|| self.handles.first())
            .flatten()
    }

    /// Last handle of a line.
    pub fn tail(&self) -> Option<&Handle> {
        matches!(self.shape, Shape::Line(_))
            .then(|| self.handles.last())
            .flatten()
    }

    pub fn constraints(&self) -> SmallVec<[Constraint; 6]> {
        self.shape.geometry().constraints(&self.handles)
    }

    /// Handle positions in canvas coordinates.
    pub fn positions(&self, canvas: &Canvas) -> Result<SmallVec<[Point; 4]>, EditorError> {
        self.handles
            .iter()
            .map(|h| canvas.position(h.id).map_err(EditorError::from))
            .collect()
    }

    /// Handle positions in item coordinates.
    pub fn local_points(&self, canvas: &Canvas) -> Result<SmallVec<[Point; 4]>, EditorError> {
        let inverse = self.matrix.inverse();
        Ok(self
            .positions(canvas)?
            .into_iter()
            .map(|p| inverse * p)
            .collect())
    }

    /// Emit the item's non-derivable state as name/value pairs.
    pub fn save(
        &self,
        canvas: &Canvas,
        subject: Option<ElementId>,
        emit: &mut dyn FnMut(&str, PersistValue),
    ) -> Result<(), EditorError> {
        emit("matrix", PersistValue::Matrix(self.matrix.as_coeffs()));
        let points = self.local_points(canvas)?;
        match &self.shape {
            Shape::Element(_) => {
                emit("width", PersistValue::Number(points[2].x - points[0].x));
                emit("height", PersistValue::Number(points[2].y - points[0].y));
            }
            Shape::Fork(_) => emit("height", PersistValue::Number(points[1].y - points[0].y)),
            Shape::Line(_) => {}
        }
        // Handle drags leave the matrix untouched.
        emit(
            "points",
            PersistValue::Points(points.iter().map(|p| (p.x, p.y)).collect()),
        );
        if let Some(combined) = self.shape.combined() {
            emit("combined", PersistValue::Text(combined.to_string()));
        }
        let ends = [("head-connection", self.head()), ("tail-connection", self.tail())];
        for (name, handle) in ends {
            if let Some(c) = handle.and_then(|h| canvas.connection(h.id)) {
                emit(
                    name,
                    PersistValue::Connection {
                        target: c.connected,
                        port: c.port,
                    },
                );
            }
        }
        if let Some(subject) = subject {
            emit("subject", PersistValue::Reference(subject));
        }
        Ok(())
    }
}

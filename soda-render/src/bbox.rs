//! First-rectangle bounding box extraction.
//!
//! The first page's content stream is interpreted into a small tree of
//! drawn primitives. Form XObjects become containers holding their own
//! primitives; everything else painted is either a rectangle or a curve.
//! The first rectangle in depth-first order marks the label column.

use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::pdf::{first_page, page_resources, resolve};

/// Nesting limit for Form XObjects.
const MAX_FORM_DEPTH: usize = 16;

const PAINT_OPERATORS: [&str; 9] = ["S", "s", "f", "F", "f*", "B", "B*", "b", "b*"];

const AXIS_EPSILON: f64 = 1e-6;

#[derive(Debug, Error)]
pub enum BboxError {
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),
    #[error("Document {path} has no pages")]
    NoPages { path: PathBuf },
    #[error("No rectangle found on the first page of {path}")]
    NotFound { path: PathBuf },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
    pub top: f64,
}

impl BoundingBox {
    pub fn new(left: f64, bottom: f64, right: f64, top: f64) -> Self {
        Self {
            left,
            bottom,
            right,
            top,
        }
    }

    fn from_points(points: &[(f64, f64)]) -> Option<Self> {
        let (&(x, y), rest) = points.split_first()?;
        let mut bbox = Self::new(x, y, x, y);
        for &(x, y) in rest {
            bbox.left = bbox.left.min(x);
            bbox.bottom = bbox.bottom.min(y);
            bbox.right = bbox.right.max(x);
            bbox.top = bbox.top.max(y);
        }
        Some(bbox)
    }

    /// Horizontal midpoint of the box, shifted one unit right. This is the
    /// boundary between the label column and the data column.
    pub fn label_column_width(&self) -> f64 {
        self.right - (self.right - self.left) / 2.0 + 1.0
    }
}

/// A drawn object on the page.
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Rect(BoundingBox),
    Curve(BoundingBox),
    Container(Vec<Primitive>),
}

/// First rectangle in depth-first, document order.
pub fn first_rect(primitives: &[Primitive]) -> Option<BoundingBox> {
    primitives.iter().find_map(|primitive| match primitive {
        Primitive::Rect(bbox) => Some(*bbox),
        Primitive::Curve(_) => None,
        Primitive::Container(children) => first_rect(children),
    })
}

/// Affine transform `[a b c d e f]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Matrix {
    pub const IDENTITY: Self = Self {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    fn from_operands(operands: &[Object]) -> Option<Self> {
        if operands.len() != 6 {
            return None;
        }
        let v: Vec<f64> = operands.iter().map(number).collect::<Option<_>>()?;
        Some(Self {
            a: v[0],
            b: v[1],
            c: v[2],
            d: v[3],
            e: v[4],
            f: v[5],
        })
    }

    /// `self` applied first, then `outer`.
    pub fn then(&self, outer: &Matrix) -> Matrix {
        Matrix {
            a: self.a * outer.a + self.b * outer.c,
            b: self.a * outer.b + self.b * outer.d,
            c: self.c * outer.a + self.d * outer.c,
            d: self.c * outer.b + self.d * outer.d,
            e: self.e * outer.a + self.f * outer.c + outer.e,
            f: self.e * outer.b + self.f * outer.d + outer.f,
        }
    }

    pub fn apply(&self, (x, y): (f64, f64)) -> (f64, f64) {
        (self.a * x + self.c * y + self.e, self.b * x + self.d * y + self.f)
    }
}

fn number(object: &Object) -> Option<f64> {
    match object {
        Object::Integer(value) => Some(*value as f64),
        Object::Real(value) => Some(f64::from(*value)),
        _ => None,
    }
}

/// One path construction segment, in user space.
#[derive(Debug, Clone)]
struct Segment {
    op: char,
    points: Vec<(f64, f64)>,
}

fn points(operands: &[Object]) -> Vec<(f64, f64)> {
    let values: Vec<f64> = operands.iter().filter_map(number).collect();
    values.chunks_exact(2).map(|pair| (pair[0], pair[1])).collect()
}

fn is_axis_aligned(p: &[(f64, f64)]) -> bool {
    let eq = |a: f64, b: f64| (a - b).abs() < AXIS_EPSILON;
    let [(x0, y0), (x1, y1), (x2, y2), (x3, y3)] = [p[0], p[1], p[2], p[3]];
    (eq(x0, x1) && eq(y1, y2) && eq(x2, x3) && eq(y3, y0))
        || (eq(y0, y1) && eq(x1, x2) && eq(y2, y3) && eq(x3, x0))
}

/// Turn a painted path into a primitive using the current transform.
fn classify(path: &[Segment], ctm: &Matrix) -> Option<Primitive> {
    let shape: String = path.iter().map(|segment| segment.op).collect();
    let device: Vec<(f64, f64)> = path
        .iter()
        .flat_map(|segment| segment.points.iter().map(|p| ctm.apply(*p)))
        .collect();
    let bbox = BoundingBox::from_points(&device)?;

    if shape == "mlllh" && device.len() == 4 && is_axis_aligned(&device) {
        Some(Primitive::Rect(bbox))
    } else {
        Some(Primitive::Curve(bbox))
    }
}

struct Interpreter<'a> {
    doc: &'a Document,
}

impl<'a> Interpreter<'a> {
    fn run(
        &self,
        content: &[u8],
        resources: Option<&'a Dictionary>,
        base: Matrix,
        depth: usize,
    ) -> Result<Vec<Primitive>, BboxError> {
        let content = Content::decode(content)?;
        let mut primitives = Vec::new();
        let mut ctm = base;
        let mut saved: Vec<Matrix> = Vec::new();
        let mut path: Vec<Segment> = Vec::new();

        for operation in &content.operations {
            let operands = operation.operands.as_slice();
            match operation.operator.as_str() {
                "q" => saved.push(ctm),
                "Q" => {
                    if let Some(previous) = saved.pop() {
                        ctm = previous;
                    }
                }
                "cm" => {
                    if let Some(m) = Matrix::from_operands(operands) {
                        ctm = m.then(&ctm);
                    }
                }
                "m" | "l" | "c" | "v" | "y" => {
                    let op = operation.operator.chars().next().unwrap_or('l');
                    path.push(Segment {
                        op,
                        points: points(operands),
                    });
                }
                "h" => path.push(Segment {
                    op: 'h',
                    points: Vec::new(),
                }),
                "re" => {
                    let v: Vec<f64> = operands.iter().filter_map(number).collect();
                    if let &[x, y, w, h] = v.as_slice() {
                        for (op, point) in [
                            ('m', (x, y)),
                            ('l', (x + w, y)),
                            ('l', (x + w, y + h)),
                            ('l', (x, y + h)),
                        ] {
                            path.push(Segment {
                                op,
                                points: vec![point],
                            });
                        }
                        path.push(Segment {
                            op: 'h',
                            points: Vec::new(),
                        });
                    }
                }
                "n" => path.clear(),
                op if PAINT_OPERATORS.contains(&op) => {
                    if let Some(primitive) = classify(&path, &ctm) {
                        primitives.push(primitive);
                    }
                    path.clear();
                }
                "Do" => {
                    if let Some(container) = self.form(operands, resources, &ctm, depth)? {
                        primitives.push(container);
                    }
                }
                _ => {}
            }
        }

        Ok(primitives)
    }

    fn form(
        &self,
        operands: &[Object],
        resources: Option<&'a Dictionary>,
        ctm: &Matrix,
        depth: usize,
    ) -> Result<Option<Primitive>, BboxError> {
        let Some(Object::Name(name)) = operands.first() else {
            return Ok(None);
        };
        let Some(xobjects) = resources
            .and_then(|r| r.get(b"XObject").ok())
            .map(|o| resolve(self.doc, o))
            .transpose()?
            .and_then(|o| o.as_dict().ok())
        else {
            return Ok(None);
        };
        let Ok(entry) = xobjects.get(name) else {
            return Ok(None);
        };
        let Object::Stream(stream) = resolve(self.doc, entry)? else {
            return Ok(None);
        };
        let is_form = matches!(stream.dict.get(b"Subtype"), Ok(Object::Name(subtype)) if subtype == b"Form");
        if !is_form {
            return Ok(None);
        }
        if depth >= MAX_FORM_DEPTH {
            log::warn!("Form XObject nesting deeper than {}; skipping", MAX_FORM_DEPTH);
            return Ok(None);
        }

        let matrix = stream
            .dict
            .get(b"Matrix")
            .ok()
            .and_then(|o| o.as_array().ok())
            .and_then(|values| Matrix::from_operands(values))
            .unwrap_or(Matrix::IDENTITY);
        let form_resources = match stream.dict.get(b"Resources") {
            Ok(object) => resolve(self.doc, object)?.as_dict().ok(),
            Err(_) => resources,
        };
        let data = stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone());

        let children = self.run(&data, form_resources, matrix.then(ctm), depth + 1)?;
        Ok(Some(Primitive::Container(children)))
    }
}

/// Primitive tree of the first page of `doc`.
pub fn first_page_primitives(doc: &Document) -> Result<Option<Vec<Primitive>>, BboxError> {
    let Some(page_id) = first_page(doc) else {
        return Ok(None);
    };
    let content = doc.get_page_content(page_id)?;
    let resources = page_resources(doc, page_id)?;
    let interpreter = Interpreter { doc };
    Ok(Some(interpreter.run(&content, resources, Matrix::IDENTITY, 0)?))
}

/// Bounding box of the first rectangle drawn on the first page of `path`.
pub fn extract_first_rect<P: AsRef<Path>>(path: P) -> Result<BoundingBox, BboxError> {
    let path = path.as_ref();
    let doc = Document::load(path)?;
    let primitives = first_page_primitives(&doc)?.ok_or_else(|| BboxError::NoPages {
        path: path.to_path_buf(),
    })?;
    log::trace!("{} top-level primitives on first page of {}", primitives.len(), path.display());

    let bbox = first_rect(&primitives).ok_or_else(|| BboxError::NotFound {
        path: path.to_path_buf(),
    })?;
    log::debug!(
        "First rectangle in {}: ({}, {}, {}, {})",
        path.display(),
        bbox.left,
        bbox.bottom,
        bbox.right,
        bbox.top
    );
    Ok(bbox)
}

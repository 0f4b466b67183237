use super::{split_path, Segment, Template};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    Collection,
    Document,
}

/// Could `path` have been produced by `template`?
///
/// The path must have exactly as many segments as the template (a collection
/// path) or one more (a document path). Literal segments must match, and
/// placeholders match any non-empty segment.
pub fn is_compatible(template: &Template, path: &str) -> bool {
    path_kind(template, path).is_some()
}

/// Tells collection paths from document paths, for paths compatible with the
/// template.
pub fn path_kind(template: &Template, path: &str) -> Option<PathKind> {
    if template.is_empty() {
        return None;
    }

    let parts = split_path(path);
    let kind = if parts.len() == template.len() {
        PathKind::Collection
    } else if parts.len() == template.len() + 1 {
        PathKind::Document
    } else {
        return None;
    };

    let matches = template
        .segments()
        .iter()
        .zip(parts.iter())
        .all(|(segment, part)| {
            !part.is_empty()
                && match segment {
                    Segment::Placeholder(_) => true,
                    Segment::Literal(lit) => lit == part,
                }
        });

    // the document id segment must not be empty either
    let id_ok = kind == PathKind::Collection || parts.last().is_some_and(|id| !id.is_empty());

    (matches && id_ok).then_some(kind)
}

use std::{collections::BTreeSet, fmt::Display, str::FromStr};

use crate::location::Location;

use super::{split_path, PathError, Segment, SEPARATOR};

/// Placeholder name linking a sub-collection to its parent document.
pub const PARENT_ID: &str = "parentId";

/// A parsed collection path template, e.g. `orgs/{orgId}/members`.
///
/// Never contains two placeholders with the same name.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    pub fn parse(template: &str) -> Result<Self, PathError> {
        let invalid = |reason: &str| PathError::InvalidTemplate {
            template: template.to_owned(),
            reason: reason.to_owned(),
        };

        let parts = split_path(template);
        if parts.is_empty() {
            return Err(invalid("template is empty"));
        }

        let mut seen = BTreeSet::new();
        let mut segments = Vec::with_capacity(parts.len());

        for part in parts {
            if part.is_empty() {
                return Err(invalid("empty segment"));
            }

            let segment = Segment::parse(part);
            match &segment {
                Segment::Placeholder(name) if name.is_empty() => {
                    return Err(invalid("empty placeholder name"))
                }
                Segment::Placeholder(name) if !seen.insert(name.clone()) => {
                    return Err(invalid(&format!("duplicate placeholder `{name}`")))
                }
                Segment::Literal(lit) if lit.contains(['{', '}']) => {
                    return Err(invalid(&format!("stray brace in `{lit}`")))
                }
                _ => {}
            }

            segments.push(segment);
        }

        Ok(Template { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Placeholder(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Turns the template and a location into a concrete path. The location id,
    /// if any, is appended as the last segment (a document path).
    pub fn resolve(&self, location: &Location) -> Result<String, PathError> {
        let mut path = self.collection_path(location)?;

        if let Some(id) = &location.id {
            check_value("id", id)?;
            path.push(SEPARATOR);
            path.push_str(id);
            check_braces(&path)?;
        }

        Ok(path)
    }

    /// Same as [`Template::resolve`], ignoring the location id.
    pub fn collection_path(&self, location: &Location) -> Result<String, PathError> {
        let mut parts = Vec::with_capacity(self.segments.len());

        for segment in &self.segments {
            parts.push(match segment {
                Segment::Literal(lit) => lit.clone(),
                Segment::Placeholder(name) => match location.get(name) {
                    Some(value) => {
                        check_value(name, value)?;
                        value.to_owned()
                    }
                    // left as `{name}` so the rescan below reports it
                    None => segment.to_string(),
                },
            });
        }

        // values can carry braces as well, so rescan the whole result
        let path = parts.join("/");
        check_braces(&path)?;

        Ok(path)
    }

    /// Inverse of [`Template::resolve`]: reads the placeholder values out of a
    /// concrete path. `id` is used as-is for the location id.
    ///
    /// Returns `None` for an empty path.
    pub fn extract_location(&self, path: &str, id: Option<&str>) -> Option<Location> {
        if path.is_empty() {
            return None;
        }

        let parts = split_path(path);
        let mut location = Location::default();
        location.id = id.map(str::to_owned);

        for (ix, segment) in self.segments.iter().enumerate() {
            if let (Segment::Placeholder(name), Some(value)) = (segment, parts.get(ix)) {
                location.set(name.clone(), *value);
            }
        }

        Some(location)
    }

    /// Template of a sub-collection living under each document of this one:
    /// `<self>/{parentId}/<sub_path>`.
    pub fn concat(&self, sub_path: &str) -> Result<Self, PathError> {
        Template::parse(&format!("{self}/{{{PARENT_ID}}}/{sub_path}"))
    }
}

impl Display for Template {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = self
            .segments
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join("/");

        f.write_str(&s)
    }
}

impl FromStr for Template {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Template::parse(s)
    }
}

/// A value must fill exactly one segment.
fn check_value(name: &str, value: &str) -> Result<(), PathError> {
    if value.is_empty() || value.contains(SEPARATOR) {
        return Err(PathError::InvalidValue {
            name: name.to_owned(),
            value: value.to_owned(),
        });
    }

    Ok(())
}

/// Fails on any `{` left in a resolved path. Every complete `{name}` is
/// reported; with none, the segments holding a stray brace are.
fn check_braces(path: &str) -> Result<(), PathError> {
    if !path.contains('{') {
        return Ok(());
    }

    let mut missing = unresolved_names(path);
    if missing.is_empty() {
        missing = split_path(path)
            .into_iter()
            .filter(|part| part.contains('{'))
            .map(str::to_owned)
            .collect();
    }

    Err(PathError::MissingPathSegment(missing))
}

/// Every `{name}` left in a path, in order of appearance. Names never span
/// segments.
fn unresolved_names(path: &str) -> Vec<String> {
    let mut names = vec![];

    for part in split_path(path) {
        let mut rest = part;

        while let Some(start) = rest.find('{') {
            let after = &rest[start + 1..];
            match after.find('}') {
                Some(end) if !after[..end].contains('{') => {
                    names.push(after[..end].to_owned());
                    rest = &after[end + 1..];
                }
                Some(_) => rest = after,
                None => break,
            }
        }
    }

    names
}

#[cfg(test)]
mod test {
    use crate::location::Location;

    use super::*;

    fn loc(pairs: &[(&str, &str)], id: Option<&str>) -> Location {
        let mut l = Location::default();
        for (k, v) in pairs {
            l.set(*k, *v);
        }
        l.id = id.map(str::to_owned);
        l
    }

    #[test]
    fn resolves_collection_and_document_paths() {
        let t = Template::parse("/orgs/{orgId}/members/").unwrap();

        assert_eq!(t.to_string(), "orgs/{orgId}/members");
        assert_eq!(
            t.resolve(&loc(&[("orgId", "acme")], None)).unwrap(),
            "orgs/acme/members"
        );
        assert_eq!(
            t.resolve(&loc(&[("orgId", "acme")], Some("bob"))).unwrap(),
            "orgs/acme/members/bob"
        );
    }

    #[test]
    fn reports_every_missing_segment() {
        let t = Template::parse("a/{x}/b/{y}").unwrap();

        assert_eq!(
            t.resolve(&loc(&[("x", "1")], None)),
            Err(PathError::MissingPathSegment(vec!["y".to_owned()]))
        );

        let t = Template::parse("a/{x}/b/{y}/c/{z}").unwrap();
        assert_eq!(
            t.resolve(&loc(&[("y", "2")], Some("doc"))),
            Err(PathError::MissingPathSegment(vec![
                "x".to_owned(),
                "z".to_owned()
            ]))
        );
    }

    #[test]
    fn braces_in_values_fail_resolution() {
        let t = Template::parse("a/{x}").unwrap();

        assert_eq!(
            t.resolve(&loc(&[("x", "{oops}")], None)),
            Err(PathError::MissingPathSegment(vec!["oops".to_owned()]))
        );
        assert_eq!(
            t.resolve(&loc(&[("x", "{oops")], None)),
            Err(PathError::MissingPathSegment(vec!["{oops".to_owned()]))
        );
        assert_eq!(
            t.resolve(&loc(&[("x", "ok")], Some("id{"))),
            Err(PathError::MissingPathSegment(vec!["id{".to_owned()]))
        );

        // complete names are still listed next to a stray brace
        let t = Template::parse("a/{x}/b/{y}").unwrap();
        assert_eq!(
            t.resolve(&loc(&[("x", "{oops")], None)),
            Err(PathError::MissingPathSegment(vec!["y".to_owned()]))
        );
    }

    #[test]
    fn values_fill_exactly_one_segment() {
        let t = Template::parse("a/{x}/d").unwrap();

        assert_eq!(
            t.resolve(&loc(&[("x", "b/c")], None)),
            Err(PathError::InvalidValue {
                name: "x".to_owned(),
                value: "b/c".to_owned()
            })
        );
        assert!(matches!(
            t.collection_path(&loc(&[("x", "")], None)),
            Err(PathError::InvalidValue { ref name, .. }) if name == "x"
        ));
        assert!(matches!(
            t.resolve(&loc(&[("x", "b")], Some("e/f"))),
            Err(PathError::InvalidValue { ref name, .. }) if name == "id"
        ));
        assert!(matches!(
            t.resolve(&loc(&[("x", "b")], Some(""))),
            Err(PathError::InvalidValue { .. })
        ));
    }

    #[test]
    fn extracts_location() {
        let t = Template::parse("orgs/{orgId}/teams/{teamId}/members").unwrap();

        let l = t
            .extract_location("orgs/acme/teams/red/members/bob", Some("bob"))
            .unwrap();
        assert_eq!(l, loc(&[("orgId", "acme"), ("teamId", "red")], Some("bob")));

        let short = t.extract_location("orgs/acme", None).unwrap();
        assert_eq!(short, loc(&[("orgId", "acme")], None));

        assert_eq!(t.extract_location("", Some("x")), None);
    }

    #[test]
    fn rejects_bad_templates() {
        for bad in ["", "/", "a/{x}/{x}", "a//b", "a/{}/b", "a/b{x}"] {
            assert!(
                matches!(Template::parse(bad), Err(PathError::InvalidTemplate { .. })),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn concat_builds_sub_collection_template() {
        let t = Template::parse("orgs/{orgId}/members").unwrap();
        let sub = t.concat("private").unwrap();

        assert_eq!(sub.to_string(), "orgs/{orgId}/members/{parentId}/private");
        assert_eq!(
            sub.resolve(&loc(&[("orgId", "acme"), ("parentId", "bob")], Some("d1")))
                .unwrap(),
            "orgs/acme/members/bob/private/d1"
        );

        assert!(t.concat("members/{orgId}").is_err());
    }
}

//! XPath location paths
//!
//! Supports the subset anchors use: absolute and relative paths, `//`,
//! `.`/`..`, name tests and `*`, and the predicates `[n]`, `[last()]`,
//! `[@attr]` and `[@attr='value']`. Evaluation yields the first node in
//! document order, like `FIRST_ORDERED_NODE_TYPE`.

use crate::dom::{selector, Dom};
use crate::error::LocatorError;

#[derive(Debug, Clone, PartialEq)]
pub struct LocationPath {
    pub absolute: bool,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// `name[...]` or `*[...]` on the child axis
    Child { name: Option<String>, predicates: Vec<Predicate> },
    /// Expansion of `//`
    DescendantOrSelf,
    SelfNode,
    Parent,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Position(usize),
    Last,
    HasAttribute(String),
    AttributeEquals(String, String),
}

// =============================================================================
// Parser
// =============================================================================

pub fn parse(expression: &str) -> Result<LocationPath, LocatorError> {
    let err = |reason: &str| LocatorError::xpath(expression, reason);
    let src = expression.trim();
    if src.is_empty() {
        return Err(err("empty expression"));
    }

    let chars: Vec<char> = src.chars().collect();
    let mut pos = 0;
    let mut steps = Vec::new();
    let absolute = chars[0] == '/';

    // bare "/" selects the document node
    if src == "/" {
        return Ok(LocationPath {
            absolute: true,
            steps,
        });
    }

    let mut expect_step = true;
    while pos < chars.len() {
        if chars[pos] == '/' {
            if pos + 1 < chars.len() && chars[pos + 1] == '/' {
                steps.push(Step::DescendantOrSelf);
                pos += 2;
            } else {
                pos += 1;
            }
            if pos >= chars.len() {
                return Err(err("expected step after `/`"));
            }
            expect_step = true;
            continue;
        }
        if !expect_step {
            return Err(err(&format!("unexpected `{}`", chars[pos])));
        }

        if chars[pos] == '.' {
            if pos + 1 < chars.len() && chars[pos + 1] == '.' {
                steps.push(Step::Parent);
                pos += 2;
            } else {
                steps.push(Step::SelfNode);
                pos += 1;
            }
            expect_step = false;
            continue;
        }

        let name = if chars[pos] == '*' {
            pos += 1;
            None
        } else {
            let start = pos;
            while pos < chars.len() && is_name_char(chars[pos]) {
                pos += 1;
            }
            if start == pos {
                return Err(err(&format!("expected node test, found `{}`", chars[pos])));
            }
            let name: String = chars[start..pos].iter().collect();
            // explicit axis syntax is outside the supported subset
            if pos < chars.len() && (chars[pos] == ':' || chars[pos] == '(') {
                return Err(err(&format!("unsupported axis or function `{}`", name)));
            }
            Some(name.to_ascii_lowercase())
        };

        let mut predicates = Vec::new();
        while pos < chars.len() && chars[pos] == '[' {
            let close = chars[pos..]
                .iter()
                .position(|&c| c == ']')
                .map(|i| pos + i)
                .ok_or_else(|| err("unterminated predicate"))?;
            let body: String = chars[pos + 1..close].iter().collect();
            predicates.push(parse_predicate(body.trim()).ok_or_else(|| err(&format!("unsupported predicate [{}]", body)))?);
            pos = close + 1;
        }

        steps.push(Step::Child { name, predicates });
        expect_step = false;
    }

    Ok(LocationPath { absolute, steps })
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_' || c == '.'
}

fn parse_predicate(body: &str) -> Option<Predicate> {
    if body == "last()" {
        return Some(Predicate::Last);
    }
    if let Ok(n) = body.parse::<usize>() {
        return Some(Predicate::Position(n));
    }
    let attr = body.strip_prefix('@')?;
    match attr.split_once('=') {
        None => {
            let name = attr.trim();
            (!name.is_empty() && name.chars().all(is_name_char)).then(|| Predicate::HasAttribute(name.to_string()))
        }
        Some((name, value)) => {
            let name = name.trim();
            let value = value.trim();
            let quote = value.chars().next()?;
            if !(quote == '\'' || quote == '"') || value.len() < 2 || !value.ends_with(quote) {
                return None;
            }
            if name.is_empty() || !name.chars().all(is_name_char) {
                return None;
            }
            Some(Predicate::AttributeEquals(
                name.to_string(),
                value[1..value.len() - 1].to_string(),
            ))
        }
    }
}

// =============================================================================
// Evaluation
// =============================================================================

/// Context node: the document itself or an element
#[derive(Debug, Clone, PartialEq)]
enum Ctx<N> {
    Document,
    Element(N),
}

pub fn evaluate_first<D: Dom + ?Sized>(dom: &D, expression: &str) -> Result<Option<D::Node>, LocatorError> {
    let path = parse(expression)?;
    let mut contexts: Vec<Ctx<D::Node>> = vec![Ctx::Document];

    for step in &path.steps {
        let mut next: Vec<Ctx<D::Node>> = Vec::new();
        for ctx in &contexts {
            match step {
                Step::SelfNode => push_unique(&mut next, ctx.clone()),
                Step::Parent => {
                    if let Ctx::Element(n) = ctx {
                        match dom.parent_element(n) {
                            Some(p) => push_unique(&mut next, Ctx::Element(p)),
                            None => push_unique(&mut next, Ctx::Document),
                        }
                    }
                }
                Step::DescendantOrSelf => {
                    push_unique(&mut next, ctx.clone());
                    for d in descendants(dom, ctx) {
                        push_unique(&mut next, Ctx::Element(d));
                    }
                }
                Step::Child { name, predicates } => {
                    let mut candidates: Vec<D::Node> = children_of(dom, ctx)
                        .into_iter()
                        .filter(|c| name.as_ref().map_or(true, |n| &dom.tag_name(c) == n))
                        .collect();
                    for predicate in predicates {
                        candidates = apply_predicate(dom, candidates, predicate);
                    }
                    for c in candidates {
                        push_unique(&mut next, Ctx::Element(c));
                    }
                }
            }
        }
        contexts = next;
        if contexts.is_empty() {
            return Ok(None);
        }
    }

    let elements: Vec<D::Node> = contexts
        .into_iter()
        .filter_map(|c| match c {
            Ctx::Element(n) => Some(n),
            Ctx::Document => None,
        })
        .collect();

    Ok(first_in_document_order(dom, elements))
}

fn push_unique<N: PartialEq>(list: &mut Vec<N>, item: N) {
    if !list.contains(&item) {
        list.push(item);
    }
}

fn children_of<D: Dom + ?Sized>(dom: &D, ctx: &Ctx<D::Node>) -> Vec<D::Node> {
    match ctx {
        Ctx::Document => dom.root_element().into_iter().collect(),
        Ctx::Element(n) => dom.children(n),
    }
}

fn descendants<D: Dom + ?Sized>(dom: &D, ctx: &Ctx<D::Node>) -> Vec<D::Node> {
    let mut out = Vec::new();
    let mut stack = children_of(dom, ctx);
    stack.reverse();
    while let Some(n) = stack.pop() {
        let mut kids = dom.children(&n);
        kids.reverse();
        out.push(n);
        stack.extend(kids);
    }
    out
}

fn apply_predicate<D: Dom + ?Sized>(dom: &D, candidates: Vec<D::Node>, predicate: &Predicate) -> Vec<D::Node> {
    match predicate {
        Predicate::Position(n) => candidates.into_iter().nth(n.wrapping_sub(1)).into_iter().collect(),
        Predicate::Last => candidates.into_iter().last().into_iter().collect(),
        Predicate::HasAttribute(name) => candidates
            .into_iter()
            .filter(|c| dom.attribute(c, name).is_some())
            .collect(),
        Predicate::AttributeEquals(name, value) => candidates
            .into_iter()
            .filter(|c| dom.attribute(c, name).as_deref() == Some(value.as_str()))
            .collect(),
    }
}

fn first_in_document_order<D: Dom + ?Sized>(dom: &D, mut nodes: Vec<D::Node>) -> Option<D::Node> {
    if nodes.len() <= 1 {
        return nodes.pop();
    }
    let mut first = None;
    selector::walk(dom, |n| {
        if nodes.contains(n) {
            first = Some(n.clone());
            false
        } else {
            true
        }
    });
    first
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_generated_path() {
        let path = parse("/html[1]/body[1]/div[2]/span[1]").unwrap();
        assert!(path.absolute);
        assert_eq!(path.steps.len(), 4);
        assert_eq!(
            path.steps[2],
            Step::Child {
                name: Some("div".into()),
                predicates: vec![Predicate::Position(2)]
            }
        );
    }

    #[test]
    fn test_parse_descendant_and_attribute_predicates() {
        let path = parse("//button[@data-role='save'][last()]").unwrap();
        assert_eq!(path.steps[0], Step::DescendantOrSelf);
        assert_eq!(
            path.steps[1],
            Step::Child {
                name: Some("button".into()),
                predicates: vec![
                    Predicate::AttributeEquals("data-role".into(), "save".into()),
                    Predicate::Last
                ]
            }
        );
    }

    #[test]
    fn test_malformed_paths_are_rejected() {
        for bad in ["", "/html/", "/html[1", "/html/[", "/html[foo()]", "//", "child::div", "/html/body/text()"] {
            assert!(parse(bad).is_err(), "expected `{}` to be rejected", bad);
        }
    }
}

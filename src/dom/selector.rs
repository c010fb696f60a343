//! CSS selector parsing and matching
//!
//! Covers what capture generates (`#id`, `tag.class`, `tag:nth-of-type(n)`
//! chains) plus the common forms hosts store by hand: attribute operators,
//! `*`, the four combinators, `:nth-child`, `:first-/last-child`,
//! `:first-/last-of-type` and selector lists.
//!
//! Matching is generic over [`Dom`] and runs right-to-left.

use crate::dom::Dom;
use crate::error::LocatorError;

// =============================================================================
// AST
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct SelectorList(pub Vec<ComplexSelector>);

#[derive(Debug, Clone, PartialEq)]
pub struct ComplexSelector {
    /// Left-to-right compounds
    pub compounds: Vec<Compound>,
    /// `combinators[i]` sits between `compounds[i]` and `compounds[i + 1]`
    pub combinators: Vec<Combinator>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    Descendant,
    Child,
    NextSibling,
    SubsequentSibling,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Compound {
    /// `None` for `*` or an omitted type selector
    pub tag: Option<String>,
    pub filters: Vec<Filter>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Id(String),
    Class(String),
    Attribute {
        name: String,
        op: Option<(AttrOp, String)>,
    },
    NthChild(Nth),
    NthOfType(Nth),
    LastChild,
    LastOfType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrOp {
    Equals,
    Includes,
    DashMatch,
    Prefix,
    Suffix,
    Substring,
}

/// `an+b`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nth {
    pub a: i64,
    pub b: i64,
}

impl Nth {
    /// Does the 1-based `index` satisfy `an+b` for some n >= 0?
    pub fn matches(&self, index: i64) -> bool {
        if self.a == 0 {
            return index == self.b;
        }
        let diff = index - self.b;
        diff % self.a == 0 && diff / self.a >= 0
    }
}

// =============================================================================
// Parser
// =============================================================================

pub fn parse(input: &str) -> Result<SelectorList, LocatorError> {
    let mut parser = Parser {
        source: input,
        chars: input.chars().collect(),
        pos: 0,
    };
    parser.parse_list()
}

struct Parser<'a> {
    source: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn err(&self, reason: impl Into<String>) -> LocatorError {
        LocatorError::selector(self.source, reason)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) -> bool {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
        self.pos > start
    }

    fn parse_list(&mut self) -> Result<SelectorList, LocatorError> {
        let mut list = Vec::new();
        loop {
            self.skip_ws();
            list.push(self.parse_complex()?);
            self.skip_ws();
            match self.peek() {
                None => break,
                Some(',') => {
                    self.pos += 1;
                }
                Some(c) => return Err(self.err(format!("unexpected `{}`", c))),
            }
        }
        Ok(SelectorList(list))
    }

    fn parse_complex(&mut self) -> Result<ComplexSelector, LocatorError> {
        let mut compounds = vec![self.parse_compound()?];
        let mut combinators = Vec::new();

        loop {
            let had_ws = self.skip_ws();
            let combinator = match self.peek() {
                Some('>') => Combinator::Child,
                Some('+') => Combinator::NextSibling,
                Some('~') => Combinator::SubsequentSibling,
                None | Some(',') => break,
                Some(_) if had_ws => Combinator::Descendant,
                Some(c) => return Err(self.err(format!("unexpected `{}`", c))),
            };
            if combinator != Combinator::Descendant {
                self.pos += 1;
                self.skip_ws();
            }
            combinators.push(combinator);
            compounds.push(self.parse_compound()?);
        }

        Ok(ComplexSelector {
            compounds,
            combinators,
        })
    }

    fn parse_compound(&mut self) -> Result<Compound, LocatorError> {
        let mut compound = Compound::default();
        let mut any = false;

        if self.eat('*') {
            any = true;
        } else if self.peek().is_some_and(is_ident_start) {
            compound.tag = Some(self.parse_ident()?.to_ascii_lowercase());
            any = true;
        }

        loop {
            match self.peek() {
                Some('#') => {
                    self.pos += 1;
                    compound.filters.push(Filter::Id(self.parse_ident()?));
                }
                Some('.') => {
                    self.pos += 1;
                    compound.filters.push(Filter::Class(self.parse_ident()?));
                }
                Some('[') => {
                    self.pos += 1;
                    compound.filters.push(self.parse_attribute()?);
                }
                Some(':') => {
                    self.pos += 1;
                    compound.filters.push(self.parse_pseudo()?);
                }
                _ => break,
            }
            any = true;
        }

        if !any {
            return Err(match self.peek() {
                Some(c) => self.err(format!("expected selector, found `{}`", c)),
                None => self.err("expected selector, found end of input"),
            });
        }
        Ok(compound)
    }

    fn parse_attribute(&mut self) -> Result<Filter, LocatorError> {
        self.skip_ws();
        let name = self.parse_ident()?.to_ascii_lowercase();
        self.skip_ws();

        let op = match self.bump() {
            Some(']') => return Ok(Filter::Attribute { name, op: None }),
            Some('=') => AttrOp::Equals,
            Some(c @ ('~' | '|' | '^' | '$' | '*')) => {
                if !self.eat('=') {
                    return Err(self.err(format!("expected `=` after `{}`", c)));
                }
                match c {
                    '~' => AttrOp::Includes,
                    '|' => AttrOp::DashMatch,
                    '^' => AttrOp::Prefix,
                    '$' => AttrOp::Suffix,
                    _ => AttrOp::Substring,
                }
            }
            Some(c) => return Err(self.err(format!("unexpected `{}` in attribute selector", c))),
            None => return Err(self.err("unterminated attribute selector")),
        };

        self.skip_ws();
        let value = match self.peek() {
            Some(q @ ('"' | '\'')) => {
                self.pos += 1;
                self.parse_string(q)?
            }
            Some(_) => self.parse_ident()?,
            None => return Err(self.err("unterminated attribute selector")),
        };
        self.skip_ws();
        if !self.eat(']') {
            return Err(self.err("unterminated attribute selector"));
        }
        Ok(Filter::Attribute {
            name,
            op: Some((op, value)),
        })
    }

    fn parse_pseudo(&mut self) -> Result<Filter, LocatorError> {
        let name = self.parse_ident()?.to_ascii_lowercase();
        match name.as_str() {
            "first-child" => Ok(Filter::NthChild(Nth { a: 0, b: 1 })),
            "first-of-type" => Ok(Filter::NthOfType(Nth { a: 0, b: 1 })),
            "last-child" => Ok(Filter::LastChild),
            "last-of-type" => Ok(Filter::LastOfType),
            "nth-child" | "nth-of-type" => {
                if !self.eat('(') {
                    return Err(self.err(format!("expected `(` after :{}", name)));
                }
                let start = self.pos;
                while matches!(self.peek(), Some(c) if c != ')') {
                    self.pos += 1;
                }
                if !self.eat(')') {
                    return Err(self.err(format!("unterminated :{}(", name)));
                }
                let arg: String = self.chars[start..self.pos - 1].iter().collect();
                let nth = parse_nth(&arg).ok_or_else(|| self.err(format!("invalid an+b `{}`", arg.trim())))?;
                Ok(if name == "nth-child" {
                    Filter::NthChild(nth)
                } else {
                    Filter::NthOfType(nth)
                })
            }
            other => Err(self.err(format!("unsupported pseudo-class :{}", other))),
        }
    }

    fn parse_ident(&mut self) -> Result<String, LocatorError> {
        let mut out = String::new();
        if self.peek() == Some('-') {
            out.push('-');
            self.pos += 1;
        }
        match self.peek() {
            Some(c) if is_ident_start(c) && c != '-' => {}
            Some('\\') => {}
            Some('-') if out.is_empty() => {}
            Some(c) => return Err(self.err(format!("expected identifier, found `{}`", c))),
            None => return Err(self.err("expected identifier, found end of input")),
        }
        while let Some(c) = self.peek() {
            if c == '\\' {
                self.pos += 1;
                out.push(self.parse_escape()?);
            } else if is_ident_char(c) {
                out.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        if out.is_empty() || out == "-" {
            return Err(self.err("empty identifier"));
        }
        Ok(out)
    }

    fn parse_escape(&mut self) -> Result<char, LocatorError> {
        let mut hex = String::new();
        while hex.len() < 6 && matches!(self.peek(), Some(c) if c.is_ascii_hexdigit()) {
            hex.push(self.chars[self.pos]);
            self.pos += 1;
        }
        if hex.is_empty() {
            return self.bump().ok_or_else(|| self.err("dangling escape"));
        }
        // one whitespace terminates a hex escape
        if matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
        u32::from_str_radix(&hex, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| self.err(format!("invalid escape \\{}", hex)))
    }

    fn parse_string(&mut self, quote: char) -> Result<String, LocatorError> {
        let mut out = String::new();
        loop {
            match self.bump() {
                Some(c) if c == quote => return Ok(out),
                Some('\\') => out.push(self.parse_escape()?),
                Some(c) => out.push(c),
                None => return Err(self.err("unterminated string")),
            }
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '-' || !c.is_ascii()
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-' || !c.is_ascii()
}

fn parse_nth(arg: &str) -> Option<Nth> {
    let s: String = arg.chars().filter(|c| !c.is_whitespace()).collect::<String>().to_ascii_lowercase();
    match s.as_str() {
        "odd" => return Some(Nth { a: 2, b: 1 }),
        "even" => return Some(Nth { a: 2, b: 0 }),
        "" => return None,
        _ => {}
    }
    match s.find('n') {
        None => s.parse().ok().map(|b| Nth { a: 0, b }),
        Some(idx) => {
            let a = match &s[..idx] {
                "" | "+" => 1,
                "-" => -1,
                n => n.parse().ok()?,
            };
            let rest = &s[idx + 1..];
            let b = if rest.is_empty() {
                0
            } else {
                rest.strip_prefix('+').unwrap_or(rest).parse().ok()?
            };
            Some(Nth { a, b })
        }
    }
}

// =============================================================================
// Escaping
// =============================================================================

/// Escape `value` for use as an identifier (`#id`, `.class`)
pub fn escape_ident(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for (i, c) in value.chars().enumerate() {
        let leading_digit = c.is_ascii_digit() && (i == 0 || (i == 1 && value.starts_with('-')));
        if leading_digit {
            out.push_str(&format!("\\{:x} ", c as u32));
        } else if is_ident_char(c) {
            out.push(c);
        } else if c.is_control() {
            out.push_str(&format!("\\{:x} ", c as u32));
        } else {
            out.push('\\');
            out.push(c);
        }
    }
    if value == "-" {
        return "\\-".to_string();
    }
    out
}

/// Escape `value` for use inside a double-quoted attribute value
pub fn escape_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '"' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_control() => out.push_str(&format!("\\{:x} ", c as u32)),
            c => out.push(c),
        }
    }
    out
}

// =============================================================================
// Matching
// =============================================================================

pub fn matches<D: Dom + ?Sized>(dom: &D, node: &D::Node, list: &SelectorList) -> bool {
    list.0.iter().any(|complex| {
        !complex.compounds.is_empty() && match_at(dom, node, complex, complex.compounds.len() - 1)
    })
}

fn match_at<D: Dom + ?Sized>(dom: &D, node: &D::Node, sel: &ComplexSelector, idx: usize) -> bool {
    if !matches_compound(dom, node, &sel.compounds[idx]) {
        return false;
    }
    if idx == 0 {
        return true;
    }
    match sel.combinators[idx - 1] {
        Combinator::Child => dom
            .parent_element(node)
            .is_some_and(|p| match_at(dom, &p, sel, idx - 1)),
        Combinator::Descendant => {
            let mut current = dom.parent_element(node);
            while let Some(p) = current {
                if match_at(dom, &p, sel, idx - 1) {
                    return true;
                }
                current = dom.parent_element(&p);
            }
            false
        }
        Combinator::NextSibling => dom
            .previous_element_sibling(node)
            .is_some_and(|s| match_at(dom, &s, sel, idx - 1)),
        Combinator::SubsequentSibling => {
            let mut current = dom.previous_element_sibling(node);
            while let Some(s) = current {
                if match_at(dom, &s, sel, idx - 1) {
                    return true;
                }
                current = dom.previous_element_sibling(&s);
            }
            false
        }
    }
}

fn matches_compound<D: Dom + ?Sized>(dom: &D, node: &D::Node, compound: &Compound) -> bool {
    if let Some(tag) = &compound.tag {
        if &dom.tag_name(node) != tag {
            return false;
        }
    }
    compound.filters.iter().all(|f| matches_filter(dom, node, f))
}

fn matches_filter<D: Dom + ?Sized>(dom: &D, node: &D::Node, filter: &Filter) -> bool {
    match filter {
        Filter::Id(id) => dom.attribute(node, "id").as_deref() == Some(id.as_str()),
        Filter::Class(class) => dom.class_list(node).iter().any(|c| c == class),
        Filter::Attribute { name, op } => {
            let Some(actual) = dom.attribute(node, name) else {
                return false;
            };
            match op {
                None => true,
                Some((op, expected)) => match op {
                    AttrOp::Equals => &actual == expected,
                    AttrOp::Includes => actual.split_whitespace().any(|w| w == expected),
                    AttrOp::DashMatch => {
                        &actual == expected || actual.starts_with(&format!("{}-", expected))
                    }
                    AttrOp::Prefix => !expected.is_empty() && actual.starts_with(expected.as_str()),
                    AttrOp::Suffix => !expected.is_empty() && actual.ends_with(expected.as_str()),
                    AttrOp::Substring => !expected.is_empty() && actual.contains(expected.as_str()),
                },
            }
        }
        Filter::NthChild(nth) => nth.matches(sibling_index(dom, node, false)),
        Filter::NthOfType(nth) => nth.matches(sibling_index(dom, node, true)),
        Filter::LastChild => following_siblings(dom, node, false) == 0,
        Filter::LastOfType => following_siblings(dom, node, true) == 0,
    }
}

/// 1-based index among element siblings (optionally of the same tag)
pub fn sibling_index<D: Dom + ?Sized>(dom: &D, node: &D::Node, same_tag: bool) -> i64 {
    let tag = dom.tag_name(node);
    let mut index = 1;
    let mut current = dom.previous_element_sibling(node);
    while let Some(s) = current {
        if !same_tag || dom.tag_name(&s) == tag {
            index += 1;
        }
        current = dom.previous_element_sibling(&s);
    }
    index
}

fn following_siblings<D: Dom + ?Sized>(dom: &D, node: &D::Node, same_tag: bool) -> usize {
    let Some(parent) = dom.parent_element(node) else {
        return 0;
    };
    let tag = dom.tag_name(node);
    let siblings = dom.children(&parent);
    let Some(pos) = siblings.iter().position(|s| s == node) else {
        return 0;
    };
    siblings[pos + 1..]
        .iter()
        .filter(|s| !same_tag || dom.tag_name(s) == tag)
        .count()
}

// =============================================================================
// Querying
// =============================================================================

/// Walk the document in pre-order, stopping when `visit` returns false
pub fn walk<D: Dom + ?Sized>(dom: &D, mut visit: impl FnMut(&D::Node) -> bool) {
    let Some(root) = dom.root_element() else {
        return;
    };
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if !visit(&node) {
            return;
        }
        let mut children = dom.children(&node);
        children.reverse();
        stack.extend(children);
    }
}

pub fn query_first<D: Dom + ?Sized>(dom: &D, selector: &str) -> Result<Option<D::Node>, LocatorError> {
    let list = parse(selector)?;
    let mut found = None;
    walk(dom, |node| {
        if matches(dom, node, &list) {
            found = Some(node.clone());
            false
        } else {
            true
        }
    });
    Ok(found)
}

pub fn query_count<D: Dom + ?Sized>(dom: &D, selector: &str) -> Result<usize, LocatorError> {
    let list = parse(selector)?;
    let mut count = 0;
    walk(dom, |node| {
        if matches(dom, node, &list) {
            count += 1;
        }
        true
    });
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_generated_forms() {
        let list = parse("#save-btn").unwrap();
        assert_eq!(list.0[0].compounds[0].filters, vec![Filter::Id("save-btn".into())]);

        let list = parse("h1.hero-title.large").unwrap();
        let c = &list.0[0].compounds[0];
        assert_eq!(c.tag.as_deref(), Some("h1"));
        assert_eq!(c.filters.len(), 2);

        let list = parse("main:nth-of-type(1) div:nth-of-type(2)").unwrap();
        assert_eq!(list.0[0].compounds.len(), 2);
        assert_eq!(list.0[0].combinators, vec![Combinator::Descendant]);
    }

    #[test]
    fn test_parse_combinators_and_lists() {
        let list = parse("ul > li + li ~ li, a[href^='http']").unwrap();
        assert_eq!(list.0.len(), 2);
        assert_eq!(
            list.0[0].combinators,
            vec![Combinator::Child, Combinator::NextSibling, Combinator::SubsequentSibling]
        );
    }

    #[test]
    fn test_malformed_selectors_are_rejected() {
        for bad in ["", "div[", "div[data-x=", "a >", ":nth-child(x)", "#", "..a", "div)", "#123"] {
            assert!(parse(bad).is_err(), "expected `{}` to be rejected", bad);
        }
    }

    #[test]
    fn test_nth_forms() {
        assert_eq!(parse_nth("3"), Some(Nth { a: 0, b: 3 }));
        assert_eq!(parse_nth("2n+1"), Some(Nth { a: 2, b: 1 }));
        assert_eq!(parse_nth("-n+3"), Some(Nth { a: -1, b: 3 }));
        assert_eq!(parse_nth("odd"), Some(Nth { a: 2, b: 1 }));
        assert!(Nth { a: 2, b: 1 }.matches(5));
        assert!(!Nth { a: 2, b: 1 }.matches(4));
        assert!(Nth { a: -1, b: 3 }.matches(1));
        assert!(!Nth { a: -1, b: 3 }.matches(4));
    }

    #[test]
    fn test_escape_ident_round_trips_through_parser() {
        for id in ["123", "a:b", "with space", "ok-id", "-9"] {
            let selector = format!("#{}", escape_ident(id));
            let list = parse(&selector).unwrap_or_else(|e| panic!("{}: {}", selector, e));
            assert_eq!(list.0[0].compounds[0].filters, vec![Filter::Id(id.to_string())]);
        }
    }

    #[test]
    fn test_escape_string_in_attribute_value() {
        let selector = format!("[data-x=\"{}\"]", escape_string("a\"b\\c"));
        let list = parse(&selector).unwrap();
        assert_eq!(
            list.0[0].compounds[0].filters,
            vec![Filter::Attribute {
                name: "data-x".into(),
                op: Some((AttrOp::Equals, "a\"b\\c".into()))
            }]
        );
    }
}

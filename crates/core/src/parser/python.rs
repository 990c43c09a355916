//! Syntax-tree walk over Python migration modules
//!
//! Nodes are classified into a small set of [`Syntax`] variants and every
//! search below is an exhaustive match over them; anything the search does
//! not care about falls into [`Syntax::Other`] and is descended into or
//! ignored.
//!
//! Lookup rules:
//! - the first `class Migration` in source order wins; bodies of other
//!   classes are never searched
//! - the first plain `dependencies = ...` assignment inside the class body
//!   wins, looking through `if`/`try`/`with` blocks but not into methods or
//!   nested classes
//! - the value must be a list or tuple literal; only elements that are
//!   2-tuples of string literals are kept

use std::iter::Peekable;
use std::str::Chars;

use tracing::{debug, trace};
use tree_sitter::Node;

use crate::migration::MigrationId;

/// Class name that carries the dependency declaration
pub const MIGRATION_CLASS: &str = "Migration";

/// Class attribute holding the dependency list
pub const DEPENDENCIES_ATTRIBUTE: &str = "dependencies";

/// The node kinds the extractor distinguishes
#[derive(Debug, Clone, Copy)]
enum Syntax<'tree> {
    ClassDefinition(Node<'tree>),
    FunctionDefinition,
    Assignment(Node<'tree>),
    List(Node<'tree>),
    Tuple(Node<'tree>),
    /// Bare `a, b` on the right of `=`
    ExpressionList(Node<'tree>),
    String(Node<'tree>),
    ConcatenatedString(Node<'tree>),
    Comment,
    Other(Node<'tree>),
}

fn classify(node: Node<'_>) -> Syntax<'_> {
    match node.kind() {
        "class_definition" => Syntax::ClassDefinition(node),
        "function_definition" => Syntax::FunctionDefinition,
        "assignment" => Syntax::Assignment(node),
        "list" => Syntax::List(node),
        "tuple" => Syntax::Tuple(node),
        "expression_list" => Syntax::ExpressionList(node),
        "string" => Syntax::String(node),
        "concatenated_string" => Syntax::ConcatenatedString(node),
        "comment" => Syntax::Comment,
        _ => Syntax::Other(node),
    }
}

/// A dependency element that is not a 2-tuple of string literals
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    /// 1-based source line
    pub line: usize,
    pub text: String,
}

/// What a module declares, including the entries that were passed over
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Declaration {
    pub dependencies: Vec<MigrationId>,
    pub skipped: Vec<SkippedEntry>,
}

/// Extract the dependency declaration from a parsed module
///
/// The declaration is empty when there is no `Migration` class, no
/// `dependencies` assignment, or the assigned value is not a sequence
/// literal.
pub fn extract_dependencies(root: &Node, source: &[u8]) -> Declaration {
    let mut declaration = Declaration::default();

    let Some(class) = find_migration_class(*root, source) else {
        trace!("No {} class definition found", MIGRATION_CLASS);
        return declaration;
    };
    trace!("Found migration class definition at line {}", line_of(&class));

    let Some(body) = class.child_by_field_name("body") else {
        return declaration;
    };

    let Some(value) = find_dependencies_value(body, source) else {
        trace!("No {} assignment in {} class", DEPENDENCIES_ATTRIBUTE, MIGRATION_CLASS);
        return declaration;
    };

    let entries = match classify(value) {
        Syntax::List(seq) | Syntax::Tuple(seq) | Syntax::ExpressionList(seq) => elements(seq),
        _ => {
            debug!(
                "{} at line {} is not a sequence literal ({}), ignoring",
                DEPENDENCIES_ATTRIBUTE,
                line_of(&value),
                value.kind()
            );
            return declaration;
        }
    };

    for element in entries {
        match migration_id_from_tuple(element, source) {
            Some(id) => {
                trace!("Found dependency {}", id);
                declaration.dependencies.push(id);
            }
            None => declaration.skipped.push(SkippedEntry {
                line: line_of(&element),
                text: element.utf8_text(source).unwrap_or("<non-utf8>").to_string(),
            }),
        }
    }
    declaration
}

/// 1-based (line, column) of the first ERROR or MISSING node, depth first
pub fn first_error_position(node: &Node) -> Option<(usize, usize)> {
    if node.is_error() || node.is_missing() {
        let pos = node.start_position();
        return Some((pos.row + 1, pos.column + 1));
    }
    if !node.has_error() {
        return None;
    }

    let mut cursor = node.walk();
    let children: Vec<Node> = node.children(&mut cursor).collect();
    children.iter().find_map(first_error_position)
}

/// Depth-first search for the first `class Migration`
fn find_migration_class<'tree>(node: Node<'tree>, source: &[u8]) -> Option<Node<'tree>> {
    for child in named_children(node) {
        match classify(child) {
            Syntax::ClassDefinition(class) => {
                let name = class
                    .child_by_field_name("name")
                    .and_then(|n| n.utf8_text(source).ok());
                if name == Some(MIGRATION_CLASS) {
                    return Some(class);
                }
            }
            Syntax::Comment => {}
            _ => {
                if let Some(found) = find_migration_class(child, source) {
                    return Some(found);
                }
            }
        }
    }
    None
}

/// Right-hand side of the first `dependencies = ...` in a class body
fn find_dependencies_value<'tree>(node: Node<'tree>, source: &[u8]) -> Option<Node<'tree>> {
    for child in named_children(node) {
        match classify(child) {
            Syntax::ClassDefinition(_) | Syntax::FunctionDefinition | Syntax::Comment => {}
            Syntax::Assignment(assignment) => {
                if let Some(value) = single_target_value(assignment, source) {
                    return Some(value);
                }
            }
            Syntax::Other(inner) => {
                if let Some(found) = find_dependencies_value(inner, source) {
                    return Some(found);
                }
            }
            // bare literals at statement level
            _ => {}
        }
    }
    None
}

/// Value of `dependencies = <value>`, if the assignment is exactly that
///
/// Annotated (`dependencies: list = ...`), chained and destructuring
/// assignments do not qualify.
fn single_target_value<'tree>(assignment: Node<'tree>, source: &[u8]) -> Option<Node<'tree>> {
    if assignment.child_by_field_name("type").is_some() {
        return None;
    }

    let left = assignment.child_by_field_name("left")?;
    let right = assignment.child_by_field_name("right")?;
    trace!(
        "Found assign node: {}",
        left.utf8_text(source).unwrap_or("<non-utf8>")
    );

    if left.kind() != "identifier" || matches!(classify(right), Syntax::Assignment(_)) {
        return None;
    }
    (left.utf8_text(source).ok()? == DEPENDENCIES_ATTRIBUTE).then_some(right)
}

/// `("component", "migration")` → MigrationId
fn migration_id_from_tuple(node: Node, source: &[u8]) -> Option<MigrationId> {
    let Syntax::Tuple(tuple) = classify(node) else {
        return None;
    };

    match elements(tuple).as_slice() {
        [component, name] => Some(MigrationId::new(
            string_value(*component, source)?,
            string_value(*name, source)?,
        )),
        _ => None,
    }
}

/// Value of a string literal expression, `None` for anything else
fn string_value(node: Node, source: &[u8]) -> Option<String> {
    match classify(node) {
        Syntax::String(literal) => string_literal_value(literal, source),
        Syntax::ConcatenatedString(parts) => elements(parts)
            .into_iter()
            .map(|part| string_value(part, source))
            .collect(),
        _ => None,
    }
}

/// Decode a single `string` node
///
/// Byte strings and f-strings with interpolations are not string literals.
fn string_literal_value(node: Node, source: &[u8]) -> Option<String> {
    let mut cursor = node.walk();
    let children: Vec<Node> = node.children(&mut cursor).collect();

    let start = children.first()?;
    let end = children.last()?;
    if start.kind() != "string_start" || end.kind() != "string_end" {
        return None;
    }
    if children.iter().any(|child| child.kind() == "interpolation") {
        return None;
    }

    let prefix = start
        .utf8_text(source)
        .ok()?
        .trim_end_matches(['"', '\''])
        .to_ascii_lowercase();
    if prefix.contains('b') {
        return None;
    }

    let body = std::str::from_utf8(source.get(start.end_byte()..end.start_byte())?).ok()?;
    let mut value = if prefix.contains('r') {
        body.to_string()
    } else {
        unescape(body)?
    };
    if prefix.contains('f') {
        value = value.replace("{{", "{").replace("}}", "}");
    }
    Some(value)
}

/// Decode Python backslash escapes
///
/// `None` if an escape is truncated, names an invalid code point or an
/// unknown character name. Unrecognised escapes are kept verbatim.
fn unescape(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(escape) = chars.next() else {
            out.push('\\');
            break;
        };
        match escape {
            // line continuation
            '\n' => {}
            '\r' => {
                chars.next_if_eq(&'\n');
            }
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            'a' => out.push('\u{07}'),
            'b' => out.push('\u{08}'),
            'f' => out.push('\u{0c}'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'v' => out.push('\u{0b}'),
            '0'..='7' => {
                let mut code = escape.to_digit(8)?;
                for _ in 0..2 {
                    let Some(digit) = chars.next_if(|c| c.is_digit(8)) else {
                        break;
                    };
                    code = code * 8 + digit.to_digit(8)?;
                }
                out.push(char::from_u32(code)?);
            }
            'x' => out.push(hex_escape(&mut chars, 2)?),
            'u' => out.push(hex_escape(&mut chars, 4)?),
            'U' => out.push(hex_escape(&mut chars, 8)?),
            'N' => {
                if chars.next()? != '{' {
                    return None;
                }
                let name: String = chars.by_ref().take_while(|&c| c != '}').collect();
                out.push(unicode_names2::character(&name)?);
            }
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    Some(out)
}

/// Exactly `digits` hex digits as one character
fn hex_escape(chars: &mut Peekable<Chars<'_>>, digits: usize) -> Option<char> {
    let mut code = 0u32;
    for _ in 0..digits {
        code = code * 16 + chars.next()?.to_digit(16)?;
    }
    char::from_u32(code)
}

fn named_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

/// Named children minus comments
fn elements(node: Node<'_>) -> Vec<Node<'_>> {
    named_children(node)
        .into_iter()
        .filter(|child| !matches!(classify(*child), Syntax::Comment))
        .collect()
}

fn line_of(node: &Node) -> usize {
    node.start_position().row + 1
}

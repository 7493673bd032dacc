//! Tree-sitter parsing shared by the validator and the interpreter.

use std::cell::RefCell;

use tree_sitter::{Node, Parser, Tree};

thread_local! {
    static PYTHON_PARSER: RefCell<Parser> = RefCell::new({
        let mut p = Parser::new();
        // A language/ABI mismatch surfaces as a failed parse below.
        let _ = p.set_language(&tree_sitter_python::LANGUAGE.into());
        p
    });
}

/// Position of a syntax problem, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyntaxPosition {
    pub line: usize,
    pub column: usize,
}

/// Parse `source` with this thread's pooled parser.
pub fn parse(source: &str) -> Option<Tree> {
    PYTHON_PARSER.with(|parser| parser.borrow_mut().parse(source, None))
}

/// First ERROR or MISSING node in document order, if any.
pub fn first_syntax_error(root: Node) -> Option<SyntaxPosition> {
    if !root.has_error() {
        return None;
    }

    let mut cursor = root.walk();
    loop {
        let node = cursor.node();
        if node.is_error() || node.is_missing() {
            let pos = node.start_position();
            return Some(SyntaxPosition {
                line: pos.row + 1,
                column: pos.column + 1,
            });
        }

        // Only descend into subtrees that contain the problem.
        if node.has_error() && cursor.goto_first_child() {
            continue;
        }

        while !cursor.goto_next_sibling() {
            if !cursor.goto_parent() {
                let pos = root.start_position();
                return Some(SyntaxPosition {
                    line: pos.row + 1,
                    column: pos.column + 1,
                });
            }
        }
    }
}

/// Source text covered by `node`.
pub fn node_text<'a>(node: &Node, source: &'a str) -> &'a str {
    source.get(node.start_byte()..node.end_byte()).unwrap_or("")
}

/// Named children, skipping comments.
pub fn named_children<'t>(node: &Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|c| c.kind() != "comment")
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_source() {
        let tree = parse("x = 1\nprint(x)\n").unwrap();
        assert!(first_syntax_error(tree.root_node()).is_none());
    }

    #[test]
    fn test_locates_syntax_error() {
        let tree = parse("x = 1\nif x\n    print(x)\n").unwrap();
        let pos = first_syntax_error(tree.root_node()).unwrap();
        assert_eq!(pos.line, 2);
    }

    #[test]
    fn test_named_children_skip_comments() {
        let source = "# leading\nx = 1  # trailing\n";
        let tree = parse(source).unwrap();
        let children = named_children(&tree.root_node());
        assert_eq!(children.len(), 1);
        assert_eq!(node_text(&children[0], source), "x = 1");
    }
}

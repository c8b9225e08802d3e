//! Graphviz DOT export of the dependency graph.
//!
//! A read-only consumer of the edge-dependency graph: walks breadth-first
//! from a value and emits one edge per was-derived-from relation. Values
//! minted by built-ins carry no creator annotation and are skipped, as
//! are self-edges introduced by copies.

use crate::value::{Creator, Obj, Object};
use rustc_hash::FxHashSet;
use std::collections::VecDeque;

fn escape(s: &str) -> String {
    s.replace('"', "\\\"")
}

fn node_label(creator: &Creator) -> String {
    format!(
        "{}\n line: {}, pos: {}",
        creator.text, creator.line, creator.column
    )
}

/// Serialize the dependency graph reachable from `root` as DOT.
pub fn to_dot(root: &Obj) -> String {
    let mut out = String::from("digraph G {\n");
    let mut seen: FxHashSet<*const Object> = FxHashSet::default();
    let mut emitted: FxHashSet<String> = FxHashSet::default();
    let mut queue: VecDeque<Obj> = VecDeque::from([root.clone()]);

    while let Some(head) = queue.pop_front() {
        if !seen.insert(std::rc::Rc::as_ptr(&head)) {
            continue;
        }
        let head_creator = head.creator_clone();
        for link in head.dependency_links() {
            if let (Some(head_creator), Some(link_creator)) =
                (head_creator.as_ref(), link.creator_clone().as_ref())
            {
                // Copies look like a node pointing at itself; condense them.
                if head_creator.text != link_creator.text {
                    let edge = format!(
                        "\t\"{}\" -> \"{}\";\n",
                        escape(&node_label(link_creator)),
                        escape(&node_label(head_creator)),
                    );
                    if emitted.insert(edge.clone()) {
                        out.push_str(&edge);
                    }
                }
            }
            queue.push_back(link);
        }
    }

    out.push('}');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Creator;
    use koko_syntax::Span;

    #[test]
    fn emits_edges_between_annotated_values() {
        let source = Object::int(1);
        source.stamp_creator(Creator::new("1", Span::new(0, 1, 1, 1)));
        let derived = Object::int(2);
        derived.stamp_creator(Creator::new("(1 + 1)", Span::new(0, 5, 1, 1)));
        derived.add_dep(&source);

        let dot = to_dot(&derived);
        assert!(dot.starts_with("digraph G {"));
        assert!(dot.contains("\"1\n line: 1, pos: 1\" -> \"(1 + 1)\n line: 1, pos: 1\""));
        assert!(dot.ends_with('}'));
    }

    #[test]
    fn skips_unannotated_values_and_self_edges() {
        let source = Object::int(1);
        let derived = Object::int(1);
        derived.stamp_creator(Creator::new("x", Span::dummy()));
        derived.add_dep(&source);
        // No creator on the source: no edge.
        assert_eq!(to_dot(&derived), "digraph G {\n}");

        let copy = Object::int(1);
        copy.stamp_creator(Creator::new("x", Span::dummy()));
        copy.add_dep(&derived);
        // Same rendered text: condensed.
        assert_eq!(to_dot(&copy), "digraph G {\n}");
    }

    #[test]
    fn escapes_quotes_in_labels() {
        let source = Object::string("a");
        source.stamp_creator(Creator::new("\"a\"", Span::dummy()));
        let derived = Object::string("aa");
        derived.stamp_creator(Creator::new("(\"a\" + \"a\")", Span::dummy()));
        derived.add_dep(&source);
        let dot = to_dot(&derived);
        assert!(dot.contains("\\\"a\\\""));
    }
}

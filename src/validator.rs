//! Graph validator: acyclicity, closed references, and head/tail
//! discovery over a precedence graph of short names.
//!
//! Operates purely on `{short_name -> [successor short_names]}`; does
//! not mutate its input. Mirrors a compiler's `validate()`
//! step (closed-reference checks) generalized with a white/gray/black
//! DFS so the offending cycle can be reported by name, which
//! `petgraph::algo::is_cyclic_directed`'s boolean result cannot do.

use std::collections::{HashMap, HashSet};

use crate::error::{CompileError, CompileResult};
use crate::ids::ShortName;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    White,
    Gray,
    Black,
}

/// Validates a precedence graph and returns its heads (no predecessors)
/// and tails (no successors).
///
/// Zero or multiple heads/tails are not themselves errors — the
/// compiler's head/tail normaliser (inserting synthetic nodes) handles
/// the "multiple" case, and an empty composition is rejected earlier as
/// [`CompileError::EmptyComposition`].
pub fn validate(
    successors: &HashMap<ShortName, Vec<ShortName>>,
) -> CompileResult<(Vec<ShortName>, Vec<ShortName>)> {
    check_closed_references(successors)?;
    check_acyclic(successors)?;
    Ok(heads_and_tails(successors))
}

fn check_closed_references(successors: &HashMap<ShortName, Vec<ShortName>>) -> CompileResult<()> {
    for targets in successors.values() {
        for target in targets {
            if !successors.contains_key(target) {
                return Err(CompileError::UnknownReference {
                    short_name: target.as_str().to_string(),
                });
            }
        }
    }
    Ok(())
}

fn check_acyclic(successors: &HashMap<ShortName, Vec<ShortName>>) -> CompileResult<()> {
    let mut marks: HashMap<&ShortName, Mark> =
        successors.keys().map(|k| (k, Mark::White)).collect();

    let mut names: Vec<&ShortName> = successors.keys().collect();
    names.sort();

    for start in names {
        if marks[start] == Mark::White {
            let mut path = Vec::new();
            visit(start, successors, &mut marks, &mut path)?;
        }
    }
    Ok(())
}

fn visit<'a>(
    node: &'a ShortName,
    successors: &'a HashMap<ShortName, Vec<ShortName>>,
    marks: &mut HashMap<&'a ShortName, Mark>,
    path: &mut Vec<&'a ShortName>,
) -> CompileResult<()> {
    marks.insert(node, Mark::Gray);
    path.push(node);

    if let Some(targets) = successors.get(node) {
        for target in targets {
            match marks.get(target).copied().unwrap_or(Mark::White) {
                Mark::White => visit(target, successors, marks, path)?,
                Mark::Gray => {
                    let start = path.iter().position(|n| *n == target).unwrap_or(0);
                    let mut cycle: Vec<String> = path[start..]
                        .iter()
                        .map(|n| n.as_str().to_string())
                        .collect();
                    cycle.push(target.as_str().to_string());
                    return Err(CompileError::Cycle { cycle });
                }
                Mark::Black => {}
            }
        }
    }

    path.pop();
    marks.insert(node, Mark::Black);
    Ok(())
}

fn heads_and_tails(
    successors: &HashMap<ShortName, Vec<ShortName>>,
) -> (Vec<ShortName>, Vec<ShortName>) {
    let mut has_predecessor: HashSet<&ShortName> = HashSet::new();
    for targets in successors.values() {
        for target in targets {
            has_predecessor.insert(target);
        }
    }

    let mut heads: Vec<ShortName> = successors
        .keys()
        .filter(|k| !has_predecessor.contains(k))
        .cloned()
        .collect();
    heads.sort();

    let mut tails: Vec<ShortName> = successors
        .iter()
        .filter(|(_, targets)| targets.is_empty())
        .map(|(k, _)| k.clone())
        .collect();
    tails.sort();

    (heads, tails)
}

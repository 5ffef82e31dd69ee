//! Tree builder and validator for child→parent name mappings.

use std::collections::{HashMap, HashSet};

use crate::error::{HierarchyDefect, Result};

/// A validated, rooted hierarchy of named nodes.
///
/// Built from child→parent pairs where a name mapping to itself marks the
/// root. Only used to seed a [`crate::PartitionTree`].
#[derive(Debug, Clone)]
pub struct Hierarchy {
    names: Vec<String>,
    children: Vec<Vec<usize>>,
    root: usize,
}

impl Hierarchy {
    /// Build and validate a hierarchy from `(child, parent)` pairs.
    ///
    /// Identical duplicate pairs are collapsed; a child listed under two
    /// different parents fails validation.
    pub fn from_pairs<I, C, P>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (C, P)>,
        C: Into<String>,
        P: Into<String>,
    {
        let mut slots: HashMap<String, usize> = HashMap::new();
        let mut names: Vec<String> = Vec::new();
        let mut children: Vec<Vec<usize>> = Vec::new();
        let mut edges = HashSet::new();
        let mut roots = Vec::new();

        let mut slot_of = |name: String, names: &mut Vec<String>, children: &mut Vec<Vec<usize>>| {
            *slots.entry(name).or_insert_with_key(|name| {
                names.push(name.clone());
                children.push(Vec::new());
                names.len() - 1
            })
        };

        for (child, parent) in pairs {
            let c = slot_of(child.into(), &mut names, &mut children);
            let p = slot_of(parent.into(), &mut names, &mut children);
            if !edges.insert((c, p)) {
                continue;
            }
            if c == p {
                roots.push(c);
            } else {
                children[p].push(c);
            }
        }

        let root = match roots.as_slice() {
            [root] => *root,
            [] => return Err(HierarchyDefect::NoRoot.into()),
            many => {
                let names = many.iter().map(|&i| names[i].clone()).collect();
                return Err(HierarchyDefect::MultipleRoots(names).into());
            }
        };

        let hierarchy = Self { names, children, root };
        hierarchy.validate()?;
        Ok(hierarchy)
    }

    /// Depth-first walk from the root marking visitation.
    fn validate(&self) -> Result<()> {
        let mut visited = vec![false; self.names.len()];
        let mut stack = vec![self.root];
        while let Some(idx) = stack.pop() {
            if visited[idx] {
                return Err(HierarchyDefect::VisitedTwice(self.names[idx].clone()).into());
            }
            visited[idx] = true;
            stack.extend(self.children[idx].iter().copied());
        }

        let mut unreachable: Vec<String> = visited
            .iter()
            .enumerate()
            .filter(|(_, seen)| !**seen)
            .map(|(idx, _)| self.names[idx].clone())
            .collect();
        if unreachable.is_empty() {
            Ok(())
        } else {
            unreachable.sort();
            Err(HierarchyDefect::Unreachable(unreachable).into())
        }
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the hierarchy has no nodes (never true once validated).
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Name of the root node.
    pub fn root_name(&self) -> &str {
        &self.names[self.root]
    }

    pub(crate) fn root(&self) -> usize {
        self.root
    }

    pub(crate) fn name(&self, idx: usize) -> &str {
        &self.names[idx]
    }

    pub(crate) fn children(&self, idx: usize) -> &[usize] {
        &self.children[idx]
    }
}

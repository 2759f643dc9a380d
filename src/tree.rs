//! Rooted binary trees with node heights.
//!
//! Nodes live in an index arena. Tips take the indices `0..tip_count` in the
//! order they appear, internal nodes follow in post-order, so the root is
//! always the last node.

use itertools::Itertools;

use crate::{error::ConfigError, model::Model};

#[derive(Debug, Clone, PartialEq)]
struct Node {
    parent: Option<usize>,
    children: Option<[usize; 2]>,
    height: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    nodes: Vec<Node>,
    stored: Vec<Node>,
    names: Vec<String>,
    root: usize,
    dirty: bool,
}

enum Parsed {
    Tip(String, Option<f64>),
    Internal(Box<Parsed>, Box<Parsed>, Option<f64>),
}

struct NewickParser<'a> {
    text: &'a [u8],
    pos: usize,
}

impl<'a> NewickParser<'a> {
    fn error(&self, msg: &str) -> ConfigError {
        ConfigError::InvalidTree(format!("{} at position {} of newick string", msg, self.pos))
    }

    fn skip_ws(&mut self) {
        while self.pos < self.text.len() && self.text[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_ws();
        self.text.get(self.pos).copied()
    }

    fn expect(&mut self, byte: u8) -> Result<(), ConfigError> {
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", byte as char)))
        }
    }

    fn label(&mut self) -> String {
        self.skip_ws();
        let start = self.pos;
        while self.pos < self.text.len() && !b"(),:;".contains(&self.text[self.pos]) {
            self.pos += 1;
        }
        String::from_utf8_lossy(&self.text[start..self.pos])
            .trim()
            .to_string()
    }

    fn branch_length(&mut self) -> Result<Option<f64>, ConfigError> {
        if self.peek() != Some(b':') {
            return Ok(None);
        }
        self.pos += 1;
        let text = self.label();
        text.parse::<f64>()
            .map(Some)
            .map_err(|_| self.error(&format!("invalid branch length '{}'", text)))
    }

    fn subtree(&mut self) -> Result<Parsed, ConfigError> {
        if self.peek() == Some(b'(') {
            self.pos += 1;
            let left = self.subtree()?;
            self.expect(b',')?;
            let right = self.subtree()?;
            if self.peek() == Some(b',') {
                return Err(self.error("only binary trees are supported"));
            }
            self.expect(b')')?;
            // internal node labels are ignored
            self.label();
            let length = self.branch_length()?;
            Ok(Parsed::Internal(Box::new(left), Box::new(right), length))
        } else {
            let name = self.label();
            if name.is_empty() {
                return Err(self.error("missing taxon name"));
            }
            let length = self.branch_length()?;
            Ok(Parsed::Tip(name, length))
        }
    }
}

impl Tree {
    /// Parse a rooted binary tree. Missing branch lengths count as 1.
    ///
    /// Heights are measured back from the tip furthest from the root.
    pub fn from_newick(newick: &str) -> Result<Self, ConfigError> {
        let mut parser = NewickParser {
            text: newick.as_bytes(),
            pos: 0,
        };
        let parsed = parser.subtree()?;
        if parser.peek() == Some(b';') {
            parser.pos += 1;
        }
        if parser.peek().is_some() {
            return Err(parser.error("unexpected trailing characters"));
        }

        fn count_tips(node: &Parsed) -> usize {
            match node {
                Parsed::Tip(..) => 1,
                Parsed::Internal(l, r, _) => count_tips(l) + count_tips(r),
            }
        }

        struct Builder {
            nodes: Vec<Node>,
            depths: Vec<f64>,
            names: Vec<String>,
            next_tip: usize,
            next_internal: usize,
        }

        impl Builder {
            fn visit(&mut self, node: &Parsed, depth: f64) -> usize {
                match node {
                    Parsed::Tip(name, length) => {
                        let idx = self.next_tip;
                        self.next_tip += 1;
                        self.names[idx] = name.clone();
                        self.depths[idx] = depth + length.unwrap_or(1.0);
                        idx
                    }
                    Parsed::Internal(left, right, length) => {
                        let depth = depth + length.unwrap_or(1.0);
                        let l = self.visit(left, depth);
                        let r = self.visit(right, depth);
                        let idx = self.next_internal;
                        self.next_internal += 1;
                        self.nodes[idx].children = Some([l, r]);
                        self.nodes[l].parent = Some(idx);
                        self.nodes[r].parent = Some(idx);
                        self.depths[idx] = depth;
                        idx
                    }
                }
            }
        }

        let tips = count_tips(&parsed);
        let count = 2 * tips - 1;
        let mut builder = Builder {
            nodes: vec![
                Node {
                    parent: None,
                    children: None,
                    height: 0.0,
                };
                count
            ],
            depths: vec![0.0; count],
            names: vec![String::new(); tips],
            next_tip: 0,
            next_internal: tips,
        };
        // the root carries no branch, its depth is zero
        let root = match &parsed {
            Parsed::Tip(..) => builder.visit(&parsed, 0.0),
            Parsed::Internal(left, right, _) => {
                let l = builder.visit(left, 0.0);
                let r = builder.visit(right, 0.0);
                let idx = builder.next_internal;
                builder.nodes[idx].children = Some([l, r]);
                builder.nodes[l].parent = Some(idx);
                builder.nodes[r].parent = Some(idx);
                idx
            }
        };

        let max_depth = builder.depths.iter().copied().fold(0.0, f64::max);
        let mut nodes = builder.nodes;
        for (node, depth) in nodes.iter_mut().zip(builder.depths.iter()) {
            node.height = max_depth - depth;
        }
        Self::from_nodes(nodes, builder.names, root)
    }

    /// Build a tree from a parent table. `parents[i]` is `None` only for the root.
    pub fn from_parents(
        parents: &[Option<usize>],
        heights: &[f64],
        names: Vec<String>,
    ) -> Result<Self, ConfigError> {
        if parents.len() != heights.len() {
            return Err(ConfigError::DimensionMismatch {
                name: "tree heights".to_string(),
                expected: parents.len(),
                found: heights.len(),
            });
        }
        let mut nodes: Vec<Node> = heights
            .iter()
            .zip(parents.iter())
            .map(|(&height, &parent)| Node {
                parent,
                children: None,
                height,
            })
            .collect();
        let mut roots = Vec::new();
        for (idx, parent) in parents.iter().enumerate() {
            let Some(parent) = *parent else {
                roots.push(idx);
                continue;
            };
            let Some(node) = nodes.get_mut(parent) else {
                return Err(ConfigError::InvalidTree(format!(
                    "node {} has unknown parent {}",
                    idx, parent
                )));
            };
            node.children = match node.children {
                None => Some([idx, usize::MAX]),
                Some([first, usize::MAX]) => Some([first, idx]),
                Some(_) => {
                    return Err(ConfigError::InvalidTree(format!(
                        "node {} has more than two children",
                        parent
                    )))
                }
            };
        }
        if roots.len() != 1 {
            return Err(ConfigError::InvalidTree(format!(
                "expected exactly one root, found {}",
                roots.len()
            )));
        }
        if nodes
            .iter()
            .any(|n| matches!(n.children, Some([_, usize::MAX])))
        {
            return Err(ConfigError::InvalidTree(
                "internal nodes must have two children".to_string(),
            ));
        }
        Self::from_nodes(nodes, names, roots[0])
    }

    fn from_nodes(nodes: Vec<Node>, names: Vec<String>, root: usize) -> Result<Self, ConfigError> {
        let tips = nodes.iter().filter(|n| n.children.is_none()).count();
        if names.len() != tips {
            return Err(ConfigError::DimensionMismatch {
                name: "taxon names".to_string(),
                expected: tips,
                found: names.len(),
            });
        }
        if nodes[..tips].iter().any(|n| n.children.is_some()) {
            return Err(ConfigError::InvalidTree(
                "tips must occupy the first node indices".to_string(),
            ));
        }
        let tree = Self {
            stored: nodes.clone(),
            nodes,
            names,
            root,
            dirty: false,
        };
        if let Some(node) = tree.first_height_violation() {
            return Err(ConfigError::InvalidTree(format!(
                "node {} is higher than its parent",
                node
            )));
        }
        Ok(tree)
    }

    fn first_height_violation(&self) -> Option<usize> {
        (0..self.nodes.len()).find(|&i| {
            self.nodes[i]
                .parent
                .is_some_and(|p| self.nodes[p].height < self.nodes[i].height)
        })
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn tip_count(&self) -> usize {
        self.names.len()
    }

    pub fn root(&self) -> usize {
        self.root
    }

    pub fn is_tip(&self, node: usize) -> bool {
        self.nodes[node].children.is_none()
    }

    pub fn parent(&self, node: usize) -> Option<usize> {
        self.nodes[node].parent
    }

    pub fn children(&self, node: usize) -> Option<[usize; 2]> {
        self.nodes[node].children
    }

    pub fn height(&self, node: usize) -> f64 {
        self.nodes[node].height
    }

    pub fn root_height(&self) -> f64 {
        self.height(self.root)
    }

    pub fn taxon(&self, tip: usize) -> &str {
        &self.names[tip]
    }

    /// Change a node height. Callers keep heights consistent with the topology.
    pub fn set_height(&mut self, node: usize, height: f64) {
        self.nodes[node].height = height;
        self.dirty = true;
    }

    /// Whether every node is at or below its parent.
    pub fn heights_consistent(&self) -> bool {
        self.first_height_violation().is_none()
    }

    /// Swap the parent attachments of two non-root nodes.
    pub fn exchange(&mut self, i: usize, j: usize) {
        let (Some(i_parent), Some(j_parent)) = (self.parent(i), self.parent(j)) else {
            return;
        };
        self.replace_child(i_parent, i, j);
        self.replace_child(j_parent, j, i);
        self.nodes[i].parent = Some(j_parent);
        self.nodes[j].parent = Some(i_parent);
        self.dirty = true;
    }

    fn replace_child(&mut self, parent: usize, old: usize, new: usize) {
        if let Some(children) = self.nodes[parent].children.as_mut() {
            if let Some(slot) = children.iter_mut().find(|c| **c == old) {
                *slot = new;
            }
        }
    }

    /// A label-sorted newick string identifying the rooted topology.
    pub fn topology_key(&self) -> String {
        self.topology_key_of(self.root)
    }

    fn topology_key_of(&self, node: usize) -> String {
        match self.nodes[node].children {
            None => self.names[node].clone(),
            Some(children) => {
                let inner = children
                    .iter()
                    .map(|&c| self.topology_key_of(c))
                    .sorted()
                    .join(",");
                format!("({})", inner)
            }
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

impl Model for Tree {
    fn store_state(&mut self) {
        self.stored.clone_from(&self.nodes);
    }

    fn restore_state(&mut self) {
        if self.dirty {
            self.nodes.clone_from(&self.stored);
            self.dirty = false;
        }
    }

    fn accept_state(&mut self) {
        self.dirty = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_newick_heights() {
        let tree = Tree::from_newick("(((A:1,B:1):1,C:2):1,D:3);").unwrap();
        assert_eq!(tree.tip_count(), 4);
        assert_eq!(tree.node_count(), 7);
        assert_eq!(tree.root(), 6);
        assert_eq!(tree.taxon(0), "A");
        assert_eq!(tree.taxon(3), "D");
        assert_eq!(tree.children(4), Some([0, 1]));
        assert_eq!(tree.children(5), Some([4, 2]));
        assert_abs_diff_eq!(tree.height(4), 1.0);
        assert_abs_diff_eq!(tree.height(5), 2.0);
        assert_abs_diff_eq!(tree.root_height(), 3.0);
        assert_abs_diff_eq!(tree.height(2), 0.0);
        assert_eq!(tree.topology_key(), "(((A,B),C),D)");
    }

    #[test]
    fn rejects_bad_trees() {
        assert!(Tree::from_newick("((A,B,C),D);").is_err());
        assert!(Tree::from_newick("((A,B),;").is_err());
        assert!(Tree::from_newick("((A:1,B:x),C);").is_err());
        // child above its parent
        let err = Tree::from_parents(
            &[Some(2), Some(2), None],
            &[0.0, 2.0, 1.0],
            vec!["A".into(), "B".into()],
        );
        assert!(err.is_err());
    }

    #[test]
    fn exchange_and_restore() {
        let mut tree = Tree::from_newick("((A:1,B:1):1,(C:1,D:1):1);").unwrap();
        let before = tree.clone();
        tree.store_state();
        tree.exchange(1, 2);
        assert_eq!(tree.topology_key(), "((A,C),(B,D))");
        assert_eq!(tree.parent(1), Some(5));
        assert_eq!(tree.parent(2), Some(4));
        tree.restore_state();
        assert_eq!(tree, before);
    }

    #[test]
    fn from_parents_matches_newick() {
        let tree = Tree::from_parents(
            &[Some(3), Some(3), Some(4), Some(4), None],
            &[0.0, 0.0, 0.0, 1.0, 2.0],
            vec!["A".into(), "B".into(), "C".into()],
        )
        .unwrap();
        assert_eq!(tree.topology_key(), "((A,B),C)");
        assert!(tree.heights_consistent());
    }
}

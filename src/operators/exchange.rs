use crate::{
    error::ConfigError,
    graph::{ModelGraph, TreeId},
    operator::{Operator, OperatorCore, OperatorFailure, Proposal},
    random::RandomSource,
    tree::Tree,
};

pub const MIN_EXCHANGE_TIPS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeVariant {
    /// Swap a node with its uncle.
    Narrow,
    /// Swap two nodes anywhere in the tree.
    Wide,
}

/// Topology move swapping the parent attachments of two subtrees.
///
/// Node heights are left untouched, so a swap is only legal when both
/// subtrees stay below their new parents.
pub struct ExchangeOperator {
    core: OperatorCore,
    tree: TreeId,
    variant: ExchangeVariant,
    candidates: Vec<(usize, usize)>,
}

impl ExchangeOperator {
    pub fn narrow(graph: &ModelGraph, tree: TreeId, weight: f64) -> Result<Self, ConfigError> {
        Self::new(graph, tree, ExchangeVariant::Narrow, weight)
    }

    pub fn wide(graph: &ModelGraph, tree: TreeId, weight: f64) -> Result<Self, ConfigError> {
        Self::new(graph, tree, ExchangeVariant::Wide, weight)
    }

    fn new(
        graph: &ModelGraph,
        tree: TreeId,
        variant: ExchangeVariant,
        weight: f64,
    ) -> Result<Self, ConfigError> {
        graph.try_tree(tree)?;
        let name = match variant {
            ExchangeVariant::Narrow => format!("narrowExchange(tree{})", tree.index()),
            ExchangeVariant::Wide => format!("wideExchange(tree{})", tree.index()),
        };
        Ok(Self {
            core: OperatorCore::new(name, weight)?,
            tree,
            variant,
            candidates: Vec::new(),
        })
    }

    pub fn variant(&self) -> ExchangeVariant {
        self.variant
    }

    /// Picks one `(node, uncle)` pair uniformly. The reverse move is a pair of
    /// the proposed tree, so the Hastings ratio is the ratio of pair counts.
    fn narrow_move(&mut self, state: &mut ModelGraph, rng: &mut dyn RandomSource) -> Proposal {
        let tree = state.tree(self.tree);
        self.candidates.clear();
        self.candidates.extend(narrow_pairs(tree));
        let before = self.candidates.len();
        if before == 0 {
            return Proposal::Failed(OperatorFailure::NoValidMove(
                "no node lies strictly below its parent with a lower uncle".to_string(),
            ));
        }

        let (node, uncle) = self.candidates[rng.uniform_int(before)];
        let tree = state.tree_mut(self.tree);
        tree.exchange(node, uncle);
        let after = narrow_pairs(tree).count();
        Proposal::Proposed((before as f64 / after as f64).ln())
    }

    fn wide_move(&mut self, state: &mut ModelGraph, rng: &mut dyn RandomSource) -> Proposal {
        let tree = state.tree(self.tree);
        let count = tree.node_count();
        let root = tree.root();

        let i = skip_excluded(rng.uniform_int(count - 1), &[root]);
        let mut excluded = [root, i];
        excluded.sort_unstable();
        let j = skip_excluded(rng.uniform_int(count - 2), &excluded);

        let (Some(i_parent), Some(j_parent)) = (tree.parent(i), tree.parent(j)) else {
            return Proposal::Failed(OperatorFailure::NoValidMove(
                "picked the root".to_string(),
            ));
        };
        let legal = i_parent != j_parent
            && i != j_parent
            && j != i_parent
            && tree.height(j) < tree.height(i_parent)
            && tree.height(i) < tree.height(j_parent);
        if !legal {
            return Proposal::Failed(OperatorFailure::NoValidMove(format!(
                "nodes {} and {} cannot be exchanged",
                i, j
            )));
        }
        state.tree_mut(self.tree).exchange(i, j);
        Proposal::Proposed(0.0)
    }
}

/// For a node that can act as the grandparent of a narrow exchange, its
/// taller child (the parent) and its other child (the uncle).
fn narrow_parent(tree: &Tree, node: usize) -> Option<(usize, usize)> {
    let [a, b] = tree.children(node)?;
    let (parent, uncle) = if tree.height(a) >= tree.height(b) {
        (a, b)
    } else {
        (b, a)
    };
    if tree.is_tip(parent) || tree.height(uncle) >= tree.height(parent) {
        return None;
    }
    Some((parent, uncle))
}

/// Every `(node, uncle)` pair a narrow exchange may swap.
///
/// `node` must sit strictly below its parent. Otherwise the grandparent would
/// have two children of equal height after the swap and the move could not be
/// reversed.
fn narrow_pairs(tree: &Tree) -> impl Iterator<Item = (usize, usize)> + '_ {
    (0..tree.node_count())
        .filter_map(move |grandparent| narrow_parent(tree, grandparent))
        .flat_map(move |(parent, uncle)| {
            tree.children(parent)
                .into_iter()
                .flatten()
                .filter(move |&node| tree.height(node) < tree.height(parent))
                .map(move |node| (node, uncle))
        })
}

/// Map `k` onto the k-th index not in `excluded`, which must be sorted.
fn skip_excluded(mut k: usize, excluded: &[usize]) -> usize {
    for &e in excluded {
        if k >= e {
            k += 1;
        }
    }
    k
}

impl Operator<ModelGraph> for ExchangeOperator {
    fn core(&self) -> &OperatorCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut OperatorCore {
        &mut self.core
    }

    fn propose(&mut self, state: &mut ModelGraph, rng: &mut dyn RandomSource) -> Proposal {
        let tips = state.tree(self.tree).tip_count();
        if tips < MIN_EXCHANGE_TIPS {
            return Proposal::Failed(OperatorFailure::TreeTooSmall {
                tips,
                needed: MIN_EXCHANGE_TIPS,
            });
        }
        match self.variant {
            ExchangeVariant::Narrow => self.narrow_move(state, rng),
            ExchangeVariant::Wide => self.wide_move(state, rng),
        }
    }
}

use crate::{error::ConfigError, model::Model, parameter::Parameter, tree::Tree};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParameterId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TreeId(usize);

impl ParameterId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl TreeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// The mutable state of a phylogenetic model: its parameters and trees.
///
/// Operators address the pieces they change through ids handed out when the
/// graph is assembled.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelGraph {
    parameters: Vec<Parameter>,
    trees: Vec<Tree>,
}

impl ModelGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_parameter(&mut self, parameter: Parameter) -> ParameterId {
        self.parameters.push(parameter);
        ParameterId(self.parameters.len() - 1)
    }

    pub fn add_tree(&mut self, tree: Tree) -> TreeId {
        self.trees.push(tree);
        TreeId(self.trees.len() - 1)
    }

    pub fn parameter(&self, id: ParameterId) -> &Parameter {
        &self.parameters[id.0]
    }

    pub fn parameter_mut(&mut self, id: ParameterId) -> &mut Parameter {
        &mut self.parameters[id.0]
    }

    /// Like [`ModelGraph::parameter`], but reports ids from another graph.
    pub fn try_parameter(&self, id: ParameterId) -> Result<&Parameter, ConfigError> {
        self.parameters
            .get(id.0)
            .ok_or(ConfigError::UnknownComponent {
                kind: "parameter",
                index: id.0,
            })
    }

    pub fn try_tree(&self, id: TreeId) -> Result<&Tree, ConfigError> {
        self.trees.get(id.0).ok_or(ConfigError::UnknownComponent {
            kind: "tree",
            index: id.0,
        })
    }

    pub fn tree(&self, id: TreeId) -> &Tree {
        &self.trees[id.0]
    }

    pub fn tree_mut(&mut self, id: TreeId) -> &mut Tree {
        &mut self.trees[id.0]
    }

    pub fn parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter()
    }

    pub fn find_parameter(&self, name: &str) -> Option<ParameterId> {
        self.parameters
            .iter()
            .position(|p| p.name() == name)
            .map(ParameterId)
    }

    pub fn is_dirty(&self) -> bool {
        self.parameters.iter().any(Parameter::is_dirty) || self.trees.iter().any(Tree::is_dirty)
    }
}

impl Model for ModelGraph {
    fn store_state(&mut self) {
        self.parameters.iter_mut().for_each(Model::store_state);
        self.trees.iter_mut().for_each(Model::store_state);
    }

    fn restore_state(&mut self) {
        self.parameters.iter_mut().for_each(Model::restore_state);
        self.trees.iter_mut().for_each(Model::restore_state);
    }

    fn accept_state(&mut self) {
        self.parameters.iter_mut().for_each(Model::accept_state);
        self.trees.iter_mut().for_each(Model::accept_state);
    }
}

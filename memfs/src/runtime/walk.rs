use crate::{
    error::Error,
    runtime::types::Visit,
    storage::{NodeTree, tree::NodeData, types::Node},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

// Pre-order depth-first traversal starting at `node`.
//
// Children are visited in ascending order of their canonical path, a directory
// child is walked completely before its next sibling is visited.
pub fn walk_nodes<F>(tree: &NodeTree, node: Node, visit: &mut F) -> Result<Flow, Error>
where
    F: FnMut(Node, &NodeData) -> Result<Visit, Error>,
{
    let Some(data) = tree.get(node) else {
        return Ok(Flow::Continue);
    };

    match visit(node, data)? {
        Visit::SkipAll => return Ok(Flow::Stop),
        // nothing below a file, so skipping it changes nothing
        Visit::SkipDir => return Ok(Flow::Continue),
        Visit::Continue => {}
    }

    for child in tree.children(node) {
        if walk_nodes(tree, child, visit)? == Flow::Stop {
            return Ok(Flow::Stop);
        }
    }

    Ok(Flow::Continue)
}

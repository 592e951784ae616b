//! The flow footprint graph.
//!
//! A heap update is reasoned about inside a bounded, rooted graph of
//! memory nodes: the *footprint*. Node 0 is the primary root (the
//! dereferenced cell); further nodes are successors added while the
//! exploration finds potentially changed outflow. Each footprint node is
//! a fresh pointer constant; equalities with program state are asserted
//! by the exploration.
//!
//! The graph also builds the edge constraints of the flow domain: what a
//! node sends along a field is received by the successor's inflow, in the
//! epochs where the edge is live.

use z3::ast::{Ast, Bool, Int};

use crate::config::Predicate;
use crate::encoding::{Encoding, Epoch};
use crate::error::EngineResult;

/// One node of the footprint.
pub struct FootprintNode<'ctx> {
    pub index: usize,
    pub term: Int<'ctx>,
}

/// The bounded footprint of one update.
pub struct Footprint<'ctx> {
    nodes: Vec<FootprintNode<'ctx>>,
}

impl<'ctx> Footprint<'ctx> {
    pub fn new() -> Self {
        Footprint { nodes: Vec::new() }
    }

    /// Allocates the next footprint node.
    pub fn add_node(&mut self, encoding: &Encoding<'ctx, '_>) -> usize {
        let index = self.nodes.len();
        let term = Int::new_const(encoding.context(), format!("$fp-{}", index));
        self.nodes.push(FootprintNode { index, term });
        index
    }

    pub fn node(&self, index: usize) -> &FootprintNode<'ctx> {
        &self.nodes[index]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FootprintNode<'ctx>> {
        self.nodes.iter()
    }

    /// A term stating that the node coincides with an earlier one.
    ///
    /// Used both to skip re-exploration of aliased nodes and to state
    /// that a cell lies outside the footprint (negated, quantified).
    pub fn already_covered(
        &self,
        encoding: &Encoding<'ctx, '_>,
        term: &Int<'ctx>,
        before: usize,
    ) -> Bool<'ctx> {
        let mut cases: Vec<Bool> = Vec::new();
        for node in self.nodes.iter().take(before) {
            cases.push(node.term._eq(term));
        }
        let refs: Vec<&Bool> = cases.iter().collect();
        Bool::or(encoding.context(), &refs)
    }

    /// Membership of a term in the whole footprint.
    pub fn covers(&self, encoding: &Encoding<'ctx, '_>, term: &Int<'ctx>) -> Bool<'ctx> {
        self.already_covered(encoding, term, self.nodes.len())
    }
}

impl<'ctx> Default for Footprint<'ctx> {
    fn default() -> Self {
        Self::new()
    }
}

/// The flow rule of one edge: whatever the node sends along the field is
/// in the successor's inflow. Vacuous for a null node.
pub fn edge_flow_rule<'ctx>(
    encoding: &Encoding<'ctx, '_>,
    node: &Int<'ctx>,
    outflow: &Predicate,
    successor: &Int<'ctx>,
    epoch: Epoch,
) -> EngineResult<Bool<'ctx>> {
    let k = encoding.qv("edge-flow");
    let sent = encoding.predicate(outflow, node, Some(&k), epoch)?;
    let received = encoding.graph_flow(successor, &k, epoch);
    let rule = crate::encoding::forall_one(encoding, &k, &sent.implies(&received));
    Ok(node._eq(&encoding.null()).not().implies(&rule))
}

/// Keyset disjointness of two footprint nodes in an epoch.
pub fn keysets_disjoint<'ctx>(
    encoding: &Encoding<'ctx, '_>,
    first: &Int<'ctx>,
    second: &Int<'ctx>,
    epoch: Epoch,
) -> EngineResult<Bool<'ctx>> {
    let k = encoding.qv("keyset-pair");
    let both = Bool::and(
        encoding.context(),
        &[
            &encoding.keyset_contains(first, &k, epoch)?,
            &encoding.keyset_contains(second, &k, epoch)?,
        ],
    );
    let disjoint = crate::encoding::forall_one(encoding, &k, &both.not());
    // Aliased nodes trivially share their keyset.
    let alias = first._eq(second);
    Ok(Bool::or(encoding.context(), &[&alias, &disjoint]))
}

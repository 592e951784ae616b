//! Post-image of the atomic heap step `p->f = e`.
//!
//! The hardest command. The update is reasoned about inside a bounded
//! footprint rooted at the updated cell:
//!
//! 1. frame everything outside the footprint (heap, flow, ownership are
//!    `Next`-equal to `Now`);
//! 2. the primary root keeps its graph inflow; its updated field takes
//!    the right-hand side in `Next`;
//! 3. the old and new successors along the updated field are secondary
//!    roots; from every explored node, exploration descends wherever the
//!    outflow may have changed, up to the configured depth;
//! 4. each explored node must satisfy the node invariant in `Next`, and
//!    keysets of explored nodes must stay disjoint in `Next`;
//! 5. the step is classified pure, or an insertion/deletion of exactly
//!    one key, which must discharge a matching obligation.
//!
//! The post annotation is rebuilt by re-symbolizing the flows of the
//! touched cells and harvesting the inflow facts the two-state solver
//! entails. For every updated shared cell an [`Effect`] is emitted for
//! the interference set.

use tracing::{debug, trace};
use z3::ast::{Ast, Bool, Int};
use z3::{Config, Context};

use keyflow_language::{Expr, OperationKind, Printer, Sort};
use keyflow_logic::{
    Annotation, Axiom, Conjunct, Effect, MemoryAxiom, SymbolFactory, SymbolId, SymbolPool,
};

use crate::checker::{checker_for_now, ImplicationChecker};
use crate::encoding::{forall_one, forall_two, Encoding, Epoch};
use crate::error::{EngineError, EngineResult};
use crate::graph::{edge_flow_rule, keysets_disjoint, Footprint};
use crate::post::{candidates, PostCx, PostImage};

/// Purity state of one atomic step. No transitions once impure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Purity {
    Pure,
    Insertion,
    Deletion,
}

struct DerefPost<'ctx, 'a, 'e> {
    cx: &'e PostCx<'a>,
    encoding: &'e Encoding<'ctx, 'a>,
    checker: ImplicationChecker<'ctx, 'a, 'e>,
    fp: Footprint<'ctx>,
    /// Indices of footprint nodes that are live (non-null, not aliases).
    live: Vec<usize>,
    purity: Purity,
    impure_key: Int<'ctx>,
    field: String,
    location: String,
    depth: usize,
}

pub fn post_assign_deref(
    cx: &PostCx<'_>,
    pool: &mut SymbolPool,
    mut pre: Annotation,
    base: &Expr,
    field: &str,
    rhs: &Expr,
) -> EngineResult<PostImage> {
    let location = {
        let printer = Printer::new(cx.program);
        format!(
            "{}->{} = {}",
            printer.expr(base),
            field,
            printer.expr(rhs)
        )
    };
    trace!(%location, "post: heap step");

    cx.materialize_reads(pool, &mut pre.now, base)?;
    let root_sym = cx
        .eval(&pre.now, base)?
        .symbol()
        .ok_or_else(|| EngineError::unsupported("heap write through a constant").at(&location))?;
    cx.ensure_memory(pool, &mut pre.now, root_sym)?;
    let rhs_sym = cx.eval_to_symbol(pool, &mut pre.now, rhs)?;

    // Writes to still-local cells are invisible to other threads: update
    // the memory axiom in place, no footprint required.
    let is_local = pre.now.conjuncts.iter().any(
        |c| matches!(c, Conjunct::Axiom(Axiom::LocalMemory(m)) if m.node == root_sym),
    );
    if is_local {
        for conjunct in &mut pre.now.conjuncts {
            if let Conjunct::Axiom(Axiom::LocalMemory(m)) = conjunct {
                if m.node == root_sym {
                    m.set_field(field, rhs_sym);
                }
            }
        }
        return Ok(PostImage::pure(pre));
    }

    cx.node_type_check(base)?;
    homogeneity_check(cx, &location)?;

    let z3_config = Config::new();
    let ctx = Context::new(&z3_config);
    let encoding = Encoding::new(&ctx, cx.program, cx.config);
    let mut step = DerefPost::new(cx, &encoding, &pre, pool, root_sym, rhs_sym, field, location)?;

    if step.checker.implies_false()? {
        trace!("premise is false; pruning");
        return Ok(PostImage::pure(Annotation::bottom()));
    }

    step.explore(pool)?;
    step.assert_flow_conservation()?;
    step.check_keyset_disjointness(pool)?;
    step.frame_non_footprint();

    step.build_post(pool, pre, root_sym, rhs_sym)
}

fn homogeneity_check(cx: &PostCx<'_>, location: &str) -> EngineResult<()> {
    let node_type = cx.program.types.get(cx.config.flow_domain.node_type);
    for (field, ty) in &node_type.fields {
        if cx.program.types.sort(*ty) == Sort::Ptr && *ty != cx.config.flow_domain.node_type {
            return Err(EngineError::unsupported(format!(
                "non-homogeneous heap: field '{}' leaves the node type",
                field
            ))
            .at(location));
        }
    }
    Ok(())
}

impl<'ctx, 'a, 'e> DerefPost<'ctx, 'a, 'e> {
    #[allow(clippy::too_many_arguments)]
    fn new(
        cx: &'e PostCx<'a>,
        encoding: &'e Encoding<'ctx, 'a>,
        pre: &Annotation,
        pool: &SymbolPool,
        root_sym: SymbolId,
        rhs_sym: SymbolId,
        field: &str,
        location: String,
    ) -> EngineResult<Self> {
        let checker = checker_for_now(encoding, &pre.now, pool)?;
        let mut step = DerefPost {
            cx,
            encoding,
            checker,
            fp: Footprint::new(),
            live: Vec::new(),
            purity: Purity::Pure,
            impure_key: encoding.qv("impure-key"),
            field: field.to_string(),
            location,
            depth: cx.config.max_footprint_depth,
        };

        // Primary root: the updated cell. Its graph inflow is unchanged.
        let root_idx = step.fp.add_node(encoding);
        let root = step.fp.node(root_idx).term.clone();
        let root_enc = encoding
            .symbol(root_sym, pool)?
            .as_int()
            .ok_or_else(|| EngineError::internal("non-integer root symbol"))?;
        step.checker.add_premise_term(&root._eq(&root_enc));
        step.checker
            .add_premise_term(&encoding.maintains_flow(&root));

        // Heap frame: only the written field of the root changes.
        let n = encoding.qv("frame-node");
        let elsewhere = n._eq(&root).not().implies(&encoding.maintains_heap(&n, &[])?);
        step.checker
            .add_premise_term(&forall_one(encoding, &n, &elsewhere));
        step.checker
            .add_premise_term(&encoding.maintains_heap(&root, &[field])?);
        let rhs_enc = encoding.symbol(rhs_sym, pool)?;
        let written = encoding.heap_is(&root, field, &rhs_enc, Epoch::Next)?;
        step.checker.add_premise_term(&written);

        // Ownership frame: publishing the right-hand side (if a pointer).
        let o = encoding.qv("frame-owner");
        if pool.sort(rhs_sym) == Some(Sort::Ptr) {
            let rhs_int = rhs_enc
                .as_int()
                .ok_or_else(|| EngineError::internal("non-integer pointer symbol"))?;
            let keeps = o
                ._eq(&rhs_int)
                .not()
                .implies(&encoding.maintains_ownership(&o));
            step.checker
                .add_premise_term(&forall_one(encoding, &o, &keeps));
            step.checker
                .add_premise_term(&encoding.ownership(&rhs_int, Epoch::Next).not());
        } else {
            step.checker
                .add_premise_term(&forall_one(encoding, &o, &encoding.maintains_ownership(&o)));
        }

        Ok(step)
    }

    fn explore(&mut self, pool: &SymbolPool) -> EngineResult<()> {
        let depth = self.depth;
        trace!(depth, "exploring footprint from the root");
        self.explore_node(0, depth, pool)?;

        // Secondary roots: the successors along the updated field, before
        // and after the step, when the field is a pointer.
        let field_is_ptr = {
            let node_type = self
                .cx
                .program
                .types
                .get(self.cx.config.flow_domain.node_type);
            node_type
                .field(&self.field)
                .map(|ty| self.cx.program.types.sort(ty) == Sort::Ptr)
                .unwrap_or(false)
        };
        if field_is_ptr {
            trace!("exploring secondary root: new successor");
            let field = self.field.clone();
            self.explore_successor(0, &field, Epoch::Next, depth, pool)?;
            trace!("exploring secondary root: old successor");
            self.explore_successor(0, &field, Epoch::Now, depth, pool)?;
        }
        Ok(())
    }

    fn explore_node(&mut self, index: usize, depth: usize, pool: &SymbolPool) -> EngineResult<()> {
        let node = self.fp.node(index).term.clone();
        trace!(index, depth, "visiting footprint node");

        if self.checker.implies_term(&node._eq(&self.encoding.null()))? {
            trace!(index, "node is null; skipping");
            return Ok(());
        }
        if index > 0 {
            let covered = self.fp.already_covered(self.encoding, &node, index);
            if self.checker.implies_term(&covered)? {
                trace!(index, "node already covered");
                self.checker.add_premise_term(&covered);
                return Ok(());
            }
        }
        if depth == 0 {
            // A genuinely new node beyond the depth bound.
            return Err(
                EngineError::footprint_too_small(self.cx.config.max_footprint_depth)
                    .at(&self.location),
            );
        }
        self.live.push(index);

        // The node invariant must survive the step.
        let invariant = self.encoding.invariant(&node, Epoch::Next)?;
        if !self.checker.implies_term(&invariant)? {
            return Err(EngineError::invariant_violation(format!(
                "footprint node #{}",
                index
            ))
            .at(&self.location)
            .because("the next-state invariant cannot be established within the footprint"));
        }

        self.check_specification(index, pool)?;

        // Descend only where the node's outflow predicate may have
        // changed. Sends depend on the sender's fields alone, and only
        // the root's written field changes, so inflow changes never
        // propagate past the footprint; the conservation equations cover
        // the edges among footprint members semantically.
        let fields: Vec<String> = self
            .cx
            .config
            .pointer_fields()
            .map(|(f, _)| f.to_string())
            .collect();
        for field in fields {
            if self.outflow_unchanged(index, &field)? {
                continue;
            }
            trace!(index, field = %field, "outflow potentially changed; descending");
            self.explore_successor(index, &field, Epoch::Next, depth - 1, pool)?;
        }
        Ok(())
    }

    fn explore_successor(
        &mut self,
        from: usize,
        field: &str,
        edge_epoch: Epoch,
        depth: usize,
        pool: &SymbolPool,
    ) -> EngineResult<()> {
        let index = self.fp.add_node(self.encoding);
        let node = self.fp.node(from).term.clone();
        let successor = self.fp.node(index).term.clone();

        // The root's edge differs per epoch; interior edges are framed.
        let epochs: &[Epoch] = if from == 0 {
            &[edge_epoch]
        } else {
            &Epoch::BOTH
        };
        for epoch in epochs {
            let edge = self.encoding.heap_is(
                &node,
                field,
                &z3::ast::Dynamic::from_ast(&successor),
                *epoch,
            )?;
            self.checker.add_premise_term(&edge);
            let outflow = self
                .cx
                .config
                .flow_domain
                .outflow_of(field)
                .ok_or_else(|| {
                    EngineError::config(format!("no outflow predicate for field '{}'", field))
                })?;
            let rule = edge_flow_rule(self.encoding, &node, outflow, &successor, *epoch)?;
            self.checker.add_premise_term(&rule);
        }

        // Non-decreasing flow domains must keep the footprint loop-free.
        if !self.cx.config.flow_domain.decreasing {
            let fresh = self
                .fp
                .already_covered(self.encoding, &successor, index)
                .not();
            if !self.checker.implies_term(&fresh)? {
                return Err(EngineError::unsupported(
                    "potentially cyclic footprint under a non-decreasing flow domain",
                )
                .at(&self.location));
            }
        }

        self.explore_node(index, depth, pool)
    }

    /// `true` if the node is null or its outflow along the field is the
    /// same in both epochs, for every key the root receives.
    fn outflow_unchanged(&self, index: usize, field: &str) -> EngineResult<bool> {
        let node = self.fp.node(index).term.clone();
        let root = self.fp.node(0).term.clone();
        let outflow = self
            .cx
            .config
            .flow_domain
            .outflow_of(field)
            .ok_or_else(|| {
                EngineError::config(format!("no outflow predicate for field '{}'", field))
            })?;
        let k = self.encoding.qv("outflow-check");
        let same = self
            .encoding
            .predicate(outflow, &node, Some(&k), Epoch::Now)?
            .iff(&self.encoding.predicate(outflow, &node, Some(&k), Epoch::Next)?);
        let relevant = self.encoding.graph_flow(&root, &k, Epoch::Now);
        let unchanged = forall_one(self.encoding, &k, &relevant.implies(&same));
        let is_null = node._eq(&self.encoding.null());
        let verdict = Bool::or(self.encoding.context(), &[&is_null, &unchanged]);
        self.checker.implies_term(&verdict)
    }

    /// `contains(node, key) ∧ key ∈ keyset(node)` in an epoch: the node
    /// decides the structure's content at this key.
    fn node_contains(
        &self,
        node: &Int<'ctx>,
        key: &Int<'ctx>,
        epoch: Epoch,
    ) -> EngineResult<Bool<'ctx>> {
        let holds =
            self.encoding
                .predicate(&self.cx.config.contains_key, node, Some(key), epoch)?;
        let owns = self.encoding.keyset_contains(node, key, epoch)?;
        Ok(Bool::and(self.encoding.context(), &[&holds, &owns]))
    }

    fn content_unchanged_at(
        &self,
        node: &Int<'ctx>,
        key: &Int<'ctx>,
    ) -> EngineResult<Bool<'ctx>> {
        Ok(self
            .node_contains(node, key, Epoch::Now)?
            .iff(&self.node_contains(node, key, Epoch::Next)?))
    }

    /// Purity classification at one explored node.
    fn check_specification(&mut self, index: usize, _pool: &SymbolPool) -> EngineResult<()> {
        let node = self.fp.node(index).term.clone();
        let k = self.encoding.qv("purity");

        let all_unchanged = forall_one(self.encoding, &k, &self.content_unchanged_at(&node, &k)?);
        if self.checker.implies_term(&all_unchanged)? {
            return Ok(());
        }

        if self.purity != Purity::Pure {
            return Err(EngineError::linearization_failure(
                self.location.clone(),
                "a second impure heap update within one atomic step",
            )
            .at(&self.location));
        }

        // Exactly one key changes; pin it to the impure-key witness.
        let impure = self.impure_key.clone();
        let witness = self.content_unchanged_at(&node, &impure)?.not();
        self.checker.add_premise_term(&witness);
        let others = forall_one(
            self.encoding,
            &k,
            &k._eq(&impure)
                .not()
                .implies(&self.content_unchanged_at(&node, &k)?),
        );
        if !self.checker.implies_term(&others)? {
            return Err(EngineError::linearization_failure(
                self.location.clone(),
                "multiple keys inserted or deleted at once",
            )
            .at(&self.location));
        }

        let inserted = Bool::and(
            self.encoding.context(),
            &[
                &self.node_contains(&node, &impure, Epoch::Now)?.not(),
                &self.node_contains(&node, &impure, Epoch::Next)?,
            ],
        );
        let deleted = Bool::and(
            self.encoding.context(),
            &[
                &self.node_contains(&node, &impure, Epoch::Now)?,
                &self.node_contains(&node, &impure, Epoch::Next)?.not(),
            ],
        );
        if self.checker.implies_term(&inserted)? {
            debug!("step classified as insertion");
            self.purity = Purity::Insertion;
        } else if self.checker.implies_term(&deleted)? {
            debug!("step classified as deletion");
            self.purity = Purity::Deletion;
        } else {
            return Err(EngineError::linearization_failure(
                self.location.clone(),
                "impure step is neither an insertion nor a deletion",
            )
            .at(&self.location));
        }
        Ok(())
    }

    /// The inflow-conservation equation of each live footprint node:
    /// everything arriving after the step is either frame inflow (arrived
    /// before and was not sent by a footprint predecessor) or is sent by
    /// a footprint predecessor now. The primary root is exempt — its
    /// graph inflow is framed wholesale.
    ///
    /// Predecessors are found semantically: every live node is a
    /// candidate sender along every pointer field, with the edge's
    /// existence (`heap_f(p) = m`) part of the contribution's guard.
    /// Senders outside the footprint keep their edges and their sends
    /// (their fields are framed), so their contributions ride along in
    /// the frame term; this is what lets the footprint close without
    /// descending into unchanged neighbours.
    fn assert_flow_conservation(&self) -> EngineResult<()> {
        let k = self.encoding.qv("conservation");
        for index in &self.live {
            if *index == 0 {
                continue;
            }
            let node = self.fp.node(*index).term.clone();

            let sent_into = |epoch: Epoch| -> EngineResult<Vec<Bool<'ctx>>> {
                let mut parts = Vec::new();
                for sender_index in &self.live {
                    let sender = self.fp.node(*sender_index).term.clone();
                    for (field, outflow) in self.cx.config.pointer_fields() {
                        let edge = self
                            .encoding
                            .heap(&sender, field, epoch)?
                            .as_int()
                            .ok_or_else(|| {
                                EngineError::internal("pointer field of non-integer sort")
                            })?
                            ._eq(&node);
                        let sends = self.encoding.predicate(outflow, &sender, Some(&k), epoch)?;
                        // Owned cells are unlinked and send nothing; the
                        // published right-hand side starts sending in Next.
                        let unowned = self.encoding.ownership(&sender, epoch).not();
                        parts.push(Bool::and(
                            self.encoding.context(),
                            &[
                                &edge,
                                &sender._eq(&self.encoding.null()).not(),
                                &unowned,
                                &sends,
                            ],
                        ));
                    }
                }
                Ok(parts)
            };

            let or_of = |parts: Vec<Bool<'ctx>>| -> Bool<'ctx> {
                let refs: Vec<&Bool> = parts.iter().collect();
                Bool::or(self.encoding.context(), &refs)
            };

            let sent_now = or_of(sent_into(Epoch::Now)?);
            let sent_next = or_of(sent_into(Epoch::Next)?);
            let frame = Bool::and(
                self.encoding.context(),
                &[
                    &self.encoding.graph_flow(&node, &k, Epoch::Now),
                    &sent_now.not(),
                ],
            );
            let arrives = Bool::or(self.encoding.context(), &[&frame, &sent_next]);
            let equation = self
                .encoding
                .graph_flow(&node, &k, Epoch::Next)
                .iff(&arrives);
            self.checker
                .add_premise_term(&forall_one(self.encoding, &k, &equation));
        }
        Ok(())
    }

    /// Keysets of live footprint nodes: assumed disjoint before the step
    /// (the structure's laminarity), checked disjoint after it.
    fn check_keyset_disjointness(&self, _pool: &SymbolPool) -> EngineResult<()> {
        for (i, first) in self.live.iter().enumerate() {
            for second in &self.live[i + 1..] {
                let a = self.fp.node(*first).term.clone();
                let b = self.fp.node(*second).term.clone();
                let before = keysets_disjoint(self.encoding, &a, &b, Epoch::Now)?;
                self.checker.add_premise_term(&before);
                let disjoint = keysets_disjoint(self.encoding, &a, &b, Epoch::Next)?;
                if !self.checker.implies_term(&disjoint)? {
                    return Err(EngineError::invariant_violation(format!(
                        "keysets of footprint nodes #{} and #{} overlap",
                        first, second
                    ))
                    .at(&self.location));
                }
            }
        }
        Ok(())
    }

    /// Flow outside the footprint is unchanged.
    fn frame_non_footprint(&self) {
        let n = self.encoding.qv("nonfp-node");
        let k = self.encoding.qv("nonfp-key");
        let outside = self.fp.covers(self.encoding, &n).not();
        let frame = outside.implies(&self.encoding.maintains_flow_at(&n, &k));
        self.checker
            .add_premise_term(&forall_two(self.encoding, &n, &k, &frame));
    }

    /// Rebuilds the post annotation and the emitted effects.
    fn build_post(
        mut self,
        pool: &mut SymbolPool,
        pre: Annotation,
        root_sym: SymbolId,
        rhs_sym: SymbolId,
    ) -> EngineResult<PostImage> {
        // Re-symbolize the flows of every shared cell inside the
        // footprint; everything outside keeps its symbols.
        let mut touched: Vec<(SymbolId, MemoryAxiom, MemoryAxiom)> = Vec::new();
        let mut fresh_flows: Vec<SymbolId> = Vec::new();

        let shared_cells: Vec<MemoryAxiom> = pre.now.shared_memories().cloned().collect();
        for cell in shared_cells {
            let node_enc = self
                .encoding
                .symbol(cell.node, pool)?
                .as_int()
                .ok_or_else(|| EngineError::internal("non-integer node symbol"))?;
            let is_root = cell.node == root_sym;
            if !is_root {
                let outside = self.fp.covers(self.encoding, &node_enc).not();
                if self.checker.implies_term(&outside)? {
                    continue; // untouched, keep as is
                }
            }

            let fresh_flow = {
                let mut factory = SymbolFactory::new(pool);
                factory.fresh_flow()
            };
            fresh_flows.push(fresh_flow);
            let k = self.encoding.qv("link-flow");
            let linked = self
                .encoding
                .flow_member(fresh_flow, &k)
                .iff(&self.encoding.graph_flow(&node_enc, &k, Epoch::Next));
            self.checker
                .add_premise_term(&forall_one(self.encoding, &k, &linked));

            let mut updated = cell.clone();
            updated.flow = fresh_flow;
            if is_root {
                updated.set_field(&self.field, rhs_sym);
            }
            touched.push((cell.node, cell, updated));
        }

        // Publication: writing a pointer to a still-local cell hands it
        // to the structure. The cell turns shared, with its flow tied to
        // the next state; no effect is emitted for it, since no other
        // thread could observe a pre-state of the cell.
        let mut published: Option<MemoryAxiom> = None;
        let local_rhs = pre
            .now
            .conjuncts
            .iter()
            .find_map(|c| match c {
                Conjunct::Axiom(Axiom::LocalMemory(m)) if m.node == rhs_sym => Some(m.clone()),
                _ => None,
            });
        if let Some(mut cell) = local_rhs {
            let fresh_flow = {
                let mut factory = SymbolFactory::new(pool);
                factory.fresh_flow()
            };
            fresh_flows.push(fresh_flow);
            let node_enc = self
                .encoding
                .symbol(cell.node, pool)?
                .as_int()
                .ok_or_else(|| EngineError::internal("non-integer node symbol"))?;
            let k = self.encoding.qv("link-flow");
            let linked = self
                .encoding
                .flow_member(fresh_flow, &k)
                .iff(&self.encoding.graph_flow(&node_enc, &k, Epoch::Next));
            self.checker
                .add_premise_term(&forall_one(self.encoding, &k, &linked));
            cell.flow = fresh_flow;
            published = Some(cell);
        }

        // Ghost bookkeeping per the purity verdict.
        let mut post_now = keyflow_logic::Conjunction::new();
        let mut discharged = false;
        let wanted = match self.purity {
            Purity::Pure => None,
            Purity::Insertion => Some(OperationKind::Insert),
            Purity::Deletion => Some(OperationKind::Delete),
        };
        for conjunct in &pre.now.conjuncts {
            let replacement = match conjunct {
                Conjunct::Axiom(Axiom::SharedMemory(mem)) => {
                    match touched.iter().find(|(node, _, _)| *node == mem.node) {
                        Some((_, _, updated)) => {
                            Some(Conjunct::Axiom(Axiom::SharedMemory(updated.clone())))
                        }
                        None => None,
                    }
                }
                Conjunct::Axiom(Axiom::LocalMemory(mem)) if mem.node == rhs_sym => published
                    .clone()
                    .map(|cell| Conjunct::Axiom(Axiom::SharedMemory(cell))),
                Conjunct::Axiom(Axiom::Obligation { kind, key }) if wanted == Some(*kind) => {
                    let key_enc = self
                        .encoding
                        .symbol(*key, pool)?
                        .as_int()
                        .ok_or_else(|| EngineError::internal("non-integer obligation key"))?;
                    if !discharged && self.checker.implies_term(&key_enc._eq(&self.impure_key))? {
                        discharged = true;
                        Some(Conjunct::Axiom(Axiom::Fulfillment {
                            kind: *kind,
                            key: *key,
                            return_value: true,
                        }))
                    } else {
                        None
                    }
                }
                _ => None,
            };
            post_now
                .conjuncts
                .push(replacement.unwrap_or_else(|| conjunct.clone()));
        }

        if wanted.is_some() && !discharged {
            return Err(EngineError::linearization_failure(
                format!("{}", pre.now),
                format!("{}", post_now),
            )
            .at(&self.location)
            .because("impure heap update without a matching obligation"));
        }

        // Harvest inflow knowledge for the re-symbolized flows.
        let mut post = Annotation {
            now: post_now,
            past: pre.past.clone(),
            future: pre.future.clone(),
        };
        let data_terms = candidates::data_terms_in(&post, pool);
        let facts =
            candidates::harvest_inflow_facts(&self.checker, pool, &fresh_flows, &data_terms)?;
        for fact in facts {
            post.now.push(fact);
        }
        keyflow_logic::simplify::simplify_annotation(&mut post);

        // Emit one effect per updated shared cell.
        let effects: Vec<Effect> = touched
            .into_iter()
            .map(|(_, before, after)| {
                let mut cell_symbols = std::collections::BTreeSet::new();
                let probe = Effect {
                    pre: before.clone(),
                    post: after.clone(),
                    context: keyflow_logic::Conjunction::new(),
                };
                cell_symbols.extend(keyflow_logic::collect::effect_symbols(&probe));
                let context = self.cx.effect_context(&pre.now, &cell_symbols);
                Effect {
                    pre: before,
                    post: after,
                    context,
                }
            })
            .collect();

        debug!(
            effects = effects.len(),
            footprint = self.fp.len(),
            "heap step complete"
        );
        Ok(PostImage { post, effects })
    }
}

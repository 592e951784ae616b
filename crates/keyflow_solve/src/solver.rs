//! The solver facade.
//!
//! The verifier loop talks to the engine exclusively through [`Solver`]:
//!
//! - [`Solver::post`] — per-command symbolic successors (§ the `post`
//!   modules);
//! - [`Solver::join`] — an over-approximation implied by every input;
//! - [`Solver::make_stable`] — removal of knowledge destructible by the
//!   interference set;
//! - [`Solver::effect_subsumes`] — subsumption between observed effects,
//!   the basis of interference consolidation;
//! - [`Solver::try_linearize`] — pure linearization of read-only
//!   operations.
//!
//! Every operation scopes its own Z3 context; nothing solver-side
//! outlives a call.

use tracing::{debug, trace};
use z3::ast::{exists_const, Ast, Bool};
use z3::{Config, Context};

use keyflow_language::{Expr, Program};
use keyflow_logic::{
    collect, equal, Annotation, Axiom, Conjunct, Conjunction, Effect, SymbolPool,
};

use crate::checker::{checker_for_now, ImplicationChecker};
use crate::config::SolverConfig;
use crate::encoding::{forall_one, forall_two, Encoding, Epoch};
use crate::error::{EngineError, EngineResult};
use crate::post::{self, linearize, PostCommand, PostImage};

/// The engine facade the verifier drives.
pub struct Solver<'a> {
    program: &'a Program,
    config: &'a SolverConfig,
}

impl<'a> Solver<'a> {
    /// Builds a solver, validating the configuration against the program.
    pub fn new(program: &'a Program, config: &'a SolverConfig) -> EngineResult<Self> {
        config
            .validate(program)
            .map_err(|e| EngineError::config(e.to_string()))?;
        Ok(Solver { program, config })
    }

    pub fn program(&self) -> &'a Program {
        self.program
    }

    pub fn config(&self) -> &'a SolverConfig {
        self.config
    }

    /// The post-image of one primitive command.
    pub fn post(
        &self,
        pool: &mut SymbolPool,
        pre: Annotation,
        command: PostCommand<'_>,
    ) -> EngineResult<PostImage> {
        post::post(self.program, self.config, pool, pre, command)
    }

    /// Materializes a memory axiom for a shared cell from the node
    /// invariant. Used to seed entry states (the cells shared variables
    /// point at) before verification starts.
    pub fn materialize_cell(
        &self,
        pool: &mut SymbolPool,
        now: &mut Conjunction,
        node: keyflow_logic::SymbolId,
    ) -> EngineResult<()> {
        let cx = post::PostCx {
            program: self.program,
            config: self.config,
        };
        cx.ensure_memory(pool, now, node)
    }

    /// Attempts pure linearization of outstanding obligations.
    pub fn try_linearize(
        &self,
        pool: &mut SymbolPool,
        annotation: Annotation,
    ) -> EngineResult<Annotation> {
        let cx = post::PostCx {
            program: self.program,
            config: self.config,
        };
        linearize::try_pure_linearization(&cx, pool, annotation)
    }

    /// `true` iff the annotation is unsatisfiable.
    pub fn is_false(&self, pool: &SymbolPool, annotation: &Annotation) -> EngineResult<bool> {
        if annotation.is_bottom() {
            return Ok(true);
        }
        let z3_config = Config::new();
        let ctx = Context::new(&z3_config);
        let encoding = Encoding::new(&ctx, self.program, self.config);
        let checker = checker_for_now(&encoding, &annotation.now, pool)?;
        checker.implies_false()
    }

    /// `true` iff the annotation entails a program condition.
    pub fn entails(
        &self,
        pool: &SymbolPool,
        annotation: &Annotation,
        condition: &Expr,
    ) -> EngineResult<bool> {
        if annotation.is_bottom() {
            return Ok(true);
        }
        let z3_config = Config::new();
        let ctx = Context::new(&z3_config);
        let encoding = Encoding::new(&ctx, self.program, self.config);
        let checker = checker_for_now(&encoding, &annotation.now, pool)?;
        let encoded = encoding
            .expr(condition, Epoch::Now)?
            .as_bool()
            .ok_or_else(|| EngineError::internal("assert condition is not boolean"))?;
        checker.implies_term(&encoded)
    }

    /// `true` iff the state entails a formula, *without* assuming the
    /// node invariants. This is the establishment direction: the
    /// initializer check must prove the invariants rather than assume
    /// them.
    pub fn entails_formula_raw(
        &self,
        pool: &SymbolPool,
        now: &Conjunction,
        formula: &Conjunction,
    ) -> EngineResult<bool> {
        let z3_config = Config::new();
        let ctx = Context::new(&z3_config);
        let encoding = Encoding::new(&ctx, self.program, self.config);
        let mut checker = ImplicationChecker::new(&encoding);
        checker.add_premise_formula(now, Epoch::Now, pool)?;
        checker.implies_formula(formula, Epoch::Now, pool)
    }

    //
    // Join
    //

    /// An over-approximation implied by every input annotation.
    ///
    /// Seeds the result with every syntactically distinct conjunct of the
    /// inputs and keeps those every input entails; past and future
    /// predicates survive by syntactic intersection.
    pub fn join(
        &self,
        pool: &SymbolPool,
        annotations: Vec<Annotation>,
    ) -> EngineResult<Annotation> {
        let live: Vec<Annotation> = annotations
            .into_iter()
            .filter(|a| !a.is_bottom())
            .collect();
        match live.len() {
            0 => return Ok(Annotation::bottom()),
            1 => return Ok(live.into_iter().next().expect("one element")),
            _ => {}
        }
        trace!(inputs = live.len(), "join");

        // Candidate set: all distinct conjuncts of all inputs.
        let mut candidates: Vec<Conjunct> = Vec::new();
        for annotation in &live {
            for conjunct in &annotation.now.conjuncts {
                if !candidates
                    .iter()
                    .any(|c| equal::conjuncts_equal(c, conjunct))
                {
                    candidates.push(conjunct.clone());
                }
            }
        }

        let mut kept = vec![true; candidates.len()];
        for annotation in &live {
            let z3_config = Config::new();
            let ctx = Context::new(&z3_config);
            let encoding = Encoding::new(&ctx, self.program, self.config);
            let checker = checker_for_now(&encoding, &annotation.now, pool)?;
            for (index, candidate) in candidates.iter().enumerate() {
                if !kept[index] {
                    continue;
                }
                let singleton = Conjunction {
                    conjuncts: vec![candidate.clone()],
                };
                kept[index] = checker.implies_formula(&singleton, Epoch::Now, pool)?;
            }
        }

        let now = Conjunction {
            conjuncts: candidates
                .into_iter()
                .zip(kept)
                .filter_map(|(c, keep)| keep.then_some(c))
                .collect(),
        };

        // Temporal predicates: syntactic intersection.
        let (first, rest) = live.split_first().expect("at least two inputs");
        let past = first
            .past
            .iter()
            .filter(|p| {
                rest.iter().all(|other| {
                    other
                        .past
                        .iter()
                        .any(|q| equal::conjunctions_equal(&p.formula, &q.formula))
                })
            })
            .cloned()
            .collect();
        let future = first
            .future
            .iter()
            .filter(|f| {
                rest.iter().all(|other| {
                    other.future.iter().any(|g| {
                        f.command == g.command
                            && equal::conjunctions_equal(&f.pre, &g.pre)
                            && equal::conjunctions_equal(&f.post, &g.post)
                    })
                })
            })
            .cloned()
            .collect();

        let mut joined = Annotation { now, past, future };
        keyflow_logic::simplify::simplify_annotation(&mut joined);
        debug!(kept = joined.now.len(), "join complete");
        Ok(joined)
    }

    //
    // Stability
    //

    /// Removes every conjunct the interference set can destroy.
    ///
    /// A quick syntactic pass keeps everything that only concerns symbol
    /// values or this thread's locals; shared-variable bindings are
    /// transient and dropped outright. Shared memory axioms are treated
    /// field by field: a field every effect provably preserves keeps its
    /// symbol, a destructible field is havocked with a fresh one, and the
    /// flow is always re-symbolized — the cell's existence itself is
    /// stable (there is no reclamation). Past predicates are immune;
    /// future predicates must keep a stable precondition.
    pub fn make_stable(
        &self,
        pool: &mut SymbolPool,
        mut annotation: Annotation,
        effects: &[Effect],
    ) -> EngineResult<Annotation> {
        if effects.is_empty() || annotation.is_bottom() {
            return Ok(annotation);
        }
        trace!(
            conjuncts = annotation.now.len(),
            effects = effects.len(),
            "stabilizing"
        );

        let mut stable: Vec<Conjunct> = Vec::new();
        let mut checks = 0usize;
        for conjunct in std::mem::take(&mut annotation.now.conjuncts) {
            match &conjunct {
                Conjunct::Axiom(Axiom::EqualsTo { var, .. })
                    if self.program.var(*var).shared =>
                {
                    // Another thread may retarget the variable at any time.
                    continue;
                }
                Conjunct::Axiom(Axiom::SharedMemory(mem)) => {
                    let mut weakened = mem.clone();
                    let fields: Vec<String> =
                        mem.fields().iter().map(|(f, _)| f.clone()).collect();
                    for field in fields {
                        let mut survives = true;
                        for effect in effects {
                            checks += 1;
                            if !self.field_preserved_by(pool, mem, &field, effect)? {
                                survives = false;
                                break;
                            }
                        }
                        if !survives {
                            let old = weakened
                                .field(&field)
                                .ok_or_else(|| EngineError::internal("missing field"))?;
                            let fresh = {
                                let mut factory =
                                    keyflow_logic::SymbolFactory::new(pool);
                                factory.fresh_like(old)
                            };
                            weakened.set_field(&field, fresh);
                        }
                    }
                    // The current inflow may have changed regardless.
                    let fresh_flow = {
                        let mut factory = keyflow_logic::SymbolFactory::new(pool);
                        factory.fresh_flow()
                    };
                    weakened.flow = fresh_flow;
                    stable.push(Conjunct::Axiom(Axiom::SharedMemory(weakened)));
                }
                Conjunct::Implication(implication) => {
                    let touches_heap = implication
                        .premise
                        .iter()
                        .chain(&implication.conclusion)
                        .any(|a| a.as_memory().is_some());
                    if !touches_heap {
                        stable.push(conjunct);
                    }
                }
                // Everything else speaks about immutable symbol values or
                // this thread's private state.
                _ => stable.push(conjunct),
            }
        }
        debug!(checks, kept = stable.len(), "stabilization complete");
        annotation.now.conjuncts = stable;

        // Future predicates whose precondition lost a conjunct are gone.
        let now = annotation.now.clone();
        annotation.future.retain(|f| {
            f.pre
                .conjuncts
                .iter()
                .all(|c| equal::syntactically_contains(&now, c) || !c_mentions_heap(c))
        });

        Ok(annotation)
    }

    /// `true` iff applying the effect from any state satisfying its
    /// context preserves one field of the given memory axiom.
    fn field_preserved_by(
        &self,
        pool: &SymbolPool,
        mem: &keyflow_logic::MemoryAxiom,
        field: &str,
        effect: &Effect,
    ) -> EngineResult<bool> {
        let z3_config = Config::new();
        let ctx = Context::new(&z3_config);
        let encoding = Encoding::new(&ctx, self.program, self.config);
        let mut checker = ImplicationChecker::new(&encoding);

        // The observer's knowledge: the candidate cell.
        let observed = Conjunction::from_axioms(vec![Axiom::SharedMemory(mem.clone())]);
        checker.add_premise_formula(&observed, Epoch::Now, pool)?;

        // The actor's knowledge, encoded separately: the observer's cell
        // and the actor's cells may alias.
        let mut actor = effect.context.clone();
        if !actor
            .memories()
            .any(|m| m.node == effect.pre.node)
        {
            actor
                .conjuncts
                .push(Conjunct::Axiom(Axiom::SharedMemory(effect.pre.clone())));
        }
        let actor_encoded = encoding.conjunction(&actor, Epoch::Now, pool)?;
        checker.add_premise_term(&actor_encoded);

        // The step: the effect cell becomes its post shape, everything
        // else is framed.
        let post = Conjunction::from_axioms(vec![Axiom::SharedMemory(effect.post.clone())]);
        let post_encoded = encoding.conjunction(&post, Epoch::Next, pool)?;
        checker.add_premise_term(&post_encoded);

        let updated = encoding
            .symbol(effect.pre.node, pool)?
            .as_int()
            .ok_or_else(|| EngineError::internal("non-integer effect node"))?;
        let n = encoding.qv("stability-node");
        let k = encoding.qv("stability-key");
        let heap_frame = n
            ._eq(&updated)
            .not()
            .implies(&encoding.maintains_heap(&n, &[])?);
        checker.add_premise_term(&forall_one(&encoding, &n, &heap_frame));
        let flow_frame = n
            ._eq(&updated)
            .not()
            .implies(&encoding.maintains_flow_at(&n, &k));
        checker.add_premise_term(&forall_two(&encoding, &n, &k, &flow_frame));
        let own_frame = encoding.maintains_ownership(&n);
        checker.add_premise_term(&forall_one(&encoding, &n, &own_frame));

        // Preserved iff the field still holds its symbol afterwards.
        let node = encoding
            .symbol(mem.node, pool)?
            .as_int()
            .ok_or_else(|| EngineError::internal("non-integer node symbol"))?;
        let value = encoding.symbol(
            mem.field(field)
                .ok_or_else(|| EngineError::internal("missing field"))?,
            pool,
        )?;
        let conclusion = encoding.heap_is(&node, field, &value, Epoch::Next)?;
        checker.implies_term(&conclusion)
    }

    //
    // Effect subsumption
    //

    /// `true` iff `general` subsumes `specific`: every transition the
    /// specific effect describes is a transition of the general one (its
    /// precondition, postcondition, and context are all implied).
    pub fn effect_subsumes(
        &self,
        pool: &SymbolPool,
        general: &Effect,
        specific: &Effect,
    ) -> EngineResult<bool> {
        // Fast path: identical up to symbol renaming.
        if equal::effects_alpha_equal(general, specific) {
            return Ok(true);
        }

        let z3_config = Config::new();
        let ctx = Context::new(&z3_config);
        let encoding = Encoding::new(&ctx, self.program, self.config);
        let mut checker = ImplicationChecker::new(&encoding);

        // Premise: the specific effect's transition.
        let mut pre_state = specific.context.clone();
        if !pre_state.memories().any(|m| m.node == specific.pre.node) {
            pre_state
                .conjuncts
                .push(Conjunct::Axiom(Axiom::SharedMemory(specific.pre.clone())));
        }
        checker.add_premise_formula(&pre_state, Epoch::Now, pool)?;
        let post = Conjunction::from_axioms(vec![Axiom::SharedMemory(specific.post.clone())]);
        let post_encoded = encoding.conjunction(&post, Epoch::Next, pool)?;
        checker.add_premise_term(&post_encoded);

        // Conclusion: some instantiation of the general effect's symbols
        // describes the same transition on the same cell.
        let mut description: Vec<Bool> = Vec::new();
        let g_pre = Conjunction::from_axioms(vec![Axiom::SharedMemory(general.pre.clone())]);
        description.push(encoding.conjunction(&g_pre, Epoch::Now, pool)?);
        let g_post = Conjunction::from_axioms(vec![Axiom::SharedMemory(general.post.clone())]);
        description.push(encoding.conjunction(&g_post, Epoch::Next, pool)?);
        description.push(encoding.conjunction(&general.context, Epoch::Now, pool)?);
        let same_cell = encoding
            .symbol(general.pre.node, pool)?
            .as_int()
            .ok_or_else(|| EngineError::internal("non-integer effect node"))?
            ._eq(
                &encoding
                    .symbol(specific.pre.node, pool)?
                    .as_int()
                    .ok_or_else(|| EngineError::internal("non-integer effect node"))?,
            );
        description.push(same_cell);
        let refs: Vec<&Bool> = description.iter().collect();
        let body = Bool::and(encoding.context(), &refs);

        let bound_symbols: Vec<z3::ast::Dynamic> = collect::effect_symbols(general)
            .into_iter()
            .filter(|s| !pool.is_flow(*s))
            .map(|s| encoding.symbol(s, pool))
            .collect::<EngineResult<_>>()?;
        let bounds: Vec<&dyn Ast> = bound_symbols
            .iter()
            .map(|d| d as &dyn Ast)
            .collect();
        let conclusion = exists_const(encoding.context(), &bounds, &[], &body);

        checker.implies_term(&conclusion)
    }
}

fn c_mentions_heap(conjunct: &Conjunct) -> bool {
    match conjunct {
        Conjunct::Axiom(axiom) => axiom.as_memory().is_some(),
        Conjunct::Implication(implication) => implication
            .premise
            .iter()
            .chain(&implication.conclusion)
            .any(|a| a.as_memory().is_some()),
    }
}

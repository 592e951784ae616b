//! Post-image of `malloc`.
//!
//! Allocation yields a thread-local cell: a fresh address, fresh field
//! symbols, and an empty flow. The local-node invariant of the
//! configuration is instantiated on the new cell; the cell stays local
//! (and interference-free) until a heap write publishes it.

use tracing::trace;

use keyflow_language::VarId;
use keyflow_logic::{
    Annotation, Axiom, Comparator, Conjunct, MemoryAxiom, StackAxiom, SymbolFactory, SymbolPool,
    SymbolicExpr,
};

use crate::error::{EngineError, EngineResult};
use crate::post::{PostCx, PostImage};

pub fn post_malloc(
    cx: &PostCx<'_>,
    pool: &mut SymbolPool,
    mut pre: Annotation,
    var: VarId,
) -> EngineResult<PostImage> {
    let decl = cx.program.var(var);
    trace!(var = %decl.name, "post: malloc");
    if decl.ty != cx.config.flow_domain.node_type {
        return Err(EngineError::config(format!(
            "malloc of '{}', but the flow domain is defined over '{}'",
            cx.program.types.get(decl.ty).name,
            cx.program
                .types
                .get(cx.config.flow_domain.node_type)
                .name
        )));
    }

    let node_type = cx.program.types.get(decl.ty);
    let mut fields = Vec::new();
    let (address, flow) = {
        let mut factory = SymbolFactory::new(pool);
        let address = factory.fresh_value(keyflow_language::Sort::Ptr);
        for (name, ty) in &node_type.fields {
            let sort = cx.program.types.sort(*ty);
            fields.push((name.clone(), factory.fresh_value(sort)));
        }
        (address, factory.fresh_flow())
    };

    let mem = MemoryAxiom::new(address, flow, fields, pool)?;
    let local_invariant = cx.config.local_node_invariant.on_memory(&mem, None, pool)?;

    // Rebind the target variable to the fresh address.
    pre.now.conjuncts.retain(|c| {
        !matches!(c, Conjunct::Axiom(Axiom::EqualsTo { var: v, .. }) if *v == var)
    });
    pre.now.push(Axiom::EqualsTo {
        var,
        value: address,
    });
    pre.now.push(Axiom::LocalMemory(mem));
    pre.now.push(Axiom::InflowEmpty {
        flow,
        is_empty: true,
    });
    pre.now.push(Axiom::Stack(StackAxiom::new(
        Comparator::Neq,
        SymbolicExpr::Symbol(address),
        SymbolicExpr::Null,
        pool,
    )?));
    for conjunct in local_invariant {
        pre.now.conjuncts.push(conjunct);
    }

    Ok(PostImage::pure(pre))
}

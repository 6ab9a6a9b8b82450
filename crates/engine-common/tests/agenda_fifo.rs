use std::cell::RefCell;
use std::rc::Rc;

use proptest::prelude::*;

use flowable_core::CommandConfig;
use flowable_engine_common::{
    CommandContext, CommandContextInterceptor, CommandExecutor, CommandInvoker, InterceptorChain,
    SessionFactories, command_fn,
};

type Trail = Rc<RefCell<Vec<u32>>>;

/// Plan operation `id`; when it runs it records itself and plans `children`
/// more operations with ids taken from `next_id`.
fn plan(
    ctx: &mut CommandContext,
    id: u32,
    fan_out: Rc<Vec<usize>>,
    next_id: Rc<RefCell<u32>>,
    trail: Trail,
) {
    ctx.agenda_mut().plan(format!("op-{id}"), move |ctx: &mut CommandContext| {
        trail.borrow_mut().push(id);
        let children = fan_out.get(id as usize).copied().unwrap_or(0);
        for _ in 0..children {
            let child = {
                let mut next = next_id.borrow_mut();
                *next += 1;
                *next
            };
            plan(ctx, child, fan_out.clone(), next_id.clone(), trail.clone());
        }
        Ok(())
    });
}

fn executor() -> CommandExecutor {
    let chain = InterceptorChain::builder()
        .with(CommandContextInterceptor::new(SessionFactories::new()))
        .invoker(CommandInvoker::new())
        .build()
        .unwrap();
    CommandExecutor::new(chain, CommandConfig::new().transaction_not_supported())
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        ..ProptestConfig::default()
    })]

    /// Property: operations run in the order they were planned, and work
    /// planned during the drain always runs after everything already queued.
    /// Ids are handed out in planning order, so the trail must be ascending.
    #[test]
    fn operations_run_in_planning_order(
        roots in 1_u32..6,
        fan_out in prop::collection::vec(0_usize..3, 0..12),
    ) {
        let trail: Trail = Rc::new(RefCell::new(Vec::new()));
        let fan_out = Rc::new(fan_out);
        let next_id = Rc::new(RefCell::new(roots - 1));

        let recorded = trail.clone();
        executor()
            .execute(command_fn("fan-out", move |ctx: &mut CommandContext| {
                for id in 0..roots {
                    plan(ctx, id, fan_out.clone(), next_id.clone(), recorded.clone());
                }
                Ok(())
            }))
            .unwrap();

        let trail = trail.borrow();
        let expected: Vec<u32> = (0..trail.len() as u32).collect();
        prop_assert_eq!(&*trail, &expected);
        prop_assert!(trail.len() >= roots as usize);
    }
}

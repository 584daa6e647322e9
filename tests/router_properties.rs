// ABOUTME: Property tests for traffic router invariants.
// ABOUTME: Random operation sequences never unbind production or share a pool between listeners.

use proptest::prelude::*;
use verdigris::config::Config;
use verdigris::router::{InMemoryRouter, PromoteOutcome, TrafficRouter};
use verdigris::types::PoolColor;

#[derive(Debug, Clone, Copy)]
enum Op {
    Promote(PoolColor),
    BindTest(PoolColor),
    UnbindTest,
}

fn color() -> impl Strategy<Value = PoolColor> {
    prop_oneof![Just(PoolColor::Blue), Just(PoolColor::Green)]
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        color().prop_map(Op::Promote),
        color().prop_map(Op::BindTest),
        Just(Op::UnbindTest),
    ]
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
}

proptest! {
    #[test]
    fn listener_invariants_hold(active in color(), ops in proptest::collection::vec(op(), 0..40)) {
        let rt = runtime();
        let router = InMemoryRouter::from_config(&Config::template(), active);

        for op in ops {
            let _ = rt.block_on(async {
                match op {
                    Op::Promote(pool) => router.promote(pool).await.map(|_| ()),
                    Op::BindTest(pool) => router.bind_test_traffic(pool).await,
                    Op::UnbindTest => router.unbind_test_traffic().await,
                }
            });

            let bindings = router.current_bindings();
            prop_assert!(bindings.production.is_some());
            prop_assert_ne!(bindings.test, bindings.production);
            let (active, inactive) = rt.block_on(async {
                (router.active_pool().await.unwrap(), router.inactive_pool().await.unwrap())
            });
            prop_assert_ne!(active, inactive);
        }
    }

    #[test]
    fn promoting_twice_equals_promoting_once(active in color(), target in color()) {
        let rt = runtime();
        let once = InMemoryRouter::from_config(&Config::template(), active);
        let twice = InMemoryRouter::from_config(&Config::template(), active);

        rt.block_on(async {
            once.promote(target).await.unwrap();
            twice.promote(target).await.unwrap();
            let second = twice.promote(target).await.unwrap();
            assert_eq!(second, PromoteOutcome::AlreadyActive);
        });

        prop_assert_eq!(once.current_bindings(), twice.current_bindings());
        prop_assert_eq!(once.switch_count(), twice.switch_count());
    }
}

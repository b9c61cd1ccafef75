mod common;

use std::sync::Arc;

use common::{init_tracing, FakeSessionFactory};
use proptest::prelude::*;
use watchpool::handle::Transition;
use watchpool::session::SessionOptions;
use watchpool::{HandleState, WatchHandle};

#[derive(Debug, Clone, Copy)]
enum Op {
    Start,
    Stop,
    FailNextOpen,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![Just(Op::Start), Just(Op::Stop), Just(Op::FailNextOpen)]
}

fn transition() -> impl Strategy<Value = Transition> {
    prop_oneof![
        Just(Transition::BeginStart),
        Just(Transition::StartSucceeded),
        Just(Transition::StartFailed),
        Just(Transition::BeginStop),
        Just(Transition::StopFinished),
    ]
}

proptest! {
    /// Only the forward cycle plus the start-failure edge is ever taken.
    #[test]
    fn state_machine_only_takes_legal_edges(steps in prop::collection::vec(transition(), 0..64)) {
        let mut state = HandleState::Stopped;
        for step in steps {
            if let Some(next) = state.apply(step) {
                let legal = matches!(
                    (state, next),
                    (HandleState::Stopped, HandleState::Starting)
                        | (HandleState::Starting, HandleState::Running)
                        | (HandleState::Starting, HandleState::Stopped)
                        | (HandleState::Running, HandleState::Stopping)
                        | (HandleState::Stopping, HandleState::Stopped)
                );
                prop_assert!(legal, "{state} -> {next}");
                state = next;
            }
        }
    }

    /// Awaited start/stop sequences leave the handle settled with at most
    /// one open session, and every open is matched by a close once stopped.
    #[test]
    fn sessions_track_state(ops in prop::collection::vec(op(), 1..24)) {
        init_tracing();
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        rt.block_on(async {
            let sessions = FakeSessionFactory::new();
            let handle = WatchHandle::new("/p", SessionOptions::default(), Arc::new(sessions.clone()));

            for op in ops {
                match op {
                    Op::Start => {
                        let _ = handle.start().await;
                    }
                    Op::Stop => {
                        let _ = handle.stop().await;
                    }
                    Op::FailNextOpen => sessions.fail_next_open("scripted"),
                }

                let state = handle.state();
                assert!(state.is_settled(), "unsettled after awaited op: {state}");
                let running = usize::from(state == HandleState::Running);
                assert_eq!(sessions.open_count(), running);
                assert_eq!(sessions.opened().len() - sessions.closed().len(), running);
            }
        });
    }
}

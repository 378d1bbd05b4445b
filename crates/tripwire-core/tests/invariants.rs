//! Property tests: state invariants hold over arbitrary call sequences.

use futures::executor::block_on;
use proptest::prelude::*;
use std::cell::Cell;
use std::time::Duration;
use tripwire_core::{Breaker, BreakerConfig, BreakerError, BreakerState, ManualClock, Phase};

const START: u64 = 1_700_000_000_000;
const RESET_MS: u64 = 2_000;

#[derive(Debug, Clone)]
enum Step {
    Succeed,
    Fail,
    Wait(u64),
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        3 => Just(Step::Succeed),
        3 => Just(Step::Fail),
        2 => (1u64..6_000).prop_map(Step::Wait),
    ]
}

fn config() -> impl Strategy<Value = BreakerConfig> {
    (
        0.0f64..=1.0,
        1u32..6,
        1u32..6,
        0u64..3_000,
        prop::option::of(1u32..12),
    )
        .prop_map(|(threshold, min_attempts, min_failures, min_eval, ceiling)| {
            let mut config = BreakerConfig::new(
                threshold,
                Duration::from_millis(5_000),
                Duration::from_millis(RESET_MS),
            )
            .with_min_attempts(min_attempts)
            .with_min_failures(min_failures)
            .with_min_evaluation_time(Duration::from_millis(min_eval));
            config.max_failure_count = ceiling;
            config
        })
}

fn run(breaker: &Breaker, succeed: bool, invoked: &Cell<u32>) -> Result<(), BreakerError<()>> {
    block_on(breaker.execute(|| async {
        invoked.set(invoked.get() + 1);
        if succeed {
            Ok(())
        } else {
            Err(())
        }
    }))
}

fn assert_invariants(state: &BreakerState, config: &BreakerConfig) -> Result<(), TestCaseError> {
    if state.phase == Phase::Closed && state.first_failure_time.is_none() {
        prop_assert_eq!(state.failure_count, 0);
    }
    if state.phase == Phase::Open {
        prop_assert!(state.next_attempt.is_some());
    }
    if let Some(ceiling) = config.max_failure_count {
        prop_assert!(state.failure_count <= ceiling);
    }
    Ok(())
}

proptest! {
    #[test]
    fn invariants_hold_over_any_sequence(
        config in config(),
        steps in prop::collection::vec(step(), 1..80),
    ) {
        let clock = ManualClock::new(START);
        let breaker = Breaker::new(config.clone(), None).unwrap().with_clock(clock.clone());
        let mut now = START;

        for step in steps {
            let before = breaker.export_state();
            let invoked = Cell::new(0);

            let result = match step {
                Step::Wait(ms) => {
                    now += ms;
                    clock.set(now);
                    continue;
                }
                Step::Succeed => run(&breaker, true, &invoked),
                Step::Fail => run(&breaker, false, &invoked),
            };

            let conclusively_open = before.phase == Phase::Open
                && before.next_attempt.map_or(false, |next| now < next)
                && config.max_failure_count.map_or(true, |c| before.failure_count < c);

            if conclusively_open {
                prop_assert_eq!(invoked.get(), 0);
                prop_assert!(matches!(result, Err(BreakerError::Open(_))));
            } else {
                prop_assert_eq!(invoked.get(), 1);
            }

            let after = breaker.export_state();
            if after.phase == Phase::Open && before.phase != Phase::Open {
                prop_assert_eq!(after.next_attempt, Some(now + RESET_MS));
            }
            assert_invariants(&after, &config)?;
            prop_assert_eq!(after, breaker.export_state());
        }
    }

    #[test]
    fn successes_never_open_the_circuit(
        config in config(),
        waits in prop::collection::vec(0u64..10_000, 1..40),
    ) {
        let clock = ManualClock::new(START);
        let breaker = Breaker::new(config, None).unwrap().with_clock(clock.clone());

        for wait in waits {
            clock.advance(Duration::from_millis(wait));
            prop_assert!(run(&breaker, true, &Cell::new(0)).is_ok());
            let state = breaker.export_state();
            prop_assert_eq!(state.phase, Phase::Closed);
            prop_assert_eq!(state.failure_count, 0);
            prop_assert_eq!(state.first_failure_time, None);
        }
    }

    #[test]
    fn snapshot_survives_json_and_reimport(
        config in config(),
        steps in prop::collection::vec(step(), 0..40),
    ) {
        let clock = ManualClock::new(START);
        let breaker = Breaker::new(config.clone(), None).unwrap().with_clock(clock.clone());

        for step in steps {
            match step {
                Step::Wait(ms) => clock.advance(Duration::from_millis(ms)),
                Step::Succeed => { let _ = run(&breaker, true, &Cell::new(0)); }
                Step::Fail => { let _ = run(&breaker, false, &Cell::new(0)); }
            }
        }

        let snapshot = breaker.export_state();
        let decoded = BreakerState::from_json(&snapshot.to_json().unwrap()).unwrap();
        prop_assert_eq!(decoded, snapshot);

        let restored = Breaker::new(config, Some(decoded)).unwrap();
        prop_assert_eq!(restored.export_state(), snapshot);
    }
}

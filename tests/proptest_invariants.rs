
use std::collections::BTreeSet;

use proptest::prelude::*;
use rulepipe::{
    InterpreterConfig, MemoryMessage, Message, PipelineInterpreter, ProcessingState, Value,
};
use strategies::{GenPipeline, arb_message, arb_pipeline, hit_field};

fn run(state: &ProcessingState, message: &MemoryMessage) -> (rulepipe::PipelineReport, MemoryMessage) {
    let mut copy = message.clone();
    let report = PipelineInterpreter::default().run(&state.pipelines()[0], &mut copy);
    (report, copy)
}

fn hits(r#gen: &GenPipeline, message: &MemoryMessage) -> BTreeSet<String> {
    r#gen.rules
        .iter()
        .filter(|r| message.get(&hit_field(&r.name)) == Some(&Value::Bool(true)))
        .map(|r| r.name.clone())
        .collect()
}

// ---------------------------------------------------------------------------
// Invariant 1: Stage semantics
//
// The pipeline outcome and the set of rules whose `then` ran agree with a
// direct evaluation of the conditions, stage by stage.
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    #[test]
    fn outcome_matches_reference(r#gen in arb_pipeline(), msg in arb_message()) {
        let state = r#gen.state(InterpreterConfig::default());
        let (report, processed) = run(&state, &msg);
        let (outcome, expected_hits) = r#gen.expected(&msg);
        prop_assert_eq!(report.outcome(), outcome);
        prop_assert_eq!(hits(&r#gen, &processed), expected_hits);
    }

    #[test]
    fn halted_pipeline_reports_no_later_stage(r#gen in arb_pipeline(), msg in arb_message()) {
        let state = r#gen.state(InterpreterConfig::default());
        let (report, _) = run(&state, &msg);
        if let rulepipe::PipelineOutcome::Halted { stage } = report.outcome() {
            let last = report.stages().last().map(rulepipe::StageReport::stage);
            prop_assert_eq!(last, Some(stage));
            prop_assert!(!report.stages().last().is_some_and(rulepipe::StageReport::passed));
        } else {
            prop_assert!(report.stages().iter().all(rulepipe::StageReport::passed));
            prop_assert_eq!(report.stages().len(), r#gen.stages.len());
        }
    }
}

// ---------------------------------------------------------------------------
// Invariant 2: Determinism
//
// The same state and message always yield the same report and message, and
// the generated fast path agrees with the tree-walking interpreter.
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    #[test]
    fn repeated_runs_agree(r#gen in arb_pipeline(), msg in arb_message()) {
        let state = r#gen.state(InterpreterConfig::default());
        let first = run(&state, &msg);
        for _ in 0..3 {
            prop_assert_eq!(&run(&state, &msg), &first);
        }
    }

    #[test]
    fn generated_code_agrees_with_interpreter(r#gen in arb_pipeline(), msg in arb_message()) {
        let generated = r#gen.state(InterpreterConfig::default().with_generated_code(true));
        let walked = r#gen.state(InterpreterConfig::default().with_generated_code(false));
        prop_assert_eq!(run(&generated, &msg), run(&walked, &msg));
    }
}

// ---------------------------------------------------------------------------
// Invariant 3: Counters
//
// Every time a stage runs, each of its rules counts exactly one of matched,
// not-matched or failed, and `executed` counts the matches.
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn rule_counters_balance(
        r#gen in arb_pipeline(),
        messages in prop::collection::vec(arb_message(), 1..8),
    ) {
        let state = r#gen.state(InterpreterConfig::default());
        for msg in &messages {
            run(&state, msg);
        }
        let pipeline = &state.pipelines()[0];
        prop_assert_eq!(pipeline.pipeline().executed_count(), messages.len() as u64);
        for stage in pipeline.stages() {
            let runs = stage.stage().executed_count();
            for rule in stage.rules() {
                let m = rule.metrics();
                prop_assert_eq!(m.matched + m.not_matched + m.failed, runs);
                prop_assert_eq!(m.executed, m.matched);
                prop_assert_eq!(m.failed, 0);
            }
        }
    }
}

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use rulepipe::{
    FunctionRegistry, InterpreterConfig, MemoryMessage, PipelineInterpreter, ProcessingState,
    parse_pipelines, parse_rules,
};

/// Rule source with `n` rules, each comparing its own field, all placed in
/// one `match all` stage followed by a stage that tags the message.
fn sources(n: usize) -> (String, String) {
    let mut rules = String::new();
    let mut stage = String::from("pipeline \"bench\"\nstage 0 match all\n");
    for i in 0..n {
        rules.push_str(&format!(
            "rule \"r{i}\" when to_long($message.f{i}) >= 1 && has_field(\"f{i}\") then let x = $message.f{i} * 2; end\n"
        ));
        stage.push_str(&format!("    rule \"r{i}\";\n"));
    }
    rules.push_str("rule \"tag\" when true then set_field(\"tagged\", \"yes\"); end\n");
    stage.push_str("stage 1 match either\n    rule \"tag\";\nend\n");
    (rules, stage)
}

fn build_state(n: usize, generated: bool) -> (ProcessingState, MemoryMessage) {
    let (rules, pipelines) = sources(n);
    let state = ProcessingState::from_sources(
        &rules,
        &pipelines,
        &FunctionRegistry::with_builtins(),
        InterpreterConfig::default().with_generated_code(generated),
    )
    .unwrap();
    let mut msg = MemoryMessage::new();
    for i in 0..n {
        msg = msg.with(&format!("f{i}"), 10_i64);
    }
    (state, msg)
}

fn bench_process(c: &mut Criterion) {
    let mut group = c.benchmark_group("process");
    let interpreter = PipelineInterpreter::default();

    for &n in &[5, 20, 50] {
        let (state, msg) = build_state(n, false);
        group.bench_function(&format!("{n}_rules_interpreted"), |b| {
            b.iter(|| {
                let mut m = msg.clone();
                black_box(interpreter.process(&state, &mut m, &["bench"]))
            });
        });

        let (state, msg) = build_state(n, true);
        group.bench_function(&format!("{n}_rules_generated"), |b| {
            b.iter(|| {
                let mut m = msg.clone();
                black_box(interpreter.process(&state, &mut m, &["bench"]))
            });
        });
    }

    group.finish();
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    let registry = FunctionRegistry::with_builtins();

    for &n in &[5, 20, 50] {
        let (rules, pipelines) = sources(n);
        group.bench_function(&format!("{n}_rules"), |b| {
            b.iter(|| black_box(parse_rules(black_box(&rules), &registry).unwrap()));
        });
        group.bench_function(&format!("{n}_rule_pipeline"), |b| {
            b.iter(|| black_box(parse_pipelines(black_box(&pipelines)).unwrap()));
        });
    }

    group.finish();
}

fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve");
    let registry = FunctionRegistry::with_builtins();

    for &n in &[5, 20, 50] {
        let (rules, pipelines) = sources(n);
        let rules = parse_rules(&rules, &registry).unwrap();
        let pipelines = parse_pipelines(&pipelines).unwrap();
        group.bench_function(&format!("{n}_rules"), |b| {
            b.iter(|| {
                black_box(
                    ProcessingState::builder()
                        .rules(rules.iter().cloned())
                        .pipelines(pipelines.iter().cloned())
                        .build(),
                )
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_process, bench_parse, bench_resolve);
criterion_main!(benches);

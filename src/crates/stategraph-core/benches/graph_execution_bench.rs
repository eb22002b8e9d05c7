use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use stategraph_checkpoint::InMemoryCheckpointSaver;
use stategraph_core::state::{FieldSpec, StateSchema};
use stategraph_core::store::{namespace, BaseStore, InMemoryStore, SearchRequest};
use stategraph_core::{CompiledGraph, StateGraph, END};
use std::sync::Arc;

fn chain_graph(length: usize) -> CompiledGraph {
    let schema = StateSchema::new()
        .field(FieldSpec::replace("counter").with_default(json!(0)))
        .field(FieldSpec::append("trace"));
    let mut graph = StateGraph::new(schema);

    for i in 0..length {
        let name = format!("node_{}", i);
        graph.add_node(name.clone(), |state, ctx| async move {
            let counter = state["counter"].as_i64().unwrap_or(0);
            Ok(json!({"counter": counter + 1, "trace": ctx.node()}))
        });
        if i == 0 {
            graph.set_entry(name);
        } else {
            graph.add_edge(format!("node_{}", i - 1), name);
        }
    }
    graph.add_edge(format!("node_{}", length - 1), END);

    graph
        .compile(Arc::new(InMemoryCheckpointSaver::new()))
        .unwrap()
}

fn graph_invoke_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("invoke chain");

    for length in [1usize, 5, 20] {
        let compiled = chain_graph(length);
        let mut thread = 0u64;
        group.bench_with_input(BenchmarkId::from_parameter(length), &length, |b, _| {
            b.to_async(&runtime).iter(|| {
                thread += 1;
                let compiled = compiled.clone();
                let thread_id = format!("bench-{}", thread);
                async move {
                    compiled
                        .invoke(&thread_id, black_box(json!({})))
                        .await
                        .unwrap();
                }
            });
        });
    }
    group.finish();
}

fn interrupt_resume_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();

    let mut graph = StateGraph::new(StateSchema::new().field(FieldSpec::replace("answer")));
    graph.add_node("ask", |_state, ctx| async move {
        let answer = ctx.interrupt(json!("continue?"))?;
        Ok(json!({"answer": answer}))
    });
    graph.set_entry("ask");
    graph.add_edge("ask", END);
    let compiled = graph
        .compile(Arc::new(InMemoryCheckpointSaver::new()))
        .unwrap();

    let mut thread = 0u64;
    c.bench_function("interrupt and resume", |b| {
        b.to_async(&runtime).iter(|| {
            thread += 1;
            let compiled = compiled.clone();
            let thread_id = format!("bench-{}", thread);
            async move {
                compiled.invoke(&thread_id, json!({})).await.unwrap();
                compiled
                    .resume(&thread_id, black_box(json!("yes")))
                    .await
                    .unwrap();
            }
        });
    });
}

fn store_search_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryStore::new();

    runtime.block_on(async {
        for user in 0..10 {
            let ns = namespace(&["users", &format!("u{}", user)]);
            for key in 0..100 {
                store
                    .put(&ns, &format!("k{}", key), json!({"text": "note", "rank": key % 5}))
                    .await
                    .unwrap();
            }
        }
    });

    let mut filter = serde_json::Map::new();
    filter.insert("rank".to_string(), json!(3));

    c.bench_function("store filtered search", |b| {
        b.to_async(&runtime).iter(|| async {
            store
                .search(
                    SearchRequest::new(namespace(&["users"]))
                        .with_filter(black_box(filter.clone()))
                        .with_limit(10),
                )
                .await
                .unwrap();
        });
    });
}

criterion_group!(
    benches,
    graph_invoke_benchmark,
    interrupt_resume_benchmark,
    store_search_benchmark
);
criterion_main!(benches);

//! Benchmarks for the typed-value codec and request compilation.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use ark_gateway::codec::{decode, encode, Value};
use ark_gateway::config::MessageEncoding;
use ark_gateway::request::{ChatCompletionRequest, RequestCompiler};

fn bench_encode_typed_list(c: &mut Criterion) {
    // 4k token ids, the usual shape of a prompt passed as ints.
    let value = Value::List((0..4096).map(Value::Int).collect());

    c.bench_function("encode_int_list_4k", |b| {
        b.iter(|| black_box(encode(black_box(&value))))
    });
}

fn bench_nested_round_trip(c: &mut Criterion) {
    let messages: Vec<Value> = (0..64)
        .map(|i| {
            Value::string_map([
                ("role", Value::from(if i % 2 == 0 { "user" } else { "assistant" })),
                ("content", Value::from("the quick brown fox jumps over the lazy dog")),
            ])
        })
        .collect();
    let value = Value::string_map([("messages", Value::List(messages))]);
    let wire = encode(&value);

    c.bench_function("decode_64_messages", |b| {
        b.iter(|| black_box(decode(black_box(&wire))))
    });
}

fn bench_compile_request(c: &mut Criterion) {
    let request: ChatCompletionRequest = serde_json::from_value(serde_json::json!({
        "model": "m",
        "messages": [
            {"role": "system", "content": "You are terse."},
            {"role": "user", "content": "hello"}
        ],
        "temperature": 0.7,
        "max_tokens": 256,
        "stop": ["\n\n"]
    }))
    .unwrap();

    for encoding in [MessageEncoding::Structured, MessageEncoding::Legacy] {
        let compiler = RequestCompiler::new(encoding);
        c.bench_function(&format!("compile_request_{encoding:?}"), |b| {
            b.iter(|| black_box(compiler.compile(black_box(&request))))
        });
    }
}

criterion_group!(
    benches,
    bench_encode_typed_list,
    bench_nested_round_trip,
    bench_compile_request
);
criterion_main!(benches);

use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use pprof::criterion::{Output, PProfProfiler};
use rewrite_rules::context::Request;
use rewrite_rules::{Engine, Rewrite};

fn profiled() -> Criterion {
    let output = Output::Flamegraph(None);
    let prof = PProfProfiler::new(1000, output);
    Criterion::default().with_profiler(prof)
}

pub fn rewrite_match(engine: &Engine, req: &Request) {
    assert!(matches!(
        engine.rewrite(req).rewrite,
        Rewrite::Uri { path, .. } if path == "/files/hello%2Fworld",
    ))
}

pub fn rewrite_conditions(engine: &Engine, req: &Request) {
    assert!(matches!(
        engine.rewrite(req).rewrite,
        Rewrite::Redirect { location, status: 301 }
            if location == "https://example.com/static/hello/world",
    ))
}

pub fn bench_rule_match(c: &mut Criterion) {
    let engine: Engine = "RewriteRule ^/static/(.*)$ /files/$1 [B]".parse().unwrap();
    let req = Request::new("/static/hello/world");
    c.bench_function("basic_match", |b| {
        b.iter(|| black_box(rewrite_match(black_box(&engine), black_box(&req))))
    });
}

pub fn bench_rule_conditions(c: &mut Criterion) {
    let engine: Engine = r#"
        RewriteCond %{HTTP_HOST} ^www\.(.+)$ [NC,OR]
        RewriteCond %{HTTP_HOST} ^old\.(.+)$ [NC]
        RewriteCond %{REQUEST_METHOD} !=POST
        RewriteRule ^/(.*)$ https://%1/$1 [R=301,L]
    "#
    .parse()
    .unwrap();
    let req = Request::new("/static/hello/world").header("Host", "WWW.example.com");
    c.bench_function("conditions_match", |b| {
        b.iter(|| black_box(rewrite_conditions(black_box(&engine), black_box(&req))))
    });
}

criterion_group!(
    name = benches;
    config = profiled();
    targets = bench_rule_match, bench_rule_conditions
);
criterion_main!(benches);

use std::cell::RefCell;
use std::io;
use std::rc::Rc;

use criterion::{criterion_group, criterion_main, Criterion};
use tlang::interpreter::Interpreter;

fn benchmark(c: &mut Criterion) {
    let src = "let fib = func(n) { if (n < 2) { ret n; }; ret fib(n - 1) + fib(n - 2); }; fib(15);";

    c.bench_function("fib 15", |b| {
        b.iter(|| {
            let sink: Rc<RefCell<dyn io::Write>> = Rc::new(RefCell::new(io::sink()));
            let mut interp = Interpreter::new(sink);
            interp.run_source(src).unwrap();
        })
    });
}

criterion_group!(benches, benchmark);
criterion_main!(benches);

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use helo::{ColumnDef, Dialect, Expr, FieldType, Row, Statement, Table, and_, col};

fn table(n: usize) -> Table {
    (0..n).fold(Table::new("t").column(ColumnDef::auto("id")), |t, i| {
        t.column(ColumnDef::new(format!("col{i}"), FieldType::BigInt))
    })
}

/// SELECT col0, col1, ... FROM t WHERE col0 = ? AND col1 = ? ...
fn select_n(t: &Table, n: usize) -> helo::Select {
    let conditions: Vec<Expr> = (0..n).map(|i| col(format!("col{i}")).eq(i as i64)).collect();
    t.select()
        .columns((0..n).map(|i| col(format!("col{i}"))))
        .filter(and_(conditions))
        .order_by([col("id").desc()])
        .limit(10)
}

fn bench_select(c: &mut Criterion) {
    let mut group = c.benchmark_group("render/select");

    for n in [1, 5, 10, 50] {
        let t = table(n);
        let select = select_n(&t, n);
        for dialect in [Dialect::MySql, Dialect::Postgres] {
            group.bench_with_input(
                BenchmarkId::new(dialect.to_string(), n),
                &select,
                |b, select| {
                    b.iter(|| black_box(select.build(dialect).unwrap()));
                },
            );
        }
    }

    group.finish();
}

fn bench_build_and_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("render/build_and_render");

    for n in [1, 5, 10, 50] {
        let t = table(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| black_box(select_n(&t, n).build(Dialect::Postgres).unwrap()));
        });
    }

    group.finish();
}

fn bench_insert_many(c: &mut Criterion) {
    let mut group = c.benchmark_group("render/insert_many");
    let t = table(4);

    for n in [10, 100, 1000] {
        let rows: Vec<Row> = (0..n)
            .map(|i| {
                (0..4)
                    .map(|c| (format!("col{c}"), i as i64 * 4 + c))
                    .collect()
            })
            .collect();
        group.bench_with_input(BenchmarkId::from_parameter(n), &rows, |b, rows| {
            b.iter(|| {
                let insert = t.insert().values_many(rows.iter().cloned());
                black_box(insert.build(Dialect::Postgres).unwrap());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_select, bench_build_and_render, bench_insert_many);
criterion_main!(benches);
